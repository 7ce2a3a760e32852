use std::fmt::Display;

/// Problems with what the caller handed us. These are never retried.
#[derive(Debug, Clone, PartialEq)]
pub enum InputValidationError {
    MissingColumn {
        column: &'static str,
        context: String,
    },
    MalformedIsotopomerLabel {
        label: String,
    },
    EmptyControlGroup {
        control_label: String,
        context: String,
    },
    EmptyMid {
        context: &'static str,
    },
    InvalidCoreCount {
        requested: usize,
        max: usize,
    },
    InvalidPathway {
        msg: String,
    },
}

impl Display for InputValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingColumn { column, context } => {
                write!(f, "Missing required column '{}' ({})", column, context)
            }
            Self::MalformedIsotopomerLabel { label } => write!(
                f,
                "Could not identify mass isotopomer '{}'. Are they in the correct format M+0 or m+0?",
                label
            ),
            Self::EmptyControlGroup {
                control_label,
                context,
            } => write!(
                f,
                "No samples matched the control condition '{}' ({})",
                control_label, context
            ),
            Self::EmptyMid { context } => {
                write!(f, "MID vectors must have at least one dimension ({})", context)
            }
            Self::InvalidCoreCount { requested, max } => write!(
                f,
                "Core count must be between 1 and {}, got {}",
                max, requested
            ),
            Self::InvalidPathway { msg } => write!(f, "Invalid pathway graph: {}", msg),
        }
    }
}

/// Numeric failures that are scoped to a single unit of work.
#[derive(Debug, Clone, PartialEq)]
pub enum NumericError {
    SingularCorrectionMatrix { size: usize },
    InsufficientChannels { channels: usize },
    InsufficientControlReplicates { replicates: usize, required: usize },
    NonFiniteControl { channel: usize },
}

impl Display for NumericError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SingularCorrectionMatrix { size } => write!(
                f,
                "Correction matrix of size {0}x{0} is singular, check the unlabeled samples",
                size
            ),
            Self::InsufficientChannels { channels } => write!(
                f,
                "At least two isotopologue channels are needed for correction, got {}",
                channels
            ),
            Self::InsufficientControlReplicates {
                replicates,
                required,
            } => write!(
                f,
                "Control group has {} replicate(s), at least {} are needed",
                replicates, required
            ),
            Self::NonFiniteControl { channel } => {
                write!(f, "Control mean for channel M+{} is not finite", channel)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DataProcessingError {
    ExpectedSlicesSameLength {
        expected: usize,
        other: usize,
        context: String,
    },
    ExpectedNonEmptyData {
        context: Option<String>,
    },
    Numeric {
        error: NumericError,
        context: String,
    },
}

impl From<NumericError> for DataProcessingError {
    fn from(x: NumericError) -> Self {
        Self::Numeric {
            error: x,
            context: "".to_string(),
        }
    }
}

impl DataProcessingError {
    pub fn append_to_context(mut self, context: &str) -> Self {
        match &mut self {
            DataProcessingError::ExpectedSlicesSameLength {
                context: owned_context,
                ..
            } => {
                owned_context.push_str(context);
            }
            DataProcessingError::ExpectedNonEmptyData {
                context: owned_context,
            } => match owned_context {
                Some(x) => x.push_str(context),
                None => *owned_context = Some(context.to_string()),
            },
            DataProcessingError::Numeric {
                context: owned_context,
                ..
            } => {
                owned_context.push_str(context);
            }
        }
        self
    }
}

impl Display for DataProcessingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExpectedSlicesSameLength {
                expected,
                other,
                context,
            } => write!(
                f,
                "Expected slices of the same length ({} != {}) in {}",
                expected, other, context
            ),
            Self::ExpectedNonEmptyData { context } => match context {
                Some(c) => write!(f, "Expected non-empty data: {}", c),
                None => write!(f, "Expected non-empty data"),
            },
            Self::Numeric { error, context } => write!(f, "{} {}", error, context),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IsonetError {
    InputValidation(InputValidationError),
    DataProcessing(DataProcessingError),
    ThreadPool { msg: String },
}

impl Display for IsonetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InputValidation(e) => write!(f, "{}", e),
            Self::DataProcessing(e) => write!(f, "{}", e),
            Self::ThreadPool { msg } => write!(f, "Could not build thread pool: {}", msg),
        }
    }
}

impl std::error::Error for IsonetError {}

pub type Result<T> = std::result::Result<T, IsonetError>;

impl From<InputValidationError> for IsonetError {
    fn from(x: InputValidationError) -> Self {
        Self::InputValidation(x)
    }
}

impl From<DataProcessingError> for IsonetError {
    fn from(x: DataProcessingError) -> Self {
        Self::DataProcessing(x)
    }
}

impl From<NumericError> for IsonetError {
    fn from(x: NumericError) -> Self {
        Self::DataProcessing(x.into())
    }
}

impl From<rayon::ThreadPoolBuildError> for IsonetError {
    fn from(x: rayon::ThreadPoolBuildError) -> Self {
        Self::ThreadPool { msg: x.to_string() }
    }
}

