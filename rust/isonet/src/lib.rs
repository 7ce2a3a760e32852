pub mod alignment;
pub mod config;
pub mod correction;
pub mod errors;
pub mod isotopologue;
pub mod mid_calculation;
pub mod network;
pub mod progress;
pub mod stats;

pub use alignment::{
    MidAligner,
    MidAlignment,
    NullModel,
    NullModelCache,
    align_vectors,
};
pub use config::{
    CorrectionConfig,
    NetworkConfig,
};
pub use correction::CorrectionMatrix;
pub use errors::{
    IsonetError,
    Result,
};
pub use mid_calculation::{
    CorrectedMid,
    MidCalculationReport,
    RawIntensityRow,
    calculate_mids,
};
pub use network::{
    MidTableRow,
    Network,
    NetworkGraph,
    PathwayGraph,
};
pub use progress::{
    NoProgress,
    ProgressSink,
    TracingProgress,
};
