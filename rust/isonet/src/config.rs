use crate::alignment::NullModelCache;
use crate::errors::{
    InputValidationError,
    IsonetError,
};
use rayon::{
    ThreadPool,
    ThreadPoolBuilder,
};
use serde::{
    Deserialize,
    Serialize,
};

/// Settings for the natural-abundance correction pipeline.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct CorrectionConfig {
    /// Samples whose condition contains this label are the unlabeled controls.
    pub control_label: String,
    pub min_control_replicates: usize,
    /// Drop isotopologues heavier than the formula's carbon count.
    pub use_formula_carbon_limit: bool,
    /// Abort the whole batch on the first failed metabolite.
    pub strict: bool,
    /// A control is usable only when its relative M+0 is at least `1 - max_label`.
    pub max_label: f64,
    /// Share of usable replicates a control group or condition needs.
    pub min_fraction: f64,
    /// Corrected MIDs whose absolute sum is further than this from 1 are masked.
    pub sum_threshold: f64,
    /// When every labeled condition has M+0 above `1 - min_label` they are all masked.
    pub min_label: f64,
    /// Trailing isotopomers below this in every condition are dropped.
    pub trim_below: Option<f64>,
    /// Conditions never expected to carry label, skipped by the `min_label` check.
    pub unlabeled_conditions: Vec<String>,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            control_label: "Ctrl".to_string(),
            min_control_replicates: 2,
            use_formula_carbon_limit: false,
            strict: false,
            max_label: 0.1,
            min_fraction: 0.75,
            sum_threshold: 0.2,
            min_label: 0.05,
            trim_below: Some(0.01),
            unlabeled_conditions: vec!["T0".to_string()],
        }
    }
}

/// Thresholds for building the contextualization network.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    pub sum_threshold: f64,
    pub min_labeling: f64,
    pub min_mid_len: usize,
    pub min_quant: f64,
    pub m0_threshold: f64,
    pub excluded_conditions: Vec<String>,
    pub unlabeled_conditions: Vec<String>,
    pub gap_penalty: f64,
    pub significance_z: f64,
    pub null_model_samples: usize,
    pub seed: Option<u64>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            sum_threshold: 0.05,
            min_labeling: 0.2,
            min_mid_len: 3,
            min_quant: 500.0,
            m0_threshold: 0.90,
            excluded_conditions: vec!["T0".to_string(), "Ctrl".to_string()],
            unlabeled_conditions: vec!["T0".to_string(), "Ctrl".to_string()],
            gap_penalty: crate::alignment::DEFAULT_GAP_PENALTY,
            significance_z: -1.0,
            null_model_samples: crate::alignment::null_model::DEFAULT_NULL_MODEL_SAMPLES,
            seed: None,
        }
    }
}

impl NetworkConfig {
    /// Fresh null model cache sized and seeded from this config.
    pub fn null_model_cache(&self) -> NullModelCache {
        match self.seed {
            Some(seed) => NullModelCache::with_seed(self.null_model_samples, seed),
            None => NullModelCache::new(self.null_model_samples),
        }
    }
}

/// Leaves two cores for the rest of the system.
pub fn max_core_count() -> usize {
    let available = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    available.saturating_sub(2).max(1)
}

pub fn validate_core_count(requested: usize) -> Result<usize, InputValidationError> {
    let max = max_core_count();
    if requested == 0 || requested > max {
        return Err(InputValidationError::InvalidCoreCount { requested, max });
    }
    Ok(requested)
}

pub(crate) fn build_pool(core_count: usize) -> Result<ThreadPool, IsonetError> {
    let threads = validate_core_count(core_count)?;
    Ok(ThreadPoolBuilder::new().num_threads(threads).build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let cfg: NetworkConfig = serde_json::from_str(r#"{"min_quant": 100.0}"#).unwrap();
        assert_eq!(cfg.min_quant, 100.0);
        assert_eq!(cfg.min_mid_len, 3);
        assert_eq!(cfg.excluded_conditions, vec!["T0", "Ctrl"]);

        let cfg: CorrectionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, CorrectionConfig::default());
    }

    #[test]
    fn test_null_model_cache_from_config() {
        let cfg = NetworkConfig {
            null_model_samples: 50,
            seed: Some(9),
            ..NetworkConfig::default()
        };
        let a = cfg.null_model_cache().get_or_simulate(3, 4, cfg.gap_penalty).unwrap();
        let b = cfg.null_model_cache().get_or_simulate(3, 4, cfg.gap_penalty).unwrap();
        assert_eq!(a, b);
        assert_eq!(cfg.null_model_cache().samples(), 50);
    }

    #[test]
    fn test_core_count_bounds() {
        assert!(validate_core_count(0).is_err());
        assert_eq!(validate_core_count(1).unwrap(), 1);
        let max = max_core_count();
        assert!(validate_core_count(max + 1).is_err());
    }
}
