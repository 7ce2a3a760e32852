use crate::error::CliError;
use isonet::config::{
    max_core_count,
    validate_core_count,
};
use isonet::{
    CorrectionConfig,
    NetworkConfig,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::path::Path;

#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub correction: CorrectionConfig,
    pub network: NetworkConfig,
    /// Worker threads, `None` means all but two cores.
    pub core_count: Option<usize>,
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self, CliError> {
        match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path)?;
                let config: Config = serde_json::from_str(&contents)?;
                Ok(config)
            }
            None => Ok(Config::default()),
        }
    }

    pub fn resolved_core_count(&self) -> Result<usize, CliError> {
        match self.core_count {
            Some(requested) => validate_core_count(requested)
                .map_err(|e| CliError::Config(e.to_string())),
            None => Ok(max_core_count()),
        }
    }

    pub fn template() -> Result<String, CliError> {
        Ok(serde_json::to_string_pretty(&Config::default())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_round_trips() {
        let parsed: Config = serde_json::from_str(&Config::template().unwrap()).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        std::fs::write(&path, r#"{"network": {"min_quant": 10.0}, "core_count": 1}"#).unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.network.min_quant, 10.0);
        assert_eq!(config.network.min_mid_len, 3);
        assert_eq!(config.correction, CorrectionConfig::default());
        assert_eq!(config.resolved_core_count().unwrap(), 1);
    }

    #[test]
    fn test_zero_cores_rejected() {
        let config = Config {
            core_count: Some(0),
            ..Config::default()
        };
        assert!(matches!(
            config.resolved_core_count(),
            Err(CliError::Config(_))
        ));
    }
}
