//! CLI configuration file.

use anyhow::{Context, Result};
use buildsync_execution::JobConfig;
use buildsync_model::LoaderConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings read from `--config`. Missing fields take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Synchronization job settings
    pub job: JobConfig,
    /// Model loader settings
    pub loader: LoaderConfig,
}

impl CliConfig {
    /// Load from a JSON file, or use defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: CliConfig = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config
            .job
            .validate()
            .with_context(|| format!("invalid config {}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildsync_execution::PhaseWeights;

    #[test]
    fn test_defaults_without_file() {
        let config = CliConfig::load(None).unwrap();
        assert_eq!(config, CliConfig::default());
        assert_eq!(config.job.weights.total(), 100);
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buildsync.json");
        std::fs::write(
            &path,
            r#"{
                "job": { "weights": { "fetch": 60, "synchronize": 30 } },
                "loader": { "max_depth": 2 }
            }"#,
        )
        .unwrap();

        let config = CliConfig::load(Some(&path)).unwrap();
        assert_eq!(config.job.weights, PhaseWeights::new(10, 60, 30));
        assert_eq!(config.loader.max_depth, 2);
        assert_eq!(config.loader.marker_files, LoaderConfig::default().marker_files);
    }

    #[test]
    fn test_rejects_zero_weights() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buildsync.json");
        std::fs::write(
            &path,
            r#"{ "job": { "weights": { "initialize": 0, "fetch": 0, "synchronize": 0 } } }"#,
        )
        .unwrap();

        assert!(CliConfig::load(Some(&path)).is_err());
    }
}
