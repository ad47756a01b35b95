//! Configuration for the pipeline, the execution engine and the offload runtime.
//!
//! Every struct has a `Default` and deserializes with missing fields filled
//! from it, so a config file only needs to name what it changes:
//!
//! ```toml
//! [pipeline]
//! acceptance_threshold = 0.75
//!
//! [execution]
//! history_capacity = 200
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ValidationError};

/// Default strict confidence a rule needs to be accepted into a decision.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.7;

/// Retrieval casts a wider net than acceptance: its minimum similarity is the
/// acceptance threshold scaled by this factor.
pub const RETRIEVAL_THRESHOLD_FACTOR: f32 = 0.8;

/// Default number of candidates requested from retrieval.
pub const DEFAULT_RETRIEVAL_TOP_K: usize = 10;

/// Default number of executed plans kept in history.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Environment override for [`PipelineConfig::acceptance_threshold`].
pub const ENV_CONFIDENCE_THRESHOLD: &str = "RULEFLOW_CONFIDENCE_THRESHOLD";
/// Environment override for [`PipelineConfig::retrieval_top_k`].
pub const ENV_RETRIEVAL_TOP_K: &str = "RULEFLOW_RETRIEVAL_TOP_K";
/// Environment override for [`ExecutionConfig::history_capacity`].
pub const ENV_HISTORY_CAPACITY: &str = "RULEFLOW_HISTORY_CAPACITY";

/// Decision pipeline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Strict confidence a reasoned rule needs to be accepted.
    pub acceptance_threshold: f32,
    /// Candidates requested from retrieval.
    pub retrieval_top_k: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            acceptance_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            retrieval_top_k: DEFAULT_RETRIEVAL_TOP_K,
        }
    }
}

impl PipelineConfig {
    /// Relaxed minimum similarity used at retrieval time.
    #[must_use]
    pub fn retrieval_threshold(&self) -> f32 {
        self.acceptance_threshold * RETRIEVAL_THRESHOLD_FACTOR
    }

    /// Checks ranges.
    ///
    /// # Errors
    ///
    /// Fails if the threshold is outside [0, 1] or `retrieval_top_k` is zero.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(0.0..=1.0).contains(&self.acceptance_threshold) {
            return Err(ValidationError::ThresholdOutOfRange {
                value: self.acceptance_threshold,
            });
        }
        if self.retrieval_top_k == 0 {
            return Err(ValidationError::TooSmall {
                field: "retrieval_top_k".to_string(),
                min: 1,
            });
        }
        Ok(())
    }
}

/// Execution engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Maximum executed plans kept in history; the oldest are evicted first.
    pub history_capacity: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

/// Worker offload settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Workers serving analysis requests.
    pub analysis_workers: usize,
    /// Workers serving execution requests.
    pub execution_workers: usize,
    /// Maximum queued requests per lane.
    pub queue_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            analysis_workers: 2,
            execution_workers: 2,
            queue_capacity: 1024,
        }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Pipeline settings.
    pub pipeline: PipelineConfig,
    /// Execution settings.
    pub execution: ExecutionConfig,
    /// Offload runtime settings.
    pub runtime: RuntimeConfig,
}

impl ServiceConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Fails on TOML syntax errors or out-of-range values.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })?;
        config.pipeline.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&text)
    }

    /// Applies `RULEFLOW_*` environment overrides.
    ///
    /// # Errors
    ///
    /// Fails if a variable is set to an unparsable or out-of-range value.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    fn apply_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        fn parse<T: std::str::FromStr>(name: &str, value: String) -> Result<T, ConfigError> {
            value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                name: name.to_string(),
                value,
            })
        }

        if let Some(value) = lookup(ENV_CONFIDENCE_THRESHOLD) {
            self.pipeline.acceptance_threshold = parse(ENV_CONFIDENCE_THRESHOLD, value)?;
        }
        if let Some(value) = lookup(ENV_RETRIEVAL_TOP_K) {
            self.pipeline.retrieval_top_k = parse(ENV_RETRIEVAL_TOP_K, value)?;
        }
        if let Some(value) = lookup(ENV_HISTORY_CAPACITY) {
            self.execution.history_capacity = parse(ENV_HISTORY_CAPACITY, value)?;
        }
        self.pipeline.validate()?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert!((config.pipeline.acceptance_threshold - 0.7).abs() < f32::EPSILON);
        assert!((config.pipeline.retrieval_threshold() - 0.56).abs() < 1e-6);
        assert_eq!(config.pipeline.retrieval_top_k, 10);
        assert_eq!(config.execution.history_capacity, 1000);
    }

    #[test]
    fn test_thresholds_stay_distinct() {
        let pipeline = PipelineConfig {
            acceptance_threshold: 0.5,
            ..PipelineConfig::default()
        };
        assert!(pipeline.retrieval_threshold() < pipeline.acceptance_threshold);
        assert!((pipeline.retrieval_threshold() - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_partial_toml() {
        let config = ServiceConfig::from_toml_str(
            "[pipeline]\nacceptance_threshold = 0.75\n\n[runtime]\nexecution_workers = 4\n",
        )
        .unwrap();
        assert!((config.pipeline.acceptance_threshold - 0.75).abs() < f32::EPSILON);
        assert_eq!(config.pipeline.retrieval_top_k, 10);
        assert_eq!(config.runtime.execution_workers, 4);
        assert_eq!(config.runtime.analysis_workers, 2);
    }

    #[test]
    fn test_toml_rejects_bad_threshold() {
        let err = ServiceConfig::from_toml_str("[pipeline]\nacceptance_threshold = 1.5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ValidationError::ThresholdOutOfRange { .. })));
        assert!(ServiceConfig::from_toml_str("pipeline = 3").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let config = ServiceConfig::default()
            .apply_overrides(|name| match name {
                ENV_CONFIDENCE_THRESHOLD => Some("0.9".to_string()),
                ENV_HISTORY_CAPACITY => Some(" 50 ".to_string()),
                _ => None,
            })
            .unwrap();
        assert!((config.pipeline.acceptance_threshold - 0.9).abs() < f32::EPSILON);
        assert_eq!(config.execution.history_capacity, 50);

        let err = ServiceConfig::default()
            .apply_overrides(|name| (name == ENV_RETRIEVAL_TOP_K).then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ruleflow.toml");
        std::fs::write(&path, "[execution]\nhistory_capacity = 7\n").unwrap();
        assert_eq!(ServiceConfig::load(&path).unwrap().execution.history_capacity, 7);
        assert!(matches!(
            ServiceConfig::load(&dir.path().join("missing.toml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
