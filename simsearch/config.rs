use crate::error::ConfigError;
use crate::fetch::DEFAULT_FETCH_TIMEOUT;
use serde::{Deserialize, Serialize};
use simsearch_features::ExtractorConfig;
use simsearch_match::{IndexParams, RATIO_THRESHOLD};
use std::path::Path;
use std::time::Duration;

/// Default bound on the longer side of the query image
pub const DEFAULT_MAX_DIMENSION: u32 = 800;

/// What a search does when one corpus entry cannot be evaluated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort the whole search with the first failure in corpus order
    #[default]
    FailFast,
    /// Log and drop the failing entry
    SkipFailed,
}

/// Coordinator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub max_dimension: u32,
    /// Worker threads; `None` uses one per CPU
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,
    pub fetch_timeout_ms: u64,
    /// Also bound corpus images by `max_dimension`
    pub resize_corpus: bool,
    pub failure_policy: FailurePolicy,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_MAX_DIMENSION,
            threads: None,
            fetch_timeout_ms: DEFAULT_FETCH_TIMEOUT.as_millis() as u64,
            resize_corpus: false,
            failure_policy: FailurePolicy::FailFast,
        }
    }
}

impl SearchConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn thread_count(&self) -> usize {
        self.threads.unwrap_or_else(simsearch_core::default_threads)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_dimension == 0 {
            return Err(ConfigError::Invalid("max_dimension must be at least 1".into()));
        }
        if self.threads == Some(0) {
            return Err(ConfigError::Invalid("threads must be at least 1".into()));
        }
        if self.fetch_timeout_ms == 0 {
            return Err(ConfigError::Invalid("fetch_timeout_ms must be positive".into()));
        }
        Ok(())
    }
}

/// Full engine configuration, usually read from a TOML file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Lowe ratio for confident matches
    pub ratio: f32,
    pub search: SearchConfig,
    pub extractor: ExtractorConfig,
    pub index: IndexParams,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ratio: RATIO_THRESHOLD,
            search: SearchConfig::default(),
            extractor: ExtractorConfig::default(),
            index: IndexParams::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.ratio > 0.0 && self.ratio <= 1.0) {
            return Err(ConfigError::Invalid(format!("ratio {} must be in (0, 1]", self.ratio)));
        }
        self.search.validate()?;
        self.extractor
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.index
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(())
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = EngineConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.search.max_dimension, 800);
        assert_eq!(cfg.search.fetch_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.search.failure_policy, FailurePolicy::FailFast);
        assert!(!cfg.search.resize_corpus);
        assert_eq!(cfg.index.trees, 5);
        assert_eq!(cfg.index.checks, 50);
        assert_eq!(cfg.ratio, 0.7);
    }

    #[test]
    fn test_partial_toml() {
        let cfg = EngineConfig::from_toml(
            r#"
ratio = 0.75

[search]
threads = 2
failure_policy = "skip_failed"

[extractor]
max_features = 300
"#,
        )
        .unwrap();
        assert_eq!(cfg.ratio, 0.75);
        assert_eq!(cfg.search.thread_count(), 2);
        assert_eq!(cfg.search.failure_policy, FailurePolicy::SkipFailed);
        assert_eq!(cfg.search.max_dimension, 800);
        assert_eq!(cfg.extractor.max_features, 300);
        assert_eq!(cfg.index, IndexParams::default());
    }

    #[test]
    fn test_invalid_values() {
        for text in [
            "ratio = 0.0",
            "[search]\nmax_dimension = 0",
            "[search]\nthreads = 0",
            "[extractor]\nlayers_per_octave = 0",
            "[index]\ntrees = 0",
        ] {
            assert!(
                matches!(EngineConfig::from_toml(text), Err(ConfigError::Invalid(_))),
                "accepted {text:?}"
            );
        }
        assert!(matches!(EngineConfig::from_toml("ratio = \"x\""), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        let mut cfg = EngineConfig::default();
        cfg.search.threads = Some(3);
        cfg.extractor = ExtractorConfig::fast_preset();
        cfg.save(&path).unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap(), cfg);
    }
}
