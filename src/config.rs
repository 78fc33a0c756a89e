//! Ingestion tunables.
//!
//! Defaults match the production limits; a JSON file can override any subset:
//! ```json
//! { "max_duration_ms": 30000, "merge_concurrency": 16 }
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Limits applied while validating rows and merging groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Exclusive lower bound for a retained duration.
    pub min_duration_ms: f64,
    /// Exclusive upper bound for a retained duration.
    pub max_duration_ms: f64,
    /// More row errors than this aborts the whole file.
    pub max_row_errors: usize,
    /// Upper bound on keys merged at the same time.
    pub merge_concurrency: usize,
    /// Largest CSV source the CLI will read.
    pub max_file_bytes: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            min_duration_ms: 0.0,
            max_duration_ms: 25_000.0,
            max_row_errors: 100,
            merge_concurrency: 8,
            max_file_bytes: 15 * 1024 * 1024,
        }
    }
}

impl IngestConfig {
    /// Loads and validates a config from a JSON file at `path`.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.min_duration_ms < self.max_duration_ms) {
            return Err(ConfigError::DurationRange {
                min: self.min_duration_ms,
                max: self.max_duration_ms,
            });
        }
        if self.merge_concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        Ok(())
    }

    /// Returns `true` if `duration` lies strictly inside the accepted range.
    pub fn accepts_duration(&self, duration: f64) -> bool {
        duration > self.min_duration_ms && duration < self.max_duration_ms
    }
}
