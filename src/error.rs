use thiserror::Error;

use crate::pipeline::stage::Stage;

pub type Result<T> = std::result::Result<T, IngestError>;

/// A single rejected input row. Recorded and reported, never fatal on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    /// Data-row index + 2; the header counts as row 1.
    pub row: usize,
    pub message: String,
}

impl RowError {
    pub fn new(row: usize, message: impl Into<String>) -> Self {
        Self {
            row,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for RowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Row {}: {}", self.row, self.message)
    }
}

/// Failures that end an ingestion run without a result value.
///
/// Bad rows, the error budget and unreadable CSV are reported inside
/// [`crate::types::ProcessingResult`] instead.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("metric store error: {0:#}")]
    Store(anyhow::Error),
    #[error("illegal pipeline transition from {from:?} to {to:?}")]
    IllegalTransition { from: Stage, to: Stage },
    #[error("merge task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("limit {limit} outside 1..={max}")]
    LimitOutOfRange { limit: usize, max: usize },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("min_duration_ms ({min}) must be below max_duration_ms ({max})")]
    DurationRange { min: f64, max: f64 },
    #[error("merge_concurrency must be at least 1")]
    ZeroConcurrency,
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}
