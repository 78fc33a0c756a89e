//! Data types shared by the ingestion pipeline, the store and the query layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of one aggregate: the bucket it covers plus account and
/// measurement type. No two stored metrics share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BucketKey {
    pub bucket_start: DateTime<Utc>,
    pub account_id: String,
    pub kind: String,
}

impl BucketKey {
    pub fn new(
        bucket_start: DateTime<Utc>,
        account_id: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            bucket_start,
            account_id: account_id.into(),
            kind: kind.into(),
        }
    }
}

impl std::fmt::Display for BucketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}|{}|{}",
            self.bucket_start.to_rfc3339(),
            self.account_id,
            self.kind
        )
    }
}

/// Average duration and sample count for one bucket key, as produced by the
/// aggregator or supplied by a pre-aggregated upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedMetric {
    pub bucket_timestamp: DateTime<Utc>,
    pub account_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub avg_duration: f64,
    pub record_count: u64,
}

impl AggregatedMetric {
    pub fn key(&self) -> BucketKey {
        BucketKey::new(self.bucket_timestamp, &self.account_id, &self.kind)
    }
}

/// Row accounting for one processed file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingStats {
    pub total_rows: usize,
    pub valid_rows: usize,
    /// Structurally valid rows dropped by the duration range filter.
    pub filtered_rows: usize,
    pub aggregated_groups: usize,
}

/// Outcome of processing one file or payload.
///
/// Serialized as `{ success, aggregatedData?, stats?, errors? }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregated_data: Option<Vec<AggregatedMetric>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<ProcessingStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

impl ProcessingResult {
    /// A failed result carrying only error messages.
    pub fn failure(errors: Vec<String>) -> Self {
        Self {
            success: false,
            aggregated_data: None,
            stats: None,
            errors: Some(errors),
        }
    }

    pub fn error_count(&self) -> usize {
        self.errors.as_ref().map_or(0, Vec::len)
    }
}

/// A durable aggregate record as held by a [`crate::store::MetricStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedMetric {
    pub id: Uuid,
    pub bucket_timestamp: DateTime<Utc>,
    pub account_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub avg_duration: f64,
    pub record_count: u64,
    pub uploaded_by: String,
    pub created_at: DateTime<Utc>,
}

impl PersistedMetric {
    /// Builds the first record for a key.
    pub fn create(key: BucketKey, avg_duration: f64, record_count: u64, uploaded_by: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            bucket_timestamp: key.bucket_start,
            account_id: key.account_id,
            kind: key.kind,
            avg_duration,
            record_count,
            uploaded_by: uploaded_by.to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn key(&self) -> BucketKey {
        BucketKey::new(self.bucket_timestamp, &self.account_id, &self.kind)
    }
}

/// One caller-supplied group in a pre-aggregated upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreAggregatedEntry {
    /// ISO-8601 timestamp of the bucket start.
    pub bucket_timestamp: String,
    pub account_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub avg_duration: f64,
    pub record_count: u64,
}

/// Body of the pre-aggregated entry point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreAggregatedPayload {
    pub aggregated_data: Vec<PreAggregatedEntry>,
    #[serde(default)]
    pub stats: Option<ProcessingStats>,
}

/// Processing result plus what the merge phase wrote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSummary {
    #[serde(flatten)]
    pub result: ProcessingResult,
    pub inserted: usize,
    pub updated: usize,
}

impl UploadSummary {
    pub fn unwritten(result: ProcessingResult) -> Self {
        Self {
            result,
            inserted: 0,
            updated: 0,
        }
    }
}
