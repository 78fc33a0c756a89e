//! Upload processing.
//!
//! CSV rows are validated, grouped into 4-hour buckets per account and type,
//! averaged, and merged into a [`crate::store::MetricStore`] with a
//! count-weighted average. Pre-aggregated uploads skip straight to merging.

pub mod aggregate;
pub mod ingest;
pub mod merge;
pub mod stage;

pub use aggregate::{AggregateGroup, aggregate_rows, round2};
pub use ingest::{Ingestor, MergeOutcome, merge_group, process_csv};
pub use merge::{MergeValue, merge};
pub use stage::Stage;
