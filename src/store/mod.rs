//! Persistent metric storage.
//!
//! [`MetricStore`] is the keyed lookup/upsert capability the merge phase needs.
//! [`MemoryStore`] keeps records in a map; [`JsonFileStore`] adds a JSON file
//! that is loaded on open and rewritten on [`MetricStore::flush`].
//! Both hand out per-key locks through [`KeyLocks`].

mod json_file;
mod locks;
mod memory;

pub use json_file::JsonFileStore;
pub use locks::{KeyGuard, KeyLocks};
pub use memory::MemoryStore;

use anyhow::Result;

use crate::types::{BucketKey, PersistedMetric};

/// Keyed storage for aggregated metrics. At most one record exists per key.
#[async_trait::async_trait]
pub trait MetricStore: Send + Sync {
    /// Returns the record stored under `key`, if any.
    async fn lookup(&self, key: &BucketKey) -> Result<Option<PersistedMetric>>;

    /// Inserts `metric`, replacing whatever is stored under its key.
    async fn upsert(&self, metric: PersistedMetric) -> Result<()>;

    /// Waits for exclusive use of `key`. Hold the guard across a
    /// lookup-merge-upsert sequence so concurrent writers cannot interleave.
    async fn lock(&self, key: &BucketKey) -> KeyGuard;

    /// Every stored record, in no particular order.
    async fn snapshot(&self) -> Result<Vec<PersistedMetric>>;

    /// Makes preceding upserts durable.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}
