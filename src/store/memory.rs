use std::collections::HashMap;

use anyhow::Result;
use tokio::sync::RwLock;

use super::{KeyGuard, KeyLocks, MetricStore};
use crate::types::{BucketKey, PersistedMetric};

/// Map-backed store; contents live as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<BucketKey, PersistedMetric>>,
    locks: KeyLocks,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store. A later record replaces an earlier one with the same key.
    pub fn from_records(records: impl IntoIterator<Item = PersistedMetric>) -> Self {
        let records = records.into_iter().map(|m| (m.key(), m)).collect();
        Self {
            records: RwLock::new(records),
            locks: KeyLocks::new(),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl MetricStore for MemoryStore {
    async fn lookup(&self, key: &BucketKey) -> Result<Option<PersistedMetric>> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn upsert(&self, metric: PersistedMetric) -> Result<()> {
        self.records.write().await.insert(metric.key(), metric);
        Ok(())
    }

    async fn lock(&self, key: &BucketKey) -> KeyGuard {
        self.locks.acquire(key).await
    }

    async fn snapshot(&self) -> Result<Vec<PersistedMetric>> {
        Ok(self.records.read().await.values().cloned().collect())
    }
}
