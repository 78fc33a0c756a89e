use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{KeyGuard, MemoryStore, MetricStore};
use crate::types::{BucketKey, PersistedMetric};

/// [`MemoryStore`] persisted as a JSON array of records.
///
/// The file is read once on open and rewritten atomically (temp file plus
/// rename) on every flush. Flushes run one at a time, each writing a
/// snapshot taken after the previous one finished. Key locks only cover this
/// process.
pub struct JsonFileStore {
    path: PathBuf,
    inner: MemoryStore,
    flush_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Opens the store at `path`, starting empty if the file does not exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let records: Vec<PersistedMetric> = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("invalid metric store file {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read metric store {}", path.display()));
            }
        };
        info!(path = %path.display(), records = records.len(), "Metric store opened");

        Ok(Self {
            path,
            inner: MemoryStore::from_records(records),
            flush_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl MetricStore for JsonFileStore {
    async fn lookup(&self, key: &BucketKey) -> Result<Option<PersistedMetric>> {
        self.inner.lookup(key).await
    }

    async fn upsert(&self, metric: PersistedMetric) -> Result<()> {
        self.inner.upsert(metric).await
    }

    async fn lock(&self, key: &BucketKey) -> KeyGuard {
        self.inner.lock(key).await
    }

    async fn snapshot(&self) -> Result<Vec<PersistedMetric>> {
        self.inner.snapshot().await
    }

    async fn flush(&self) -> Result<()> {
        // Held from snapshot to rename so an older snapshot never lands last.
        let _flushing = self.flush_lock.lock().await;
        let mut records = self.inner.snapshot().await?;
        records.sort_by(|a, b| a.key().cmp(&b.key()));
        let body = serde_json::to_vec_pretty(&records)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &body)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("failed to replace {}", self.path.display()))?;

        debug!(path = %self.path.display(), records = records.len(), "Metric store flushed");
        Ok(())
    }
}
