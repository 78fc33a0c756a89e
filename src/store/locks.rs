use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::types::BucketKey;

/// Held while one key is being read, merged and written.
pub type KeyGuard = OwnedMutexGuard<()>;

/// Lazily created async mutex per bucket key.
///
/// Locks nobody holds or waits on are dropped once the table grows past
/// `PRUNE_THRESHOLD` entries.
#[derive(Debug, Default)]
pub struct KeyLocks {
    table: DashMap<BucketKey, Arc<Mutex<()>>>,
}

const PRUNE_THRESHOLD: usize = 4096;

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &BucketKey) -> KeyGuard {
        if self.table.len() >= PRUNE_THRESHOLD {
            self.table.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        // The entry ref must be released before awaiting the lock.
        let lock = self.table.entry(key.clone()).or_default().clone();
        lock.lock_owned().await
    }

    /// Number of keys with a live lock entry.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    fn key(account: &str) -> BucketKey {
        BucketKey::new(Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap(), account, "api")
    }

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = Arc::new(KeyLocks::new());
        let guard = locks.acquire(&key("a")).await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(&key("a")).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_block() {
        let locks = KeyLocks::new();
        let _a = locks.acquire(&key("a")).await;
        let _b = tokio::time::timeout(Duration::from_millis(100), locks.acquire(&key("b")))
            .await
            .expect("distinct key should not wait");
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_idle_locks_are_pruned() {
        let locks = KeyLocks::new();
        let held = locks.acquire(&key("held")).await;
        for i in 0..PRUNE_THRESHOLD - 1 {
            drop(locks.acquire(&key(&format!("idle-{i}"))).await);
        }
        assert_eq!(locks.len(), PRUNE_THRESHOLD);

        // Crossing the threshold sweeps every idle entry but keeps the held one.
        let _next = locks.acquire(&key("next")).await;
        assert_eq!(locks.len(), 2);
        drop(held);
    }
}
