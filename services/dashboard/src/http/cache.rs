//! services/dashboard/src/http/cache.rs
//!
//! Short-lived cache of successful GET bodies. Keys carry the session
//! generation as well as path and query, so one session never reads
//! another's entries.

use std::time::Duration;

use bytes::Bytes;
use moka::future::Cache as MokaCache;

/// Upper bound on cached responses; least recently used entries go first.
pub const DEFAULT_MAX_ENTRIES: u64 = 512;

#[derive(Clone)]
pub struct ResponseCache {
    inner: MokaCache<String, Bytes>,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_capacity(ttl: Duration, max_entries: u64) -> Self {
        Self {
            inner: MokaCache::builder()
                .time_to_live(ttl)
                .max_capacity(max_entries)
                .build(),
        }
    }

    pub async fn get(&self, key: &str) -> Option<Bytes> {
        self.inner.get(key).await
    }

    pub async fn put(&self, key: String, body: Bytes) {
        self.inner.insert(key, body).await;
    }

    /// Drops everything: after a mutation, and whenever the session changes.
    pub fn clear(&self) {
        self.inner.invalidate_all();
    }

    /// Live entries once pending evictions have been applied.
    pub async fn len(&self) -> u64 {
        self.inner.run_pending_tasks().await;
        self.inner.entry_count()
    }
}
