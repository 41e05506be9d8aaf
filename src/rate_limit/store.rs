use crate::error::StoreError;
use crate::rate_limit::bucket::BucketState;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A bucket together with the version it was written at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VersionedBucket {
    pub state: BucketState,
    pub version: u64,
}

/// Abstract storage for per-key bucket state.
///
/// Designed for both in-process and shared key-value backends. Writes use compare-and-swap on an
/// opaque version so concurrent updates to the same key are linearized by the caller's retry
/// loop; different keys never coordinate.
#[async_trait]
pub trait BucketStore: Send + Sync {
    /// Fetch the current state for a key, if any.
    async fn load(&self, key: &str) -> Result<Option<VersionedBucket>, StoreError>;

    /// Write `state` only if the stored version still equals `expected`.
    ///
    /// `expected == None` means the key must not exist yet. Returns `Ok(false)` when another
    /// writer got there first and the caller must reload.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<u64>,
        state: BucketState,
    ) -> Result<bool, StoreError>;

    /// Drop every bucket whose last refill is older than `cutoff_ms`. Returns how many went.
    async fn evict_idle(&self, cutoff_ms: i64) -> Result<usize, StoreError>;
}

/// In-memory bucket store, sharded by key.
///
/// Versions come from a store-wide counter so a key that is evicted and recreated can never be
/// mistaken for its earlier incarnation.
#[derive(Default, Clone, Debug)]
pub struct InMemoryBucketStore {
    buckets: Arc<DashMap<String, VersionedBucket>>,
    next_version: Arc<AtomicU64>,
}

impl InMemoryBucketStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    fn bump(&self) -> u64 {
        self.next_version.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[async_trait]
impl BucketStore for InMemoryBucketStore {
    async fn load(&self, key: &str) -> Result<Option<VersionedBucket>, StoreError> {
        Ok(self.buckets.get(key).map(|entry| *entry.value()))
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<u64>,
        state: BucketState,
    ) -> Result<bool, StoreError> {
        match self.buckets.entry(key.to_owned()) {
            Entry::Occupied(mut slot) => {
                if expected != Some(slot.get().version) {
                    return Ok(false);
                }
                let version = self.bump();
                slot.insert(VersionedBucket { state, version });
                Ok(true)
            }
            Entry::Vacant(slot) => {
                if expected.is_some() {
                    // evicted underneath us
                    return Ok(false);
                }
                let version = self.bump();
                slot.insert(VersionedBucket { state, version });
                Ok(true)
            }
        }
    }

    async fn evict_idle(&self, cutoff_ms: i64) -> Result<usize, StoreError> {
        let mut evicted = 0;
        self.buckets.retain(|_, bucket| {
            let keep = bucket.state.last_refill_at_ms >= cutoff_ms;
            if !keep {
                evicted += 1;
            }
            keep
        });
        Ok(evicted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::bucket::RateLimitPolicy;

    fn bucket(at: i64) -> BucketState {
        BucketState::new(RateLimitPolicy::new(10.0, 10).unwrap(), at)
    }

    #[tokio::test]
    async fn cas_on_absent_key_requires_none() {
        let store = InMemoryBucketStore::new();
        assert!(!store.compare_and_swap("k", Some(1), bucket(0)).await.unwrap());
        assert!(store.compare_and_swap("k", None, bucket(0)).await.unwrap());
        assert!(!store.compare_and_swap("k", None, bucket(0)).await.unwrap());
    }

    #[tokio::test]
    async fn cas_detects_stale_version() {
        let store = InMemoryBucketStore::new();
        store.compare_and_swap("k", None, bucket(0)).await.unwrap();
        let v1 = store.load("k").await.unwrap().unwrap().version;

        assert!(store.compare_and_swap("k", Some(v1), bucket(5)).await.unwrap());
        assert!(!store.compare_and_swap("k", Some(v1), bucket(9)).await.unwrap());
        assert_eq!(store.load("k").await.unwrap().unwrap().state.last_refill_at_ms(), 5);
    }

    #[tokio::test]
    async fn recreated_key_gets_a_fresh_version() {
        let store = InMemoryBucketStore::new();
        store.compare_and_swap("k", None, bucket(0)).await.unwrap();
        let old = store.load("k").await.unwrap().unwrap().version;

        assert_eq!(store.evict_idle(100).await.unwrap(), 1);
        store.compare_and_swap("k", None, bucket(200)).await.unwrap();

        assert!(!store.compare_and_swap("k", Some(old), bucket(300)).await.unwrap());
    }

    #[tokio::test]
    async fn evict_idle_keeps_recent_buckets() {
        let store = InMemoryBucketStore::new();
        store.compare_and_swap("old", None, bucket(10)).await.unwrap();
        store.compare_and_swap("new", None, bucket(1_000)).await.unwrap();

        assert_eq!(store.evict_idle(500).await.unwrap(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.load("new").await.unwrap().is_some());
        assert!(store.load("old").await.unwrap().is_none());
    }
}
