//! In-Memory Atomic Store Adapter
//!
//! Implements the `AtomicStore` port on a sharded `DashMap`. Every primitive
//! holds the key's shard lock for its whole read-modify-write, which gives
//! the same per-key atomicity a single-threaded store server provides.
//!
//! Expiry is lazy: an expired entry is treated as absent by every primitive
//! and physically removed on the next access or by [`InMemoryStore::purge_expired`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::domain::ports::AtomicStore;
use crate::error::{Error, Result};

/// A stored value with its optional deadline
#[derive(Debug, Clone)]
struct StoredValue {
    data: Bytes,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn new(data: Bytes, ttl: Option<Duration>) -> Self {
        Self {
            data,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    #[inline]
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }
}

/// In-memory store statistics
#[derive(Debug, Clone, Default)]
pub struct InMemoryStoreStats {
    /// Keys currently held (including not-yet-purged expired ones)
    pub keys: u64,
    /// Read operations
    pub reads: u64,
    /// Write operations
    pub writes: u64,
    /// Delete operations
    pub deletes: u64,
}

/// In-memory atomic store for tests and single-process deployments
#[derive(Default)]
pub struct InMemoryStore {
    entries: DashMap<String, StoredValue>,
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
}

impl InMemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining time to live of a key, `None` if absent or persistent.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|v| !v.is_expired(now))
            .and_then(|v| v.expires_at)
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, v| !v.is_expired(now));
        before - self.entries.len()
    }

    /// Number of keys held
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no keys
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get store statistics
    pub fn stats(&self) -> InMemoryStoreStats {
        InMemoryStoreStats {
            keys: self.entries.len() as u64,
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        }
    }

    fn parse_counter(key: &str, data: &[u8]) -> Result<i64> {
        std::str::from_utf8(data)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| Error::Store(format!("value at {} is not an integer", key)))
    }
}

#[async_trait]
impl AtomicStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();

        // The read guard must be released before removing from the same shard
        let found = match self.entries.get(key) {
            Some(v) if !v.is_expired(now) => return Ok(Some(v.data.clone())),
            Some(_) => true,
            None => false,
        };

        if found {
            self.entries.remove_if(key, |_, v| v.is_expired(now));
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<()> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.entries
            .insert(key.to_string(), StoredValue::new(value, ttl));
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: Bytes, ttl: Duration) -> Result<bool> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(StoredValue::new(value, Some(ttl)));
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(StoredValue::new(value, Some(ttl)));
                Ok(true)
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.deletes.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();

        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, v)| !v.is_expired(now)))
    }

    async fn increment(&self, key: &str) -> Result<i64> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();

        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| StoredValue::new(Bytes::from_static(b"0"), None));

        if entry.is_expired(now) {
            *entry = StoredValue::new(Bytes::from_static(b"0"), None);
        }

        let current = Self::parse_counter(key, &entry.data)?;
        let next = current
            .checked_add(1)
            .ok_or_else(|| Error::Store(format!("increment would overflow at {}", key)))?;
        entry.data = Bytes::from(next.to_string());

        Ok(next)
    }

    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<bool> {
        self.deletes.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();

        Ok(self
            .entries
            .remove_if(key, |_, v| !v.is_expired(now) && v.data.as_ref() == expected)
            .is_some())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = InMemoryStore::new();

        store
            .set("k", Bytes::from_static(b"v"), None)
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(Bytes::from_static(b"v")));

        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let store = InMemoryStore::new();

        store
            .set("k", Bytes::from_static(b"v"), Some(Duration::from_millis(20)))
            .await
            .unwrap();
        assert!(store.ttl("k").is_some());

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(store.get("k").await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_empty_value_is_a_hit() {
        let store = InMemoryStore::new();

        store.set("k", Bytes::new(), None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(Bytes::new()));
    }

    #[tokio::test]
    async fn test_set_if_absent() {
        let store = InMemoryStore::new();
        let ttl = Duration::from_secs(10);

        assert!(store.set_if_absent("k", Bytes::from_static(b"a"), ttl).await.unwrap());
        assert!(!store.set_if_absent("k", Bytes::from_static(b"b"), ttl).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some(Bytes::from_static(b"a")));
    }

    #[tokio::test]
    async fn test_set_if_absent_replaces_expired() {
        let store = InMemoryStore::new();

        assert!(store
            .set_if_absent("k", Bytes::from_static(b"a"), Duration::from_millis(10))
            .await
            .unwrap());
        tokio::time::sleep(Duration::from_millis(25)).await;

        assert!(store
            .set_if_absent("k", Bytes::from_static(b"b"), Duration::from_secs(10))
            .await
            .unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some(Bytes::from_static(b"b")));
    }

    #[tokio::test]
    async fn test_increment() {
        let store = InMemoryStore::new();

        assert_eq!(store.increment("c").await.unwrap(), 1);
        assert_eq!(store.increment("c").await.unwrap(), 2);
        assert_eq!(store.get("c").await.unwrap(), Some(Bytes::from_static(b"2")));
    }

    #[tokio::test]
    async fn test_increment_rejects_non_integer() {
        let store = InMemoryStore::new();

        store.set("c", Bytes::from_static(b"abc"), None).await.unwrap();
        let err = store.increment("c").await.unwrap_err();
        assert!(matches!(err, Error::Store(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increment_is_atomic() {
        let store = Arc::new(InMemoryStore::new());
        let mut join_set = tokio::task::JoinSet::new();

        for _ in 0..200 {
            let store = store.clone();
            join_set.spawn(async move { store.increment("c").await.unwrap() });
        }

        let mut seen = Vec::new();
        while let Some(result) = join_set.join_next().await {
            seen.push(result.unwrap());
        }
        seen.sort_unstable();
        assert_eq!(seen, (1..=200).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_compare_and_delete() {
        let store = InMemoryStore::new();

        store.set("k", Bytes::from_static(b"owner-a"), None).await.unwrap();

        assert!(!store.compare_and_delete("k", b"owner-b").await.unwrap());
        assert!(store.get("k").await.unwrap().is_some());

        assert!(store.compare_and_delete("k", b"owner-a").await.unwrap());
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_purge_expired_and_stats() {
        let store = InMemoryStore::new();

        store
            .set("short", Bytes::from_static(b"1"), Some(Duration::from_millis(5)))
            .await
            .unwrap();
        store.set("long", Bytes::from_static(b"2"), None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(15)).await;

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);

        let stats = store.stats();
        assert_eq!(stats.keys, 1);
        assert_eq!(stats.writes, 2);
    }
}
