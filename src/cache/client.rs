//! Cache-Aside Client
//!
//! Read-through lookups over the atomic store with a database fallback.
//! Three protections are available, chosen per key-space:
//!
//! - **Pass-through**: absent records are remembered as an empty value so
//!   repeated lookups of ids that do not exist never reach the database.
//! - **Logical expiry**: entries carry a soft deadline. An expired entry is
//!   still served while one background rebuild refreshes it.
//! - **Mutex**: a miss takes the rebuild lock so only one reader loads from
//!   the database; the others back off and re-read.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use super::entry::LogicalEntry;
use super::metrics::CacheMetrics;
use super::rebuild::RebuildPool;
use crate::config::{CacheClientConfig, CachePolicy, KeySpace, RebuildPoolConfig};
use crate::domain::ports::AtomicStore;
use crate::error::{Error, Result};
use crate::lock::{DistributedLock, LockService};

/// Result of a plain cache read
enum Lookup<T> {
    Hit(T),
    /// The empty marker: the record is known not to exist
    NullHit,
    Miss,
}

/// Cache-aside client shared by all request handlers
#[derive(Clone)]
pub struct CacheClient {
    store: Arc<dyn AtomicStore>,
    locks: LockService,
    rebuilds: Arc<RebuildPool>,
    metrics: Arc<CacheMetrics>,
    config: CacheClientConfig,
}

impl CacheClient {
    /// Create a client and start its rebuild pool.
    pub fn new(
        store: Arc<dyn AtomicStore>,
        config: CacheClientConfig,
        pool_config: RebuildPoolConfig,
    ) -> Self {
        let metrics = Arc::new(CacheMetrics::new());
        let rebuilds = Arc::new(RebuildPool::new(pool_config, metrics.clone()));

        Self {
            locks: LockService::new(store.clone()),
            store,
            rebuilds,
            metrics,
            config,
        }
    }

    pub fn metrics(&self) -> Arc<CacheMetrics> {
        self.metrics.clone()
    }

    pub fn rebuild_pool(&self) -> &RebuildPool {
        &self.rebuilds
    }

    pub fn config(&self) -> &CacheClientConfig {
        &self.config
    }

    /// Stop the rebuild pool
    pub async fn shutdown(&self) {
        self.rebuilds.shutdown().await;
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Store `value` under `key` with a store-level TTL
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let payload = serde_json::to_vec(value)?;
        self.store.set(key, Bytes::from(payload), Some(ttl)).await
    }

    /// Store `value` as a logical-expiry entry that never leaves the store
    pub async fn set_with_logical_expire<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<()> {
        write_logical(self.store.as_ref(), key, Some(value), ttl).await
    }

    /// Drop a cached entry so the next read repopulates it
    pub async fn invalidate(&self, key: &str) -> Result<bool> {
        let removed = self.store.delete(key).await?;
        debug!(key = %key, removed, "Invalidated cache entry");
        Ok(removed)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Plain read of a value written by [`set`](Self::set). The empty marker
    /// reads as `None`.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.lookup::<T>(key).await? {
            Lookup::Hit(value) => Ok(Some(value)),
            Lookup::NullHit | Lookup::Miss => Ok(None),
        }
    }

    /// Look `id` up in `space` with the space's configured protection
    pub async fn query<T, ID, F, Fut>(
        &self,
        space: &KeySpace,
        id: ID,
        fallback: F,
    ) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        ID: Display + Clone + Send + Sync + 'static,
        F: Fn(ID) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<T>>> + Send + 'static,
    {
        match space.policy {
            CachePolicy::PassThrough { null_ttl, ttl } => {
                self.query_with_pass_through(&space.key_prefix, id, fallback, null_ttl, ttl)
                    .await
            }
            CachePolicy::LogicalExpire { ttl } => {
                self.query_with_logical_expire(
                    &space.key_prefix,
                    &space.lock_prefix,
                    id,
                    fallback,
                    ttl,
                )
                .await
            }
            CachePolicy::Mutex { null_ttl, ttl } => {
                self.query_with_mutex(
                    &space.key_prefix,
                    &space.lock_prefix,
                    id,
                    fallback,
                    null_ttl,
                    ttl,
                )
                .await
            }
        }
    }

    /// Null-caching read.
    ///
    /// A miss calls `fallback` once. An absent record is stored as the empty
    /// marker for `null_ttl`; a present one is stored for `ttl`.
    #[instrument(skip_all, fields(key_prefix = %key_prefix, id = %id))]
    pub async fn query_with_pass_through<T, ID, F, Fut>(
        &self,
        key_prefix: &str,
        id: ID,
        fallback: F,
        null_ttl: Duration,
        ttl: Duration,
    ) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        ID: Display,
        F: Fn(ID) -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let key = format!("{}{}", key_prefix, id);

        match self.lookup::<T>(&key).await? {
            Lookup::Hit(value) => Ok(Some(value)),
            Lookup::NullHit => Ok(None),
            Lookup::Miss => self.load_and_store(&key, id, &fallback, null_ttl, ttl).await,
        }
    }

    /// Logical-expiry read for pre-warmed keys.
    ///
    /// Never waits on the database: a fresh entry is returned as is, an
    /// expired one is returned stale after at most one reader schedules a
    /// rebuild under the `lock_prefix + id` lock. A key missing from the
    /// store reads as not found.
    #[instrument(skip_all, fields(key_prefix = %key_prefix, id = %id))]
    pub async fn query_with_logical_expire<T, ID, F, Fut>(
        &self,
        key_prefix: &str,
        lock_prefix: &str,
        id: ID,
        fallback: F,
        ttl: Duration,
    ) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        ID: Display + Clone + Send + Sync + 'static,
        F: Fn(ID) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<T>>> + Send + 'static,
    {
        let key = format!("{}{}", key_prefix, id);

        let Some(entry) = self.read_logical::<T>(&key).await? else {
            self.metrics.record_miss();
            debug!("Logical entry missing, key was not warmed up");
            return Ok(None);
        };

        if !entry.is_expired(Utc::now()) {
            self.metrics.record_hit();
            return Ok(entry.data);
        }

        let lock = Arc::new(self.locks.lock(format!("{}{}", lock_prefix, id)));
        if lock.try_acquire(self.config.rebuild_lock_ttl).await? {
            // Another reader may have finished a rebuild since our first read
            let current = self.read_logical::<T>(&key).await;
            match current {
                Ok(Some(current)) if !current.is_expired(Utc::now()) => {
                    release_quietly(&lock).await;
                    self.metrics.record_hit();
                    return Ok(current.data);
                }
                Ok(_) => self.schedule_rebuild(key, id, fallback, ttl, lock).await,
                Err(e) => {
                    release_quietly(&lock).await;
                    return Err(e);
                }
            }
        } else {
            debug!("Rebuild already in flight");
        }

        self.metrics.record_stale_serve();
        Ok(entry.data)
    }

    /// Mutex-protected read.
    ///
    /// On a miss the reader takes the `lock_prefix + id` lock, re-reads the
    /// cache, and only then calls `fallback`. Contended readers sleep and
    /// start over; after `mutex_retry.max_attempts` rounds the read fails
    /// with [`Error::LockTimeout`].
    #[instrument(skip_all, fields(key_prefix = %key_prefix, id = %id))]
    pub async fn query_with_mutex<T, ID, F, Fut>(
        &self,
        key_prefix: &str,
        lock_prefix: &str,
        id: ID,
        fallback: F,
        null_ttl: Duration,
        ttl: Duration,
    ) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        ID: Display + Clone,
        F: Fn(ID) -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let key = format!("{}{}", key_prefix, id);
        let lock_name = format!("{}{}", lock_prefix, id);
        let policy = self.config.mutex_retry;

        for attempt in 1..=policy.max_attempts {
            match self.lookup::<T>(&key).await? {
                Lookup::Hit(value) => return Ok(Some(value)),
                Lookup::NullHit => return Ok(None),
                Lookup::Miss => {}
            }

            let lock = self.locks.lock(lock_name.as_str());
            if lock.try_acquire(self.config.rebuild_lock_ttl).await? {
                return lock
                    .run_then_release(async {
                        match self.peek::<T>(&key).await? {
                            Lookup::Hit(value) => Ok(Some(value)),
                            Lookup::NullHit => Ok(None),
                            Lookup::Miss => {
                                self.load_and_store(&key, id.clone(), &fallback, null_ttl, ttl)
                                    .await
                            }
                        }
                    })
                    .await;
            }

            self.metrics.record_lock_wait();
            if attempt < policy.max_attempts {
                tokio::time::sleep(policy.delay_after(attempt)).await;
            }
        }

        warn!(lock = %lock_name, attempts = policy.max_attempts, "Gave up waiting for rebuild lock");
        Err(Error::LockTimeout {
            name: lock_name,
            attempts: policy.max_attempts,
        })
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Read and classify, recording the outcome
    async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Result<Lookup<T>> {
        let found = self.peek::<T>(key).await?;
        match &found {
            Lookup::Hit(_) => {
                self.metrics.record_hit();
                debug!(key = %key, "Cache hit");
            }
            Lookup::NullHit => {
                self.metrics.record_null_hit();
                debug!(key = %key, "Cached absence");
            }
            Lookup::Miss => {
                self.metrics.record_miss();
                debug!(key = %key, "Cache miss");
            }
        }
        Ok(found)
    }

    /// Read and classify without touching the counters
    async fn peek<T: DeserializeOwned>(&self, key: &str) -> Result<Lookup<T>> {
        match self.store.get(key).await? {
            Some(raw) if raw.is_empty() => Ok(Lookup::NullHit),
            Some(raw) => Ok(Lookup::Hit(serde_json::from_slice(&raw)?)),
            None => Ok(Lookup::Miss),
        }
    }

    async fn load_and_store<T, ID, F, Fut>(
        &self,
        key: &str,
        id: ID,
        fallback: &F,
        null_ttl: Duration,
        ttl: Duration,
    ) -> Result<Option<T>>
    where
        T: Serialize,
        F: Fn(ID) -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        self.metrics.record_fallback_call();
        match fallback(id).await? {
            Some(value) => {
                self.set(key, &value, ttl).await?;
                Ok(Some(value))
            }
            None => {
                self.store.set(key, Bytes::new(), Some(null_ttl)).await?;
                debug!(key = %key, "Cached absence marker");
                Ok(None)
            }
        }
    }

    async fn read_logical<T: DeserializeOwned>(&self, key: &str) -> Result<Option<LogicalEntry<T>>> {
        match self.store.get(key).await? {
            Some(raw) if !raw.is_empty() => Ok(Some(serde_json::from_slice(&raw)?)),
            _ => Ok(None),
        }
    }

    /// Hand a rebuild to the pool. The job owns the lock and releases it on
    /// every exit; if the pool refuses the job the lock is released here.
    async fn schedule_rebuild<T, ID, F, Fut>(
        &self,
        key: String,
        id: ID,
        fallback: F,
        ttl: Duration,
        lock: Arc<DistributedLock>,
    ) where
        T: Serialize + Send + Sync + 'static,
        ID: Send + 'static,
        F: Fn(ID) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<T>>> + Send + 'static,
    {
        let store = self.store.clone();
        let metrics = self.metrics.clone();
        let job_key = key.clone();
        let job_lock = lock.clone();

        let job = async move {
            job_lock
                .run_then_release(async move {
                    metrics.record_fallback_call();
                    let data = fallback(id).await?;
                    write_logical(store.as_ref(), &job_key, data.as_ref(), ttl).await
                })
                .await
        };

        if let Err(e) = self.rebuilds.submit(key.as_str(), job) {
            warn!(key = %key, error = %e, "Could not schedule rebuild");
            release_quietly(&lock).await;
        }
    }
}

impl std::fmt::Debug for CacheClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheClient")
            .field("config", &self.config)
            .field("metrics", &self.metrics.snapshot())
            .finish()
    }
}

async fn write_logical<T: Serialize>(
    store: &dyn AtomicStore,
    key: &str,
    value: Option<&T>,
    ttl: Duration,
) -> Result<()> {
    let entry = LogicalEntry::new(value, ttl);
    let payload = serde_json::to_vec(&entry)?;
    store.set(key, Bytes::from(payload), None).await
}

async fn release_quietly(lock: &DistributedLock) {
    if let Err(e) = lock.release().await {
        warn!(lock = %lock.key(), error = %e, "Failed to release lock, leaving it to expire");
    }
}

// =============================================================================
// Tests
// =============================================================================
