//! Distributed Lock
//!
//! A named mutual-exclusion token stored at `lock:{name}` in the external
//! atomic store. Acquisition is a single set-if-absent with a mandatory TTL,
//! so a crashed holder can never wedge the lock. Release deletes the key only
//! if it still carries this handle's owner token.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::FutureExt;
use once_cell::sync::Lazy;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::retry::RetryPolicy;
use crate::domain::ports::AtomicStore;
use crate::error::Result;

/// Key prefix of every lock entry
pub const LOCK_KEY_PREFIX: &str = "lock:";

/// Identifies this process among all instances sharing the store
static INSTANCE_ID: Lazy<String> = Lazy::new(|| Uuid::new_v4().simple().to_string());

/// Hands out lock handles bound to one store
#[derive(Clone)]
pub struct LockService {
    store: Arc<dyn AtomicStore>,
}

impl LockService {
    pub fn new(store: Arc<dyn AtomicStore>) -> Self {
        Self { store }
    }

    /// A fresh handle for `name`. Each handle is its own owner.
    pub fn lock(&self, name: impl Into<String>) -> DistributedLock {
        DistributedLock::new(name, self.store.clone())
    }

    /// Identifier of this process, the first half of every owner token
    pub fn instance_id() -> &'static str {
        INSTANCE_ID.as_str()
    }
}

impl std::fmt::Debug for LockService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockService")
            .field("instance_id", &Self::instance_id())
            .finish()
    }
}

/// One owner's handle on a named lock
pub struct DistributedLock {
    store: Arc<dyn AtomicStore>,
    name: String,
    key: String,
    token: String,
}

impl DistributedLock {
    pub fn new(name: impl Into<String>, store: Arc<dyn AtomicStore>) -> Self {
        let name = name.into();
        Self {
            key: format!("{}{}", LOCK_KEY_PREFIX, name),
            token: format!("{}-{}", INSTANCE_ID.as_str(), Uuid::new_v4().simple()),
            store,
            name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Store key holding the owner token
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Owner token written on acquisition
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Attempt to take the lock once. Contention is `Ok(false)`, not an error.
    #[instrument(skip(self), fields(lock = %self.key))]
    pub async fn try_acquire(&self, ttl: Duration) -> Result<bool> {
        let acquired = self
            .store
            .set_if_absent(&self.key, Bytes::from(self.token.clone()), ttl)
            .await?;

        debug!(acquired, "Lock acquisition attempt");
        Ok(acquired)
    }

    /// Retry [`try_acquire`](Self::try_acquire) under `policy`, sleeping between
    /// attempts. Returns `Ok(false)` once the attempts are used up.
    pub async fn acquire_with_retry(&self, ttl: Duration, policy: &RetryPolicy) -> Result<bool> {
        for attempt in 1..=policy.max_attempts {
            if self.try_acquire(ttl).await? {
                return Ok(true);
            }
            if attempt < policy.max_attempts {
                tokio::time::sleep(policy.delay_after(attempt)).await;
            }
        }
        debug!(lock = %self.key, attempts = policy.max_attempts, "Lock still contended");
        Ok(false)
    }

    /// Release the lock if this handle still owns it.
    ///
    /// Returns false when the entry had already expired or now belongs to
    /// another owner; that case leaves the store untouched.
    #[instrument(skip(self), fields(lock = %self.key))]
    pub async fn release(&self) -> Result<bool> {
        let released = self
            .store
            .compare_and_delete(&self.key, self.token.as_bytes())
            .await?;

        if !released {
            debug!("Lock no longer owned, release skipped");
        }
        Ok(released)
    }

    /// Run `critical` and release the lock afterwards on every path: success,
    /// error or panic. A panic is re-raised after the release.
    ///
    /// If the caller's future is dropped mid-flight the release does not run
    /// and the entry's TTL reclaims the lock.
    pub async fn run_then_release<F, T>(&self, critical: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let outcome = AssertUnwindSafe(critical).catch_unwind().await;

        if let Err(e) = self.release().await {
            warn!(lock = %self.key, error = %e, "Failed to release lock, leaving it to expire");
        }

        match outcome {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

impl std::fmt::Debug for DistributedLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedLock")
            .field("key", &self.key)
            .field("token", &self.token)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use crate::adapters::InMemoryStore;
    use crate::error::Error;

    fn service() -> (Arc<InMemoryStore>, LockService) {
        let store = Arc::new(InMemoryStore::new());
        (store.clone(), LockService::new(store))
    }

    #[tokio::test]
    async fn test_key_and_token_shape() {
        let (_, locks) = service();
        let lock = locks.lock("order:42");

        assert_eq!(lock.key(), "lock:order:42");
        assert!(lock.token().starts_with(LockService::instance_id()));
        assert_ne!(lock.token(), locks.lock("order:42").token());
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let (store, locks) = service();
        let lock = locks.lock("order:1");
        let ttl = Duration::from_secs(10);

        assert!(lock.try_acquire(ttl).await.unwrap());
        assert_eq!(
            store.get("lock:order:1").await.unwrap(),
            Some(Bytes::from(lock.token().to_string()))
        );
        assert!(!locks.lock("order:1").try_acquire(ttl).await.unwrap());

        assert!(lock.release().await.unwrap());
        assert!(locks.lock("order:1").try_acquire(ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_release_by_non_owner_is_noop() {
        let (store, locks) = service();
        let first = locks.lock("shop:1");
        let second = locks.lock("shop:1");

        assert!(first
            .try_acquire(Duration::from_millis(20))
            .await
            .unwrap());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(second.try_acquire(Duration::from_secs(10)).await.unwrap());

        // First owner's TTL ran out; its late release must not free the second owner
        assert!(!first.release().await.unwrap());
        assert_eq!(
            store.get("lock:shop:1").await.unwrap(),
            Some(Bytes::from(second.token().to_string()))
        );
    }

    #[tokio::test]
    async fn test_acquire_with_retry_waits_for_release() {
        let (_, locks) = service();
        let holder = locks.lock("order:9");
        assert!(holder.try_acquire(Duration::from_secs(10)).await.unwrap());

        let waiter = locks.lock("order:9");
        let policy = RetryPolicy::new(50, Duration::from_millis(5));
        let release = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            holder.release().await.unwrap();
        };

        let (acquired, _) = tokio::join!(
            waiter.acquire_with_retry(Duration::from_secs(10), &policy),
            release
        );
        assert!(acquired.unwrap());
    }

    #[tokio::test]
    async fn test_acquire_with_retry_gives_up() {
        let (_, locks) = service();
        assert!(locks
            .lock("order:9")
            .try_acquire(Duration::from_secs(10))
            .await
            .unwrap());

        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let acquired = locks
            .lock("order:9")
            .acquire_with_retry(Duration::from_secs(10), &policy)
            .await
            .unwrap();
        assert!(!acquired);
    }

    #[tokio::test]
    async fn test_run_then_release_on_error() {
        let (store, locks) = service();
        let lock = locks.lock("order:3");
        assert!(lock.try_acquire(Duration::from_secs(10)).await.unwrap());

        let result: Result<()> = lock
            .run_then_release(async { Err(Error::Database("boom".into())) })
            .await;

        assert_matches!(result, Err(Error::Database(_)));
        assert!(store.get("lock:order:3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_run_then_release_on_panic() {
        let (store, locks) = service();
        let lock = Arc::new(locks.lock("order:4"));
        assert!(lock.try_acquire(Duration::from_secs(10)).await.unwrap());

        let task_lock = lock.clone();
        let joined = tokio::spawn(async move {
            task_lock
                .run_then_release(async {
                    if true {
                        panic!("critical section blew up");
                    }
                    Ok(())
                })
                .await
        })
        .await;

        assert!(joined.unwrap_err().is_panic());
        assert!(store.get("lock:order:4").await.unwrap().is_none());
    }
}
