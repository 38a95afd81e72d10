//! Configuration
//!
//! Library-side configuration structs. The binary assembles these from its
//! command line; tests build them directly or use the defaults.
//!
//! Every cached key-space carries exactly one [`CachePolicy`]. The policy is
//! part of the key-space's contract: readers never pick a strategy per call.

use std::time::Duration;

use crate::lock::RetryPolicy;

/// Key prefix of cached shops
pub const CACHE_SHOP_KEY: &str = "cache:shop:";

/// Lock name prefix for shop rebuilds (stored under `lock:shop:{id}`)
pub const LOCK_SHOP_NAME: &str = "shop:";

/// Key of the cached shop-type list
pub const CACHE_SHOP_TYPE_KEY: &str = "cache:shop-type:list";

/// Lifetime of a cached "confirmed absent" marker
pub const CACHE_NULL_TTL: Duration = Duration::from_secs(2 * 60);

/// Lifetime of a cached shop
pub const CACHE_SHOP_TTL: Duration = Duration::from_secs(30 * 60);

// =============================================================================
// Cache Policy
// =============================================================================

/// How a key-space is protected against penetration and breakdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Null-caching: misses for absent records are remembered for `null_ttl`
    PassThrough { null_ttl: Duration, ttl: Duration },
    /// Entries never leave the store; staleness is checked by the reader and
    /// an expired entry is rebuilt in the background while readers get the
    /// stale value
    LogicalExpire { ttl: Duration },
    /// Null-caching plus a rebuild lock on misses; contended readers back off
    /// and retry
    Mutex { null_ttl: Duration, ttl: Duration },
}

impl CachePolicy {
    pub fn name(&self) -> &'static str {
        match self {
            CachePolicy::PassThrough { .. } => "pass-through",
            CachePolicy::LogicalExpire { .. } => "logical-expire",
            CachePolicy::Mutex { .. } => "mutex",
        }
    }
}

impl std::fmt::Display for CachePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A family of cache keys sharing a prefix and a policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    /// Human readable name used in logs
    pub name: String,
    /// Prefix prepended to the id to form the cache key
    pub key_prefix: String,
    /// Prefix prepended to the id to form the rebuild lock name
    pub lock_prefix: String,
    /// Protection strategy
    pub policy: CachePolicy,
}

impl KeySpace {
    pub fn new(
        name: impl Into<String>,
        key_prefix: impl Into<String>,
        lock_prefix: impl Into<String>,
        policy: CachePolicy,
    ) -> Self {
        Self {
            name: name.into(),
            key_prefix: key_prefix.into(),
            lock_prefix: lock_prefix.into(),
            policy,
        }
    }

    /// The shop key-space with the given policy
    pub fn shops(policy: CachePolicy) -> Self {
        Self::new("shop", CACHE_SHOP_KEY, LOCK_SHOP_NAME, policy)
    }

    /// Cache key for `id`
    pub fn key(&self, id: impl std::fmt::Display) -> String {
        format!("{}{}", self.key_prefix, id)
    }

    /// Rebuild lock name for `id`
    pub fn lock_name(&self, id: impl std::fmt::Display) -> String {
        format!("{}{}", self.lock_prefix, id)
    }
}

// =============================================================================
// Component Configuration
// =============================================================================

/// Cache client configuration
#[derive(Debug, Clone)]
pub struct CacheClientConfig {
    /// How long a rebuild lock may be held before the store drops it
    pub rebuild_lock_ttl: Duration,
    /// Back-off used by the mutex strategy while another reader rebuilds
    pub mutex_retry: RetryPolicy,
}

impl Default for CacheClientConfig {
    fn default() -> Self {
        Self {
            rebuild_lock_ttl: Duration::from_secs(10),
            mutex_retry: RetryPolicy::new(20, Duration::from_millis(50)),
        }
    }
}

/// Background rebuild pool configuration
#[derive(Debug, Clone)]
pub struct RebuildPoolConfig {
    /// Fixed number of worker tasks
    pub workers: usize,
    /// Maximum queued rebuilds before submissions are refused
    pub queue_capacity: usize,
}

impl Default for RebuildPoolConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            queue_capacity: 1024,
        }
    }
}

/// Seckill order flow configuration
#[derive(Debug, Clone)]
pub struct SeckillConfig {
    /// Hold time of the per-user order lock
    pub lock_ttl: Duration,
    /// Lock name prefix; the user id is appended
    pub lock_prefix: String,
    /// Business prefix handed to the id generator
    pub id_prefix: String,
}

impl Default for SeckillConfig {
    fn default() -> Self {
        Self {
            lock_ttl: Duration::from_secs(30),
            lock_prefix: "order:".to_string(),
            id_prefix: "order".to_string(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shop_keyspace_naming() {
        let space = KeySpace::shops(CachePolicy::LogicalExpire {
            ttl: Duration::from_secs(20),
        });

        assert_eq!(space.key(7), "cache:shop:7");
        assert_eq!(space.lock_name(7), "shop:7");
        assert_eq!(space.policy.to_string(), "logical-expire");
    }

    #[test]
    fn test_defaults() {
        let cache = CacheClientConfig::default();
        assert_eq!(cache.rebuild_lock_ttl, Duration::from_secs(10));
        assert_eq!(cache.mutex_retry.max_attempts, 20);

        assert_eq!(RebuildPoolConfig::default().workers, 10);

        let seckill = SeckillConfig::default();
        assert_eq!(seckill.lock_prefix, "order:");
        assert_eq!(seckill.id_prefix, "order");
    }

    #[test]
    fn test_default_ttls() {
        assert_eq!(CACHE_NULL_TTL, Duration::from_secs(120));
        assert_eq!(CACHE_SHOP_TTL, Duration::from_secs(1800));
    }
}
