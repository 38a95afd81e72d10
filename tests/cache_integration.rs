//! Cache Engine Integration Tests
//!
//! - Pass-through: cached absence shields the database
//! - Logical expiry: stale reads during a single background rebuild
//! - Mutex: one loader per cold key
//! - Shop service: update-then-invalidate round trip

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use bytes::Bytes;
use tokio::task::JoinSet;

use flashguard::adapters::InMemoryStore;
use flashguard::config::{CacheClientConfig, RebuildPoolConfig};
use flashguard::domain::ports::AtomicStore;
use flashguard::{CacheClient, Error, Result};

const NULL_TTL: Duration = Duration::from_secs(120);
const TTL: Duration = Duration::from_secs(1800);

fn client(store: Arc<InMemoryStore>) -> CacheClient {
    CacheClient::new(
        store,
        CacheClientConfig::default(),
        RebuildPoolConfig::default(),
    )
}

async fn wait_for(mut done: impl FnMut() -> bool) {
    for _ in 0..400 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

// =============================================================================
// Pass-Through
// =============================================================================

mod pass_through_tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_id_hits_fallback_once() {
        let store = Arc::new(InMemoryStore::new());
        let client = client(store.clone());
        let calls = Arc::new(AtomicUsize::new(0));

        let fallback = {
            let calls = calls.clone();
            move |_id: u64| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<Option<String>, Error>(None) }
            }
        };

        let first = client
            .query_with_pass_through("cache:shop:", 0u64, &fallback, NULL_TTL, TTL)
            .await
            .unwrap();
        let second = client
            .query_with_pass_through("cache:shop:", 0u64, &fallback, NULL_TTL, TTL)
            .await
            .unwrap();

        assert!(first.is_none());
        assert!(second.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_absence_expires_with_null_ttl() {
        let store = Arc::new(InMemoryStore::new());
        let client = client(store.clone());
        let calls = Arc::new(AtomicUsize::new(0));

        let fallback = {
            let calls = calls.clone();
            move |_id: u64| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<Option<String>, Error>(None) }
            }
        };
        let short = Duration::from_millis(20);

        client
            .query_with_pass_through("cache:shop:", 0u64, &fallback, short, TTL)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        client
            .query_with_pass_through("cache:shop:", 0u64, &fallback, short, TTL)
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_corrupt_payload_is_an_error() {
        let store = Arc::new(InMemoryStore::new());
        // A non-JSON payload under the key surfaces as a serialization error
        store
            .set("cache:shop:1", Bytes::from_static(b"{not json"), None)
            .await
            .unwrap();
        let client = client(store);

        let result = client
            .query_with_pass_through(
                "cache:shop:",
                1u64,
                |_id: u64| async { Ok::<Option<String>, Error>(Some("x".into())) },
                NULL_TTL,
                TTL,
            )
            .await;

        assert_matches!(result, Err(Error::Serialization(_)));
    }
}

// =============================================================================
// Logical Expiry
// =============================================================================

mod logical_expiry_tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;

    type BoxedLookup = Pin<Box<dyn Future<Output = Result<Option<String>>> + Send>>;

    fn slow_fallback(
        calls: Arc<AtomicUsize>,
        delay: Duration,
    ) -> impl Fn(u64) -> BoxedLookup + Clone + Send + Sync + 'static {
        move |id: u64| -> BoxedLookup {
            let calls = calls.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                Ok(Some(format!("fresh-{}", id)))
            })
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_readers_get_stale_and_one_rebuild_runs() {
        let store = Arc::new(InMemoryStore::new());
        let client = client(store.clone());
        client
            .set_with_logical_expire("cache:shop:1", &"stale".to_string(), Duration::ZERO)
            .await
            .unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let fallback = slow_fallback(calls.clone(), Duration::from_millis(300));

        let mut join_set = JoinSet::new();
        for _ in 0..50 {
            let client = client.clone();
            let fallback = fallback.clone();
            join_set.spawn(async move {
                client
                    .query_with_logical_expire("cache:shop:", "shop:", 1u64, fallback, TTL)
                    .await
            });
        }

        while let Some(result) = join_set.join_next().await {
            let value = result.unwrap().unwrap();
            assert_eq!(value.as_deref(), Some("stale"));
        }

        let metrics = client.metrics();
        wait_for(|| metrics.snapshot().rebuilds_completed == 1).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(metrics.snapshot().rebuilds_scheduled, 1);
        assert!(store.get("lock:shop:1").await.unwrap().is_none());

        let value = client
            .query_with_logical_expire("cache:shop:", "shop:", 1u64, fallback, TTL)
            .await
            .unwrap();
        assert_eq!(value.as_deref(), Some("fresh-1"));
        client.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_rebuild_releases_lock_and_retries() {
        let store = Arc::new(InMemoryStore::new());
        let client = client(store.clone());
        client
            .set_with_logical_expire("cache:shop:2", &"stale".to_string(), Duration::ZERO)
            .await
            .unwrap();

        let failing = |_id: u64| async { Err::<Option<String>, _>(Error::Database("down".into())) };
        let value = client
            .query_with_logical_expire("cache:shop:", "shop:", 2u64, failing, TTL)
            .await
            .unwrap();
        assert_eq!(value.as_deref(), Some("stale"));

        let metrics = client.metrics();
        wait_for(|| metrics.snapshot().rebuilds_failed == 1).await;
        assert!(store.get("lock:shop:2").await.unwrap().is_none());

        // The next request schedules the rebuild again
        let calls = Arc::new(AtomicUsize::new(0));
        let value = client
            .query_with_logical_expire(
                "cache:shop:",
                "shop:",
                2u64,
                slow_fallback(calls.clone(), Duration::ZERO),
                TTL,
            )
            .await
            .unwrap();
        assert_eq!(value.as_deref(), Some("stale"));
        wait_for(|| metrics.snapshot().rebuilds_completed == 1).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_rebuild_releases_lock() {
        let store = Arc::new(InMemoryStore::new());
        let client = client(store.clone());
        client
            .set_with_logical_expire("cache:shop:3", &"stale".to_string(), Duration::ZERO)
            .await
            .unwrap();

        let exploding = |_id: u64| async {
            if true {
                panic!("fallback exploded");
            }
            Ok::<Option<String>, Error>(None)
        };
        client
            .query_with_logical_expire("cache:shop:", "shop:", 3u64, exploding, TTL)
            .await
            .unwrap();

        let metrics = client.metrics();
        wait_for(|| metrics.snapshot().rebuilds_failed == 1).await;
        assert!(store.get("lock:shop:3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rebuild_of_deleted_record_stores_empty_data() {
        let store = Arc::new(InMemoryStore::new());
        let client = client(store.clone());
        client
            .set_with_logical_expire("cache:shop:4", &"stale".to_string(), Duration::ZERO)
            .await
            .unwrap();

        client
            .query_with_logical_expire(
                "cache:shop:",
                "shop:",
                4u64,
                |_id: u64| async { Ok::<Option<String>, Error>(None) },
                TTL,
            )
            .await
            .unwrap();

        let metrics = client.metrics();
        wait_for(|| metrics.snapshot().rebuilds_completed == 1).await;

        let value: Option<String> = client
            .query_with_logical_expire(
                "cache:shop:",
                "shop:",
                4u64,
                |_id: u64| async { Ok::<Option<String>, Error>(None) },
                TTL,
            )
            .await
            .unwrap();
        assert!(value.is_none());
    }
}

// =============================================================================
// Mutex
// =============================================================================

mod mutex_tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_cold_key_loads_once() {
        let store = Arc::new(InMemoryStore::new());
        let client = client(store.clone());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut join_set = JoinSet::new();
        for _ in 0..20 {
            let client = client.clone();
            let calls = calls.clone();
            join_set.spawn(async move {
                client
                    .query_with_mutex(
                        "cache:shop:",
                        "shop:",
                        7u64,
                        move |id: u64| {
                            let calls = calls.clone();
                            async move {
                                calls.fetch_add(1, Ordering::SeqCst);
                                tokio::time::sleep(Duration::from_millis(30)).await;
                                Ok::<_, Error>(Some(format!("shop-{}", id)))
                            }
                        },
                        NULL_TTL,
                        TTL,
                    )
                    .await
            });
        }

        while let Some(result) = join_set.join_next().await {
            assert_eq!(result.unwrap().unwrap().as_deref(), Some("shop-7"));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(client.metrics().snapshot().lock_waits > 0);
        assert!(store.get("lock:shop:7").await.unwrap().is_none());
    }
}

// =============================================================================
// Shop Service
// =============================================================================

mod shop_service_tests {
    use super::*;
    use flashguard::adapters::{InMemoryDatabase, InMemoryEventCollector};
    use flashguard::config::CACHE_NULL_TTL;
    use flashguard::domain::model::{Shop, ShopId};
    use flashguard::{CachePolicy, KeySpace, ShopService, ShopUpdate};

    #[tokio::test]
    async fn test_update_invalidates_and_next_read_repopulates() {
        let store = Arc::new(InMemoryStore::new());
        let db = Arc::new(InMemoryDatabase::new());
        let space = KeySpace::shops(CachePolicy::Mutex {
            null_ttl: CACHE_NULL_TTL,
            ttl: TTL,
        });
        let service = ShopService::new(
            client(store.clone()),
            db.clone(),
            Arc::new(InMemoryEventCollector::new()),
            space,
        );

        let mut shop = Shop::new(ShopId::new(1), "Noodle Bar");
        db.insert_shop(shop.clone()).await;
        assert_eq!(
            service.query_by_id(ShopId::new(1)).await.unwrap().unwrap().name,
            "Noodle Bar"
        );

        shop.name = "Noodle House".to_string();
        assert_eq!(service.update(&shop).await.unwrap(), ShopUpdate::Updated);
        assert!(store.get("cache:shop:1").await.unwrap().is_none());

        assert_eq!(
            service.query_by_id(ShopId::new(1)).await.unwrap().unwrap().name,
            "Noodle House"
        );
        assert_eq!(db.shop_reads(), 2);
    }
}
