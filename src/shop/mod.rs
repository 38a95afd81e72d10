//! Shop Catalog Service
//!
//! Cached reads of shops and shop types. Writes go to the database first and
//! then delete the cache entry; the next read repopulates it.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::cache::CacheClient;
use crate::config::{KeySpace, CACHE_SHOP_TTL, CACHE_SHOP_TYPE_KEY};
use crate::domain::events::DomainEvent;
use crate::domain::model::{Shop, ShopId, ShopType};
use crate::domain::ports::{EventPublisher, ShopRepository};
use crate::error::Result;

/// Outcome of a shop update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShopUpdate {
    /// Row written and cache entry dropped
    Updated,
    /// No shop with this id; nothing was touched
    NotFound,
}

/// Shop lookups and updates through the cache
pub struct ShopService {
    cache: CacheClient,
    shops: Arc<dyn ShopRepository>,
    events: Arc<dyn EventPublisher>,
    space: KeySpace,
}

impl ShopService {
    pub fn new(
        cache: CacheClient,
        shops: Arc<dyn ShopRepository>,
        events: Arc<dyn EventPublisher>,
        space: KeySpace,
    ) -> Self {
        Self {
            cache,
            shops,
            events,
            space,
        }
    }

    pub fn key_space(&self) -> &KeySpace {
        &self.space
    }

    /// Shop by id through the key-space's cache policy
    pub async fn query_by_id(&self, id: ShopId) -> Result<Option<Shop>> {
        let shops = self.shops.clone();
        self.cache
            .query(&self.space, id, move |id| {
                let shops = shops.clone();
                async move { shops.get_shop(id).await }
            })
            .await
    }

    /// Write `shop` to the database, then drop its cache entry
    #[instrument(skip(self, shop), fields(shop_id = %shop.id))]
    pub async fn update(&self, shop: &Shop) -> Result<ShopUpdate> {
        if !self.shops.update_shop(shop).await? {
            debug!("Update for unknown shop");
            return Ok(ShopUpdate::NotFound);
        }

        let key = self.space.key(shop.id);
        self.cache.invalidate(&key).await?;
        info!(key = %key, "Shop updated, cache entry invalidated");

        if let Err(e) = self.events.publish(DomainEvent::shop_updated(shop.id, key)).await {
            warn!(error = %e, "Failed to publish shop event");
        }
        Ok(ShopUpdate::Updated)
    }

    /// Load a shop from the database into a logical-expiry entry.
    ///
    /// Returns false when the shop does not exist.
    pub async fn warm_up(&self, id: ShopId, ttl: Duration) -> Result<bool> {
        let Some(shop) = self.shops.get_shop(id).await? else {
            return Ok(false);
        };
        self.cache
            .set_with_logical_expire(&self.space.key(id), &shop, ttl)
            .await?;
        debug!(shop_id = %id, "Warmed up shop");
        Ok(true)
    }

    /// All shop types ordered by `sort`, cached as one list.
    ///
    /// An empty list is returned but not cached.
    pub async fn list_types(&self) -> Result<Vec<ShopType>> {
        if let Some(types) = self.cache.get::<Vec<ShopType>>(CACHE_SHOP_TYPE_KEY).await? {
            return Ok(types);
        }

        let types = self.shops.list_shop_types().await?;
        if !types.is_empty() {
            self.cache
                .set(CACHE_SHOP_TYPE_KEY, &types, CACHE_SHOP_TTL)
                .await?;
        }
        Ok(types)
    }
}

// =============================================================================
// Tests
// =============================================================================
