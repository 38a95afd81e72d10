//! Domain Ports (DDD Port/Adapter Pattern)
//!
//! This module defines the core abstractions (ports) that the cache engine,
//! the lock, the id generator and the order flow depend on. Infrastructure
//! adapters implement these traits to provide concrete implementations.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Domain Layer                            │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                    Ports (Traits)                    │    │
//! │  │  AtomicStore │ ShopRepository │ VoucherRepository   │    │
//! │  │  OrderStore / OrderTransaction │ EventPublisher     │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Infrastructure Layer                       │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                  Adapters (Impls)                    │    │
//! │  │  InMemoryStore │ RedisStore │ InMemoryDatabase      │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::events::DomainEvent;
use super::model::{Shop, ShopId, ShopType, SeckillVoucher, UserId, VoucherId, VoucherOrder};
use crate::error::Result;

// =============================================================================
// External Atomic Store Port
// =============================================================================

/// Port for the external in-memory key-value store.
///
/// These primitives are the entire contract the cache engine, the lock and
/// the id generator need. Any store offering them atomically is substitutable.
///
/// # Example
///
/// ```ignore
/// let created = store
///     .set_if_absent("lock:order:7", Bytes::from("token"), Duration::from_secs(30))
///     .await?;
/// ```
#[async_trait]
pub trait AtomicStore: Send + Sync {
    /// Read a value. Expired entries read as absent.
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Write a value, replacing any previous one. `None` keeps it until deleted.
    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<()>;

    /// Write a value only if the key is absent. Returns true if this call created it.
    async fn set_if_absent(&self, key: &str, value: Bytes, ttl: Duration) -> Result<bool>;

    /// Delete a key. Returns true if something was removed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Atomically increment an integer counter, creating it at zero first.
    async fn increment(&self, key: &str) -> Result<i64>;

    /// Delete the key only if it currently holds `expected`, as one atomic step.
    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<bool>;
}

// =============================================================================
// Relational Store Ports
// =============================================================================

/// Port for shop records.
#[async_trait]
pub trait ShopRepository: Send + Sync {
    /// Get a shop by id.
    async fn get_shop(&self, id: ShopId) -> Result<Option<Shop>>;

    /// Overwrite a shop row. Returns false if no row has this id.
    async fn update_shop(&self, shop: &Shop) -> Result<bool>;

    /// All shop types ordered by their `sort` column.
    async fn list_shop_types(&self) -> Result<Vec<ShopType>>;
}

/// Port for seckill voucher reads.
#[async_trait]
pub trait VoucherRepository: Send + Sync {
    /// Get a voucher's stock and sale window.
    async fn get_voucher(&self, id: VoucherId) -> Result<Option<SeckillVoucher>>;
}

/// Port for the order unit of work.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Open a transaction. Dropping it without [`OrderTransaction::commit`]
    /// rolls back everything it wrote.
    async fn begin(&self) -> Result<Box<dyn OrderTransaction>>;
}

/// A single atomic transaction over vouchers and orders.
#[async_trait]
pub trait OrderTransaction: Send {
    /// Number of orders already placed by `user_id` for `voucher_id`.
    async fn count_orders(&mut self, user_id: UserId, voucher_id: VoucherId) -> Result<u64>;

    /// `stock = stock - 1 WHERE voucher_id = ? AND stock > 0`; returns rows affected.
    async fn decrement_stock(&mut self, voucher_id: VoucherId) -> Result<u64>;

    /// Insert a new order row.
    async fn insert_order(&mut self, order: &VoucherOrder) -> Result<()>;

    /// Make every write of this transaction durable.
    async fn commit(self: Box<Self>) -> Result<()>;
}

// =============================================================================
// Event Publisher Port
// =============================================================================

/// Port for publishing domain events.
///
/// This trait abstracts event publishing, allowing different backends
/// (logging, in-memory, message bus) to be used.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a domain event.
    async fn publish(&self, event: DomainEvent) -> Result<()>;

    /// Publish multiple events.
    async fn publish_all(&self, events: Vec<DomainEvent>) -> Result<()>;
}
