//! In-Memory Relational Adapter
//!
//! Implements the shop, voucher and order ports on plain tables. Each
//! statement runs under a short table latch. How statements of one
//! [`OrderTransaction`] interleave with other transactions depends on the
//! [`Isolation`] the database was created with. Every transaction keeps an
//! undo log that is replayed if it is dropped without a commit.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

use crate::domain::model::{
    OrderId, SeckillVoucher, Shop, ShopId, ShopType, UserId, VoucherId, VoucherOrder,
};
use crate::domain::ports::{OrderStore, OrderTransaction, ShopRepository, VoucherRepository};
use crate::error::{Error, Result};

/// How order transactions interleave
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Isolation {
    /// One transaction at a time; a transaction sees no concurrent writes.
    #[default]
    Serializable,
    /// Only single statements are atomic. Two transactions may both count
    /// zero orders for a user and then both insert, as on a relational store
    /// without a unique index. The conditional decrement stays atomic.
    PerStatement,
}

#[derive(Debug, Default)]
struct Tables {
    shops: HashMap<ShopId, Shop>,
    shop_types: Vec<ShopType>,
    vouchers: HashMap<VoucherId, SeckillVoucher>,
    orders: Vec<VoucherOrder>,
}

/// In-memory stand-in for the relational store
#[derive(Debug, Default)]
pub struct InMemoryDatabase {
    tables: Arc<Mutex<Tables>>,
    /// Held for a whole transaction under [`Isolation::Serializable`]
    serial: Arc<AsyncMutex<()>>,
    isolation: Isolation,
    shop_reads: AtomicU64,
    fail_inserts: Arc<AtomicBool>,
}

impl InMemoryDatabase {
    /// Create an empty, serializable database
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty database with the given transaction isolation
    pub fn with_isolation(isolation: Isolation) -> Self {
        Self {
            isolation,
            ..Self::default()
        }
    }

    pub fn isolation(&self) -> Isolation {
        self.isolation
    }

    /// Insert or replace a shop row
    pub async fn insert_shop(&self, shop: Shop) {
        self.tables.lock().shops.insert(shop.id, shop);
    }

    /// Insert a shop type row
    pub async fn insert_shop_type(&self, shop_type: ShopType) {
        self.tables.lock().shop_types.push(shop_type);
    }

    /// Insert or replace a voucher row
    pub async fn insert_voucher(&self, voucher: SeckillVoucher) {
        self.tables.lock().vouchers.insert(voucher.voucher_id, voucher);
    }

    /// Current stock of a voucher
    pub async fn stock_of(&self, voucher_id: VoucherId) -> Option<u32> {
        self.tables.lock().vouchers.get(&voucher_id).map(|v| v.stock)
    }

    /// Total number of committed orders
    pub async fn order_count(&self) -> usize {
        self.tables.lock().orders.len()
    }

    /// Committed orders of one user for one voucher
    pub async fn orders_for(&self, user_id: UserId, voucher_id: VoucherId) -> Vec<VoucherOrder> {
        self.tables
            .lock()
            .orders
            .iter()
            .filter(|o| o.user_id == user_id && o.voucher_id == voucher_id)
            .cloned()
            .collect()
    }

    /// Number of `get_shop` calls served
    pub fn shop_reads(&self) -> u64 {
        self.shop_reads.load(Ordering::Relaxed)
    }

    /// Make every subsequent order insert fail (fault injection).
    pub fn fail_order_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ShopRepository for InMemoryDatabase {
    async fn get_shop(&self, id: ShopId) -> Result<Option<Shop>> {
        self.shop_reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.tables.lock().shops.get(&id).cloned())
    }

    async fn update_shop(&self, shop: &Shop) -> Result<bool> {
        let mut tables = self.tables.lock();
        match tables.shops.get_mut(&shop.id) {
            Some(row) => {
                *row = shop.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_shop_types(&self) -> Result<Vec<ShopType>> {
        let mut types = self.tables.lock().shop_types.clone();
        types.sort_by_key(|t| t.sort);
        Ok(types)
    }
}

#[async_trait]
impl VoucherRepository for InMemoryDatabase {
    async fn get_voucher(&self, id: VoucherId) -> Result<Option<SeckillVoucher>> {
        Ok(self.tables.lock().vouchers.get(&id).cloned())
    }
}

#[async_trait]
impl OrderStore for InMemoryDatabase {
    async fn begin(&self) -> Result<Box<dyn OrderTransaction>> {
        let serial = match self.isolation {
            Isolation::Serializable => Some(self.serial.clone().lock_owned().await),
            Isolation::PerStatement => None,
        };
        Ok(Box::new(InMemoryTransaction {
            tables: self.tables.clone(),
            _serial: serial,
            interleave: self.isolation == Isolation::PerStatement,
            undo: Vec::new(),
            committed: false,
            fail_inserts: self.fail_inserts.clone(),
        }))
    }
}

// =============================================================================
// Transaction
// =============================================================================

#[derive(Debug)]
enum Undo {
    Stock { voucher_id: VoucherId },
    Order { order_id: OrderId },
}

struct InMemoryTransaction {
    tables: Arc<Mutex<Tables>>,
    _serial: Option<OwnedMutexGuard<()>>,
    /// Let other transactions run between statements
    interleave: bool,
    undo: Vec<Undo>,
    committed: bool,
    fail_inserts: Arc<AtomicBool>,
}

impl InMemoryTransaction {
    async fn statement_boundary(&self) {
        if self.interleave {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl OrderTransaction for InMemoryTransaction {
    async fn count_orders(&mut self, user_id: UserId, voucher_id: VoucherId) -> Result<u64> {
        self.statement_boundary().await;
        Ok(self
            .tables
            .lock()
            .orders
            .iter()
            .filter(|o| o.user_id == user_id && o.voucher_id == voucher_id)
            .count() as u64)
    }

    async fn decrement_stock(&mut self, voucher_id: VoucherId) -> Result<u64> {
        self.statement_boundary().await;
        let mut tables = self.tables.lock();
        match tables.vouchers.get_mut(&voucher_id) {
            Some(voucher) if voucher.stock > 0 => {
                voucher.stock -= 1;
                self.undo.push(Undo::Stock { voucher_id });
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn insert_order(&mut self, order: &VoucherOrder) -> Result<()> {
        self.statement_boundary().await;
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(Error::Database(format!(
                "insert of order {} rejected",
                order.order_id
            )));
        }
        self.tables.lock().orders.push(order.clone());
        self.undo.push(Undo::Order {
            order_id: order.order_id,
        });
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut tx = self;
        tx.committed = true;
        tx.undo.clear();
        Ok(())
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        if self.committed || self.undo.is_empty() {
            return;
        }

        debug!("Rolling back {} uncommitted writes", self.undo.len());
        let mut tables = self.tables.lock();
        while let Some(undo) = self.undo.pop() {
            match undo {
                Undo::Stock { voucher_id } => {
                    if let Some(voucher) = tables.vouchers.get_mut(&voucher_id) {
                        voucher.stock += 1;
                    }
                }
                Undo::Order { order_id } => {
                    tables.orders.retain(|o| o.order_id != order_id);
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
