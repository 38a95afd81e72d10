//! Seckill Order Service
//!
//! Runs one purchase attempt through the gates
//! `CheckWindow -> CheckStock -> AcquireLock -> CheckIdempotency ->
//! DecrementStock -> CreateOrder -> Release`. The first three gates reject
//! without side effects; the last four run inside the per-user lock as one
//! database transaction.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use super::outcome::{Rejection, SeckillOutcome, SeckillStage};
use crate::config::SeckillConfig;
use crate::domain::events::DomainEvent;
use crate::domain::model::{OrderId, UserContext, UserId, VoucherId, VoucherOrder};
use crate::domain::ports::{EventPublisher, OrderStore, VoucherRepository};
use crate::error::Result;
use crate::idgen::IdGenerator;
use crate::lock::LockService;
use crate::metrics::MetricsRegistry;

/// Flash-sale order flow
pub struct SeckillService {
    vouchers: Arc<dyn VoucherRepository>,
    orders: Arc<dyn OrderStore>,
    locks: LockService,
    ids: IdGenerator,
    events: Arc<dyn EventPublisher>,
    config: SeckillConfig,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl SeckillService {
    pub fn new(
        vouchers: Arc<dyn VoucherRepository>,
        orders: Arc<dyn OrderStore>,
        locks: LockService,
        ids: IdGenerator,
        events: Arc<dyn EventPublisher>,
        config: SeckillConfig,
    ) -> Self {
        Self {
            vouchers,
            orders,
            locks,
            ids,
            events,
            config,
            metrics: None,
        }
    }

    /// Count outcomes in `metrics`
    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &SeckillConfig {
        &self.config
    }

    /// Attempt to buy one unit of `voucher_id` for `user`.
    ///
    /// Business rejections come back as `Ok(SeckillOutcome::Rejected(_))`;
    /// only store or database failures are errors.
    #[instrument(skip(self, user), fields(user_id = %user.user_id, voucher_id = %voucher_id))]
    pub async fn seckill_voucher(
        &self,
        user: &UserContext,
        voucher_id: VoucherId,
    ) -> Result<SeckillOutcome> {
        let mut stage = SeckillStage::CheckWindow;
        match self.attempt(user.user_id, voucher_id, &mut stage).await {
            Ok(outcome) => {
                self.report(user.user_id, voucher_id, &outcome, stage).await;
                Ok(outcome)
            }
            Err(e) => {
                warn!(stage = %stage, error = %e, "Purchase attempt failed");
                Err(e)
            }
        }
    }

    /// Runs the gates, leaving `stage` at the last one entered
    async fn attempt(
        &self,
        user_id: UserId,
        voucher_id: VoucherId,
        stage: &mut SeckillStage,
    ) -> Result<SeckillOutcome> {
        *stage = SeckillStage::CheckWindow;
        let Some(voucher) = self.vouchers.get_voucher(voucher_id).await? else {
            return Ok(Rejection::VoucherNotFound.into());
        };
        let now = Utc::now();
        if voucher.not_started(now) {
            return Ok(Rejection::NotStarted.into());
        }
        if voucher.ended(now) {
            return Ok(Rejection::Ended.into());
        }

        // Best effort; the decrement decides
        *stage = SeckillStage::CheckStock;
        if voucher.stock < 1 {
            return Ok(Rejection::SoldOut.into());
        }

        *stage = SeckillStage::AcquireLock;
        let lock = self
            .locks
            .lock(format!("{}{}", self.config.lock_prefix, user_id));
        if !lock.try_acquire(self.config.lock_ttl).await? {
            warn!(lock = %lock.key(), "Concurrent purchase attempt for user");
            return Ok(Rejection::InProgress.into());
        }

        let outcome = lock
            .run_then_release(self.run_order_transaction(user_id, voucher_id, &mut *stage))
            .await?;
        if outcome.is_created() {
            *stage = SeckillStage::Release;
        }
        Ok(outcome)
    }

    /// The locked part of the flow: idempotency check, conditional
    /// decrement and insert, committed together or not at all.
    ///
    /// Callers must hold the user's order lock. The database alone does not
    /// stop two concurrent calls for one user from both inserting.
    pub async fn create_voucher_order(
        &self,
        user_id: UserId,
        voucher_id: VoucherId,
    ) -> Result<SeckillOutcome> {
        let mut stage = SeckillStage::CheckIdempotency;
        self.run_order_transaction(user_id, voucher_id, &mut stage)
            .await
    }

    async fn run_order_transaction(
        &self,
        user_id: UserId,
        voucher_id: VoucherId,
        stage: &mut SeckillStage,
    ) -> Result<SeckillOutcome> {
        let mut tx = self.orders.begin().await?;

        *stage = SeckillStage::CheckIdempotency;
        if tx.count_orders(user_id, voucher_id).await? > 0 {
            return Ok(Rejection::AlreadyPurchased.into());
        }

        *stage = SeckillStage::DecrementStock;
        if tx.decrement_stock(voucher_id).await? == 0 {
            return Ok(Rejection::SoldOut.into());
        }

        *stage = SeckillStage::CreateOrder;
        let order_id = OrderId::new(self.ids.next_id(&self.config.id_prefix).await?);
        let order = VoucherOrder {
            order_id,
            user_id,
            voucher_id,
            create_time: Utc::now(),
        };
        tx.insert_order(&order).await?;
        tx.commit().await?;

        info!(order_id = %order_id, "Order created");
        Ok(SeckillOutcome::Created { order_id })
    }

    async fn report(
        &self,
        user_id: UserId,
        voucher_id: VoucherId,
        outcome: &SeckillOutcome,
        stage: SeckillStage,
    ) {
        if let Some(metrics) = &self.metrics {
            metrics.record_seckill(outcome);
        }

        let event = match outcome {
            SeckillOutcome::Created { order_id } => {
                DomainEvent::order_created(*order_id, user_id, voucher_id)
            }
            SeckillOutcome::Rejected(reason) => {
                debug!(reason = %reason, stage = %stage, "Purchase rejected");
                DomainEvent::order_rejected(user_id, voucher_id, reason.label(), stage.to_string())
            }
        };

        // The order is already committed; a lost event does not undo it
        if let Err(e) = self.events.publish(event).await {
            warn!(error = %e, "Failed to publish order event");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
