use serde::Serialize;

use crate::domain::model::OrderId;

/// Steps of a purchase attempt, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SeckillStage {
    /// Voucher exists and the sale window is open
    CheckWindow,
    /// Fast, non-authoritative stock read
    CheckStock,
    /// Per-user order lock
    AcquireLock,
    /// No earlier order for this user and voucher
    CheckIdempotency,
    /// Conditional `stock > 0` decrement
    DecrementStock,
    /// Id allocation and order insert
    CreateOrder,
    /// Per-user lock released
    Release,
}

impl std::fmt::Display for SeckillStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SeckillStage::CheckWindow => write!(f, "CheckWindow"),
            SeckillStage::CheckStock => write!(f, "CheckStock"),
            SeckillStage::AcquireLock => write!(f, "AcquireLock"),
            SeckillStage::CheckIdempotency => write!(f, "CheckIdempotency"),
            SeckillStage::DecrementStock => write!(f, "DecrementStock"),
            SeckillStage::CreateOrder => write!(f, "CreateOrder"),
            SeckillStage::Release => write!(f, "Release"),
        }
    }
}

/// Why a purchase attempt was turned away
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Rejection {
    /// No voucher with this id
    VoucherNotFound,
    /// Sale window has not opened
    NotStarted,
    /// Sale window has closed
    Ended,
    /// No stock left, by the fast read or the conditional decrement
    SoldOut,
    /// Another attempt by the same user holds the order lock
    InProgress,
    /// The user already owns an order for this voucher
    AlreadyPurchased,
}

impl Rejection {
    /// Short machine-readable label
    pub fn label(&self) -> &'static str {
        match self {
            Rejection::VoucherNotFound => "voucher_not_found",
            Rejection::NotStarted => "not_started",
            Rejection::Ended => "ended",
            Rejection::SoldOut => "sold_out",
            Rejection::InProgress => "in_progress",
            Rejection::AlreadyPurchased => "already_purchased",
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::VoucherNotFound => write!(f, "voucher does not exist"),
            Rejection::NotStarted => write!(f, "sale has not started"),
            Rejection::Ended => write!(f, "sale has ended"),
            Rejection::SoldOut => write!(f, "sold out"),
            Rejection::InProgress => write!(f, "a purchase for this user is already in progress"),
            Rejection::AlreadyPurchased => write!(f, "user already purchased this voucher"),
        }
    }
}

/// Result of one purchase attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SeckillOutcome {
    Created { order_id: OrderId },
    Rejected(Rejection),
}

impl SeckillOutcome {
    pub fn is_created(&self) -> bool {
        matches!(self, SeckillOutcome::Created { .. })
    }

    pub fn order_id(&self) -> Option<OrderId> {
        match self {
            SeckillOutcome::Created { order_id } => Some(*order_id),
            SeckillOutcome::Rejected(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            SeckillOutcome::Created { .. } => None,
            SeckillOutcome::Rejected(reason) => Some(*reason),
        }
    }

    /// Metric label: `created` or the rejection label
    pub fn label(&self) -> &'static str {
        match self {
            SeckillOutcome::Created { .. } => "created",
            SeckillOutcome::Rejected(reason) => reason.label(),
        }
    }
}

impl From<Rejection> for SeckillOutcome {
    fn from(reason: Rejection) -> Self {
        SeckillOutcome::Rejected(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_accessors() {
        let created = SeckillOutcome::Created {
            order_id: OrderId::new(42),
        };
        assert!(created.is_created());
        assert_eq!(created.order_id(), Some(OrderId::new(42)));
        assert_eq!(created.label(), "created");

        let rejected = SeckillOutcome::from(Rejection::InProgress);
        assert!(!rejected.is_created());
        assert_eq!(rejected.rejection(), Some(Rejection::InProgress));
        assert_eq!(rejected.label(), "in_progress");
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(SeckillStage::AcquireLock.to_string(), "AcquireLock");
        assert_eq!(SeckillStage::DecrementStock.to_string(), "DecrementStock");
    }
}
