//! Domain Events
//!
//! This module defines domain events that represent significant occurrences
//! in the system. Events are immutable records of things that have happened.
//!
//! # Usage
//!
//! Domain events are used for:
//! - Audit logging of every purchase attempt
//! - Decoupling the order flow from downstream consumers
//!
//! # Example
//!
//! ```ignore
//! let event = DomainEvent::order_created(order_id, user_id, voucher_id);
//!
//! event_publisher.publish(event).await?;
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::model::{OrderId, ShopId, UserId, VoucherId};

/// Domain event representing a significant occurrence in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    // =========================================================================
    // Order Events
    // =========================================================================
    /// A seckill order was committed.
    OrderCreated {
        order_id: i64,
        user_id: u64,
        voucher_id: u64,
        timestamp: DateTime<Utc>,
    },

    /// A purchase attempt was turned away by one of the order-flow gates.
    OrderRejected {
        user_id: u64,
        voucher_id: u64,
        reason: String,
        /// Gate that turned the attempt away
        stage: String,
        timestamp: DateTime<Utc>,
    },

    // =========================================================================
    // Catalog Events
    // =========================================================================
    /// A shop row was updated and its cache entry invalidated.
    ShopUpdated {
        shop_id: u64,
        cache_key: String,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            DomainEvent::OrderCreated { timestamp, .. } => *timestamp,
            DomainEvent::OrderRejected { timestamp, .. } => *timestamp,
            DomainEvent::ShopUpdated { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::OrderCreated { .. } => "OrderCreated",
            DomainEvent::OrderRejected { .. } => "OrderRejected",
            DomainEvent::ShopUpdated { .. } => "ShopUpdated",
        }
    }

    /// Get the acting user if applicable.
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            DomainEvent::OrderCreated { user_id, .. } => Some(UserId(*user_id)),
            DomainEvent::OrderRejected { user_id, .. } => Some(UserId(*user_id)),
            _ => None,
        }
    }
}

// =============================================================================
// Event Builders
// =============================================================================

impl DomainEvent {
    /// Create an OrderCreated event.
    pub fn order_created(order_id: OrderId, user_id: UserId, voucher_id: VoucherId) -> Self {
        DomainEvent::OrderCreated {
            order_id: order_id.value(),
            user_id: user_id.value(),
            voucher_id: voucher_id.value(),
            timestamp: Utc::now(),
        }
    }

    /// Create an OrderRejected event.
    pub fn order_rejected(
        user_id: UserId,
        voucher_id: VoucherId,
        reason: impl Into<String>,
        stage: impl Into<String>,
    ) -> Self {
        DomainEvent::OrderRejected {
            user_id: user_id.value(),
            voucher_id: voucher_id.value(),
            reason: reason.into(),
            stage: stage.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a ShopUpdated event.
    pub fn shop_updated(shop_id: ShopId, cache_key: impl Into<String>) -> Self {
        DomainEvent::ShopUpdated {
            shop_id: shop_id.value(),
            cache_key: cache_key.into(),
            timestamp: Utc::now(),
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
    fn test_event_serialization() {
        let event = DomainEvent::order_created(OrderId(99), UserId(1), VoucherId(2));

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("OrderCreated"));
        assert!(json.contains("\"order_id\":99"));

        let deserialized: DomainEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.event_type(), "OrderCreated");
    }

    #[test]
    fn test_user_id_extraction() {
        let rejected =
            DomainEvent::order_rejected(UserId(3), VoucherId(4), "sold_out", "DecrementStock");
        assert_eq!(rejected.user_id(), Some(UserId(3)));

        let json = serde_json::to_string(&rejected).unwrap();
        assert!(json.contains("\"stage\":\"DecrementStock\""));

        let updated = DomainEvent::shop_updated(ShopId(1), "cache:shop:1");
        assert_eq!(updated.user_id(), None);
    }

    #[test]
    fn test_timestamp() {
        let before = Utc::now();
        let event = DomainEvent::shop_updated(ShopId(1), "cache:shop:1");
        let after = Utc::now();

        assert!(event.timestamp() >= before);
        assert!(event.timestamp() <= after);
    }
}
