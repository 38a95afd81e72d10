//! Domain Model
//!
//! Value objects and records owned by the relational store. The cache may
//! hold stale read-only copies of [`Shop`] and [`ShopType`]; vouchers and
//! orders are only ever read through the database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Identifiers
// =============================================================================

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident, $inner:ty) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl $name {
            pub fn new(id: $inner) -> Self {
                Self(id)
            }

            pub fn value(&self) -> $inner {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$inner> for $name {
            fn from(id: $inner) -> Self {
                Self(id)
            }
        }
    };
}

numeric_id!(
    /// User identifier (value object).
    UserId,
    u64
);
numeric_id!(
    /// Seckill voucher identifier (value object).
    VoucherId,
    u64
);
numeric_id!(
    /// Shop identifier (value object).
    ShopId,
    u64
);
numeric_id!(
    /// Order identifier minted by the id generator.
    OrderId,
    i64
);

// =============================================================================
// Request Context
// =============================================================================

/// The authenticated caller of a request.
///
/// Threaded explicitly through every call that needs to know who is acting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserContext {
    pub user_id: UserId,
    pub nick_name: Option<String>,
}

impl UserContext {
    pub fn new(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            nick_name: None,
        }
    }

    pub fn with_nick_name(mut self, nick_name: impl Into<String>) -> Self {
        self.nick_name = Some(nick_name.into());
        self
    }
}

// =============================================================================
// Records
// =============================================================================

/// A shop listing, the canonical cached entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shop {
    pub id: ShopId,
    pub name: String,
    pub type_id: u64,
    pub area: Option<String>,
    pub address: String,
    /// Longitude
    pub x: f64,
    /// Latitude
    pub y: f64,
    pub avg_price: Option<u64>,
    pub sold: u32,
    pub comments: u32,
    /// Rating, 1-5 scaled by ten
    pub score: u8,
    pub open_hours: Option<String>,
    pub update_time: DateTime<Utc>,
}

impl Shop {
    /// Minimal shop record, mostly useful for seeding and tests.
    pub fn new(id: impl Into<ShopId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            type_id: 1,
            area: None,
            address: String::new(),
            x: 0.0,
            y: 0.0,
            avg_price: None,
            sold: 0,
            comments: 0,
            score: 0,
            open_hours: None,
            update_time: Utc::now(),
        }
    }
}

/// Shop category shown on the landing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopType {
    pub id: u64,
    pub name: String,
    pub icon: String,
    pub sort: i32,
}

/// Stock and sale window of a flash-sale voucher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeckillVoucher {
    pub voucher_id: VoucherId,
    pub stock: u32,
    pub begin_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl SeckillVoucher {
    pub fn new(
        voucher_id: impl Into<VoucherId>,
        stock: u32,
        begin_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        Self {
            voucher_id: voucher_id.into(),
            stock,
            begin_time,
            end_time,
        }
    }

    /// Whether the sale window has not opened yet at `now`.
    pub fn not_started(&self, now: DateTime<Utc>) -> bool {
        now < self.begin_time
    }

    /// Whether the sale window has closed at `now`.
    pub fn ended(&self, now: DateTime<Utc>) -> bool {
        now > self.end_time
    }
}

/// One purchased voucher. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoucherOrder {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub voucher_id: VoucherId,
    pub create_time: DateTime<Utc>,
}

// =============================================================================
// Tests
// =============================================================================
