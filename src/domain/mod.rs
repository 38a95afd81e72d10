//! Domain Layer
//!
//! This module contains the core domain types following Domain-Driven Design principles.
//!
//! # Architecture
//!
//! The domain layer is organized into:
//!
//! - **Model** (`model.rs`) - Identifiers, request context and database records
//! - **Ports** (`ports.rs`) - Trait abstractions for the external store, database and event sink
//! - **Events** (`events.rs`) - Domain events for audit and decoupling
//!
//! # Usage
//!
//! ```ignore
//! use flashguard::domain::ports::{AtomicStore, VoucherRepository};
//!
//! // Use traits for dependency injection
//! async fn stock_left<V>(vouchers: &V, id: VoucherId) -> Result<u32>
//! where
//!     V: VoucherRepository,
//! {
//!     Ok(vouchers.get_voucher(id).await?.map(|v| v.stock).unwrap_or(0))
//! }
//! ```

pub mod events;
pub mod model;
pub mod ports;

// Re-export commonly used types
pub use events::DomainEvent;
pub use model::{
    OrderId, SeckillVoucher, Shop, ShopId, ShopType, UserContext, UserId, VoucherId,
    VoucherOrder,
};
pub use ports::{
    AtomicStore, EventPublisher, OrderStore, OrderTransaction, ShopRepository,
    VoucherRepository,
};
