//! Seckill (Flash-Sale) Order Flow
//!
//! One order per user per voucher, stock never below zero, and at most one
//! in-flight attempt per user across every process sharing the store.
//!
//! # Flow
//!
//! ```text
//! CheckWindow ─▶ CheckStock ─▶ AcquireLock ─┬─▶ CheckIdempotency ─▶ DecrementStock ─▶ CreateOrder ─┐
//!      │              │             │       │         (one database transaction)                   │
//!      ▼              ▼             ▼       └──────────────────────── Release ◀─────────────────────┘
//!  rejected       rejected      rejected
//! ```

mod outcome;
mod service;

pub use outcome::{Rejection, SeckillOutcome, SeckillStage};
pub use service::SeckillService;
