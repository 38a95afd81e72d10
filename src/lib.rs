//! Flashguard - Flash-Sale Caching and Coordination Layer
//!
//! Sits in front of a relational store and keeps it alive through read
//! storms and inventory bursts.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  ShopService            SeckillService                             │
//! │      │                      │                                      │
//! │      ▼                      ├──────────────┬───────────────┐       │
//! │  CacheClient ──▶ RebuildPool│              │               │       │
//! │      │                      ▼              ▼               ▼       │
//! │      └──────────────▶ LockService     IdGenerator     OrderStore   │
//! │                             │              │                       │
//! │                             ▼              ▼                       │
//! │                        AtomicStore (Redis / in-memory)             │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`adapters`] - Store and database adapters implementing domain ports
//! - [`cache`] - Cache-aside engine with pass-through, logical-expiry and mutex reads
//! - [`config`] - Configuration and per key-space cache policy
//! - [`domain`] - Domain model, ports and events
//! - [`error`] - Error types
//! - [`idgen`] - Distributed id generator
//! - [`lock`] - Distributed lock
//! - [`metrics`] - Prometheus exposition
//! - [`seckill`] - Flash-sale order flow
//! - [`shop`] - Cached shop catalog

pub mod adapters;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod idgen;
pub mod lock;
pub mod metrics;
pub mod seckill;
pub mod shop;

// Re-export commonly used types
pub use cache::{CacheClient, CacheMetrics, LogicalEntry, RebuildPool};
pub use config::{CachePolicy, KeySpace};
pub use error::{Error, Result};
pub use idgen::IdGenerator;
pub use lock::{DistributedLock, LockService, RetryPolicy};
pub use metrics::MetricsRegistry;
pub use seckill::{Rejection, SeckillOutcome, SeckillService};
pub use shop::{ShopService, ShopUpdate};
