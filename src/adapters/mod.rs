//! Infrastructure Adapters
//!
//! This module contains adapter implementations for the domain ports,
//! following the Port/Adapter (Hexagonal) architecture pattern.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Domain Layer                              │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │                    Ports (Traits)                           │ │
//! │  │  AtomicStore │ ShopRepository │ OrderStore │ EventPublisher │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Adapters (This Module)                       │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │ InMemoryStore │ RedisStore │ InMemoryDatabase              │ │
//! │  │ LoggingEventPublisher │ InMemoryEventCollector             │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use flashguard::adapters::InMemoryStore;
//! use flashguard::domain::ports::AtomicStore;
//!
//! let store: Arc<dyn AtomicStore> = Arc::new(InMemoryStore::new());
//! let counter = store.increment("icr:order:20240101").await?;
//! ```

mod event_publisher;
mod memory_db;
mod memory_store;
#[cfg(feature = "redis")]
mod redis_store;

pub use event_publisher::{InMemoryEventCollector, LoggingEventPublisher};
pub use memory_db::{InMemoryDatabase, Isolation};
pub use memory_store::{InMemoryStore, InMemoryStoreStats};
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;
