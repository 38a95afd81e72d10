//! Distributed Lock Module
//!
//! Cross-process mutual exclusion on top of the external atomic store. Used
//! to serialize cache rebuilds per key and purchase attempts per user.
//!
//! # Semantics
//!
//! - Bounded hold: every entry carries a TTL, so a crashed holder releases
//!   the lock eventually
//! - Owner-checked release: only the token written at acquisition may delete
//!   the entry, in one atomic compare-and-delete
//! - No blocking by default: contention is reported, retry is the caller's call

mod distributed;
mod retry;

pub use distributed::{DistributedLock, LockService, LOCK_KEY_PREFIX};
pub use retry::RetryPolicy;
