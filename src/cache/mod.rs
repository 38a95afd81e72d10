//! Cache-Aside Engine
//!
//! Shields the relational store from read storms. See [`CacheClient`] for
//! the three read strategies and [`RebuildPool`] for background refreshes.
//!
//! # Stored formats
//!
//! | Strategy | Value at `prefix + id` | Store TTL |
//! |---|---|---|
//! | pass-through / mutex, present | JSON of the record | value TTL |
//! | pass-through / mutex, absent | empty string | null TTL |
//! | logical expiry | JSON [`LogicalEntry`] | none |

mod client;
mod entry;
mod metrics;
mod rebuild;

pub use client::CacheClient;
pub use entry::LogicalEntry;
pub use metrics::{CacheMetrics, CacheMetricsSnapshot};
pub use rebuild::{RebuildJob, RebuildPool};

pub use crate::config::{CachePolicy, KeySpace};
