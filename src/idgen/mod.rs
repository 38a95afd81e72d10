//! Distributed Id Generation
//!
//! Builds 64-bit ids from a seconds-since-epoch timestamp in the high bits
//! and a per-prefix, per-day counter from the shared store in the low 32.
//!
//! ```text
//!  63                       32 31                        0
//! ┌────────────────────────────┬───────────────────────────┐
//! │ seconds since 2022-01-01   │ daily sequence (icr:…)    │
//! └────────────────────────────┴───────────────────────────┘
//! ```

mod generator;

#[cfg(test)]
mod proptest;

pub use generator::{IdGenerator, IdParts, BEGIN_TIMESTAMP, COUNTER_KEY_PREFIX, COUNT_BITS};
