//! Property-Based Tests for Id Generation
//!
//! # Test Properties
//!
//! 1. **Decomposition**: every issued id splits back into its second and sequence
//! 2. **Ordering**: an id issued in a later second is strictly greater

#![cfg(test)]

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use tokio_test::block_on;

use super::generator::{IdGenerator, BEGIN_TIMESTAMP};
use crate::adapters::InMemoryStore;

/// Seconds after the epoch, within the representable range
fn offset_strategy() -> impl Strategy<Value = i64> {
    0i64..2_000_000_000
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_decompose_recovers_parts(offset in offset_strategy(), draws in 1usize..20) {
        let generator = IdGenerator::new(Arc::new(InMemoryStore::new()));
        let now = Utc.timestamp_opt(BEGIN_TIMESTAMP + offset, 0).unwrap();

        for expected in 1..=draws {
            let id = block_on(generator.next_id_at("order", now)).unwrap();
            let parts = IdGenerator::decompose(id);
            prop_assert_eq!(parts.timestamp, offset);
            prop_assert_eq!(parts.sequence as usize, expected);
        }
    }

    #[test]
    fn prop_later_second_orders_after(
        first in offset_strategy(),
        gap in 1i64..1_000_000,
        burst in 1usize..50,
    ) {
        let generator = IdGenerator::new(Arc::new(InMemoryStore::new()));
        let early = Utc.timestamp_opt(BEGIN_TIMESTAMP + first, 0).unwrap();
        let late = Utc.timestamp_opt(BEGIN_TIMESTAMP + first + gap, 0).unwrap();

        // Run the early counter up so its sequence exceeds the late one's
        let mut last_early = 0;
        for _ in 0..burst {
            last_early = block_on(generator.next_id_at("order", early)).unwrap();
        }
        let late_id = block_on(generator.next_id_at("order", late)).unwrap();

        prop_assert!(late_id > last_early);
    }
}
