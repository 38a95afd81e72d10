//! Id generator backed by per-day store counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tracing::{debug, instrument};

use crate::domain::ports::AtomicStore;
use crate::error::{Error, Result};

/// Epoch of the timestamp part: 2022-01-01T00:00:00Z
pub const BEGIN_TIMESTAMP: i64 = 1_640_995_200;

/// Width of the sequence part
pub const COUNT_BITS: u32 = 32;

/// Key prefix of the daily counters
pub const COUNTER_KEY_PREFIX: &str = "icr:";

const MAX_SEQUENCE: i64 = (1i64 << COUNT_BITS) - 1;
const MAX_TIMESTAMP: i64 = i64::MAX >> COUNT_BITS;

/// The two halves of an issued id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdParts {
    /// Seconds since [`BEGIN_TIMESTAMP`]
    pub timestamp: i64,
    /// Position within the day's counter
    pub sequence: u32,
}

impl IdParts {
    /// Wall-clock second the id was issued in
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.timestamp + BEGIN_TIMESTAMP, 0).single()
    }
}

/// Cluster-wide unique, roughly time-ordered 64-bit ids
#[derive(Clone)]
pub struct IdGenerator {
    store: Arc<dyn AtomicStore>,
    issued: Arc<AtomicU64>,
}

impl IdGenerator {
    pub fn new(store: Arc<dyn AtomicStore>) -> Self {
        Self {
            store,
            issued: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Next id for `prefix` at the current time
    pub async fn next_id(&self, prefix: &str) -> Result<i64> {
        self.next_id_at(prefix, Utc::now()).await
    }

    /// Next id for `prefix` as if issued at `now`.
    ///
    /// The timestamp occupies the high bits and the day's counter the low
    /// 32, so ids of one prefix are unique and ordered across seconds.
    #[instrument(skip(self), fields(prefix = %prefix))]
    pub async fn next_id_at(&self, prefix: &str, now: DateTime<Utc>) -> Result<i64> {
        let timestamp = now.timestamp() - BEGIN_TIMESTAMP;
        if !(0..=MAX_TIMESTAMP).contains(&timestamp) {
            return Err(Error::Internal(format!(
                "clock {} outside the id epoch",
                now.to_rfc3339()
            )));
        }

        let key = Self::counter_key(prefix, now);
        let count = self.store.increment(&key).await?;
        if !(0..=MAX_SEQUENCE).contains(&count) {
            return Err(Error::IdSpaceExhausted {
                prefix: prefix.to_string(),
                count,
            });
        }

        self.issued.fetch_add(1, Ordering::Relaxed);
        let id = (timestamp << COUNT_BITS) | count;
        debug!(id, counter = %key, "Issued id");
        Ok(id)
    }

    /// Counter key for `prefix` on the UTC day of `at`
    pub fn counter_key(prefix: &str, at: DateTime<Utc>) -> String {
        format!("{}{}:{}", COUNTER_KEY_PREFIX, prefix, at.format("%Y%m%d"))
    }

    /// Split an id back into timestamp and sequence
    pub fn decompose(id: i64) -> IdParts {
        IdParts {
            timestamp: id >> COUNT_BITS,
            sequence: (id & MAX_SEQUENCE) as u32,
        }
    }

    /// Ids issued by this generator since it was created
    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for IdGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdGenerator")
            .field("issued", &self.issued())
            .finish()
    }
}
