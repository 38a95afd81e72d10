use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A cached payload carrying its own soft deadline.
///
/// Stored without a store-level TTL; readers compare `logical_expire_time`
/// against the clock and schedule a rebuild once it has passed. `data` is
/// `None` when the last rebuild found no backing record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogicalEntry<T> {
    pub data: Option<T>,
    pub logical_expire_time: DateTime<Utc>,
}

impl<T> LogicalEntry<T> {
    /// Entry that goes stale `ttl` from now
    pub fn new(data: Option<T>, ttl: Duration) -> Self {
        Self::expiring_at(data, deadline_after(Utc::now(), ttl))
    }

    pub fn expiring_at(data: Option<T>, logical_expire_time: DateTime<Utc>) -> Self {
        Self {
            data,
            logical_expire_time,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.logical_expire_time
    }
}

fn deadline_after(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let at = DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let entry = LogicalEntry::expiring_at(Some(7u32), at);

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["data"], 7);
        assert_eq!(json["logicalExpireTime"], "2024-05-01T10:00:00Z");
    }

    #[test]
    fn test_expiry() {
        let entry = LogicalEntry::new(Some("shop"), Duration::from_secs(60));
        assert!(!entry.is_expired(Utc::now()));
        assert!(entry.is_expired(Utc::now() + chrono::Duration::seconds(61)));

        let huge = LogicalEntry::<u8>::new(None, Duration::MAX);
        assert_eq!(huge.logical_expire_time, DateTime::<Utc>::MAX_UTC);
    }
}
