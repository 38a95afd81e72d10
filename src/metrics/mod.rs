//! Metrics module
//!
//! Prometheus exposition for the order flow and the cache engine. Counters
//! owned by other components (cache, id generator) are copied in at scrape
//! time through the `observe_*` methods.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::cache::CacheMetricsSnapshot;
use crate::error::{Error, Result};
use crate::seckill::SeckillOutcome;

/// Process-local metrics registry
pub struct MetricsRegistry {
    registry: Registry,
    seckill_outcomes: IntCounterVec,
    ids_issued: IntCounter,
    cache_events: IntGaugeVec,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let seckill_outcomes = IntCounterVec::new(
            Opts::new(
                "flashguard_seckill_outcomes_total",
                "Purchase attempts by outcome",
            ),
            &["outcome"],
        )
        .map_err(metrics_error)?;

        let ids_issued = IntCounter::new("flashguard_ids_issued_total", "Ids issued by this process")
            .map_err(metrics_error)?;

        let cache_events = IntGaugeVec::new(
            Opts::new(
                "flashguard_cache_events",
                "Cache engine counters since process start",
            ),
            &["kind"],
        )
        .map_err(metrics_error)?;

        registry
            .register(Box::new(seckill_outcomes.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(ids_issued.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(cache_events.clone()))
            .map_err(metrics_error)?;

        Ok(Self {
            registry,
            seckill_outcomes,
            ids_issued,
            cache_events,
        })
    }

    pub fn record_seckill(&self, outcome: &SeckillOutcome) {
        self.seckill_outcomes
            .with_label_values(&[outcome.label()])
            .inc();
    }

    /// Attempts recorded with `label` (`created`, `sold_out`, ...)
    pub fn seckill_count(&self, label: &str) -> u64 {
        self.seckill_outcomes.with_label_values(&[label]).get()
    }

    /// Bring the id counter up to `total`
    pub fn observe_ids_issued(&self, total: u64) {
        let current = self.ids_issued.get();
        if total > current {
            self.ids_issued.inc_by(total - current);
        }
    }

    pub fn observe_cache(&self, snapshot: &CacheMetricsSnapshot) {
        let values = [
            ("hit", snapshot.hits),
            ("null_hit", snapshot.null_hits),
            ("miss", snapshot.misses),
            ("fallback_call", snapshot.fallback_calls),
            ("stale_serve", snapshot.stale_serves),
            ("rebuild_scheduled", snapshot.rebuilds_scheduled),
            ("rebuild_completed", snapshot.rebuilds_completed),
            ("rebuild_failed", snapshot.rebuilds_failed),
            ("lock_wait", snapshot.lock_waits),
        ];
        for (kind, value) in values {
            self.cache_events
                .with_label_values(&[kind])
                .set(i64::try_from(value).unwrap_or(i64::MAX));
        }
    }

    /// Text exposition format
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        String::from_utf8(buffer).map_err(|e| Error::Internal(format!("metrics not utf-8: {}", e)))
    }
}

fn metrics_error(e: prometheus::Error) -> Error {
    Error::Internal(format!("metrics: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::OrderId;
    use crate::seckill::Rejection;

    #[test]
    fn test_outcomes_are_labelled() {
        let metrics = MetricsRegistry::new().unwrap();
        metrics.record_seckill(&SeckillOutcome::Created {
            order_id: OrderId::new(1),
        });
        metrics.record_seckill(&SeckillOutcome::Rejected(Rejection::SoldOut));
        metrics.record_seckill(&SeckillOutcome::Rejected(Rejection::SoldOut));

        assert_eq!(metrics.seckill_count("created"), 1);
        assert_eq!(metrics.seckill_count("sold_out"), 2);

        let text = metrics.encode().unwrap();
        assert!(text.contains("flashguard_seckill_outcomes_total{outcome=\"sold_out\"} 2"));
    }

    #[test]
    fn test_observed_counters() {
        let metrics = MetricsRegistry::new().unwrap();
        metrics.observe_ids_issued(5);
        metrics.observe_ids_issued(3);
        metrics.observe_cache(&CacheMetricsSnapshot {
            hits: 4,
            ..Default::default()
        });

        let text = metrics.encode().unwrap();
        assert!(text.contains("flashguard_ids_issued_total 5"));
        assert!(text.contains("flashguard_cache_events{kind=\"hit\"} 4"));
    }

    #[test]
    fn test_registries_are_independent() {
        let first = MetricsRegistry::new().unwrap();
        let second = MetricsRegistry::new().unwrap();
        first.observe_ids_issued(2);
        assert!(second.encode().unwrap().contains("flashguard_ids_issued_total 0"));
    }
}
