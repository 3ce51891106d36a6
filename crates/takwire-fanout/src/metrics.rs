//! Fan-out metrics and Prometheus export
//!
//! Counters are kept as atomics for the stats endpoints and mirrored into
//! the `metrics` facade for scraping.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::info;

const SEND_LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0,
];

#[derive(Debug)]
pub struct FanoutMetrics {
    published: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    evicted: AtomicU64,
    dropped: AtomicU64,
}

impl FanoutMetrics {
    pub fn new() -> Self {
        describe_counter!(
            "takwire_fanout_published_total",
            "Messages published to a channel"
        );
        describe_counter!(
            "takwire_fanout_delivered_total",
            "Messages delivered to a subscriber"
        );
        describe_counter!(
            "takwire_fanout_failed_total",
            "Failed or timed out subscriber sends"
        );
        describe_counter!(
            "takwire_fanout_evicted_total",
            "Connections evicted after failed sends"
        );
        describe_counter!(
            "takwire_fanout_dropped_total",
            "Messages dropped because the dispatch queue was full"
        );
        describe_gauge!("takwire_fanout_connections", "Registered connections");
        describe_histogram!(
            "takwire_fanout_publish_latency_seconds",
            "Time to deliver one published message to every subscriber"
        );

        Self {
            published: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn record_published(&self, channel: &'static str) {
        self.published.fetch_add(1, Ordering::Relaxed);
        counter!("takwire_fanout_published_total", "channel" => channel).increment(1);
    }

    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        counter!("takwire_fanout_delivered_total").increment(1);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        counter!("takwire_fanout_failed_total").increment(1);
    }

    pub fn record_evicted(&self) {
        self.evicted.fetch_add(1, Ordering::Relaxed);
        counter!("takwire_fanout_evicted_total").increment(1);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        counter!("takwire_fanout_dropped_total").increment(1);
    }

    pub fn set_connections(&self, count: usize) {
        gauge!("takwire_fanout_connections").set(count as f64);
    }

    pub fn record_publish_latency(&self, latency: Duration) {
        histogram!("takwire_fanout_publish_latency_seconds").record(latency.as_secs_f64());
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for FanoutMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Install the process-wide Prometheus recorder. The returned handle
/// renders the text exposition format on demand.
pub fn install_prometheus_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("latency_seconds".to_string()),
            SEND_LATENCY_BUCKETS,
        )?
        .install_recorder()?;

    info!("Prometheus metrics recorder installed");
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_without_recorder() {
        let metrics = FanoutMetrics::new();
        metrics.record_published("cot");
        metrics.record_delivered();
        metrics.record_delivered();
        metrics.record_failed();
        metrics.record_evicted();
        metrics.record_dropped();

        assert_eq!(metrics.published(), 1);
        assert_eq!(metrics.delivered(), 2);
        assert_eq!(metrics.failed(), 1);
        assert_eq!(metrics.evicted(), 1);
        assert_eq!(metrics.dropped(), 1);
    }
}
