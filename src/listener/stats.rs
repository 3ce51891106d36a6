//! Listener counters
//!
//! Every counter lives in an atomic so [`ListenerState::snapshot`] never
//! blocks, and is mirrored to the `metrics` facade for Prometheus.

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Once;

/// Where a frame came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameSource {
    Stream,
    Datagram,
    Multicast,
}

impl FrameSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameSource::Stream => "stream",
            FrameSource::Datagram => "datagram",
            FrameSource::Multicast => "multicast",
        }
    }
}

/// Point-in-time copy of the listener counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListenerStats {
    pub running: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub uptime_seconds: u64,
    /// Frames extracted from any transport
    pub events_received: u64,
    /// Frames handed to the ingest queue
    pub events_forwarded: u64,
    pub pings_answered: u64,
    pub stream_connections_total: u64,
    pub stream_connections_active: u64,
    pub stream_connections_rejected: u64,
    pub datagrams_received: u64,
    pub multicast_datagrams: u64,
    pub buffer_overflows: u64,
    pub errors: u64,
}

fn describe_metrics() {
    static DESCRIBE: Once = Once::new();
    DESCRIBE.call_once(|| {
        describe_counter!(
            "takwire_listener_events_received_total",
            "Event frames extracted, by transport"
        );
        describe_counter!(
            "takwire_listener_events_forwarded_total",
            "Event frames handed to the ingest queue"
        );
        describe_counter!(
            "takwire_listener_connections_total",
            "Stream connections accepted"
        );
        describe_counter!(
            "takwire_listener_connections_rejected_total",
            "Stream connections rejected at the connection cap"
        );
        describe_gauge!(
            "takwire_listener_connections_active",
            "Open stream connections"
        );
        describe_counter!(
            "takwire_listener_datagrams_total",
            "Datagrams received, by transport"
        );
        describe_counter!(
            "takwire_listener_buffer_overflows_total",
            "Stream buffers cleared after passing the size limit"
        );
        describe_counter!("takwire_listener_errors_total", "Listener errors");
    });
}

#[derive(Debug, Default)]
pub struct ListenerState {
    running: AtomicBool,
    started_at: RwLock<Option<DateTime<Utc>>>,
    events_received: AtomicU64,
    events_forwarded: AtomicU64,
    pings_answered: AtomicU64,
    connections_total: AtomicU64,
    connections_active: AtomicU64,
    connections_rejected: AtomicU64,
    datagrams: AtomicU64,
    multicast_datagrams: AtomicU64,
    buffer_overflows: AtomicU64,
    errors: AtomicU64,
}

impl ListenerState {
    pub fn new() -> Self {
        describe_metrics();
        Self::default()
    }

    pub fn mark_started(&self) {
        *self.started_at.write() = Some(Utc::now());
        self.running.store(true, Ordering::Release);
    }

    pub fn mark_stopped(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn record_event(&self, source: FrameSource) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
        counter!("takwire_listener_events_received_total", "source" => source.as_str())
            .increment(1);
    }

    pub fn record_forwarded(&self) {
        self.events_forwarded.fetch_add(1, Ordering::Relaxed);
        counter!("takwire_listener_events_forwarded_total").increment(1);
    }

    pub fn record_ping(&self) {
        self.pings_answered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_opened(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        let active = self.connections_active.fetch_add(1, Ordering::Relaxed) + 1;
        counter!("takwire_listener_connections_total").increment(1);
        gauge!("takwire_listener_connections_active").set(active as f64);
    }

    pub fn connection_closed(&self) {
        let active = self
            .connections_active
            .fetch_sub(1, Ordering::Relaxed)
            .saturating_sub(1);
        gauge!("takwire_listener_connections_active").set(active as f64);
    }

    pub fn record_rejected(&self) {
        self.connections_rejected.fetch_add(1, Ordering::Relaxed);
        counter!("takwire_listener_connections_rejected_total").increment(1);
    }

    pub fn record_datagram(&self, source: FrameSource) {
        match source {
            FrameSource::Multicast => &self.multicast_datagrams,
            _ => &self.datagrams,
        }
        .fetch_add(1, Ordering::Relaxed);
        counter!("takwire_listener_datagrams_total", "source" => source.as_str()).increment(1);
    }

    pub fn record_overflow(&self) {
        self.buffer_overflows.fetch_add(1, Ordering::Relaxed);
        counter!("takwire_listener_buffer_overflows_total").increment(1);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        counter!("takwire_listener_errors_total").increment(1);
    }

    pub fn snapshot(&self) -> ListenerStats {
        let started_at = *self.started_at.read();
        let running = self.is_running();
        let uptime_seconds = match (running, started_at) {
            (true, Some(at)) => (Utc::now() - at).num_seconds().max(0) as u64,
            _ => 0,
        };

        ListenerStats {
            running,
            started_at,
            uptime_seconds,
            events_received: self.events_received.load(Ordering::Relaxed),
            events_forwarded: self.events_forwarded.load(Ordering::Relaxed),
            pings_answered: self.pings_answered.load(Ordering::Relaxed),
            stream_connections_total: self.connections_total.load(Ordering::Relaxed),
            stream_connections_active: self.connections_active.load(Ordering::Relaxed),
            stream_connections_rejected: self.connections_rejected.load(Ordering::Relaxed),
            datagrams_received: self.datagrams.load(Ordering::Relaxed),
            multicast_datagrams: self.multicast_datagrams.load(Ordering::Relaxed),
            buffer_overflows: self.buffer_overflows.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_counts() {
        let state = ListenerState::new();
        state.mark_started();
        state.connection_opened();
        state.connection_opened();
        state.connection_closed();
        state.record_rejected();
        state.record_datagram(FrameSource::Datagram);
        state.record_datagram(FrameSource::Multicast);
        state.record_event(FrameSource::Stream);

        let stats = state.snapshot();
        assert!(stats.running);
        assert!(stats.started_at.is_some());
        assert_eq!(stats.stream_connections_total, 2);
        assert_eq!(stats.stream_connections_active, 1);
        assert_eq!(stats.stream_connections_rejected, 1);
        assert_eq!(stats.datagrams_received, 1);
        assert_eq!(stats.multicast_datagrams, 1);
        assert_eq!(stats.events_received, 1);

        state.mark_stopped();
        assert_eq!(state.snapshot().uptime_seconds, 0);
    }
}
