//! Ingest pipeline
//!
//! Single consumer of the listener queue. Each frame is decoded, run
//! through the geofence engine and published to the fan-out:
//!
//! - every event on `cot`
//! - the marker view on `markers` (`drawings` for drawing shapes), or a
//!   `marker_deleted` notice for tombstones
//! - geofence alerts on `alerts`

use crate::listener::InboundFrame;
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use takwire_cot::{decode, Event, MarkerKind, ParseError};
use takwire_fanout::{Channel, Message, MessageKind, Publisher};
use takwire_geofence::{Alert, AlertKind, GeofenceEngine};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineStats {
    pub frames: u64,
    pub decoded: u64,
    pub decode_errors: u64,
    pub alerts: u64,
    /// Messages the fan-out queue refused
    pub dropped: u64,
}

#[derive(Debug, Default)]
pub struct PipelineCounters {
    frames: AtomicU64,
    decoded: AtomicU64,
    decode_errors: AtomicU64,
    alerts: AtomicU64,
    dropped: AtomicU64,
}

impl PipelineCounters {
    pub fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            frames: self.frames.load(Ordering::Relaxed),
            decoded: self.decoded.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            alerts: self.alerts.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

pub struct Pipeline {
    frames: flume::Receiver<InboundFrame>,
    publisher: Publisher,
    geofence: Option<Arc<GeofenceEngine>>,
    counters: Arc<PipelineCounters>,
}

impl Pipeline {
    pub fn new(frames: flume::Receiver<InboundFrame>, publisher: Publisher) -> Self {
        Self {
            frames,
            publisher,
            geofence: None,
            counters: Arc::new(PipelineCounters::default()),
        }
    }

    pub fn with_geofence(mut self, engine: Arc<GeofenceEngine>) -> Self {
        self.geofence = Some(engine);
        self
    }

    pub fn counters(&self) -> Arc<PipelineCounters> {
        Arc::clone(&self.counters)
    }

    /// Consume frames until `shutdown` fires or every sender is gone.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(geofence = self.geofence.is_some(), "Ingest pipeline started");

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    frame = self.frames.recv_async() => match frame {
                        Ok(frame) => self.process(frame).await,
                        Err(_) => break,
                    },
                }
            }

            info!(pending = self.frames.len(), "Ingest pipeline stopped");
        })
    }

    pub async fn process(&self, frame: InboundFrame) {
        self.counters.frames.fetch_add(1, Ordering::Relaxed);

        let event = match decode(&frame.payload) {
            Ok(event) => event,
            Err(e) => {
                self.record_decode_error(&frame, &e);
                return;
            }
        };
        self.counters.decoded.fetch_add(1, Ordering::Relaxed);
        counter!("takwire_pipeline_events_total", "source" => frame.source.as_str()).increment(1);
        debug!(uid = %event.uid, cot_type = %event.event_type, peer = %frame.peer, "Decoded event");

        self.publish(Channel::Cot, Message::from_payload(MessageKind::CotEvent, &event))
            .await;
        self.publish_marker(&event).await;

        if event.is_tombstone() {
            if let Some(engine) = &self.geofence {
                engine.forget_entity(&event.uid);
            }
            return;
        }

        if let Some(engine) = &self.geofence {
            let alerts = engine.check_position(&event.uid, event.point.lat, event.point.lon);
            for alert in alerts {
                self.publish_alert(&alert).await;
            }
        }
    }

    async fn publish_marker(&self, event: &Event) {
        if event.is_tombstone() {
            let message = Message::new(MessageKind::MarkerDeleted, json!({ "id": event.uid }));
            self.publish(Channel::Markers, message).await;
            return;
        }

        let marker = event.to_marker();
        let channel = match marker.kind {
            MarkerKind::Drawing => Channel::Drawings,
            _ => Channel::Markers,
        };
        self.publish(channel, Message::from_payload(MessageKind::MarkerUpdated, &marker))
            .await;
    }

    async fn publish_alert(&self, alert: &Alert) {
        self.counters.alerts.fetch_add(1, Ordering::Relaxed);
        info!(
            entity_id = %alert.entity_id,
            zone_id = %alert.zone_id,
            kind = alert.kind.as_str(),
            "{}",
            alert.message
        );

        let kind = match alert.kind {
            AlertKind::Entry => MessageKind::GeofenceEntry,
            AlertKind::Exit => MessageKind::GeofenceExit,
        };
        self.publish(Channel::Alerts, Message::from_payload(kind, alert))
            .await;
    }

    async fn publish(&self, channel: Channel, message: Message) {
        if !self.publisher.publish(channel, message).await {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record_decode_error(&self, frame: &InboundFrame, error: &ParseError) {
        self.counters.decode_errors.fetch_add(1, Ordering::Relaxed);
        counter!("takwire_pipeline_decode_errors_total").increment(1);

        if error.is_validation() {
            debug!(peer = %frame.peer, bytes = frame.payload.len(), error = %error, "Rejected invalid event");
        } else {
            warn!(peer = %frame.peer, bytes = frame.payload.len(), error = %error, "Failed to decode frame");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::FrameSource;
    use bytes::Bytes;
    use takwire_core::config::FanoutConfig;
    use takwire_fanout::{ChannelTransport, FanoutDispatcher, SubscriberRegistry};
    use takwire_geofence::{GeoPoint, Zone};

    fn frame(xml: &str) -> InboundFrame {
        InboundFrame {
            payload: Bytes::copy_from_slice(xml.as_bytes()),
            source: FrameSource::Stream,
            peer: "127.0.0.1:5000".parse().unwrap(),
        }
    }

    fn position(uid: &str, lat: f64, lon: f64) -> String {
        format!(
            r#"<event version="2.0" uid="{uid}" type="a-f-G-U-C" how="m-g"><point lat="{lat}" lon="{lon}"/><detail><contact callsign="{uid}"/></detail></event>"#
        )
    }

    fn pipeline() -> (Pipeline, flume::Sender<InboundFrame>, FanoutDispatcher) {
        let registry = Arc::new(SubscriberRegistry::new(FanoutConfig::default()));
        let dispatcher = FanoutDispatcher::new(registry);
        let (tx, rx) = flume::bounded(16);
        (Pipeline::new(rx, dispatcher.publisher()), tx, dispatcher)
    }

    #[tokio::test]
    async fn test_event_published_on_cot_and_markers() {
        let (pipeline, _tx, dispatcher) = pipeline();
        pipeline.process(frame(&position("u-1", 48.0, 11.0))).await;

        let stats = pipeline.counters().snapshot();
        assert_eq!(stats.decoded, 1);
        assert_eq!(dispatcher.publisher().pending(), 2);
    }

    #[tokio::test]
    async fn test_garbage_counts_decode_error() {
        let (pipeline, _tx, dispatcher) = pipeline();
        pipeline.process(frame("<event version=")).await;
        pipeline
            .process(frame(r#"<event version="2.0" uid="x" type="a-f" how="m-g"><point lat="99" lon="0"/></event>"#))
            .await;

        let stats = pipeline.counters().snapshot();
        assert_eq!(stats.frames, 2);
        assert_eq!(stats.decode_errors, 2);
        assert_eq!(dispatcher.publisher().pending(), 0);
    }

    #[tokio::test]
    async fn test_geofence_entry_published() {
        let (pipeline, _tx, dispatcher) = pipeline();
        let engine = Arc::new(
            GeofenceEngine::with_zones([Zone::circle(
                "hq",
                "HQ",
                GeoPoint::new(48.0, 11.0),
                1000.0,
            )])
            .unwrap(),
        );
        let pipeline = pipeline.with_geofence(engine);

        pipeline.process(frame(&position("u-1", 48.0, 11.0))).await;
        pipeline.process(frame(&position("u-1", 48.0, 11.0))).await;

        let stats = pipeline.counters().snapshot();
        assert_eq!(stats.alerts, 1);
        // cot + marker per event, plus one alert
        assert_eq!(dispatcher.publisher().pending(), 5);
    }

    #[tokio::test]
    async fn test_tombstone_publishes_delete() {
        let registry = Arc::new(SubscriberRegistry::new(FanoutConfig::default()));
        let dispatcher = FanoutDispatcher::new(Arc::clone(&registry));
        let shutdown = CancellationToken::new();
        let task = dispatcher.spawn(shutdown.clone());

        let (transport, mut rx) = ChannelTransport::new(16);
        let id = registry.register(Arc::new(transport), None);
        registry.subscribe(&id, Channel::Markers);

        let (_tx, frames) = flume::bounded(1);
        let pipeline = Pipeline::new(frames, dispatcher.publisher());
        pipeline
            .process(frame(
                r#"<event version="2.0" uid="m-9" type="a-h-G-U-C" how="m-g" time="2024-01-01T00:00:00.000Z" start="2024-01-01T00:00:00.000Z" stale="2024-01-01T00:00:00.000Z"><point lat="1" lon="2"/></event>"#,
            ))
            .await;

        let raw = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let message: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(message["type"], "marker_deleted");
        assert_eq!(message["data"]["id"], "m-9");

        // Stale before start deletes too
        pipeline
            .process(frame(
                r#"<event version="2.0" uid="m-10" type="a-h-G-U-C" how="m-g" time="2024-01-01T00:00:10Z" start="2024-01-01T00:00:10Z" stale="2024-01-01T00:00:00Z"><point lat="1" lon="2"/></event>"#,
            ))
            .await;
        let raw = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let message: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(message["type"], "marker_deleted");
        assert_eq!(message["data"]["id"], "m-10");
        assert_eq!(pipeline.counters().snapshot().decode_errors, 0);

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_spawned_loop_stops_on_cancel() {
        let (pipeline, tx, _dispatcher) = pipeline();
        let counters = pipeline.counters();
        let shutdown = CancellationToken::new();
        let handle = pipeline.spawn(shutdown.clone());

        tx.send_async(frame(&position("u-2", 10.0, 10.0))).await.unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while counters.snapshot().decoded == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        shutdown.cancel();
        handle.await.unwrap();
    }
}
