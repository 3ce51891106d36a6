//! Shared helpers for the listener and pipeline integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use takwire::{CotListener, InboundFrame, ListenerStats};
use takwire_core::config::ListenerConfig;

pub const TIMEOUT: Duration = Duration::from_secs(3);

/// Loopback listener on ephemeral ports.
pub fn loopback_config() -> ListenerConfig {
    ListenerConfig {
        bind_address: "127.0.0.1".to_string(),
        stream_port: 0,
        datagram_port: 0,
        max_connections: 4,
        join_timeout_secs: 2,
        gateway_uid: "test-gateway".to_string(),
        ..Default::default()
    }
}

pub async fn start_listener(
    config: ListenerConfig,
) -> (Arc<CotListener>, flume::Receiver<InboundFrame>) {
    let (tx, rx) = flume::bounded(64);
    let listener = Arc::new(CotListener::new(config, tx));
    listener.start().await.expect("listener starts");
    (listener, rx)
}

pub fn position_xml(uid: &str, lat: f64, lon: f64) -> String {
    format!(
        r#"<event version="2.0" uid="{uid}" type="a-f-G-U-C" how="m-g" time="2030-01-01T00:00:00Z" start="2030-01-01T00:00:00Z" stale="2030-01-01T00:05:00Z"><point lat="{lat}" lon="{lon}" hae="0" ce="10" le="10"/><detail><contact callsign="{uid}"/></detail></event>"#
    )
}

pub async fn next_frame(rx: &flume::Receiver<InboundFrame>) -> InboundFrame {
    tokio::time::timeout(TIMEOUT, rx.recv_async())
        .await
        .expect("frame within timeout")
        .expect("queue open")
}

/// Poll listener stats until `check` holds.
pub async fn wait_for_stats(listener: &CotListener, check: impl Fn(&ListenerStats) -> bool) {
    tokio::time::timeout(TIMEOUT, async {
        loop {
            if check(&listener.stats()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("stats condition within timeout");
}
