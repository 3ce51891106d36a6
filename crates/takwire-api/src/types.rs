//! Request and response bodies

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use takwire_cot::Marker;
use takwire_fanout::{Channel, MessageKind};
use takwire_geofence::{Alert, Zone, ZoneDistance};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub connections: usize,
    pub zones: usize,
    pub timestamp: DateTime<Utc>,
}

/// Body of `POST /api/v1/fanout/publish`.
#[derive(Debug, Clone, Deserialize)]
pub struct PublishRequest {
    pub channel: Channel,
    #[serde(rename = "type", default = "default_publish_kind")]
    pub kind: MessageKind,
    #[serde(default)]
    pub data: serde_json::Value,
}

fn default_publish_kind() -> MessageKind {
    MessageKind::Notification
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishResponse {
    pub queued: bool,
    pub channel: Channel,
}

#[derive(Debug, Default, Deserialize)]
pub struct ZoneListQuery {
    #[serde(default)]
    pub enabled_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneList {
    pub total: usize,
    pub zones: Vec<Zone>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckPositionRequest {
    pub entity_id: String,
    pub lat: f64,
    pub lon: f64,
}

/// Alerts fired by the check, plus every zone that now contains the point.
#[derive(Debug, Clone, Serialize)]
pub struct CheckPositionResponse {
    pub alerts: Vec<Alert>,
    pub zones: Vec<ZoneDistance>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkerResponse {
    pub marker: Marker,
    /// Encoded event that went out to stream clients
    pub xml: String,
    pub clients_reached: usize,
    pub published: bool,
}
