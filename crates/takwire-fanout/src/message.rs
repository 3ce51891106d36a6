//! Envelope delivered to subscribers

use crate::channel::Channel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    CotEvent,
    MarkerUpdated,
    MarkerDeleted,
    GeofenceEntry,
    GeofenceExit,
    SystemStatus,
    Notification,
}

/// `{type, channel, data, timestamp}` as seen by clients.
///
/// `channel` and `timestamp` are filled in by the registry on publish when
/// the producer left them empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<Channel>,
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(kind: MessageKind, data: serde_json::Value) -> Self {
        Self {
            kind,
            channel: None,
            data,
            timestamp: None,
        }
    }

    /// Serialize any payload into a message. Falls back to `null` data for
    /// payloads that cannot be represented as JSON.
    pub fn from_payload<T: Serialize>(kind: MessageKind, payload: &T) -> Self {
        let data = serde_json::to_value(payload).unwrap_or(serde_json::Value::Null);
        Self::new(kind, data)
    }

    pub(crate) fn stamped(mut self, channel: Channel) -> Self {
        self.channel = Some(channel);
        self.timestamp.get_or_insert_with(Utc::now);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape() {
        let msg = Message::new(MessageKind::CotEvent, json!({"uid": "u1"})).stamped(Channel::Cot);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "cot_event");
        assert_eq!(value["channel"], "cot");
        assert_eq!(value["data"]["uid"], "u1");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_stamp_keeps_producer_timestamp() {
        let ts = Utc::now() - chrono::Duration::hours(1);
        let mut msg = Message::new(MessageKind::SystemStatus, json!(null));
        msg.timestamp = Some(ts);
        assert_eq!(msg.stamped(Channel::System).timestamp, Some(ts));
    }
}
