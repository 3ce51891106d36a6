//! Client subscription protocol
//!
//! Clients send JSON text frames: `{"type":"subscribe","channel":"cot"}`,
//! `{"type":"unsubscribe","channel":"cot"}` or `{"type":"ping"}`. Every frame
//! gets exactly one reply.

use crate::channel::Channel;
use crate::registry::SubscriberRegistry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientMessage {
    Subscribe(Channel),
    Unsubscribe(Channel),
    Ping,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ConnectionEstablished {
        connection_id: String,
        timestamp: DateTime<Utc>,
    },
    Subscribed {
        channel: Channel,
    },
    Unsubscribed {
        channel: Channel,
    },
    Pong {
        timestamp: DateTime<Utc>,
    },
    Error {
        error: String,
    },
}

impl ServerMessage {
    pub fn connection_established(connection_id: impl Into<String>) -> Self {
        ServerMessage::ConnectionEstablished {
            connection_id: connection_id.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn error(error: impl ToString) -> Self {
        ServerMessage::Error {
            error: error.to_string(),
        }
    }
}

/// Client frame rejections. The display strings are what the client sees.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Missing message type")]
    MissingType,

    #[error("Unknown message type: {0}")]
    UnknownType(String),

    #[error("Missing channel name")]
    MissingChannel,

    #[error("Unknown channel: {0}")]
    UnknownChannel(String),
}

pub fn parse_client_message(text: &str) -> Result<ClientMessage, ProtocolError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;

    let kind = match value.get("type") {
        None | Some(Value::Null) => return Err(ProtocolError::MissingType),
        Some(Value::String(kind)) if kind.is_empty() => return Err(ProtocolError::MissingType),
        Some(Value::String(kind)) => kind.as_str(),
        Some(other) => return Err(ProtocolError::UnknownType(other.to_string())),
    };

    match kind {
        "subscribe" => channel_of(&value).map(ClientMessage::Subscribe),
        "unsubscribe" => channel_of(&value).map(ClientMessage::Unsubscribe),
        "ping" => Ok(ClientMessage::Ping),
        other => Err(ProtocolError::UnknownType(other.to_string())),
    }
}

fn channel_of(value: &Value) -> Result<Channel, ProtocolError> {
    let name = match value.get("channel").and_then(Value::as_str) {
        Some(name) if !name.is_empty() => name,
        _ => return Err(ProtocolError::MissingChannel),
    };
    name.parse()
        .map_err(|_| ProtocolError::UnknownChannel(name.to_string()))
}

/// Parse one client frame, apply it to the registry and send the reply back
/// to the same connection. Returns the reply that was sent.
pub async fn handle_client_message(
    registry: &SubscriberRegistry,
    connection_id: &str,
    text: &str,
) -> ServerMessage {
    let reply = match parse_client_message(text) {
        Ok(ClientMessage::Subscribe(channel)) => {
            if registry.subscribe(connection_id, channel) {
                ServerMessage::Subscribed { channel }
            } else {
                ServerMessage::error(format!("Connection not found: {connection_id}"))
            }
        }
        Ok(ClientMessage::Unsubscribe(channel)) => {
            registry.unsubscribe(connection_id, channel);
            ServerMessage::Unsubscribed { channel }
        }
        Ok(ClientMessage::Ping) => ServerMessage::Pong {
            timestamp: Utc::now(),
        },
        Err(e) => {
            debug!(connection_id, error = %e, "Rejected client frame");
            ServerMessage::error(e)
        }
    };

    registry.send_direct(connection_id, &reply).await;
    reply
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ChannelTransport;
    use std::sync::Arc;
    use takwire_core::config::FanoutConfig;

    #[test]
    fn test_parse_valid() {
        assert_eq!(
            parse_client_message(r#"{"type":"subscribe","channel":"cot"}"#),
            Ok(ClientMessage::Subscribe(Channel::Cot))
        );
        assert_eq!(
            parse_client_message(r#"{"type":"unsubscribe","channel":"geofence"}"#),
            Ok(ClientMessage::Unsubscribe(Channel::Geofence))
        );
        assert_eq!(
            parse_client_message(r#"{"type":"ping"}"#),
            Ok(ClientMessage::Ping)
        );
    }

    #[test]
    fn test_error_strings() {
        let err = |text: &str| parse_client_message(text).unwrap_err().to_string();

        assert_eq!(err(r#"{"channel":"cot"}"#), "Missing message type");
        assert_eq!(err(r#"{"type":"dance"}"#), "Unknown message type: dance");
        assert_eq!(err(r#"{"type":"subscribe"}"#), "Missing channel name");
        assert_eq!(
            err(r#"{"type":"subscribe","channel":""}"#),
            "Missing channel name"
        );
        assert_eq!(
            err(r#"{"type":"subscribe","channel":"weather"}"#),
            "Unknown channel: weather"
        );
        assert!(err("{not json").starts_with("Invalid JSON: "));
    }

    #[test]
    fn test_server_message_shape() {
        let json = serde_json::to_value(ServerMessage::Subscribed {
            channel: Channel::Markers,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"type": "subscribed", "channel": "markers"}));

        let json = serde_json::to_value(ServerMessage::error("Missing channel name")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "error", "error": "Missing channel name"})
        );
    }

    #[tokio::test]
    async fn test_handle_applies_and_replies() {
        let registry = SubscriberRegistry::new(FanoutConfig::default());
        let (t, mut rx) = ChannelTransport::new(8);
        let id = registry.register(Arc::new(t), None);

        let reply =
            handle_client_message(&registry, &id, r#"{"type":"subscribe","channel":"alerts"}"#)
                .await;
        assert_eq!(reply, ServerMessage::Subscribed { channel: Channel::Alerts });
        assert_eq!(registry.channel_subscribers(Channel::Alerts), 1);
        let frame = rx.recv().await.unwrap();
        assert!(frame.contains("\"subscribed\""));

        handle_client_message(&registry, &id, r#"{"type":"unsubscribe","channel":"alerts"}"#)
            .await;
        assert_eq!(registry.channel_subscribers(Channel::Alerts), 0);

        let reply = handle_client_message(&registry, &id, r#"{"type":"ping"}"#).await;
        assert!(matches!(reply, ServerMessage::Pong { .. }));

        let reply = handle_client_message(&registry, &id, "garbage").await;
        assert!(matches!(reply, ServerMessage::Error { .. }));
    }
}
