//! Channel-based broadcast fan-out
//!
//! A [`SubscriberRegistry`] holds live connections (anything implementing
//! [`Transport`]) and their channel subscriptions. Producers publish through
//! a [`Publisher`] handle; the [`FanoutDispatcher`] task performs delivery.
//!
//! ```rust
//! use std::sync::Arc;
//! use takwire_core::config::FanoutConfig;
//! use takwire_fanout::{Channel, ChannelTransport, Message, MessageKind, SubscriberRegistry};
//!
//! # tokio_test::block_on(async {
//! let registry = SubscriberRegistry::new(FanoutConfig::default());
//! let (transport, mut rx) = ChannelTransport::new(16);
//! let id = registry.register(Arc::new(transport), None);
//! registry.subscribe(&id, Channel::Alerts);
//!
//! let msg = Message::new(MessageKind::GeofenceEntry, serde_json::json!({"zone_id": "hq"}));
//! let report = registry.publish(Channel::Alerts, msg).await;
//! assert_eq!(report.delivered, 1);
//! assert!(rx.recv().await.unwrap().contains("\"alerts\""));
//! # });
//! ```

pub mod channel;
pub mod dispatcher;
pub mod health;
pub mod message;
pub mod metrics;
pub mod protocol;
pub mod registry;
pub mod transport;

pub use channel::{Channel, UnknownChannel};
pub use dispatcher::{DistributionStrategy, FanoutCommand, FanoutDispatcher, Publisher};
pub use health::{ConnectionHealth, FanoutStats, HealthStatus};
pub use message::{Message, MessageKind};
pub use metrics::{install_prometheus_recorder, FanoutMetrics};
pub use protocol::{
    handle_client_message, parse_client_message, ClientMessage, ProtocolError, ServerMessage,
};
pub use registry::{ConnectionId, DeliveryOutcome, PublishReport, SubscriberRegistry};
pub use transport::{ChannelTransport, SendError, Transport, TransportState};
