//! Subscriber registry
//!
//! Tracks live connections, their channel subscriptions and delivery health.
//! Publishing serializes a message once and sends it to every subscriber of
//! the channel concurrently, each send bounded by the configured timeout.
//! Connections that keep failing are evicted.

use crate::channel::Channel;
use crate::health::{ConnectionHealth, FanoutStats, HealthStatus};
use crate::message::Message;
use crate::metrics::FanoutMetrics;
use crate::transport::{SendError, Transport, TransportState};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use takwire_core::config::FanoutConfig;
use takwire_core::DeliveryError;
use tracing::{debug, info, warn};

/// Opaque connection identifier (UUID v4)
pub type ConnectionId = String;

/// Result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Failed { error: DeliveryError, evicted: bool },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered)
    }
}

/// What a publish or broadcast did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
    pub evicted: usize,
}

impl PublishReport {
    fn absorb(&mut self, outcome: &DeliveryOutcome) {
        self.attempted += 1;
        match outcome {
            DeliveryOutcome::Delivered => self.delivered += 1,
            DeliveryOutcome::Failed { evicted, .. } => {
                self.failed += 1;
                if *evicted {
                    self.evicted += 1;
                }
            }
        }
    }
}

/// One registered connection.
pub struct Subscriber {
    id: ConnectionId,
    user_id: Option<String>,
    transport: Arc<dyn Transport>,
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    failed_attempts: AtomicU32,
    last_activity_ms: AtomicI64,
    created_at: DateTime<Utc>,
    connected: Instant,
}

impl Subscriber {
    fn new(id: ConnectionId, user_id: Option<String>, transport: Arc<dyn Transport>) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id,
            transport,
            messages_sent: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            failed_attempts: AtomicU32::new(0),
            last_activity_ms: AtomicI64::new(now.timestamp_millis()),
            created_at: now,
            connected: Instant::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts.load(Ordering::Relaxed)
    }

    fn touch(&self) {
        self.last_activity_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    fn record_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.failed_attempts.store(0, Ordering::Relaxed);
        self.touch();
    }

    fn record_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    /// Returns the new consecutive failure count.
    fn record_failure(&self) -> u32 {
        self.failed_attempts.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn last_activity(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.last_activity_ms.load(Ordering::Relaxed))
            .unwrap_or(self.created_at)
    }
}

pub struct SubscriberRegistry {
    connections: DashMap<ConnectionId, Arc<Subscriber>>,
    channels: RwLock<HashMap<Channel, HashSet<ConnectionId>>>,
    config: FanoutConfig,
    metrics: Arc<FanoutMetrics>,
}

impl SubscriberRegistry {
    pub fn new(config: FanoutConfig) -> Self {
        Self {
            connections: DashMap::new(),
            channels: RwLock::new(HashMap::new()),
            config,
            metrics: Arc::new(FanoutMetrics::new()),
        }
    }

    pub fn config(&self) -> &FanoutConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<FanoutMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Register a transport and return its new connection id.
    pub fn register(&self, transport: Arc<dyn Transport>, user_id: Option<String>) -> ConnectionId {
        let id = uuid::Uuid::new_v4().to_string();
        let subscriber = Arc::new(Subscriber::new(id.clone(), user_id, transport));

        info!(
            connection_id = %id,
            user_id = subscriber.user_id().unwrap_or("-"),
            "Connection registered"
        );
        self.connections.insert(id.clone(), subscriber);
        self.metrics.set_connections(self.connections.len());
        id
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn contains(&self, connection_id: &str) -> bool {
        self.connections.contains_key(connection_id)
    }

    /// Subscribe a connection. False when the connection is unknown.
    ///
    /// Membership is checked under the channel lock, which `disconnect` also
    /// holds while removing, so a racing disconnect cannot leave a stale entry.
    pub fn subscribe(&self, connection_id: &str, channel: Channel) -> bool {
        let mut channels = self.channels.write();
        if !self.connections.contains_key(connection_id) {
            return false;
        }

        channels
            .entry(channel)
            .or_default()
            .insert(connection_id.to_string());
        debug!(connection_id, %channel, "Subscribed");
        true
    }

    /// False when the connection was not subscribed to `channel`.
    pub fn unsubscribe(&self, connection_id: &str, channel: Channel) -> bool {
        let mut channels = self.channels.write();
        let Some(subscribers) = channels.get_mut(&channel) else {
            return false;
        };

        let removed = subscribers.remove(connection_id);
        if subscribers.is_empty() {
            channels.remove(&channel);
        }
        if removed {
            debug!(connection_id, %channel, "Unsubscribed");
        }
        removed
    }

    /// Remove a connection from every channel. Unknown ids are a no-op.
    pub fn unsubscribe_all(&self, connection_id: &str) {
        Self::purge(&mut self.channels.write(), connection_id);
    }

    fn purge(channels: &mut HashMap<Channel, HashSet<ConnectionId>>, connection_id: &str) {
        channels.retain(|_, subscribers| {
            subscribers.remove(connection_id);
            !subscribers.is_empty()
        });
    }

    /// Channels a connection is subscribed to, in declaration order.
    pub fn subscriptions(&self, connection_id: &str) -> Vec<Channel> {
        let mut subscribed: Vec<Channel> = self
            .channels
            .read()
            .iter()
            .filter(|(_, subscribers)| subscribers.contains(connection_id))
            .map(|(channel, _)| *channel)
            .collect();
        subscribed.sort();
        subscribed
    }

    /// Deliver `message` to every subscriber of `channel`.
    ///
    /// Stamps the channel and, if missing, the timestamp. Delivery errors are
    /// absorbed into the report and never returned.
    pub async fn publish(&self, channel: Channel, message: Message) -> PublishReport {
        let message = message.stamped(channel);
        self.metrics.record_published(channel.as_str());

        let frame: Arc<str> = match serde_json::to_string(&message) {
            Ok(json) => Arc::from(json),
            Err(e) => {
                warn!(%channel, error = %e, "Failed to serialize message");
                return PublishReport::default();
            }
        };

        let targets = self.subscribers_of(channel);
        if targets.is_empty() {
            debug!(%channel, "No subscribers");
            return PublishReport::default();
        }

        let started = Instant::now();
        let report = self.deliver_all(&targets, frame).await;
        self.metrics.record_publish_latency(started.elapsed());

        debug!(
            %channel,
            attempted = report.attempted,
            delivered = report.delivered,
            failed = report.failed,
            evicted = report.evicted,
            "Published"
        );
        report
    }

    /// Deliver to every registered connection except those in `exclude`.
    pub async fn broadcast_all(&self, mut message: Message, exclude: &[ConnectionId]) -> PublishReport {
        message.timestamp.get_or_insert_with(Utc::now);

        let frame: Arc<str> = match serde_json::to_string(&message) {
            Ok(json) => Arc::from(json),
            Err(e) => {
                warn!(error = %e, "Failed to serialize broadcast");
                return PublishReport::default();
            }
        };

        let targets: Vec<Arc<Subscriber>> = self
            .connections
            .iter()
            .filter(|entry| !exclude.contains(entry.key()))
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        self.deliver_all(&targets, frame).await
    }

    /// Send one payload to a single connection.
    pub async fn send_direct<T: Serialize + ?Sized>(
        &self,
        connection_id: &str,
        payload: &T,
    ) -> DeliveryOutcome {
        let Some(subscriber) = self.get(connection_id) else {
            return DeliveryOutcome::Failed {
                error: DeliveryError::ConnectionNotFound {
                    connection_id: connection_id.to_string(),
                },
                evicted: false,
            };
        };

        match serde_json::to_string(payload) {
            Ok(json) => self.deliver(&subscriber, Arc::from(json)).await,
            Err(e) => DeliveryOutcome::Failed {
                error: DeliveryError::Serialization {
                    reason: e.to_string(),
                },
                evicted: false,
            },
        }
    }

    /// Send a payload to every connection registered for `user_id`.
    pub async fn send_to_user<T: Serialize + ?Sized>(
        &self,
        user_id: &str,
        payload: &T,
    ) -> PublishReport {
        let frame: Arc<str> = match serde_json::to_string(payload) {
            Ok(json) => Arc::from(json),
            Err(e) => {
                warn!(user_id, error = %e, "Failed to serialize message");
                return PublishReport::default();
            }
        };

        let targets: Vec<Arc<Subscriber>> = self
            .connections
            .iter()
            .filter(|entry| entry.value().user_id() == Some(user_id))
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        self.deliver_all(&targets, frame).await
    }

    /// Remove a connection everywhere and close its transport. Returns false
    /// for unknown ids.
    pub async fn disconnect(&self, connection_id: &str) -> bool {
        let removed = {
            let mut channels = self.channels.write();
            let removed = self.connections.remove(connection_id);
            if removed.is_some() {
                Self::purge(&mut channels, connection_id);
            }
            removed
        };
        let Some((_, subscriber)) = removed else {
            return false;
        };

        self.metrics.set_connections(self.connections.len());
        subscriber.transport.close().await;

        info!(
            connection_id,
            messages_sent = subscriber.messages_sent.load(Ordering::Relaxed),
            messages_received = subscriber.messages_received.load(Ordering::Relaxed),
            "Connection removed"
        );
        true
    }

    /// Count an inbound message from the client.
    pub fn record_activity(&self, connection_id: &str) -> bool {
        match self.get(connection_id) {
            Some(subscriber) => {
                subscriber.record_received();
                true
            }
            None => false,
        }
    }

    pub fn connection_health(&self, connection_id: &str) -> Option<ConnectionHealth> {
        let subscriber = self.get(connection_id)?;
        let failed_attempts = subscriber.failed_attempts();
        let max = self.config.max_failed_attempts;

        Some(ConnectionHealth {
            connection_id: subscriber.id.clone(),
            user_id: subscriber.user_id.clone(),
            healthy: failed_attempts < max,
            status: HealthStatus::from_failures(failed_attempts, max),
            failed_attempts,
            max_failed_attempts: max,
            duration_seconds: subscriber.connected.elapsed().as_secs_f64(),
            messages_sent: subscriber.messages_sent.load(Ordering::Relaxed),
            messages_received: subscriber.messages_received.load(Ordering::Relaxed),
            last_activity: subscriber.last_activity(),
            channels: self.subscriptions(connection_id),
        })
    }

    pub fn stats(&self) -> FanoutStats {
        let mut stats = FanoutStats::default();

        for entry in self.connections.iter() {
            let subscriber = entry.value();
            stats.total_connections += 1;
            if subscriber.failed_attempts() > 0 {
                stats.unhealthy_connections += 1;
            } else {
                stats.healthy_connections += 1;
            }
            stats.total_messages_sent += subscriber.messages_sent.load(Ordering::Relaxed);
            stats.total_messages_received += subscriber.messages_received.load(Ordering::Relaxed);
        }

        let channels = self.channels.read();
        stats.total_channels = channels.len();
        stats.channels = channels
            .iter()
            .map(|(channel, subscribers)| (*channel, subscribers.len()))
            .collect();
        stats
    }

    pub fn channel_subscribers(&self, channel: Channel) -> usize {
        self.channels
            .read()
            .get(&channel)
            .map(HashSet::len)
            .unwrap_or(0)
    }

    /// Channels with at least one subscriber.
    pub fn channels(&self) -> Vec<Channel> {
        let mut channels: Vec<Channel> = self.channels.read().keys().copied().collect();
        channels.sort();
        channels
    }

    fn get(&self, connection_id: &str) -> Option<Arc<Subscriber>> {
        self.connections
            .get(connection_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    fn subscribers_of(&self, channel: Channel) -> Vec<Arc<Subscriber>> {
        let channels = self.channels.read();
        channels
            .get(&channel)
            .map(|ids| ids.iter().filter_map(|id| self.get(id)).collect())
            .unwrap_or_default()
    }

    async fn deliver_all(&self, targets: &[Arc<Subscriber>], frame: Arc<str>) -> PublishReport {
        let outcomes = join_all(
            targets
                .iter()
                .map(|subscriber| self.deliver(subscriber, Arc::clone(&frame))),
        )
        .await;

        let mut report = PublishReport::default();
        for outcome in &outcomes {
            report.absorb(outcome);
        }
        report
    }

    async fn deliver(&self, subscriber: &Arc<Subscriber>, frame: Arc<str>) -> DeliveryOutcome {
        let connection_id = || subscriber.id.clone();
        let timeout = self.config.send_timeout();

        let result = match subscriber.transport.state() {
            TransportState::Closed => Err(DeliveryError::Closed {
                connection_id: connection_id(),
            }),
            TransportState::Closing => Err(DeliveryError::NotOpen {
                connection_id: connection_id(),
            }),
            TransportState::Open => {
                match tokio::time::timeout(timeout, subscriber.transport.send(frame)).await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(SendError::Closed)) => Err(DeliveryError::Closed {
                        connection_id: connection_id(),
                    }),
                    Ok(Err(SendError::Failed(reason))) => Err(DeliveryError::Failed {
                        connection_id: connection_id(),
                        reason,
                    }),
                    Err(_) => Err(DeliveryError::Timeout {
                        connection_id: connection_id(),
                        timeout_ms: timeout.as_millis() as u64,
                    }),
                }
            }
        };

        match result {
            Ok(()) => {
                subscriber.record_sent();
                self.metrics.record_delivered();
                DeliveryOutcome::Delivered
            }
            Err(error) => {
                self.metrics.record_failed();
                let failures = subscriber.record_failure();
                let evicted =
                    error.is_definitive() || failures >= self.config.max_failed_attempts;

                warn!(
                    connection_id = %subscriber.id,
                    failures,
                    max_failed_attempts = self.config.max_failed_attempts,
                    error = %error,
                    "Delivery failed"
                );

                if evicted && self.disconnect(&subscriber.id).await {
                    self.metrics.record_evicted();
                    warn!(connection_id = %subscriber.id, "Evicted connection");
                }
                DeliveryOutcome::Failed { error, evicted }
            }
        }
    }
}
