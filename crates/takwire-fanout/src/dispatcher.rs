//! Fan-out dispatcher
//!
//! Producers (the ingest pipeline, the HTTP surface) hand messages to a
//! cloneable [`Publisher`]. A single dispatcher task drains the bounded queue
//! and runs the deliveries, so producers never wait on slow subscribers.

use crate::channel::Channel;
use crate::message::Message;
use crate::metrics::FanoutMetrics;
use crate::registry::{ConnectionId, SubscriberRegistry};
use flume::{Receiver, Sender, TrySendError};
use std::sync::Arc;
use std::time::Duration;
use takwire_core::config::{DispatchMode, FanoutConfig};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What a producer does when the dispatch queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistributionStrategy {
    /// Drop the message (default)
    #[default]
    DropOnFull,
    /// Wait until there is room
    BlockOnFull,
    /// Wait up to the given duration, then drop
    TryForTimeout(Duration),
}

impl DistributionStrategy {
    pub fn from_config(config: &FanoutConfig) -> Self {
        match config.dispatch_mode {
            DispatchMode::DropOnFull => Self::DropOnFull,
            DispatchMode::BlockOnFull => Self::BlockOnFull,
            DispatchMode::TryForTimeout => Self::TryForTimeout(config.dispatch_timeout()),
        }
    }
}

#[derive(Debug, Clone)]
pub enum FanoutCommand {
    Publish { channel: Channel, message: Message },
    Broadcast { message: Message, exclude: Vec<ConnectionId> },
}

/// Cloneable producer handle.
#[derive(Clone)]
pub struct Publisher {
    tx: Sender<FanoutCommand>,
    strategy: DistributionStrategy,
    metrics: Arc<FanoutMetrics>,
}

impl Publisher {
    /// Queue a channel publish. False if the message was dropped.
    pub async fn publish(&self, channel: Channel, message: Message) -> bool {
        self.submit(FanoutCommand::Publish { channel, message }).await
    }

    /// Queue a broadcast to every connection not in `exclude`.
    pub async fn broadcast(&self, message: Message, exclude: Vec<ConnectionId>) -> bool {
        self.submit(FanoutCommand::Broadcast { message, exclude })
            .await
    }

    pub fn strategy(&self) -> DistributionStrategy {
        self.strategy
    }

    pub fn pending(&self) -> usize {
        self.tx.len()
    }

    async fn submit(&self, command: FanoutCommand) -> bool {
        let result: Result<(), String> = match self.strategy {
            DistributionStrategy::DropOnFull => self.tx.try_send(command).map_err(|e| match e {
                TrySendError::Full(_) => "queue full".to_string(),
                TrySendError::Disconnected(_) => "dispatcher stopped".to_string(),
            }),
            DistributionStrategy::BlockOnFull => self
                .tx
                .send_async(command)
                .await
                .map_err(|_| "dispatcher stopped".to_string()),
            DistributionStrategy::TryForTimeout(timeout) => {
                match tokio::time::timeout(timeout, self.tx.send_async(command)).await {
                    Ok(sent) => sent.map_err(|_| "dispatcher stopped".to_string()),
                    Err(_) => Err("send timeout".to_string()),
                }
            }
        };

        match result {
            Ok(()) => true,
            Err(reason) => {
                self.metrics.record_dropped();
                debug!(%reason, "Dropped fan-out message");
                false
            }
        }
    }
}

pub struct FanoutDispatcher {
    registry: Arc<SubscriberRegistry>,
    tx: Sender<FanoutCommand>,
    rx: Receiver<FanoutCommand>,
    strategy: DistributionStrategy,
}

impl FanoutDispatcher {
    /// Queue capacity and strategy come from the registry's config.
    pub fn new(registry: Arc<SubscriberRegistry>) -> Self {
        let config = registry.config();
        let (tx, rx) = flume::bounded(config.dispatch_queue_capacity);
        let strategy = DistributionStrategy::from_config(config);

        Self {
            registry,
            tx,
            rx,
            strategy,
        }
    }

    pub fn with_strategy(mut self, strategy: DistributionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn publisher(&self) -> Publisher {
        Publisher {
            tx: self.tx.clone(),
            strategy: self.strategy,
            metrics: self.registry.metrics(),
        }
    }

    /// Run the dispatch loop until `shutdown` fires. Commands still queued at
    /// that point are discarded.
    pub fn spawn(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let rx = self.rx.clone();
        let registry = Arc::clone(&self.registry);

        tokio::spawn(async move {
            info!("Fan-out dispatcher started");

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    command = rx.recv_async() => match command {
                        Ok(command) => Self::execute(&registry, command).await,
                        Err(_) => {
                            warn!("Fan-out queue disconnected");
                            break;
                        }
                    },
                }
            }

            info!(discarded = rx.len(), "Fan-out dispatcher stopped");
        })
    }

    async fn execute(registry: &SubscriberRegistry, command: FanoutCommand) {
        match command {
            FanoutCommand::Publish { channel, message } => {
                registry.publish(channel, message).await;
            }
            FanoutCommand::Broadcast { message, exclude } => {
                registry.broadcast_all(message, &exclude).await;
            }
        }
    }
}
