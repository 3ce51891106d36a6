//! Per-connection outbound transports

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Open,
    Closing,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// The peer is gone; retrying cannot succeed
    #[error("transport closed")]
    Closed,

    #[error("send failed: {0}")]
    Failed(String),
}

/// Write side of one subscriber connection.
#[async_trait]
pub trait Transport: Send + Sync {
    fn state(&self) -> TransportState;

    /// Send one already-serialized text frame.
    async fn send(&self, frame: Arc<str>) -> Result<(), SendError>;

    /// Close the transport. Calling it more than once is harmless.
    async fn close(&self);
}

/// Transport backed by a bounded queue that a socket writer task drains.
///
/// A full queue waits; the registry bounds that wait with its send timeout.
/// Dropping the receiver (writer task gone) makes the transport closed.
pub struct ChannelTransport {
    tx: Mutex<Option<mpsc::Sender<Arc<str>>>>,
}

impl ChannelTransport {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    fn sender(&self) -> Option<mpsc::Sender<Arc<str>>> {
        self.tx.lock().clone()
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    fn state(&self) -> TransportState {
        match self.tx.lock().as_ref() {
            Some(tx) if !tx.is_closed() => TransportState::Open,
            _ => TransportState::Closed,
        }
    }

    async fn send(&self, frame: Arc<str>) -> Result<(), SendError> {
        let tx = self.sender().ok_or(SendError::Closed)?;
        tx.send(frame).await.map_err(|_| SendError::Closed)
    }

    async fn close(&self) {
        // Dropping the last sender ends the writer's receive loop.
        self.tx.lock().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_and_close() {
        let (transport, mut rx) = ChannelTransport::new(4);
        assert_eq!(transport.state(), TransportState::Open);

        transport.send(Arc::from("hello")).await.unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some("hello"));

        transport.close().await;
        assert_eq!(transport.state(), TransportState::Closed);
        assert_eq!(
            transport.send(Arc::from("late")).await,
            Err(SendError::Closed)
        );
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_closed() {
        let (transport, rx) = ChannelTransport::new(4);
        drop(rx);
        assert_eq!(transport.state(), TransportState::Closed);
        assert_eq!(transport.send(Arc::from("x")).await, Err(SendError::Closed));
    }
}
