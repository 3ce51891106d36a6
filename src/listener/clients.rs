//! Connected stream clients that receive pushed events

use bytes::Bytes;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

/// Write handle of one stream connection.
#[derive(Debug, Clone)]
pub struct StreamClient {
    pub peer: SocketAddr,
    tx: mpsc::Sender<Bytes>,
}

impl StreamClient {
    pub fn new(peer: SocketAddr, tx: mpsc::Sender<Bytes>) -> Self {
        Self { peer, tx }
    }
}

#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: DashMap<u64, StreamClient>,
    next_id: AtomicU64,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, client: StreamClient) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.clients.insert(id, client);
        id
    }

    pub fn remove(&self, id: u64) {
        self.clients.remove(&id);
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn clear(&self) {
        self.clients.clear();
    }

    /// Queue `payload` on every client. Returns the number of clients that
    /// took it; clients whose writer is gone are pruned.
    pub fn broadcast(&self, payload: Bytes) -> usize {
        let mut reached = 0;
        let mut dead = Vec::new();

        for entry in self.clients.iter() {
            match entry.value().tx.try_send(payload.clone()) {
                Ok(()) => reached += 1,
                Err(TrySendError::Full(_)) => {
                    debug!(peer = %entry.value().peer, "Client write queue full, skipping");
                }
                Err(TrySendError::Closed(_)) => dead.push(*entry.key()),
            }
        }

        for id in dead {
            if let Some((_, client)) = self.clients.remove(&id) {
                debug!(peer = %client.peer, "Pruned closed stream client");
            }
        }

        reached
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[tokio::test]
    async fn test_broadcast_prunes_dead_clients() {
        let registry = ClientRegistry::new();
        let (tx1, mut rx1) = mpsc::channel(4);
        let (tx2, rx2) = mpsc::channel(4);
        registry.register(StreamClient::new(peer(1), tx1));
        registry.register(StreamClient::new(peer(2), tx2));
        drop(rx2);

        assert_eq!(registry.broadcast(Bytes::from_static(b"<event/>")), 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(rx1.recv().await.unwrap(), Bytes::from_static(b"<event/>"));
    }

    #[test]
    fn test_full_queue_is_skipped_not_pruned() {
        let registry = ClientRegistry::new();
        let (tx, _rx) = mpsc::channel(1);
        let id = registry.register(StreamClient::new(peer(1), tx));

        assert_eq!(registry.broadcast(Bytes::from_static(b"a")), 1);
        assert_eq!(registry.broadcast(Bytes::from_static(b"b")), 0);
        assert_eq!(registry.len(), 1);

        registry.remove(id);
        assert!(registry.is_empty());
    }
}
