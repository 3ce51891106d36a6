//! Socket listener
//!
//! Accepts CoT traffic from TAK clients and hands every extracted event
//! frame to a bounded ingest queue.
//!
//! ```text
//!    TAK clients (stream)     datagram / SA multicast
//!           │                          │
//!    ┌──────▼───────┐          ┌───────▼────────┐
//!    │ accept loop  │          │ receive loop   │
//!    │ (semaphore)  │          │ (64 KB buffer) │
//!    └──────┬───────┘          └───────┬────────┘
//!    per-connection task               │
//!    CotFrameCodec, idle timeout       │
//!           │                          │
//!           └────────────┬─────────────┘
//!                        ▼
//!             flume::Sender<InboundFrame>
//! ```
//!
//! Stream clients stay registered for the lifetime of their connection, so
//! encoded events can be pushed back to them with [`CotListener::broadcast`].

pub mod clients;
pub mod codec;
mod datagram;
pub mod stats;
mod stream;

pub use clients::{ClientRegistry, StreamClient};
pub use codec::{datagram_frames, extract_spans, CotFrameCodec, Frame};
pub use stats::{FrameSource, ListenerStats};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use memchr::memmem;
use parking_lot::Mutex;
use stats::ListenerState;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use takwire_api::CotOutbound;
use takwire_core::config::{ListenerConfig, MulticastConfig};
use takwire_core::TransportError;
use takwire_cot::{decode, encode, Event, PING_TYPE};
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// TTL of outbound SA multicast, keeps traffic on the local network
const MULTICAST_TTL: u32 = 32;

/// One extracted event span.
#[derive(Debug, Clone)]
pub struct InboundFrame {
    pub payload: Bytes,
    pub source: FrameSource,
    pub peer: SocketAddr,
}

/// State shared by the listener and its tasks.
pub(crate) struct Shared {
    config: ListenerConfig,
    sink: flume::Sender<InboundFrame>,
    state: ListenerState,
    clients: ClientRegistry,
}

impl Shared {
    /// Count a frame, answer it if it is a ping, otherwise forward it.
    pub(crate) async fn dispatch(
        &self,
        payload: Bytes,
        source: FrameSource,
        peer: SocketAddr,
        reply: Option<&mpsc::Sender<Bytes>>,
        shutdown: &CancellationToken,
    ) {
        self.state.record_event(source);

        if let Some(reply) = reply {
            if self.config.answer_pings && self.answer_ping(&payload, peer, reply).await {
                return;
            }
        }

        let frame = InboundFrame {
            payload,
            source,
            peer,
        };

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {}
            sent = self.sink.send_async(frame) => match sent {
                Ok(()) => self.state.record_forwarded(),
                Err(_) => {
                    self.state.record_error();
                    warn!(peer = %peer, "Ingest queue closed, dropping frame");
                }
            },
        }
    }

    async fn answer_ping(&self, payload: &[u8], peer: SocketAddr, reply: &mpsc::Sender<Bytes>) -> bool {
        if memmem::find(payload, PING_TYPE.as_bytes()).is_none() {
            return false;
        }
        let Ok(event) = decode(payload) else {
            return false;
        };
        if !event.is_ping() {
            return false;
        }

        let pong = encode(&Event::ping_ack(self.config.gateway_uid.clone(), Utc::now()));
        if reply.send(Bytes::from(pong)).await.is_err() {
            debug!(peer = %peer, "Connection closed before ping reply");
        }
        self.state.record_ping();
        debug!(peer = %peer, uid = %event.uid, "Answered ping");
        true
    }
}

struct Running {
    shutdown: CancellationToken,
    tracker: TaskTracker,
    stream_addr: Option<SocketAddr>,
    datagram_addr: Option<SocketAddr>,
}

/// Stream, datagram and multicast listener feeding one ingest queue.
pub struct CotListener {
    shared: Arc<Shared>,
    running: Mutex<Option<Running>>,
}

impl CotListener {
    pub fn new(config: ListenerConfig, sink: flume::Sender<InboundFrame>) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                sink,
                state: ListenerState::new(),
                clients: ClientRegistry::new(),
            }),
            running: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ListenerConfig {
        &self.shared.config
    }

    /// Bind every enabled endpoint and spawn its loop. A bind failure is
    /// returned and nothing is left running.
    pub async fn start(&self) -> Result<(), TransportError> {
        if self.running.lock().is_some() {
            return Err(TransportError::AlreadyRunning);
        }

        let config = &self.shared.config;

        let stream = if config.stream_enabled {
            let address = config.stream_address();
            let listener = TcpListener::bind(&address)
                .await
                .map_err(|e| TransportError::bind("stream", &address, e))?;
            Some(listener)
        } else {
            None
        };

        let datagram = if config.datagram_enabled {
            let address = config.datagram_address();
            let socket = UdpSocket::bind(&address)
                .await
                .map_err(|e| TransportError::bind("datagram", &address, e))?;
            Some(socket)
        } else {
            None
        };

        let multicast = if config.multicast.enabled {
            Some(bind_multicast(&config.multicast)?)
        } else {
            None
        };

        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();
        let stream_addr = stream.as_ref().and_then(|l| l.local_addr().ok());
        let datagram_addr = datagram.as_ref().and_then(|s| s.local_addr().ok());

        if let Some(listener) = stream {
            let semaphore = Arc::new(Semaphore::new(config.max_connections));
            tracker.spawn(stream::accept_loop(
                Arc::clone(&self.shared),
                listener,
                semaphore,
                shutdown.clone(),
                tracker.clone(),
            ));
            info!(address = ?stream_addr, max_connections = config.max_connections, "Stream listener started");
        }

        if let Some(socket) = datagram {
            tracker.spawn(datagram::receive_loop(
                Arc::clone(&self.shared),
                socket,
                FrameSource::Datagram,
                shutdown.clone(),
            ));
            info!(address = ?datagram_addr, "Datagram listener started");
        }

        if let Some(socket) = multicast {
            tracker.spawn(datagram::receive_loop(
                Arc::clone(&self.shared),
                socket,
                FrameSource::Multicast,
                shutdown.clone(),
            ));
            info!(
                group = %config.multicast.group,
                port = config.multicast.port,
                "SA multicast listener started"
            );
        }

        let mut running = self.running.lock();
        if running.is_some() {
            shutdown.cancel();
            return Err(TransportError::AlreadyRunning);
        }
        *running = Some(Running {
            shutdown,
            tracker,
            stream_addr,
            datagram_addr,
        });
        self.shared.state.mark_started();

        Ok(())
    }

    /// Cancel every loop and wait for them up to the join timeout. Partial
    /// buffers are dropped. Calling it on a stopped listener does nothing.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().take() else {
            return;
        };

        info!("Stopping listener");
        running.shutdown.cancel();
        running.tracker.close();

        let join_timeout = self.shared.config.join_timeout();
        if tokio::time::timeout(join_timeout, running.tracker.wait())
            .await
            .is_err()
        {
            warn!(
                timeout_secs = join_timeout.as_secs(),
                remaining = running.tracker.len(),
                "Listener tasks did not finish within the join timeout"
            );
        }

        self.shared.clients.clear();
        self.shared.state.mark_stopped();
        info!("Listener stopped");
    }

    pub fn is_running(&self) -> bool {
        self.shared.state.is_running()
    }

    pub fn stats(&self) -> ListenerStats {
        self.shared.state.snapshot()
    }

    /// Bound stream address, once started.
    pub fn stream_addr(&self) -> Option<SocketAddr> {
        self.running.lock().as_ref().and_then(|r| r.stream_addr)
    }

    /// Bound datagram address, once started.
    pub fn datagram_addr(&self) -> Option<SocketAddr> {
        self.running.lock().as_ref().and_then(|r| r.datagram_addr)
    }

    pub fn client_count(&self) -> usize {
        self.shared.clients.len()
    }

    /// Push an encoded event to every connected stream client.
    pub fn broadcast(&self, xml: &str) -> usize {
        let reached = self
            .shared
            .clients
            .broadcast(Bytes::copy_from_slice(xml.as_bytes()));
        if reached > 0 {
            debug!(clients = reached, bytes = xml.len(), "Pushed event to stream clients");
        }
        reached
    }

    /// Send an encoded event to the SA multicast group.
    pub async fn send_multicast(&self, xml: &str) -> Result<(), TransportError> {
        let multicast = &self.shared.config.multicast;
        let group = multicast
            .group_addr()
            .map_err(|e| multicast_error(multicast, e))?;

        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .await
            .map_err(|e| multicast_error(multicast, e))?;
        socket
            .set_multicast_ttl_v4(MULTICAST_TTL)
            .map_err(|e| multicast_error(multicast, e))?;
        socket
            .send_to(xml.as_bytes(), (group, multicast.port))
            .await
            .map_err(|e| TransportError::write(format!("{}:{}", group, multicast.port), e))?;

        debug!(group = %group, port = multicast.port, bytes = xml.len(), "Sent SA multicast");
        Ok(())
    }
}

#[async_trait]
impl CotOutbound for CotListener {
    async fn push(&self, xml: Arc<str>) -> usize {
        let reached = self.broadcast(&xml);

        if self.shared.config.multicast.enabled {
            if let Err(e) = self.send_multicast(&xml).await {
                warn!(error = %e, "SA multicast send failed");
            }
        }

        reached
    }
}

fn multicast_error(config: &MulticastConfig, reason: impl ToString) -> TransportError {
    TransportError::Multicast {
        group: format!("{}:{}", config.group, config.port),
        reason: reason.to_string(),
    }
}

/// Bind the SA multicast port with address reuse and join the group.
fn bind_multicast(config: &MulticastConfig) -> Result<UdpSocket, TransportError> {
    use socket2::{Domain, Protocol, Socket, Type};

    let group = config.group_addr().map_err(|e| multicast_error(config, e))?;
    let interface = config
        .interface_addr()
        .map_err(|e| multicast_error(config, e))?;

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| multicast_error(config, e))?;
    socket
        .set_reuse_address(true)
        .map_err(|e| multicast_error(config, e))?;
    socket
        .set_nonblocking(true)
        .map_err(|e| multicast_error(config, e))?;

    let bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port));
    socket
        .bind(&bind_addr.into())
        .map_err(|e| TransportError::bind("multicast", bind_addr.to_string(), e))?;
    socket
        .join_multicast_v4(&group, &interface)
        .map_err(|e| multicast_error(config, e))?;

    UdpSocket::from_std(socket.into()).map_err(|e| multicast_error(config, e))
}
