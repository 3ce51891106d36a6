//! Stream accept loop and per-connection handler

use super::clients::StreamClient;
use super::codec::{CotFrameCodec, Frame};
use super::stats::FrameSource;
use super::Shared;
use bytes::Bytes;
use futures::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use takwire_core::{CapacityError, TransportError};
use tokio::io::{AsyncRead, AsyncWriteExt, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Outbound frames queued per connection (pushed events and ping replies)
const CLIENT_QUEUE: usize = 256;

/// How long a closing connection may keep flushing queued writes
const WRITER_DRAIN: Duration = Duration::from_secs(1);

pub(super) async fn accept_loop(
    shared: Arc<Shared>,
    listener: TcpListener,
    semaphore: Arc<Semaphore>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
) {
    let limit = shared.config.max_connections;

    loop {
        let accepted = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => match Arc::clone(&semaphore).try_acquire_owned() {
                Ok(permit) => {
                    tracker.spawn(handle_connection(
                        Arc::clone(&shared),
                        stream,
                        peer,
                        shutdown.clone(),
                        permit,
                    ));
                }
                Err(_) => {
                    let err = CapacityError::ConnectionLimit {
                        limit,
                        peer: peer.to_string(),
                    };
                    warn!(peer = %peer, limit, error = %err, "Rejecting stream connection");
                    shared.state.record_rejected();
                    drop(stream);
                }
            },
            Err(e) => {
                error!(error = %e, "Accept error");
                shared.state.record_error();
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }

    debug!("Stream accept loop stopped");
}

async fn handle_connection(
    shared: Arc<Shared>,
    stream: TcpStream,
    peer: SocketAddr,
    shutdown: CancellationToken,
    _permit: OwnedSemaphorePermit,
) {
    let (read_half, mut write_half) = stream.into_split();
    let (tx, mut rx) = mpsc::channel::<Bytes>(CLIENT_QUEUE);

    let client_id = shared.clients.register(StreamClient::new(peer, tx.clone()));
    shared.state.connection_opened();
    info!(peer = %peer, "Stream client connected");

    let mut writer = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if let Err(e) = write_half.write_all(&payload).await {
                debug!(error = %TransportError::write(peer, e), "Stream write failed");
                break;
            }
        }
        let _ = write_half.shutdown().await;
    });

    let max_buffer = shared.config.max_buffer_bytes;
    let idle_timeout = shared.config.idle_timeout();
    let mut frames = FramedRead::new(
        ActivityReader::new(read_half),
        CotFrameCodec::new(max_buffer),
    );

    // Armed from the last byte read, not the last complete frame
    let idle = tokio::time::sleep(idle_timeout);
    tokio::pin!(idle);

    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            next = frames.next() => next,
            _ = &mut idle => {
                let last_read = frames.get_ref().last_read();
                if last_read.elapsed() >= idle_timeout {
                    info!(peer = %peer, idle_secs = idle_timeout.as_secs(), "Idle timeout, closing connection");
                    break;
                }
                idle.as_mut().reset(last_read + idle_timeout);
                continue;
            }
        };

        match next {
            None => {
                debug!(peer = %peer, "Peer closed connection");
                break;
            }
            Some(Err(e)) => {
                warn!(peer = %peer, error = %TransportError::read(peer, e), "Read error");
                shared.state.record_error();
                break;
            }
            Some(Ok(Frame::Overflow { discarded })) => {
                let err = CapacityError::BufferOverflow {
                    limit: max_buffer,
                    peer: peer.to_string(),
                };
                warn!(peer = %peer, bytes = discarded, error = %err, "Discarding stream buffer");
                shared.state.record_overflow();
            }
            Some(Ok(Frame::Event(payload))) => {
                debug!(peer = %peer, bytes = payload.len(), "Stream frame");
                shared
                    .dispatch(payload, FrameSource::Stream, peer, Some(&tx), &shutdown)
                    .await;
            }
        }
    }

    shared.clients.remove(client_id);
    drop(tx);
    if tokio::time::timeout(WRITER_DRAIN, &mut writer).await.is_err() {
        writer.abort();
    }

    shared.state.connection_closed();
    info!(peer = %peer, "Stream client disconnected");
}

/// Read half that records when bytes last arrived.
struct ActivityReader<R> {
    inner: R,
    last_read: Instant,
}

impl<R> ActivityReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            last_read: Instant::now(),
        }
    }

    fn last_read(&self) -> Instant {
        self.last_read
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ActivityReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let before = buf.filled().len();
        let polled = Pin::new(&mut self.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = polled {
            if buf.filled().len() > before {
                self.last_read = Instant::now();
            }
        }
        polled
    }
}
