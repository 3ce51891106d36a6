//! Datagram and SA multicast receive loop

use super::codec::datagram_frames;
use super::stats::FrameSource;
use super::Shared;
use bytes::Bytes;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Largest datagram accepted
const MAX_DATAGRAM: usize = 64 * 1024;

pub(super) async fn receive_loop(
    shared: Arc<Shared>,
    socket: UdpSocket,
    source: FrameSource,
    shutdown: CancellationToken,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM];

    loop {
        let received = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            received = socket.recv_from(&mut buf) => received,
        };

        let (len, peer) = match received {
            Ok(received) => received,
            Err(e) => {
                warn!(source = source.as_str(), error = %e, "Datagram receive error");
                shared.state.record_error();
                continue;
            }
        };

        shared.state.record_datagram(source);
        let datagram = Bytes::copy_from_slice(&buf[..len]);
        let frames = datagram_frames(&datagram);
        if frames.is_empty() {
            debug!(peer = %peer, bytes = len, source = source.as_str(), "Datagram without event");
            continue;
        }

        for frame in frames {
            let payload = datagram.slice_ref(frame);
            shared.dispatch(payload, source, peer, None, &shutdown).await;
        }
    }

    debug!(source = source.as_str(), "Datagram loop stopped");
}
