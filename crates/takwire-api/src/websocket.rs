//! WebSocket endpoint for the channel subscription protocol
//!
//! Each socket is registered with the fan-out registry through a
//! [`ChannelTransport`]. A writer task drains that transport into the socket
//! while the read loop applies client frames to the registry.

use crate::ApiState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{
    sink::SinkExt,
    stream::{SplitSink, StreamExt},
};
use serde::Deserialize;
use std::sync::Arc;
use takwire_fanout::{handle_client_message, ChannelTransport, ServerMessage};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub fn create_ws_router(state: ApiState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    /// Associates the connection with a user for direct delivery
    #[serde(default)]
    pub user_id: Option<String>,
}

/// GET /ws
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<ApiState>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.user_id))
}

async fn handle_socket(socket: WebSocket, state: ApiState, user_id: Option<String>) {
    let registry = Arc::clone(&state.registry);
    let (sender, mut receiver) = socket.split();

    let (transport, outbound_rx) = ChannelTransport::new(registry.config().client_queue_capacity);
    let connection_id = registry.register(Arc::new(transport), user_id);
    info!(connection_id = %connection_id, "WebSocket client connected");

    let send_task = tokio::spawn(forward_frames(sender, outbound_rx, connection_id.clone()));

    registry
        .send_direct(
            &connection_id,
            &ServerMessage::connection_established(&connection_id),
        )
        .await;

    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                registry.record_activity(&connection_id);
                handle_client_message(&registry, &connection_id, text.as_str()).await;
            }
            Ok(Message::Binary(_)) => {
                registry.record_activity(&connection_id);
                registry
                    .send_direct(
                        &connection_id,
                        &ServerMessage::error("Binary frames are not supported"),
                    )
                    .await;
            }
            Ok(Message::Close(reason)) => {
                debug!(connection_id = %connection_id, reason = ?reason, "Client closed connection");
                break;
            }
            // Axum answers pings itself
            Ok(_) => {}
            Err(e) => {
                warn!(connection_id = %connection_id, error = %e, "WebSocket error");
                break;
            }
        }

        if !registry.contains(&connection_id) {
            debug!(connection_id = %connection_id, "Connection evicted, closing socket");
            break;
        }
    }

    // Closing the transport ends the writer loop.
    registry.disconnect(&connection_id).await;
    let _ = send_task.await;

    info!(connection_id = %connection_id, "WebSocket client disconnected");
}

async fn forward_frames(
    mut sender: SplitSink<WebSocket, Message>,
    mut frames: mpsc::Receiver<Arc<str>>,
    connection_id: String,
) {
    while let Some(frame) = frames.recv().await {
        if let Err(e) = sender.send(Message::Text(frame.as_ref().into())).await {
            debug!(connection_id = %connection_id, error = %e, "Socket write failed");
            break;
        }
    }

    let _ = sender.close().await;
}
