//! Listener and pipeline counters over HTTP

use crate::listener::{CotListener, ListenerStats};
use crate::pipeline::{PipelineCounters, PipelineStats};
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;

#[derive(Clone)]
pub struct StatusState {
    pub listener: Arc<CotListener>,
    pub pipeline: Arc<PipelineCounters>,
}

#[derive(Debug, Serialize)]
pub struct IngestStatus {
    pub listener: ListenerStats,
    pub pipeline: PipelineStats,
    pub stream_clients: usize,
}

pub fn status_router(state: StatusState) -> Router {
    Router::new()
        .route("/api/v1/listener/stats", get(listener_stats))
        .with_state(state)
}

async fn listener_stats(State(state): State<StatusState>) -> Json<IngestStatus> {
    Json(IngestStatus {
        listener: state.listener.stats(),
        pipeline: state.pipeline.snapshot(),
        stream_clients: state.listener.client_count(),
    })
}
