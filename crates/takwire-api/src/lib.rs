//! HTTP and WebSocket surface for takwire
//!
//! - `GET /ws`: subscription protocol over a WebSocket, backed by the
//!   fan-out registry
//! - `/api/v1/fanout/*`: statistics, connection health and publishing
//! - `/api/v1/geofences*`: zone administration and position checks
//! - `/api/v1/markers*`: marker injection into the CoT stream
//! - `/metrics`: Prometheus text, when a recorder is installed
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use takwire_api::{create_router, ApiState};
//! use takwire_core::config::{ApiConfig, FanoutConfig};
//! use takwire_fanout::{FanoutDispatcher, SubscriberRegistry};
//! use takwire_geofence::GeofenceEngine;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> std::io::Result<()> {
//! let registry = Arc::new(SubscriberRegistry::new(FanoutConfig::default()));
//! let dispatcher = FanoutDispatcher::new(Arc::clone(&registry));
//! let state = ApiState::new(registry, dispatcher.publisher(), Arc::new(GeofenceEngine::new()));
//! let router = create_router(state, &ApiConfig::default());
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! takwire_api::serve(listener, router, CancellationToken::new()).await
//! # }
//! ```

pub mod error;
pub mod outbound;
pub mod rest;
pub mod types;
pub mod websocket;

pub use error::{ApiError, ErrorResponse};
pub use outbound::CotOutbound;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::{Duration, Instant};
use takwire_core::config::{ApiConfig, CodecConfig};
use takwire_fanout::{Publisher, SubscriberRegistry};
use takwire_geofence::{GeofenceEngine, ZoneStore};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared handler state.
#[derive(Clone)]
pub struct ApiState {
    pub registry: Arc<SubscriberRegistry>,
    pub publisher: Publisher,
    pub geofence: Arc<GeofenceEngine>,
    /// Persists zone changes made over the API
    pub zone_store: Option<Arc<dyn ZoneStore>>,
    pub outbound: Option<Arc<dyn CotOutbound>>,
    pub prometheus: Option<PrometheusHandle>,
    pub metrics_path: String,
    pub codec: CodecConfig,
    pub started_at: Instant,
}

impl ApiState {
    pub fn new(
        registry: Arc<SubscriberRegistry>,
        publisher: Publisher,
        geofence: Arc<GeofenceEngine>,
    ) -> Self {
        Self {
            registry,
            publisher,
            geofence,
            zone_store: None,
            outbound: None,
            prometheus: None,
            metrics_path: "/metrics".to_string(),
            codec: CodecConfig::default(),
            started_at: Instant::now(),
        }
    }

    pub fn with_zone_store(mut self, store: Arc<dyn ZoneStore>) -> Self {
        self.zone_store = Some(store);
        self
    }

    pub fn with_outbound(mut self, outbound: Arc<dyn CotOutbound>) -> Self {
        self.outbound = Some(outbound);
        self
    }

    pub fn with_prometheus(mut self, handle: PrometheusHandle, path: impl Into<String>) -> Self {
        self.prometheus = Some(handle);
        self.metrics_path = path.into();
        self
    }

    pub fn with_codec(mut self, codec: CodecConfig) -> Self {
        self.codec = codec;
        self
    }
}

/// Build the full router: REST, WebSocket and metrics, with tracing, CORS
/// and body-size layers applied.
pub fn create_router(state: ApiState, config: &ApiConfig) -> Router {
    let router = Router::new()
        .merge(rest::create_rest_router(state.clone()))
        .merge(websocket::create_ws_router(state))
        .layer(DefaultBodyLimit::max(config.max_body_size))
        .layer(TraceLayer::new_for_http());

    if config.cors {
        router.layer(cors_layer())
    } else {
        router
    }
}

pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([axum::http::header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600))
}

/// Serve `router` until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(address = %addr, "API server listening");
    }

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}
