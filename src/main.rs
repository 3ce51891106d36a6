use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use takwire::{status_router, CotListener, Pipeline, StatusState};
use takwire_api::{create_router, serve, ApiState};
use takwire_core::config::{AppConfig, LogFormat, LoggingConfig};
use takwire_fanout::{install_prometheus_recorder, FanoutDispatcher, SubscriberRegistry};
use takwire_geofence::{load_zones_file, GeofenceEngine, MemoryZoneStore};
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// takwire - CoT listener, geofence engine and WebSocket fan-out
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "TAKWIRE_CONFIG")]
    config: Option<PathBuf>,

    /// Override the stream listener port
    #[arg(long)]
    stream_port: Option<u16>,

    /// Override the datagram listener port
    #[arg(long)]
    datagram_port: Option<u16>,

    /// Override the HTTP/WebSocket port
    #[arg(long)]
    api_port: Option<u16>,

    /// Override the log level
    #[arg(long)]
    log_level: Option<String>,

    /// Zones file loaded into the geofence engine at startup
    #[arg(long)]
    zones: Option<PathBuf>,
}

impl Args {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(port) = self.stream_port {
            config.listener.stream_port = port;
        }
        if let Some(port) = self.datagram_port {
            config.listener.datagram_port = port;
        }
        if let Some(port) = self.api_port {
            config.api.port = port;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(zones) = &self.zones {
            config.geofence.zones_file = Some(zones.clone());
        }
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.filter_directives()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(logging.file_line)
        .with_line_number(logging.file_line);

    // Ignore if a subscriber is already installed
    let _ = match logging.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    init_tracing(&config.logging);
    info!(name = %config.app.name, version = env!("CARGO_PKG_VERSION"), "Starting takwire");
    if let Some(path) = &args.config {
        info!("Configuration loaded from {:?}", path);
    }

    let prometheus = if config.metrics.enabled {
        match install_prometheus_recorder() {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "Failed to install Prometheus recorder, metrics disabled");
                None
            }
        }
    } else {
        None
    };

    // Geofence zones
    let zones = match &config.geofence.zones_file {
        Some(path) => load_zones_file(path)
            .with_context(|| format!("Failed to load zones file: {:?}", path))?,
        None => Vec::new(),
    };
    let zone_store = Arc::new(MemoryZoneStore::with_zones(zones));
    let geofence = Arc::new(GeofenceEngine::new());
    let loaded = geofence
        .load_from(zone_store.as_ref())
        .await
        .context("Failed to load geofence zones")?;
    info!(zones = loaded, enabled = config.geofence.enabled, "Geofence engine ready");

    let shutdown = CancellationToken::new();

    // Fan-out
    let registry = Arc::new(SubscriberRegistry::new(config.fanout.clone()));
    let dispatcher = FanoutDispatcher::new(Arc::clone(&registry));
    let dispatcher_task = dispatcher.spawn(shutdown.clone());

    // Listener -> pipeline
    let (frames_tx, frames_rx) = flume::bounded(config.listener.queue_capacity);
    let listener = Arc::new(CotListener::new(config.listener.clone(), frames_tx));

    let mut pipeline = Pipeline::new(frames_rx, dispatcher.publisher());
    if config.geofence.enabled {
        pipeline = pipeline.with_geofence(Arc::clone(&geofence));
    }
    let pipeline_counters = pipeline.counters();
    let pipeline_task = pipeline.spawn(shutdown.clone());

    listener
        .start()
        .await
        .context("Failed to start CoT listener")?;

    // HTTP / WebSocket
    let api_task = if config.api.enabled {
        let mut state = ApiState::new(
            Arc::clone(&registry),
            dispatcher.publisher(),
            Arc::clone(&geofence),
        )
        .with_zone_store(zone_store.clone())
        .with_outbound(listener.clone())
        .with_codec(config.codec.clone());
        if let Some(handle) = prometheus {
            state = state.with_prometheus(handle, config.metrics.path.clone());
        }

        let router = create_router(state, &config.api).merge(status_router(StatusState {
            listener: Arc::clone(&listener),
            pipeline: pipeline_counters,
        }));

        let address = config.api.bind_address();
        let api_listener = TcpListener::bind(&address)
            .await
            .with_context(|| format!("Failed to bind API address {}", address))?;
        Some(tokio::spawn(serve(api_listener, router, shutdown.clone())))
    } else {
        info!("HTTP/WebSocket API disabled");
        None
    };

    signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Received shutdown signal, stopping...");

    // Stop ingest first so nothing new enters the queue
    listener.stop().await;
    shutdown.cancel();

    let timeout = config.app.shutdown_timeout();
    let drain = async {
        if let Err(e) = pipeline_task.await {
            error!(error = %e, "Pipeline task failed");
        }
        if let Err(e) = dispatcher_task.await {
            error!(error = %e, "Dispatcher task failed");
        }
        if let Some(task) = api_task {
            match task.await {
                Ok(Err(e)) => error!(error = %e, "API server error"),
                Err(e) => error!(error = %e, "API task failed"),
                Ok(Ok(())) => {}
            }
        }
    };
    if tokio::time::timeout(timeout, drain).await.is_err() {
        warn!(timeout_secs = timeout.as_secs(), "Shutdown timed out");
    }

    info!("takwire stopped");
    Ok(())
}
