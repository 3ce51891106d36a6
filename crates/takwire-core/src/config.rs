//! Configuration management for takwire.
//!
//! One [`AppConfig`] carries every tunable of the pipeline. Each section and
//! field has a default, so an empty file (or no file at all) yields a working
//! gateway on the standard ports.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;

/// Main application configuration.
///
/// # Examples
///
/// ```no_run
/// use takwire_core::config::AppConfig;
///
/// let config = AppConfig::from_file("takwire.yaml").unwrap();
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application-wide settings
    #[serde(default)]
    pub app: ApplicationConfig,

    /// Stream/datagram listener
    #[serde(default)]
    pub listener: ListenerConfig,

    /// Subscriber fan-out
    #[serde(default)]
    pub fanout: FanoutConfig,

    /// Geofence zones
    #[serde(default)]
    pub geofence: GeofenceConfig,

    /// Event encoding defaults
    #[serde(default)]
    pub codec: CodecConfig,

    /// HTTP/WebSocket server
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl AppConfig {
    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::file_not_found(path.display().to_string()).into());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Self::from_yaml(&contents)
    }

    /// Loads configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| {
            ConfigError::InvalidFormat {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Loads configuration through the `config` crate: the optional file first,
    /// then `TAKWIRE__SECTION__FIELD` environment variables on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let source = path
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<environment>".to_string());

        let config = builder
            .add_source(
                config::Environment::with_prefix("TAKWIRE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigError::LoadFailed {
                path: source,
                reason: e.to_string(),
            })?;

        config.try_deserialize().map_err(|e| {
            ConfigError::InvalidFormat {
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<()> {
        self.listener.validate()?;
        self.fanout.validate()?;
        self.api.validate()?;
        self.logging.parse_level()?;
        self.metrics.validate()?;
        Ok(())
    }
}

/// Application-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_app_name")]
    pub name: String,

    /// Graceful shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

fn default_app_name() -> String {
    "takwire".to_string()
}

fn default_shutdown_timeout() -> u64 {
    10
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl ApplicationConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

fn default_true() -> bool {
    true
}

/// Socket listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// Interface both sockets bind to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Stream (TCP) port
    #[serde(default = "default_stream_port")]
    pub stream_port: u16,

    /// Datagram (UDP) port
    #[serde(default = "default_datagram_port")]
    pub datagram_port: u16,

    #[serde(default = "default_true")]
    pub stream_enabled: bool,

    #[serde(default = "default_true")]
    pub datagram_enabled: bool,

    /// Concurrent stream connections; further connections are refused
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// A stream connection with no bytes for this long is closed
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Receive buffer cap before the buffer is discarded
    #[serde(default = "default_max_buffer")]
    pub max_buffer_bytes: usize,

    /// How long `stop()` waits for loops to exit
    #[serde(default = "default_join_timeout")]
    pub join_timeout_secs: u64,

    /// Capacity of the frame queue between listener and pipeline
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Answer `t-x-c-t` pings on stream connections instead of forwarding them
    #[serde(default = "default_true")]
    pub answer_pings: bool,

    /// uid used on ping acknowledgements
    #[serde(default = "default_gateway_uid")]
    pub gateway_uid: String,

    /// SA multicast receive
    #[serde(default)]
    pub multicast: MulticastConfig,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_stream_port() -> u16 {
    8088
}

fn default_datagram_port() -> u16 {
    4242
}

fn default_max_connections() -> usize {
    32
}

fn default_idle_timeout() -> u64 {
    30
}

fn default_max_buffer() -> usize {
    64 * 1024
}

fn default_join_timeout() -> u64 {
    5
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_gateway_uid() -> String {
    "takwire-gateway".to_string()
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            stream_port: default_stream_port(),
            datagram_port: default_datagram_port(),
            stream_enabled: true,
            datagram_enabled: true,
            max_connections: default_max_connections(),
            idle_timeout_secs: default_idle_timeout(),
            max_buffer_bytes: default_max_buffer(),
            join_timeout_secs: default_join_timeout(),
            queue_capacity: default_queue_capacity(),
            answer_pings: true,
            gateway_uid: default_gateway_uid(),
            multicast: MulticastConfig::default(),
        }
    }
}

impl ListenerConfig {
    pub fn stream_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.stream_port)
    }

    pub fn datagram_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.datagram_port)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(
                ConfigError::invalid_value("listener.max_connections", "must be at least 1")
                    .into(),
            );
        }
        if self.idle_timeout_secs == 0 {
            return Err(ConfigError::invalid_value(
                "listener.idle_timeout_secs",
                "must be greater than 0",
            )
            .into());
        }
        if self.max_buffer_bytes < 1024 {
            return Err(ConfigError::invalid_value(
                "listener.max_buffer_bytes",
                "must be at least 1024",
            )
            .into());
        }
        if self.queue_capacity == 0 {
            return Err(
                ConfigError::invalid_value("listener.queue_capacity", "must be at least 1").into(),
            );
        }
        self.multicast.validate()
    }
}

/// SA multicast listener. Off unless enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MulticastConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_multicast_group")]
    pub group: String,

    #[serde(default = "default_multicast_port")]
    pub port: u16,

    /// Local interface used to join the group
    #[serde(default = "default_multicast_interface")]
    pub interface: String,
}

fn default_multicast_group() -> String {
    "239.2.3.1".to_string()
}

fn default_multicast_port() -> u16 {
    6969
}

fn default_multicast_interface() -> String {
    "0.0.0.0".to_string()
}

impl Default for MulticastConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            group: default_multicast_group(),
            port: default_multicast_port(),
            interface: default_multicast_interface(),
        }
    }
}

impl MulticastConfig {
    pub fn group_addr(&self) -> Result<Ipv4Addr> {
        self.group.parse().map_err(|_| {
            ConfigError::invalid_value("listener.multicast.group", "not an IPv4 address").into()
        })
    }

    pub fn interface_addr(&self) -> Result<Ipv4Addr> {
        self.interface.parse().map_err(|_| {
            ConfigError::invalid_value("listener.multicast.interface", "not an IPv4 address")
                .into()
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if !self.group_addr()?.is_multicast() {
            return Err(ConfigError::invalid_value(
                "listener.multicast.group",
                format!("{} is not a multicast address", self.group),
            )
            .into());
        }
        self.interface_addr()?;
        Ok(())
    }
}

/// How producers behave when the fan-out queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// Drop the message
    #[default]
    DropOnFull,
    /// Wait for space
    BlockOnFull,
    /// Wait up to `dispatch_timeout_ms`, then drop
    TryForTimeout,
}

/// Subscriber fan-out configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutConfig {
    /// Consecutive send failures before a connection is evicted
    #[serde(default = "default_max_failed_attempts")]
    pub max_failed_attempts: u32,

    /// Upper bound on a single send to one subscriber
    #[serde(default = "default_send_timeout")]
    pub send_timeout_ms: u64,

    /// Outbound queue per WebSocket client
    #[serde(default = "default_client_queue")]
    pub client_queue_capacity: usize,

    /// Queue between producers and the dispatcher task
    #[serde(default = "default_dispatch_queue")]
    pub dispatch_queue_capacity: usize,

    #[serde(default)]
    pub dispatch_mode: DispatchMode,

    #[serde(default = "default_dispatch_timeout")]
    pub dispatch_timeout_ms: u64,
}

fn default_max_failed_attempts() -> u32 {
    3
}

fn default_send_timeout() -> u64 {
    2000
}

fn default_client_queue() -> usize {
    256
}

fn default_dispatch_queue() -> usize {
    4096
}

fn default_dispatch_timeout() -> u64 {
    100
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            max_failed_attempts: default_max_failed_attempts(),
            send_timeout_ms: default_send_timeout(),
            client_queue_capacity: default_client_queue(),
            dispatch_queue_capacity: default_dispatch_queue(),
            dispatch_mode: DispatchMode::default(),
            dispatch_timeout_ms: default_dispatch_timeout(),
        }
    }
}

impl FanoutConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_failed_attempts == 0 {
            return Err(ConfigError::invalid_value(
                "fanout.max_failed_attempts",
                "must be at least 1",
            )
            .into());
        }
        if self.send_timeout_ms == 0 {
            return Err(ConfigError::invalid_value(
                "fanout.send_timeout_ms",
                "must be greater than 0",
            )
            .into());
        }
        if self.client_queue_capacity == 0 || self.dispatch_queue_capacity == 0 {
            return Err(
                ConfigError::invalid_value("fanout", "queue capacities must be at least 1").into(),
            );
        }
        Ok(())
    }
}

/// Geofence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeofenceConfig {
    /// Run positions through the geofence engine
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// YAML file with zone definitions loaded at startup
    #[serde(default)]
    pub zones_file: Option<PathBuf>,
}

impl Default for GeofenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            zones_file: None,
        }
    }
}

/// Defaults applied when encoding markers to events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodecConfig {
    /// Validity window of an encoded marker
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,
}

fn default_stale_after() -> u64 {
    300
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: default_stale_after(),
        }
    }
}

impl CodecConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

/// API server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Whether the API server is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// API server bind address
    #[serde(default = "default_api_host")]
    pub host: String,

    /// API server port
    #[serde(default = "default_api_port")]
    pub port: u16,

    /// Whether to enable CORS
    #[serde(default = "default_true")]
    pub cors: bool,

    /// Maximum request body size in bytes
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_max_body_size() -> usize {
    1024 * 1024
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_api_host(),
            port: default_api_port(),
            cors: true,
            max_body_size: default_max_body_size(),
        }
    }
}

impl ApiConfig {
    pub fn validate(&self) -> Result<()> {
        if self.enabled && self.port == 0 {
            return Err(ConfigError::invalid_value("api.port", "Port cannot be 0").into());
        }
        Ok(())
    }

    /// Returns the API server bind address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "text" or "json"
    #[serde(default)]
    pub format: LogFormat,

    /// Whether to include file/line info
    #[serde(default)]
    pub file_line: bool,

    /// Per-module log levels, e.g. `takwire::listener: debug`
    #[serde(default)]
    pub module_levels: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
            file_line: false,
            module_levels: HashMap::new(),
        }
    }
}

impl LoggingConfig {
    /// Parses the log level string to a tracing Level.
    pub fn parse_level(&self) -> Result<Level> {
        self.level.parse().map_err(|_| {
            ConfigError::invalid_value("logging.level", format!("Invalid log level: {}", self.level))
                .into()
        })
    }

    /// Filter directives in `EnvFilter` syntax: the global level followed by
    /// per-module overrides.
    pub fn filter_directives(&self) -> String {
        let mut modules: Vec<_> = self.module_levels.iter().collect();
        modules.sort();

        let mut directives = vec![self.level.clone()];
        directives.extend(modules.into_iter().map(|(m, l)| format!("{m}={l}")));
        directives.join(",")
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON format for structured logging
    Json,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Install the Prometheus recorder and expose the endpoint
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics endpoint path
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl MetricsConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.path.starts_with('/') || self.path.len() < 2 {
            return Err(ConfigError::invalid_value(
                "metrics.path",
                format!("Path must start with '/': {}", self.path),
            )
            .into());
        }
        Ok(())
    }
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_metrics_path(),
        }
    }
}
