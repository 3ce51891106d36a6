//! Error types for the takwire event pipeline.
//!
//! Decode and validation errors live next to the codec in `takwire-cot`. This
//! module holds the failures shared across crates: socket transport,
//! subscriber delivery, capacity limits and configuration.

use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// Result type alias using TakwireError as the error type.
pub type Result<T> = std::result::Result<T, TakwireError>;

/// Top-level error type for pipeline operations.
#[derive(Debug, Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "details")]
pub enum TakwireError {
    /// Socket bind/accept/read/write failures
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Subscriber delivery failures
    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// Connection or queue limits reached
    #[error("Capacity error: {0}")]
    Capacity(#[from] CapacityError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Internal errors that shouldn't normally occur
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised by the stream and datagram listeners.
///
/// A bind failure is fatal for the listener that raised it and is returned
/// from `start()`. Everything else is scoped to a single connection.
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum TransportError {
    /// Could not bind the listening socket
    #[error("Failed to bind {transport} listener on {address}: {reason}")]
    Bind {
        transport: String,
        address: String,
        reason: String,
    },

    /// accept() failed
    #[error("Accept failed on {address}: {reason}")]
    Accept { address: String, reason: String },

    /// Read from a live connection failed
    #[error("Read from {peer} failed: {reason}")]
    Read { peer: String, reason: String },

    /// Write to a live connection failed
    #[error("Write to {peer} failed: {reason}")]
    Write { peer: String, reason: String },

    /// Joining a multicast group failed
    #[error("Failed to join multicast group {group}: {reason}")]
    Multicast { group: String, reason: String },

    /// The listener is already running
    #[error("Listener already running")]
    AlreadyRunning,
}

impl TransportError {
    /// Creates a bind error.
    pub fn bind(
        transport: impl Into<String>,
        address: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        Self::Bind {
            transport: transport.into(),
            address: address.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a read error for a connection.
    pub fn read(peer: impl ToString, reason: impl ToString) -> Self {
        Self::Read {
            peer: peer.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Creates a write error for a connection.
    pub fn write(peer: impl ToString, reason: impl ToString) -> Self {
        Self::Write {
            peer: peer.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Returns true if the error stops a whole listener rather than one connection.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TransportError::Bind { .. }
                | TransportError::Multicast { .. }
                | TransportError::AlreadyRunning
        )
    }
}

/// Errors from delivering a message to one subscriber.
///
/// These never reach the publisher; the registry counts them and evicts.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum DeliveryError {
    /// No connection with this id is registered
    #[error("Connection not found: {connection_id}")]
    ConnectionNotFound { connection_id: String },

    /// Transport is closed; no retry will succeed
    #[error("Connection {connection_id} is closed")]
    Closed { connection_id: String },

    /// Transport is still up but not accepting messages
    #[error("Connection {connection_id} is not open")]
    NotOpen { connection_id: String },

    /// Send did not complete within the configured timeout
    #[error("Send to {connection_id} timed out after {timeout_ms}ms")]
    Timeout {
        connection_id: String,
        timeout_ms: u64,
    },

    /// Send failed for any other reason
    #[error("Send to {connection_id} failed: {reason}")]
    Failed {
        connection_id: String,
        reason: String,
    },

    /// Message could not be serialized
    #[error("Failed to serialize message: {reason}")]
    Serialization { reason: String },
}

impl DeliveryError {
    /// True for failures that evict the connection without waiting for the threshold.
    pub fn is_definitive(&self) -> bool {
        matches!(
            self,
            DeliveryError::Closed { .. } | DeliveryError::ConnectionNotFound { .. }
        )
    }
}

/// Limits being hit.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum CapacityError {
    /// Too many concurrent stream connections
    #[error("Connection limit of {limit} reached, rejecting {peer}")]
    ConnectionLimit { limit: usize, peer: String },

    /// A bounded queue is full
    #[error("Queue '{queue}' is full (capacity {capacity})")]
    QueueFull { queue: String, capacity: usize },

    /// Receive buffer grew past its cap without yielding a frame
    #[error("Receive buffer from {peer} exceeded {limit} bytes")]
    BufferOverflow { limit: usize, peer: String },
}

/// Configuration errors.
///
/// These occur when loading, parsing, or validating configuration files.
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {reason}")]
    LoadFailed { path: String, reason: String },

    /// Invalid configuration format
    #[error("Invalid configuration format: {reason}")]
    InvalidFormat { reason: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ConfigError {
    /// Creates a file not found error.
    pub fn file_not_found(path: impl Into<String>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Creates an invalid value error.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Wrapper for I/O errors to make them serializable.
#[derive(Debug, Error, Serialize, Deserialize)]
#[error("I/O error: {kind:?}: {message}")]
pub struct IoError {
    pub kind: IoErrorKind,
    pub message: String,
}

impl From<io::Error> for IoError {
    fn from(err: io::Error) -> Self {
        Self {
            kind: err.kind().into(),
            message: err.to_string(),
        }
    }
}

impl From<io::Error> for TakwireError {
    fn from(err: io::Error) -> Self {
        TakwireError::Io(err.into())
    }
}

/// Serializable subset of std::io::ErrorKind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IoErrorKind {
    NotFound,
    PermissionDenied,
    ConnectionRefused,
    ConnectionReset,
    ConnectionAborted,
    AddrInUse,
    AddrNotAvailable,
    BrokenPipe,
    TimedOut,
    UnexpectedEof,
    Other,
}

impl From<io::ErrorKind> for IoErrorKind {
    fn from(kind: io::ErrorKind) -> Self {
        match kind {
            io::ErrorKind::NotFound => IoErrorKind::NotFound,
            io::ErrorKind::PermissionDenied => IoErrorKind::PermissionDenied,
            io::ErrorKind::ConnectionRefused => IoErrorKind::ConnectionRefused,
            io::ErrorKind::ConnectionReset => IoErrorKind::ConnectionReset,
            io::ErrorKind::ConnectionAborted => IoErrorKind::ConnectionAborted,
            io::ErrorKind::AddrInUse => IoErrorKind::AddrInUse,
            io::ErrorKind::AddrNotAvailable => IoErrorKind::AddrNotAvailable,
            io::ErrorKind::BrokenPipe => IoErrorKind::BrokenPipe,
            io::ErrorKind::TimedOut => IoErrorKind::TimedOut,
            io::ErrorKind::UnexpectedEof => IoErrorKind::UnexpectedEof,
            _ => IoErrorKind::Other,
        }
    }
}
