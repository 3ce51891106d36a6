//! # takwire core
//!
//! Configuration and the shared error taxonomy for the takwire event pipeline.
//!
//! - **Errors**: `thiserror` enums for transport, delivery, capacity and
//!   configuration failures. All of them serialize so the HTTP surface can
//!   return them as-is.
//! - **Configuration**: a single [`AppConfig`] loaded from YAML, optionally
//!   layered with `TAKWIRE__`-prefixed environment variables, with defaults
//!   for every field.
//!
//! ## Example
//!
//! ```
//! use takwire_core::config::AppConfig;
//!
//! let config = AppConfig::from_yaml("listener:\n  stream_port: 9000\n").unwrap();
//! assert_eq!(config.listener.stream_port, 9000);
//! assert_eq!(config.listener.datagram_port, 4242);
//! assert!(config.validate().is_ok());
//! ```

pub mod config;
pub mod error;

pub use config::AppConfig;
pub use error::{CapacityError, DeliveryError, Result, TakwireError, TransportError};
