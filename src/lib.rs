//! # takwire
//!
//! CoT gateway: a socket listener that extracts events from TAK client
//! traffic, an ingest pipeline that decodes them and runs the geofence
//! engine, and the WebSocket fan-out that pushes the results to browsers.
//!
//! ```text
//! TAK clients ──► CotListener ──► flume queue ──► Pipeline ──► Publisher ──► WebSocket clients
//!                     ▲                              │
//!                     │                              └──► GeofenceEngine (alerts)
//!   HTTP markers ─────┘ (pushed back to stream clients)
//! ```

pub mod listener;
pub mod pipeline;
pub mod status;

pub use listener::{CotListener, InboundFrame, ListenerStats};
pub use pipeline::{Pipeline, PipelineCounters, PipelineStats};
pub use status::{status_router, StatusState};
