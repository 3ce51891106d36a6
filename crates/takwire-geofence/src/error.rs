use thiserror::Error;

pub type Result<T> = std::result::Result<T, GeofenceError>;

#[derive(Error, Debug)]
pub enum GeofenceError {
    #[error("Invalid zone {zone_id}: {reason}")]
    InvalidZone { zone_id: String, reason: String },

    #[error("Zone not found: {0}")]
    NotFound(String),

    #[error("Failed to read zones file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid zones file {path}: {reason}")]
    Format { path: String, reason: String },
}

impl GeofenceError {
    pub fn invalid_zone(zone_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidZone {
            zone_id: zone_id.into(),
            reason: reason.into(),
        }
    }
}
