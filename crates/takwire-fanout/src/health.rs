//! Connection health snapshots

use crate::channel::Channel;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// No failed sends since the last success
    Healthy,
    /// Some failed sends, still below the eviction threshold
    Degraded,
    /// At or past the eviction threshold
    Unhealthy,
}

impl HealthStatus {
    pub fn from_failures(failed_attempts: u32, max_failed_attempts: u32) -> Self {
        if failed_attempts == 0 {
            HealthStatus::Healthy
        } else if failed_attempts < max_failed_attempts {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionHealth {
    pub connection_id: String,
    pub user_id: Option<String>,
    pub healthy: bool,
    pub status: HealthStatus,
    pub failed_attempts: u32,
    pub max_failed_attempts: u32,
    pub duration_seconds: f64,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub last_activity: DateTime<Utc>,
    pub channels: Vec<Channel>,
}

/// Registry-wide totals. A connection with any failed send since its last
/// success counts as unhealthy here.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FanoutStats {
    pub total_connections: usize,
    pub healthy_connections: usize,
    pub unhealthy_connections: usize,
    pub total_channels: usize,
    pub total_messages_sent: u64,
    pub total_messages_received: u64,
    pub channels: BTreeMap<Channel, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_thresholds() {
        assert_eq!(HealthStatus::from_failures(0, 3), HealthStatus::Healthy);
        assert_eq!(HealthStatus::from_failures(1, 3), HealthStatus::Degraded);
        assert_eq!(HealthStatus::from_failures(2, 3), HealthStatus::Degraded);
        assert_eq!(HealthStatus::from_failures(3, 3), HealthStatus::Unhealthy);
    }
}
