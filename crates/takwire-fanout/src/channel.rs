//! Topic names

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The fixed set of topics a connection can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Positions,
    Status,
    Messages,
    Alerts,
    Cot,
    Geofence,
    Missions,
    System,
    Markers,
    Overlays,
    Drawings,
    Symbols,
    Camera,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown channel: {0}")]
pub struct UnknownChannel(pub String);

impl Channel {
    pub const ALL: [Channel; 13] = [
        Channel::Positions,
        Channel::Status,
        Channel::Messages,
        Channel::Alerts,
        Channel::Cot,
        Channel::Geofence,
        Channel::Missions,
        Channel::System,
        Channel::Markers,
        Channel::Overlays,
        Channel::Drawings,
        Channel::Symbols,
        Channel::Camera,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Positions => "positions",
            Channel::Status => "status",
            Channel::Messages => "messages",
            Channel::Alerts => "alerts",
            Channel::Cot => "cot",
            Channel::Geofence => "geofence",
            Channel::Missions => "missions",
            Channel::System => "system",
            Channel::Markers => "markers",
            Channel::Overlays => "overlays",
            Channel::Drawings => "drawings",
            Channel::Symbols => "symbols",
            Channel::Camera => "camera",
        }
    }
}

impl FromStr for Channel {
    type Err = UnknownChannel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Channel::ALL
            .iter()
            .find(|c| c.as_str() == s)
            .copied()
            .ok_or_else(|| UnknownChannel(s.to_string()))
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
