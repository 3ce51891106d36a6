//! Adapters between CoT events and the application's own marker records.

use crate::event::{Contact, Detail, Event, Group, Point};
use crate::mapping::{argb_to_hex, classify, color_to_team, hex_to_argb, KindTable, MarkerKind};
use crate::validate::{validate_coordinates, ValidationError};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// `how` stamped on events built from markers
pub const MARKER_HOW: &str = "m-g";

/// A map entity as the rest of the application stores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub altitude: f64,
    #[serde(rename = "type", default)]
    pub kind: MarkerKind,
    /// Hex color, `#rrggbb` or `#aarrggbb`
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Wire type the marker arrived with, if it came from CoT
    #[serde(default)]
    pub cot_type: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Marker {
    /// Event that deletes this marker on receiving clients.
    pub fn tombstone_event(&self, now: DateTime<Utc>) -> Result<Event, ValidationError> {
        Event::from_marker(self, now, Duration::zero())
    }
}

impl Event {
    /// Build a wire event for a marker, valid from `now` for `stale_after`.
    ///
    /// The callsign falls back to the marker id. A team given on the marker
    /// always wins over one derived from its color.
    pub fn from_marker(
        marker: &Marker,
        now: DateTime<Utc>,
        stale_after: Duration,
    ) -> Result<Event, ValidationError> {
        validate_coordinates(marker.lat, marker.lng)?;
        if marker.id.is_empty() {
            return Err(ValidationError::EmptyUid);
        }

        let event_type = match (&marker.kind, &marker.cot_type) {
            (MarkerKind::Unknown, Some(cot_type)) if !cot_type.is_empty() => cot_type.clone(),
            (kind, _) => kind.wire_type().to_string(),
        };

        let team = marker.team.clone().or_else(|| {
            marker
                .color
                .as_deref()
                .and_then(color_to_team)
                .map(str::to_string)
        });
        let group = (team.is_some() || marker.role.is_some()).then(|| Group {
            name: team,
            role: marker.role.clone(),
        });

        let callsign = marker
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| marker.id.clone());

        Ok(Event {
            version: "2.0".to_string(),
            uid: marker.id.clone(),
            event_type,
            time: now,
            start: now,
            stale: now + stale_after,
            how: MARKER_HOW.to_string(),
            point: Point::new(marker.lat, marker.lng, marker.altitude),
            detail: Detail {
                contact: Some(Contact {
                    endpoint: None,
                    callsign,
                }),
                group,
                remarks: marker.description.clone().filter(|d| !d.is_empty()),
                track: None,
                color: marker.color.as_deref().and_then(hex_to_argb),
                archive: false,
                relay: false,
            },
        })
    }

    /// Marker record for this event using the standard kind table.
    pub fn to_marker(&self) -> Marker {
        self.to_marker_with(KindTable::standard())
    }

    pub fn to_marker_with(&self, table: &KindTable) -> Marker {
        Marker {
            id: self.uid.clone(),
            name: Some(self.callsign().unwrap_or(&self.uid).to_string()),
            lat: self.point.lat,
            lng: self.point.lon,
            altitude: self.point.hae,
            kind: classify(table, self),
            color: self.detail.color.map(argb_to_hex),
            team: self.team().map(str::to_string),
            role: self.role().map(str::to_string),
            description: self.remarks().map(str::to_string),
            cot_type: Some(self.event_type.clone()),
            source: Some("cot".to_string()),
            timestamp: Some(self.time),
        }
    }
}
