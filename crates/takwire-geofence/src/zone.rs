//! Zone definitions and containment

use crate::error::{GeofenceError, Result};
use crate::geo::{haversine_distance, GeoPoint};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use takwire_cot::validate_coordinates;

/// What a zone is for. Carried through to alerts; evaluation is the same
/// for every kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneKind {
    Inclusion,
    #[default]
    Exclusion,
    Alert,
    Safe,
}

impl ZoneKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneKind::Inclusion => "inclusion",
            ZoneKind::Exclusion => "exclusion",
            ZoneKind::Alert => "alert",
            ZoneKind::Safe => "safe",
        }
    }
}

impl fmt::Display for ZoneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum ZoneShape {
    Circle { center: GeoPoint, radius_meters: f64 },
    /// Vertices in order; the ring closes implicitly.
    Polygon { vertices: Vec<GeoPoint> },
}

/// A named region evaluated against entity positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub shape: ZoneShape,
    #[serde(default)]
    pub kind: ZoneKind,
    #[serde(default = "default_true")]
    pub alert_on_entry: bool,
    #[serde(default)]
    pub alert_on_exit: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

fn default_true() -> bool {
    true
}

impl Zone {
    /// Circle zone with entry alerts only.
    pub fn circle(
        id: impl Into<String>,
        name: impl Into<String>,
        center: GeoPoint,
        radius_meters: f64,
    ) -> Self {
        Self::with_shape(
            id,
            name,
            ZoneShape::Circle {
                center,
                radius_meters,
            },
        )
    }

    pub fn polygon(id: impl Into<String>, name: impl Into<String>, vertices: Vec<GeoPoint>) -> Self {
        Self::with_shape(id, name, ZoneShape::Polygon { vertices })
    }

    fn with_shape(id: impl Into<String>, name: impl Into<String>, shape: ZoneShape) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            shape,
            kind: ZoneKind::default(),
            alert_on_entry: true,
            alert_on_exit: false,
            enabled: true,
            metadata: HashMap::new(),
        }
    }

    pub fn with_kind(mut self, kind: ZoneKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_alerts(mut self, on_entry: bool, on_exit: bool) -> Self {
        self.alert_on_entry = on_entry;
        self.alert_on_exit = on_exit;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Reference point for distances: the circle center or the polygon's
    /// vertex centroid.
    pub fn center(&self) -> GeoPoint {
        match &self.shape {
            ZoneShape::Circle { center, .. } => *center,
            ZoneShape::Polygon { vertices } => {
                if vertices.is_empty() {
                    return GeoPoint::new(0.0, 0.0);
                }
                let n = vertices.len() as f64;
                let (lat, lon) = vertices
                    .iter()
                    .fold((0.0, 0.0), |(lat, lon), v| (lat + v.lat, lon + v.lon));
                GeoPoint::new(lat / n, lon / n)
            }
        }
    }

    pub fn distance_from_center(&self, lat: f64, lon: f64) -> f64 {
        let center = self.center();
        haversine_distance(center.lat, center.lon, lat, lon)
    }

    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        match &self.shape {
            ZoneShape::Circle {
                center,
                radius_meters,
            } => haversine_distance(center.lat, center.lon, lat, lon) <= *radius_meters,
            ZoneShape::Polygon { vertices } => point_in_polygon(vertices, lat, lon),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(GeofenceError::invalid_zone("", "empty id"));
        }

        let check_point = |p: &GeoPoint| {
            validate_coordinates(p.lat, p.lon)
                .map_err(|e| GeofenceError::invalid_zone(&self.id, e.to_string()))
        };

        match &self.shape {
            ZoneShape::Circle {
                center,
                radius_meters,
            } => {
                check_point(center)?;
                if !radius_meters.is_finite() || *radius_meters < 0.0 {
                    return Err(GeofenceError::invalid_zone(
                        &self.id,
                        format!("radius must be >= 0, got {radius_meters}"),
                    ));
                }
            }
            ZoneShape::Polygon { vertices } => {
                if vertices.len() < 3 {
                    return Err(GeofenceError::invalid_zone(
                        &self.id,
                        format!("polygon needs at least 3 vertices, got {}", vertices.len()),
                    ));
                }
                vertices.iter().try_for_each(check_point)?;
            }
        }

        Ok(())
    }
}

/// Even-odd ray cast in the lon/lat plane.
fn point_in_polygon(vertices: &[GeoPoint], lat: f64, lon: f64) -> bool {
    if vertices.len() < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = vertices.len() - 1;
    for i in 0..vertices.len() {
        let (a, b) = (&vertices[i], &vertices[j]);
        if (a.lat > lat) != (b.lat > lat)
            && lon < (b.lon - a.lon) * (lat - a.lat) / (b.lat - a.lat) + a.lon
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}
