//! Edge-detecting evaluation of entity positions against zones

use crate::error::{GeofenceError, Result};
use crate::store::ZoneStore;
use crate::zone::{Zone, ZoneKind};
use chrono::{DateTime, Utc};
use metrics::counter;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use takwire_cot::validate_coordinates;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertKind {
    #[serde(rename = "geofence_entry")]
    Entry,
    #[serde(rename = "geofence_exit")]
    Exit,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Entry => "geofence_entry",
            AlertKind::Exit => "geofence_exit",
        }
    }
}

/// A zone boundary crossing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub entity_id: String,
    pub zone_id: String,
    pub zone_name: String,
    pub zone_kind: ZoneKind,
    pub lat: f64,
    pub lon: f64,
    pub distance_from_center: f64,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl Alert {
    fn new(kind: AlertKind, entity_id: &str, zone: &Zone, lat: f64, lon: f64) -> Self {
        let verb = match kind {
            AlertKind::Entry => "entered",
            AlertKind::Exit => "exited",
        };
        Self {
            kind,
            entity_id: entity_id.to_string(),
            zone_id: zone.id.clone(),
            zone_name: zone.name.clone(),
            zone_kind: zone.kind,
            lat,
            lon,
            distance_from_center: zone.distance_from_center(lat, lon),
            timestamp: Utc::now(),
            message: format!("Entity {} {} zone {}", entity_id, verb, zone.name),
        }
    }
}

/// Zone paired with its distance from a query point.
#[derive(Debug, Clone, Serialize)]
pub struct ZoneDistance {
    #[serde(flatten)]
    pub zone: Zone,
    pub distance_meters: f64,
}

/// Holds zones and the last known inside/outside state of every entity
/// against every zone.
///
/// Lock order is zones, then states.
pub struct GeofenceEngine {
    zones: RwLock<BTreeMap<String, Zone>>,
    states: Mutex<HashMap<String, HashMap<String, bool>>>,
}

impl GeofenceEngine {
    pub fn new() -> Self {
        Self {
            zones: RwLock::new(BTreeMap::new()),
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Engine preloaded with `zones`. Fails on the first invalid zone.
    pub fn with_zones(zones: impl IntoIterator<Item = Zone>) -> Result<Self> {
        let engine = Self::new();
        for zone in zones {
            engine.upsert_zone(zone)?;
        }
        Ok(engine)
    }

    /// Replace the zone set with everything the store holds.
    pub async fn load_from(&self, store: &dyn ZoneStore) -> Result<usize> {
        let zones = store.load().await?;
        for zone in &zones {
            zone.validate()?;
        }

        let count = zones.len();
        let mut current = self.zones.write();
        *current = zones.into_iter().map(|z| (z.id.clone(), z)).collect();
        let mut states = self.states.lock();
        for per_zone in states.values_mut() {
            per_zone.retain(|zone_id, _| current.contains_key(zone_id));
        }

        info!(zones = count, "Loaded geofence zones");
        Ok(count)
    }

    /// Evaluate a position report and return the crossings it causes.
    ///
    /// Every enabled zone's state is updated whether or not an alert fires.
    /// Coordinates out of range produce no alerts and leave state untouched.
    pub fn check_position(&self, entity_id: &str, lat: f64, lon: f64) -> Vec<Alert> {
        if let Err(e) = validate_coordinates(lat, lon) {
            debug!(entity_id, error = %e, "Skipping geofence check");
            return Vec::new();
        }

        let zones = self.zones.read();
        let mut states = self.states.lock();
        let entity_state = states.entry(entity_id.to_string()).or_default();

        let mut alerts = Vec::new();
        for zone in zones.values().filter(|z| z.enabled) {
            let inside = zone.contains(lat, lon);
            let was_inside = entity_state.get(&zone.id).copied().unwrap_or(false);

            if inside && !was_inside && zone.alert_on_entry {
                alerts.push(Alert::new(AlertKind::Entry, entity_id, zone, lat, lon));
            } else if !inside && was_inside && zone.alert_on_exit {
                alerts.push(Alert::new(AlertKind::Exit, entity_id, zone, lat, lon));
            }

            entity_state.insert(zone.id.clone(), inside);
        }

        for alert in &alerts {
            debug!(
                entity_id,
                zone_id = %alert.zone_id,
                kind = alert.kind.as_str(),
                "Geofence crossing"
            );
            counter!("takwire_geofence_alerts_total", "kind" => alert.kind.as_str()).increment(1);
        }

        alerts
    }

    /// Enabled zones containing the point, nearest center first.
    pub fn zones_containing(&self, lat: f64, lon: f64) -> Vec<ZoneDistance> {
        let mut hits: Vec<ZoneDistance> = self
            .zones
            .read()
            .values()
            .filter(|z| z.enabled && z.contains(lat, lon))
            .map(|z| ZoneDistance {
                distance_meters: z.distance_from_center(lat, lon),
                zone: z.clone(),
            })
            .collect();
        sort_by_distance(&mut hits);
        hits
    }

    /// Up to `limit` enabled zones, nearest center first.
    pub fn nearest_zones(&self, lat: f64, lon: f64, limit: usize) -> Vec<ZoneDistance> {
        let mut all: Vec<ZoneDistance> = self
            .zones
            .read()
            .values()
            .filter(|z| z.enabled)
            .map(|z| ZoneDistance {
                distance_meters: z.distance_from_center(lat, lon),
                zone: z.clone(),
            })
            .collect();
        sort_by_distance(&mut all);
        all.truncate(limit);
        all
    }

    /// Insert or replace a zone. Returns the previous definition.
    ///
    /// Replacing a zone with a different shape drops every entity's state for
    /// it, so the next report is judged against the new geometry alone.
    pub fn upsert_zone(&self, zone: Zone) -> Result<Option<Zone>> {
        zone.validate()?;
        debug!(zone_id = %zone.id, name = %zone.name, "Upserting zone");

        let mut zones = self.zones.write();
        let zone_id = zone.id.clone();
        let previous = zones.insert(zone_id.clone(), zone);

        let reshaped = match (&previous, zones.get(&zone_id)) {
            (Some(old), Some(new)) => old.shape != new.shape,
            _ => false,
        };
        if reshaped {
            let mut states = self.states.lock();
            for per_zone in states.values_mut() {
                per_zone.remove(&zone_id);
            }
            debug!(zone_id = %zone_id, "Zone geometry changed, cleared entity state");
        }

        Ok(previous)
    }

    /// Remove a zone and every entity's state for it.
    pub fn remove_zone(&self, zone_id: &str) -> Result<Zone> {
        let mut zones = self.zones.write();
        let removed = zones
            .remove(zone_id)
            .ok_or_else(|| GeofenceError::NotFound(zone_id.to_string()))?;

        let mut states = self.states.lock();
        for per_zone in states.values_mut() {
            per_zone.remove(zone_id);
        }

        debug!(zone_id, "Removed zone");
        Ok(removed)
    }

    pub fn zone(&self, zone_id: &str) -> Option<Zone> {
        self.zones.read().get(zone_id).cloned()
    }

    pub fn zones(&self, enabled_only: bool) -> Vec<Zone> {
        self.zones
            .read()
            .values()
            .filter(|z| !enabled_only || z.enabled)
            .cloned()
            .collect()
    }

    pub fn zone_count(&self) -> usize {
        self.zones.read().len()
    }

    /// Drop all state for an entity, e.g. after its tombstone.
    pub fn forget_entity(&self, entity_id: &str) -> bool {
        self.states.lock().remove(entity_id).is_some()
    }

    pub fn tracked_entities(&self) -> usize {
        self.states.lock().len()
    }
}

impl Default for GeofenceEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn sort_by_distance(zones: &mut [ZoneDistance]) {
    zones.sort_by(|a, b| a.distance_meters.total_cmp(&b.distance_meters));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoPoint;

    const INSIDE: (f64, f64) = (48.0, 11.0);
    const OUTSIDE: (f64, f64) = (48.1, 11.0);

    fn engine_with(zone: Zone) -> GeofenceEngine {
        GeofenceEngine::with_zones([zone]).unwrap()
    }

    fn depot() -> Zone {
        Zone::circle("depot", "Depot", GeoPoint::new(48.0, 11.0), 500.0)
    }

    #[test]
    fn test_entry_fires_once() {
        let engine = engine_with(depot());

        assert!(engine.check_position("e1", OUTSIDE.0, OUTSIDE.1).is_empty());

        let alerts = engine.check_position("e1", INSIDE.0, INSIDE.1);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::Entry);
        assert_eq!(alerts[0].zone_id, "depot");
        assert_eq!(alerts[0].message, "Entity e1 entered zone Depot");

        assert!(engine.check_position("e1", INSIDE.0, INSIDE.1).is_empty());
    }

    #[test]
    fn test_first_report_inside_is_entry() {
        let engine = engine_with(depot());
        assert_eq!(engine.check_position("e1", INSIDE.0, INSIDE.1).len(), 1);
    }

    #[test]
    fn test_silent_exit_and_reentry() {
        let engine = engine_with(depot());

        assert_eq!(engine.check_position("e1", INSIDE.0, INSIDE.1).len(), 1);
        assert!(engine.check_position("e1", OUTSIDE.0, OUTSIDE.1).is_empty());

        let alerts = engine.check_position("e1", INSIDE.0, INSIDE.1);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::Entry);
    }

    #[test]
    fn test_exit_alert() {
        let engine = engine_with(depot().with_alerts(false, true));

        assert!(engine.check_position("e1", INSIDE.0, INSIDE.1).is_empty());
        let alerts = engine.check_position("e1", OUTSIDE.0, OUTSIDE.1);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::Exit);
        assert_eq!(alerts[0].message, "Entity e1 exited zone Depot");
        assert!(alerts[0].distance_from_center > 500.0);
    }

    #[test]
    fn test_entities_are_independent() {
        let engine = engine_with(depot());
        assert_eq!(engine.check_position("e1", INSIDE.0, INSIDE.1).len(), 1);
        assert_eq!(engine.check_position("e2", INSIDE.0, INSIDE.1).len(), 1);
    }

    #[test]
    fn test_disabled_zone_is_skipped() {
        let engine = engine_with(depot().with_enabled(false));
        assert!(engine.check_position("e1", INSIDE.0, INSIDE.1).is_empty());
        assert!(engine.zones_containing(INSIDE.0, INSIDE.1).is_empty());
        assert!(engine.nearest_zones(INSIDE.0, INSIDE.1, 5).is_empty());
    }

    #[test]
    fn test_invalid_coordinates() {
        let engine = engine_with(depot());
        assert!(engine.check_position("e1", 91.0, 0.0).is_empty());
        assert!(engine.check_position("e1", f64::NAN, 0.0).is_empty());
        assert_eq!(engine.tracked_entities(), 0);
    }

    #[test]
    fn test_remove_zone_purges_state() {
        let engine = engine_with(depot());
        assert_eq!(engine.check_position("e1", INSIDE.0, INSIDE.1).len(), 1);

        engine.remove_zone("depot").unwrap();
        assert!(matches!(
            engine.remove_zone("depot"),
            Err(GeofenceError::NotFound(_))
        ));

        engine.upsert_zone(depot()).unwrap();
        assert_eq!(engine.check_position("e1", INSIDE.0, INSIDE.1).len(), 1);
    }

    #[test]
    fn test_reshaped_zone_starts_fresh() {
        let engine = engine_with(depot());
        assert_eq!(engine.check_position("e1", INSIDE.0, INSIDE.1).len(), 1);

        // Renaming keeps state
        let mut renamed = depot();
        renamed.name = "Depot North".to_string();
        engine.upsert_zone(renamed).unwrap();
        assert!(engine.check_position("e1", INSIDE.0, INSIDE.1).is_empty());

        // Moving the zone away does not report an exit the entity never made
        let moved = Zone::circle("depot", "Depot", GeoPoint::new(49.0, 11.0), 500.0);
        assert!(engine.upsert_zone(moved).unwrap().is_some());
        assert!(engine.check_position("e1", INSIDE.0, INSIDE.1).is_empty());

        // Moving it back over the entity is a fresh entry
        engine.upsert_zone(depot()).unwrap();
        let alerts = engine.check_position("e1", INSIDE.0, INSIDE.1);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::Entry);
    }

    #[test]
    fn test_resized_zone_does_not_keep_stale_inside() {
        let engine = engine_with(depot());
        assert_eq!(engine.check_position("e1", INSIDE.0, INSIDE.1).len(), 1);

        // Grown to cover OUTSIDE too: the old "inside" flag is discarded
        let grown = Zone::circle("depot", "Depot", GeoPoint::new(48.0, 11.0), 20_000.0);
        engine.upsert_zone(grown).unwrap();
        let alerts = engine.check_position("e1", OUTSIDE.0, OUTSIDE.1);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::Entry);
    }

    #[test]
    fn test_forget_entity() {
        let engine = engine_with(depot());
        engine.check_position("e1", INSIDE.0, INSIDE.1);
        assert!(engine.forget_entity("e1"));
        assert!(!engine.forget_entity("e1"));
        assert_eq!(engine.check_position("e1", INSIDE.0, INSIDE.1).len(), 1);
    }

    #[test]
    fn test_distance_ordering() {
        let engine = GeofenceEngine::with_zones([
            Zone::circle("far", "Far", GeoPoint::new(48.01, 11.0), 5_000.0),
            Zone::circle("near", "Near", GeoPoint::new(48.001, 11.0), 5_000.0),
            Zone::circle("away", "Away", GeoPoint::new(49.0, 11.0), 100.0),
        ])
        .unwrap();

        let containing: Vec<_> = engine
            .zones_containing(48.0, 11.0)
            .into_iter()
            .map(|z| z.zone.id)
            .collect();
        assert_eq!(containing, ["near", "far"]);

        let nearest: Vec<_> = engine
            .nearest_zones(48.0, 11.0, 2)
            .into_iter()
            .map(|z| z.zone.id)
            .collect();
        assert_eq!(nearest, ["near", "far"]);
        assert_eq!(engine.nearest_zones(48.0, 11.0, 10).len(), 3);
    }

    #[test]
    fn test_upsert_rejects_invalid() {
        let engine = GeofenceEngine::new();
        let bad = Zone::circle("bad", "Bad", GeoPoint::new(0.0, 0.0), -5.0);
        assert!(engine.upsert_zone(bad).is_err());
        assert_eq!(engine.zone_count(), 0);
    }
}
