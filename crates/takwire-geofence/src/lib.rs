//! Geofence engine
//!
//! Zones are circles (haversine radius) or polygons (ray casting). The
//! [`GeofenceEngine`] remembers, per entity and zone, whether the entity was
//! last seen inside, and reports only the boundary crossings.
//!
//! ```rust
//! use takwire_geofence::{AlertKind, GeoPoint, GeofenceEngine, Zone};
//!
//! let engine = GeofenceEngine::with_zones([
//!     Zone::circle("hq", "HQ", GeoPoint::new(48.0, 11.0), 500.0),
//! ]).unwrap();
//!
//! let alerts = engine.check_position("unit-1", 48.0, 11.0);
//! assert_eq!(alerts[0].kind, AlertKind::Entry);
//! assert!(engine.check_position("unit-1", 48.0, 11.0).is_empty());
//! ```

pub mod engine;
pub mod error;
pub mod geo;
pub mod store;
pub mod zone;

pub use engine::{Alert, AlertKind, GeofenceEngine, ZoneDistance};
pub use error::{GeofenceError, Result};
pub use geo::{haversine_distance, initial_bearing, GeoPoint, EARTH_RADIUS_M};
pub use store::{load_zones_file, MemoryZoneStore, ZoneStore};
pub use zone::{Zone, ZoneKind, ZoneShape};
