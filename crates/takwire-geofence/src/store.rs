//! Zone sources

use crate::error::{GeofenceError, Result};
use crate::zone::Zone;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Where zone definitions come from and go to.
#[async_trait]
pub trait ZoneStore: Send + Sync {
    async fn load(&self) -> Result<Vec<Zone>>;

    async fn save(&self, zone: &Zone) -> Result<()>;

    /// Returns false when nothing was stored under `zone_id`.
    async fn delete(&self, zone_id: &str) -> Result<bool>;
}

/// Process-local store.
#[derive(Default)]
pub struct MemoryZoneStore {
    zones: RwLock<BTreeMap<String, Zone>>,
}

impl MemoryZoneStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_zones(zones: impl IntoIterator<Item = Zone>) -> Self {
        Self {
            zones: RwLock::new(zones.into_iter().map(|z| (z.id.clone(), z)).collect()),
        }
    }
}

#[async_trait]
impl ZoneStore for MemoryZoneStore {
    async fn load(&self) -> Result<Vec<Zone>> {
        Ok(self.zones.read().values().cloned().collect())
    }

    async fn save(&self, zone: &Zone) -> Result<()> {
        zone.validate()?;
        self.zones.write().insert(zone.id.clone(), zone.clone());
        Ok(())
    }

    async fn delete(&self, zone_id: &str) -> Result<bool> {
        Ok(self.zones.write().remove(zone_id).is_some())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ZonesFile {
    Wrapped { zones: Vec<Zone> },
    List(Vec<Zone>),
}

/// Read zone definitions from YAML, either a bare list or a `zones:` key.
pub fn load_zones_file(path: impl AsRef<Path>) -> Result<Vec<Zone>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| GeofenceError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let zones = match serde_yaml::from_str::<ZonesFile>(&content) {
        Ok(ZonesFile::Wrapped { zones }) | Ok(ZonesFile::List(zones)) => zones,
        Err(e) => {
            return Err(GeofenceError::Format {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
        }
    };

    for zone in &zones {
        zone.validate()?;
    }
    Ok(zones)
}
