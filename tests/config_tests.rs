//! Shipped example configuration stays loadable

use std::path::PathBuf;
use takwire_core::config::{DispatchMode, LogFormat};
use takwire_core::AppConfig;
use takwire_geofence::{load_zones_file, GeofenceEngine, ZoneShape};

fn config_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config")
}

#[test]
fn test_example_config_parses_and_validates() {
    let config = AppConfig::from_file(config_dir().join("takwire.example.yaml")).unwrap();
    config.validate().unwrap();

    assert_eq!(config.listener.stream_port, 8088);
    assert_eq!(config.listener.multicast.port, 6969);
    assert!(!config.listener.multicast.enabled);
    assert_eq!(config.fanout.dispatch_mode, DispatchMode::DropOnFull);
    assert_eq!(config.logging.format, LogFormat::Text);
    assert_eq!(config.logging.filter_directives(), "info,tower_http=warn");
    assert_eq!(config.metrics.path, "/metrics");
}

#[test]
fn test_example_zones_load() {
    let zones = load_zones_file(config_dir().join("zones.example.yaml")).unwrap();
    assert_eq!(zones.len(), 2);
    assert!(matches!(zones[0].shape, ZoneShape::Circle { .. }));
    assert!(matches!(zones[1].shape, ZoneShape::Polygon { .. }));

    let engine = GeofenceEngine::with_zones(zones).unwrap();
    let alerts = engine.check_position("walker", 48.137, 11.575);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].zone_id, "hq");
}
