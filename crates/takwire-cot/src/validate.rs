//! Validation for CoT events

use crate::event::{Event, Point};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid latitude: {0} (must be between -90 and 90)")]
    InvalidLatitude(f64),

    #[error("Invalid longitude: {0} (must be between -180 and 180)")]
    InvalidLongitude(f64),

    #[error("Invalid circular error: {0} (must be positive)")]
    InvalidCircularError(f64),

    #[error("Invalid linear error: {0} (must be positive)")]
    InvalidLinearError(f64),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid timestamp order: stale ({0}) is before start ({1})")]
    InvalidTimestampOrder(String, String),

    #[error("Empty UID")]
    EmptyUid,

    #[error("Empty type")]
    EmptyType,
}

/// Checks applied to every decoded event: the point must lie on the globe.
///
/// Timestamps are not ordered here. A sender deletes a marker by sending
/// stale at or before start, so `stale < start` is a tombstone, not an error.
pub fn validate_event(event: &Event) -> Result<(), ValidationError> {
    validate_point(&event.point)
}

/// Opt-in checks for locally built events: non-empty uid and type,
/// non-negative error estimates and `stale >= start`.
pub fn validate_event_strict(event: &Event) -> Result<(), ValidationError> {
    if event.uid.is_empty() {
        return Err(ValidationError::EmptyUid);
    }

    if event.event_type.is_empty() {
        return Err(ValidationError::EmptyType);
    }

    if event.stale < event.start {
        return Err(ValidationError::InvalidTimestampOrder(
            event.stale.to_rfc3339(),
            event.start.to_rfc3339(),
        ));
    }

    validate_point(&event.point)?;

    if event.point.ce < 0.0 {
        return Err(ValidationError::InvalidCircularError(event.point.ce));
    }

    if event.point.le < 0.0 {
        return Err(ValidationError::InvalidLinearError(event.point.le));
    }

    Ok(())
}

/// Validates a Point
pub fn validate_point(point: &Point) -> Result<(), ValidationError> {
    validate_coordinates(point.lat, point.lon)
}

/// Range check shared with the geofence engine. NaN is rejected.
pub fn validate_coordinates(lat: f64, lon: f64) -> Result<(), ValidationError> {
    if !(-90.0..=90.0).contains(&lat) {
        return Err(ValidationError::InvalidLatitude(lat));
    }

    if !(-180.0..=180.0).contains(&lon) {
        return Err(ValidationError::InvalidLongitude(lon));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Detail;
    use chrono::{Duration, TimeZone, Utc};

    fn create_valid_event() -> Event {
        let t = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        Event {
            version: "2.0".to_string(),
            uid: "test-123".to_string(),
            event_type: "a-f-G".to_string(),
            time: t,
            start: t,
            stale: t + Duration::minutes(5),
            how: "h-e".to_string(),
            point: Point {
                lat: 37.7749,
                lon: -122.4194,
                hae: 100.0,
                ce: 10.0,
                le: 5.0,
            },
            detail: Detail::default(),
        }
    }

    #[test]
    fn test_valid_event() {
        assert!(validate_event(&create_valid_event()).is_ok());
        assert!(validate_event_strict(&create_valid_event()).is_ok());
    }

    #[test]
    fn test_tombstone_is_valid() {
        let event = create_valid_event();
        let dead = event.tombstone(event.time);
        assert!(validate_event(&dead).is_ok());
    }

    #[test]
    fn test_stale_before_start_is_tombstone() {
        let mut event = create_valid_event();
        event.stale = event.start - Duration::seconds(10);
        assert!(validate_event(&event).is_ok());
        assert!(event.is_tombstone());
        assert!(matches!(
            validate_event_strict(&event),
            Err(ValidationError::InvalidTimestampOrder(_, _))
        ));
    }

    #[test]
    fn test_error_estimates_only_checked_when_strict() {
        let mut event = create_valid_event();
        event.point.ce = -1.0;
        assert!(validate_event(&event).is_ok());
        assert_eq!(
            validate_event_strict(&event),
            Err(ValidationError::InvalidCircularError(-1.0))
        );

        event.point.ce = 1.0;
        event.point.le = -2.0;
        assert_eq!(
            validate_event_strict(&event),
            Err(ValidationError::InvalidLinearError(-2.0))
        );
    }

    #[test]
    fn test_coordinate_bounds() {
        assert!(validate_coordinates(90.0, 180.0).is_ok());
        assert!(validate_coordinates(-90.0, -180.0).is_ok());
        assert_eq!(
            validate_coordinates(90.5, 0.0),
            Err(ValidationError::InvalidLatitude(90.5))
        );
        assert_eq!(
            validate_coordinates(0.0, -180.1),
            Err(ValidationError::InvalidLongitude(-180.1))
        );
        assert!(validate_coordinates(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn test_empty_uid_and_type_only_checked_when_strict() {
        let mut event = create_valid_event();
        event.uid = String::new();
        assert!(validate_event(&event).is_ok());
        assert_eq!(validate_event_strict(&event), Err(ValidationError::EmptyUid));

        event.uid = "x".to_string();
        event.event_type = String::new();
        assert_eq!(validate_event_strict(&event), Err(ValidationError::EmptyType));
    }
}
