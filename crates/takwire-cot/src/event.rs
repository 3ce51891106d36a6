//! CoT event record, affiliation and provenance parsing

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Type code of a TAK client ping
pub const PING_TYPE: &str = "t-x-c-t";

/// Type code of a ping acknowledgement
pub const PING_ACK_TYPE: &str = "t-x-c-t-r";

/// CoT Event represents one Cursor on Target message.
///
/// Events are never mutated after construction; a newer event with the same
/// `uid` supersedes an older one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// CoT version (typically "2.0")
    pub version: String,
    /// Stable entity identifier
    pub uid: String,
    /// CoT type (e.g., "a-f-G-U-C" for friendly ground unit)
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event timestamp
    pub time: DateTime<Utc>,
    /// Start of the validity window
    pub start: DateTime<Utc>,
    /// End of the validity window
    pub stale: DateTime<Utc>,
    /// How the event was generated (e.g., "h-e" for human-entered)
    pub how: String,
    /// Geographic location and accuracy
    pub point: Point,
    /// Structured detail section
    #[serde(default)]
    pub detail: Detail,
}

/// Geographic point with accuracy metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Latitude in decimal degrees (-90 to 90)
    pub lat: f64,
    /// Longitude in decimal degrees (-180 to 180)
    pub lon: f64,
    /// Height above ellipsoid in meters
    pub hae: f64,
    /// Circular error in meters
    pub ce: f64,
    /// Linear error in meters
    pub le: f64,
}

/// The parts of `<detail>` the pipeline understands.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Detail {
    pub contact: Option<Contact>,
    pub group: Option<Group>,
    pub remarks: Option<String>,
    pub track: Option<Track>,
    /// Color in ARGB format (e.g., -65536 for red)
    pub color: Option<i32>,
    /// `<archive/>` present: clients keep the entity past its stale time
    #[serde(default)]
    pub archive: bool,
    /// A vendor relay element (`<meshtastic>`) was present
    #[serde(default, rename = "has_relay_detail")]
    pub relay: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Optional endpoint for communication
    pub endpoint: Option<String>,
    /// Callsign for display
    pub callsign: String,
}

/// Team membership (`<__group>`). Either attribute may be absent.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Group {
    pub name: Option<String>,
    pub role: Option<String>,
}

/// Track information for moving entities
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Track {
    /// Speed in meters per second
    pub speed: f64,
    /// Course/heading in degrees (0-360)
    pub course: f64,
}

/// MIL-STD-2525 affiliation parsed from the CoT type field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Affiliation {
    Pending,
    Unknown,
    AssumedFriend,
    Friend,
    Neutral,
    Suspect,
    Hostile,
    Joker,
    Faker,
    None,
}

impl Affiliation {
    /// Parse affiliation from an atom type like "a-f-G"; the second
    /// dash-separated segment carries the affiliation.
    pub fn from_cot_type(cot_type: &str) -> Option<Self> {
        let mut parts = cot_type.split('-');
        if parts.next() != Some("a") {
            return None;
        }

        match parts.next()?.chars().next() {
            Some('p') => Some(Affiliation::Pending),
            Some('u') => Some(Affiliation::Unknown),
            Some('a') => Some(Affiliation::AssumedFriend),
            Some('f') => Some(Affiliation::Friend),
            Some('n') => Some(Affiliation::Neutral),
            Some('s') => Some(Affiliation::Suspect),
            Some('h') => Some(Affiliation::Hostile),
            Some('j') => Some(Affiliation::Joker),
            Some('k') => Some(Affiliation::Faker),
            Some('o') => Some(Affiliation::None),
            _ => None,
        }
    }
}

impl fmt::Display for Affiliation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Affiliation::Pending => write!(f, "Pending"),
            Affiliation::Unknown => write!(f, "Unknown"),
            Affiliation::AssumedFriend => write!(f, "Assumed Friend"),
            Affiliation::Friend => write!(f, "Friend"),
            Affiliation::Neutral => write!(f, "Neutral"),
            Affiliation::Suspect => write!(f, "Suspect"),
            Affiliation::Hostile => write!(f, "Hostile"),
            Affiliation::Joker => write!(f, "Joker"),
            Affiliation::Faker => write!(f, "Faker"),
            Affiliation::None => write!(f, "None"),
        }
    }
}

/// Where the data in an event came from, read off the `how` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// `h-*`: placed by a person or a handheld's own GPS
    Human,
    /// `m-r*`: forwarded by a relay
    Relayed,
    /// any other `m-*`
    Machine,
    Unknown,
}

impl Provenance {
    pub fn from_how(how: &str) -> Self {
        if how == "h" || how.starts_with("h-") {
            Provenance::Human
        } else if how == "m-r" || how.starts_with("m-r-") {
            Provenance::Relayed
        } else if how == "m" || how.starts_with("m-") {
            Provenance::Machine
        } else {
            Provenance::Unknown
        }
    }
}

impl Event {
    /// Get the affiliation from the event type
    pub fn affiliation(&self) -> Option<Affiliation> {
        Affiliation::from_cot_type(&self.event_type)
    }

    pub fn provenance(&self) -> Provenance {
        Provenance::from_how(&self.how)
    }

    /// Get the callsign from the contact detail, if present
    pub fn callsign(&self) -> Option<&str> {
        self.detail.contact.as_ref().map(|c| c.callsign.as_str())
    }

    /// Team name from `<__group name>`
    pub fn team(&self) -> Option<&str> {
        self.detail.group.as_ref().and_then(|g| g.name.as_deref())
    }

    /// Team role from `<__group role>`
    pub fn role(&self) -> Option<&str> {
        self.detail.group.as_ref().and_then(|g| g.role.as_deref())
    }

    pub fn remarks(&self) -> Option<&str> {
        self.detail.remarks.as_deref()
    }

    /// True if the event tells receivers to delete the entity.
    pub fn is_tombstone(&self) -> bool {
        self.stale <= self.time
    }

    pub fn is_ping(&self) -> bool {
        self.event_type == PING_TYPE
    }

    /// Same entity, with `time`, `start` and `stale` all set to `now`.
    pub fn tombstone(&self, now: DateTime<Utc>) -> Event {
        Event {
            time: now,
            start: now,
            stale: now,
            ..self.clone()
        }
    }

    /// Minimal acknowledgement for a client ping, valid for 30 seconds.
    pub fn ping_ack(uid: impl Into<String>, now: DateTime<Utc>) -> Event {
        Event {
            version: "2.0".to_string(),
            uid: uid.into(),
            event_type: PING_ACK_TYPE.to_string(),
            time: now,
            start: now,
            stale: now + Duration::seconds(30),
            how: "m-g".to_string(),
            point: Point::new(0.0, 0.0, 0.0),
            detail: Detail::default(),
        }
    }
}

impl Point {
    /// Create a new Point with default accuracy values
    pub fn new(lat: f64, lon: f64, hae: f64) -> Self {
        Self {
            lat,
            lon,
            hae,
            ce: 9999999.0,
            le: 9999999.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_event() -> Event {
        let t = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        Event {
            version: "2.0".to_string(),
            uid: "ANDROID-1".to_string(),
            event_type: "a-f-G-U-C".to_string(),
            time: t,
            start: t,
            stale: t + Duration::minutes(5),
            how: "h-e".to_string(),
            point: Point::new(48.1, 11.5, 520.0),
            detail: Detail::default(),
        }
    }

    #[test]
    fn test_affiliation_parsing() {
        assert_eq!(
            Affiliation::from_cot_type("a-f-G"),
            Some(Affiliation::Friend)
        );
        assert_eq!(
            Affiliation::from_cot_type("a-h-G-U-C"),
            Some(Affiliation::Hostile)
        );
        assert_eq!(Affiliation::from_cot_type("b-m-p-s-m"), None);
        assert_eq!(Affiliation::from_cot_type("invalid"), None);
    }

    #[test]
    fn test_provenance_from_how() {
        assert_eq!(Provenance::from_how("h-e"), Provenance::Human);
        assert_eq!(Provenance::from_how("h-g-i-g-o"), Provenance::Human);
        assert_eq!(Provenance::from_how("m-g"), Provenance::Machine);
        assert_eq!(Provenance::from_how("m-r"), Provenance::Relayed);
        assert_eq!(Provenance::from_how(""), Provenance::Unknown);
    }

    #[test]
    fn test_tombstone() {
        let event = sample_event();
        assert!(!event.is_tombstone());

        let now = Utc.with_ymd_and_hms(2024, 1, 15, 11, 0, 0).unwrap();
        let dead = event.tombstone(now);
        assert!(dead.is_tombstone());
        assert_eq!(dead.time, now);
        assert_eq!(dead.start, now);
        assert_eq!(dead.stale, now);
        assert_eq!(dead.uid, event.uid);
        assert_eq!(dead.event_type, event.event_type);
    }

    #[test]
    fn test_ping_ack() {
        let now = Utc::now();
        let ack = Event::ping_ack("takwire-gateway", now);
        assert_eq!(ack.event_type, PING_ACK_TYPE);
        assert_eq!(ack.stale - ack.time, Duration::seconds(30));
        assert!(!ack.is_ping());
    }
}
