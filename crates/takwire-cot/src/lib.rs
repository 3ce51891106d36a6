//! Cursor on Target (CoT) event codec
//!
//! Decodes single CoT XML documents into [`Event`] values, encodes events
//! back to XML, and translates between wire types and the application's own
//! [`MarkerKind`] classification.
//!
//! # Example
//!
//! ```rust
//! use takwire_cot::{decode, encode, MarkerKind};
//!
//! let xml = r#"<?xml version="1.0"?>
//! <event version="2.0" uid="test-1" type="a-f-G-U-C"
//!        time="2024-01-15T10:30:00Z"
//!        start="2024-01-15T10:30:00Z"
//!        stale="2024-01-15T10:35:00Z" how="m-g">
//!     <point lat="37.7749" lon="-122.4194" hae="100.0" ce="10.0" le="5.0"/>
//!     <detail><contact callsign="Alpha"/></detail>
//! </event>"#;
//!
//! let event = decode(xml.as_bytes()).expect("valid CoT");
//! assert_eq!(event.uid, "test-1");
//! assert_eq!(event.callsign(), Some("Alpha"));
//! assert_eq!(event.to_marker().kind, MarkerKind::Friendly);
//!
//! let again = decode(encode(&event).as_bytes()).expect("re-decodes");
//! assert_eq!(again.point.lat, 37.7749);
//! ```

pub mod event;
pub mod mapping;
pub mod marker;
pub mod parser;
pub mod serializer;
pub mod validate;

pub use event::{
    Affiliation, Contact, Detail, Event, Group, Point, Provenance, Track, PING_ACK_TYPE,
    PING_TYPE,
};
pub use mapping::{
    argb_to_hex, classify, color_to_team, hex_to_argb, should_archive, wire_type_for, KindTable,
    MarkerKind,
};
pub use marker::Marker;
pub use parser::{decode, parse_cot, parse_cot_bytes, ParseError};
pub use serializer::{encode, format_time, serialize_event};
pub use validate::{
    validate_coordinates, validate_event, validate_event_strict, validate_point, ValidationError,
};
