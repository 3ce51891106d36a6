//! Decode/encode behavior across the public codec surface

use chrono::{Duration, TimeZone, Utc};
use takwire_cot::{
    decode, encode, hex_to_argb, Event, Marker, MarkerKind, ParseError, ValidationError,
    PING_ACK_TYPE,
};

const FULL_EVENT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<event version="2.0" uid="ANDROID-12345678" type="a-f-G-U-C" time="2024-01-15T10:30:00Z" start="2024-01-15T10:30:00Z" stale="2024-01-15T10:35:00Z" how="h-e">
    <point lat="37.7749" lon="-122.4194" hae="100.0" ce="10.0" le="5.0"/>
    <detail>
        <contact callsign="Alpha-1" endpoint="192.168.1.100:4242"/>
        <__group name="Cyan" role="Team Member"/>
        <status battery="85"/>
        <takv device="Pixel" platform="ATAK-CIV" os="34" version="5.1"/>
        <track speed="3.5" course="270.0"/>
        <remarks><![CDATA[checkpoint <B>]]></remarks>
    </detail>
</event>"#;

#[test]
fn test_decode_full_event() {
    let event = decode(FULL_EVENT.as_bytes()).expect("decodes");

    assert_eq!(event.uid, "ANDROID-12345678");
    assert_eq!(event.event_type, "a-f-G-U-C");
    assert_eq!(event.callsign(), Some("Alpha-1"));
    assert_eq!(event.team(), Some("Cyan"));
    assert_eq!(event.role(), Some("Team Member"));
    assert_eq!(event.remarks(), Some("checkpoint <B>"));

    let track = event.detail.track.expect("track");
    assert_eq!(track.speed, 3.5);
    assert_eq!(track.course, 270.0);
    assert_eq!(
        event.time,
        Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap()
    );
}

#[test]
fn test_round_trip_preserves_identity() {
    let event = decode(FULL_EVENT.as_bytes()).unwrap();
    let again = decode(encode(&event).as_bytes()).unwrap();

    assert_eq!(again.uid, event.uid);
    assert_eq!(again.event_type, event.event_type);
    assert_eq!(again.point.lat, event.point.lat);
    assert_eq!(again.point.lon, event.point.lon);
    assert_eq!(again.callsign(), event.callsign());
    assert_eq!(again.remarks(), event.remarks());
    assert_eq!(again.time, event.time);
    assert_eq!(again.stale, event.stale);
}

#[test]
fn test_point_defaults() {
    let xml = r#"<event version="2.0" uid="u" type="a-u-G" how="m-g"><point lat="1.5" lon="2.5"/></event>"#;
    let event = decode(xml.as_bytes()).unwrap();
    assert_eq!(event.point.hae, 0.0);
    assert_eq!(event.point.ce, 9999999.0);
    assert_eq!(event.point.le, 9999999.0);
    assert_eq!(event.start, event.time);
    assert_eq!(event.stale - event.time, Duration::minutes(5));
}

#[test]
fn test_missing_fields_are_validation_errors() {
    let no_uid = r#"<event version="2.0" type="a-f-G" how="m-g"><point lat="1" lon="2"/></event>"#;
    let no_point = r#"<event version="2.0" uid="u" type="a-f-G" how="m-g"></event>"#;
    let no_lat = r#"<event version="2.0" uid="u" type="a-f-G" how="m-g"><point lon="2"/></event>"#;

    for xml in [no_uid, no_point, no_lat] {
        let err = decode(xml.as_bytes()).unwrap_err();
        assert!(err.is_validation(), "{xml}: {err}");
    }
}

#[test]
fn test_out_of_range_coordinates() {
    let xml = r#"<event version="2.0" uid="u" type="a-f-G" how="m-g"><point lat="91" lon="2"/></event>"#;
    assert!(matches!(
        decode(xml.as_bytes()),
        Err(ParseError::InvalidEvent(ValidationError::InvalidLatitude(_)))
    ));

    let xml = r#"<event version="2.0" uid="u" type="a-f-G" how="m-g"><point lat="1" lon="-181"/></event>"#;
    assert!(matches!(
        decode(xml.as_bytes()),
        Err(ParseError::InvalidEvent(ValidationError::InvalidLongitude(_)))
    ));
}

#[test]
fn test_garbage_never_panics() {
    let inputs: [&[u8]; 6] = [
        b"",
        b"not xml at all",
        b"<event",
        b"<event version=\"2.0\" uid=\"u\"",
        b"<event version=\"2.0\" uid=\"u\" type=\"a\" how=\"m\"><point lat=\"x\" lon=\"1\"/></event>",
        &[0xff, 0xfe, 0x00, 0x3c],
    ];
    for input in inputs {
        assert!(decode(input).is_err());
    }
}

#[test]
fn test_marker_round_trip() {
    let now = Utc::now();
    let marker = Marker {
        id: "spot-1".to_string(),
        name: Some("Rally".to_string()),
        lat: 52.52,
        lng: 13.405,
        altitude: 34.0,
        kind: MarkerKind::SpotMap,
        color: Some("#0000ff".to_string()),
        team: None,
        role: Some("Team Lead".to_string()),
        description: Some("north gate".to_string()),
        cot_type: None,
        source: None,
        timestamp: None,
    };

    let event = Event::from_marker(&marker, now, Duration::minutes(10)).unwrap();
    let xml = encode(&event);
    assert!(xml.contains("<archive/>"));
    assert!(xml.contains(&format!(r#"<color argb="{}"/>"#, hex_to_argb("#0000ff").unwrap())));

    let back = decode(xml.as_bytes()).unwrap().to_marker();
    assert_eq!(back.id, "spot-1");
    assert_eq!(back.name.as_deref(), Some("Rally"));
    assert_eq!(back.kind, MarkerKind::SpotMap);
    assert_eq!(back.color.as_deref(), Some("#0000ff"));
    assert_eq!(back.team.as_deref(), Some("Blue"));
    assert_eq!(back.role.as_deref(), Some("Team Lead"));
    assert_eq!(back.description.as_deref(), Some("north gate"));
}

#[test]
fn test_stale_before_start_decodes_as_tombstone() {
    let xml = r#"<event version="2.0" uid="ANDROID-7" type="a-f-G-U-C" how="h-g-i-g-o" time="2024-01-01T00:00:10Z" start="2024-01-01T00:00:10Z" stale="2024-01-01T00:00:00Z"><point lat="1" lon="2" ce="-1" le="-1"/></event>"#;
    let event = decode(xml.as_bytes()).expect("stale before start still decodes");
    assert_eq!(event.uid, "ANDROID-7");
    assert!(event.stale < event.start);
    assert!(event.is_tombstone());
    assert_eq!(event.point.ce, -1.0);
}

#[test]
fn test_tombstone_round_trip() {
    let event = decode(FULL_EVENT.as_bytes()).unwrap();
    let now = Utc::now();
    let dead = decode(encode(&event.tombstone(now)).as_bytes()).unwrap();
    assert!(dead.is_tombstone());
    assert_eq!(dead.uid, event.uid);
}

#[test]
fn test_ping_ack_encodes() {
    let ping = r#"<event version="2.0" uid="ANDROID-1-ping" type="t-x-c-t" how="h-g-i-g-o"><point lat="0" lon="0"/></event>"#;
    let event = decode(ping.as_bytes()).unwrap();
    assert!(event.is_ping());

    let ack = Event::ping_ack("takwire", Utc::now());
    let decoded = decode(encode(&ack).as_bytes()).unwrap();
    assert_eq!(decoded.event_type, PING_ACK_TYPE);
    assert!(!decoded.is_ping());
}
