//! XML serialization for CoT events

use crate::event::{Detail, Event, Track};
use crate::mapping::{should_archive, SPOT_MAP_TYPE};
use chrono::{DateTime, Utc};
use quick_xml::escape::escape;
use std::fmt::{self, Write};

/// Wire timestamp layout, millisecond precision
pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Encode one event as a standalone XML document.
pub fn encode(event: &Event) -> String {
    serialize_event(event)
}

/// Serialize an Event to XML string
pub fn serialize_event(event: &Event) -> String {
    let mut xml = String::with_capacity(512);
    // fmt::Write for String cannot fail
    let _ = write_event(&mut xml, event);
    xml
}

pub fn format_time(dt: &DateTime<Utc>) -> String {
    dt.format(TIME_FORMAT).to_string()
}

fn write_event(xml: &mut String, event: &Event) -> fmt::Result {
    write!(
        xml,
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#
    )?;

    write!(
        xml,
        r#"<event version="{}" uid="{}" type="{}" how="{}" time="{}" start="{}" stale="{}">"#,
        escape(event.version.as_str()),
        escape(event.uid.as_str()),
        escape(event.event_type.as_str()),
        escape(event.how.as_str()),
        format_time(&event.time),
        format_time(&event.start),
        format_time(&event.stale),
    )?;

    write!(
        xml,
        r#"<point lat="{}" lon="{}" hae="{}" ce="{}" le="{}"/>"#,
        event.point.lat, event.point.lon, event.point.hae, event.point.ce, event.point.le
    )?;

    xml.push_str("<detail>");
    write_detail(xml, &event.event_type, &event.detail)?;
    xml.push_str("</detail></event>");
    Ok(())
}

fn write_detail(xml: &mut String, event_type: &str, detail: &Detail) -> fmt::Result {
    if let Some(ref contact) = detail.contact {
        write!(xml, r#"<contact callsign="{}""#, escape(contact.callsign.as_str()))?;
        if let Some(ref endpoint) = contact.endpoint {
            write!(xml, r#" endpoint="{}""#, escape(endpoint.as_str()))?;
        }
        xml.push_str("/>");
    }

    if let Some(ref group) = detail.group {
        if group.name.is_some() || group.role.is_some() {
            xml.push_str("<__group");
            if let Some(ref name) = group.name {
                write!(xml, r#" name="{}""#, escape(name.as_str()))?;
            }
            if let Some(ref role) = group.role {
                write!(xml, r#" role="{}""#, escape(role.as_str()))?;
            }
            xml.push_str("/>");
        }
    }

    if let Some(ref remarks) = detail.remarks {
        if !remarks.is_empty() {
            write!(xml, "<remarks>{}</remarks>", escape(remarks.as_str()))?;
        }
    }

    if event_type == SPOT_MAP_TYPE {
        if let Some(color) = detail.color {
            write!(xml, r#"<color argb="{}"/>"#, color)?;
        }
    }

    if detail.archive || should_archive(event_type) {
        xml.push_str("<archive/>");
    }

    // Kinematics are not computed; a missing track encodes as zero.
    let track = detail.track.unwrap_or(Track::default());
    write!(
        xml,
        r#"<track speed="{}" course="{}"/>"#,
        track.speed, track.course
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Contact, Group, Point};
    use crate::parser::parse_cot;
    use chrono::{Duration, TimeZone};

    fn base_event(event_type: &str) -> Event {
        let t = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        Event {
            version: "2.0".to_string(),
            uid: "marker-7".to_string(),
            event_type: event_type.to_string(),
            time: t,
            start: t,
            stale: t + Duration::minutes(5),
            how: "m-g".to_string(),
            point: Point::new(48.137, 11.575, 519.0),
            detail: Detail::default(),
        }
    }

    #[test]
    fn test_required_attributes_and_format() {
        let xml = serialize_event(&base_event("a-f-G-U-C"));
        assert!(xml.contains(r#"uid="marker-7""#));
        assert!(xml.contains(r#"type="a-f-G-U-C""#));
        assert!(xml.contains(r#"how="m-g""#));
        assert!(xml.contains(r#"time="2024-01-15T10:30:00.000Z""#));
        assert!(xml.contains(r#"stale="2024-01-15T10:35:00.000Z""#));
        assert!(xml.contains(r#"<point lat="48.137" lon="11.575""#));
        assert!(xml.contains(r#"<track speed="0" course="0"/>"#));
    }

    #[test]
    fn test_optional_children_omitted() {
        let xml = serialize_event(&base_event("a-f-G-U-C"));
        assert!(!xml.contains("<contact"));
        assert!(!xml.contains("<__group"));
        assert!(!xml.contains("<remarks"));
        assert!(!xml.contains("<color"));
    }

    #[test]
    fn test_group_with_only_role() {
        let mut event = base_event("a-f-G-U-C");
        event.detail.group = Some(Group {
            name: None,
            role: Some("Medic".to_string()),
        });
        let xml = serialize_event(&event);
        assert!(xml.contains(r#"<__group role="Medic"/>"#));
    }

    #[test]
    fn test_archive_for_affiliations_and_shapes() {
        for t in ["a-f-G-U-C", "a-h-G-U-C", "a-n-G-U-C", "a-u-G-U-C", "b-m-p-s-m", "u-d-f"] {
            assert!(serialize_event(&base_event(t)).contains("<archive/>"), "{t}");
        }
        assert!(!serialize_event(&base_event("a-p-G-U-C")).contains("<archive/>"));
    }

    #[test]
    fn test_color_only_for_spot_map() {
        let mut spot = base_event(SPOT_MAP_TYPE);
        spot.detail.color = Some(-65536);
        assert!(serialize_event(&spot).contains(r#"<color argb="-65536"/>"#));

        let mut unit = base_event("a-f-G-U-C");
        unit.detail.color = Some(-65536);
        assert!(!serialize_event(&unit).contains("<color"));

        let plain_spot = base_event(SPOT_MAP_TYPE);
        assert!(!serialize_event(&plain_spot).contains("<color"));
    }

    #[test]
    fn test_escaping_survives_decode() {
        let mut event = base_event("a-f-G-U-C");
        event.detail.contact = Some(Contact {
            endpoint: None,
            callsign: r#"Alpha <"1"> & co"#.to_string(),
        });
        event.detail.remarks = Some("a < b & c".to_string());

        let xml = serialize_event(&event);
        let decoded = parse_cot(&xml).unwrap();
        assert_eq!(decoded.callsign(), Some(r#"Alpha <"1"> & co"#));
        assert_eq!(decoded.remarks(), Some("a < b & c"));
    }
}
