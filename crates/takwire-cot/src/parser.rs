//! Decoder for XML CoT events

use crate::event::{Contact, Detail, Event, Group, Point, Track};
use crate::validate::{validate_event, ValidationError};
use chrono::{DateTime, Duration, Utc};
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesStart, Event as XmlEvent};
use quick_xml::Reader;
use thiserror::Error;

/// Stale window applied when an event carries no `stale` attribute
const DEFAULT_STALE_MINUTES: i64 = 5;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("XML parsing error: {0}")]
    XmlError(#[from] quick_xml::Error),

    #[error("Invalid datetime format: {0}")]
    InvalidDateTime(String),

    #[error("Invalid number format: {0}")]
    InvalidNumber(String),

    #[error("Invalid event structure: {0}")]
    InvalidStructure(String),

    #[error("Invalid event: {0}")]
    InvalidEvent(#[from] ValidationError),
}

impl ParseError {
    fn missing(field: &str) -> Self {
        ParseError::InvalidEvent(ValidationError::MissingField(field.to_string()))
    }

    /// True when the payload was well-formed XML but not an acceptable event.
    pub fn is_validation(&self) -> bool {
        matches!(self, ParseError::InvalidEvent(_))
    }
}

/// Decode one wire event.
pub fn decode(bytes: &[u8]) -> Result<Event, ParseError> {
    parse_cot_bytes(bytes)
}

/// Parse a CoT message from XML string
pub fn parse_cot(xml: &str) -> Result<Event, ParseError> {
    parse_cot_bytes(xml.as_bytes())
}

/// Parse a CoT message from XML bytes
pub fn parse_cot_bytes(xml: &[u8]) -> Result<Event, ParseError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();

    let mut seen_event = false;
    let mut version = None;
    let mut uid = None;
    let mut event_type = None;
    let mut time = None;
    let mut start = None;
    let mut stale = None;
    let mut how = None;
    let mut point = None;
    let mut detail = Detail::default();
    let mut in_detail = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(XmlEvent::Start(e)) | Ok(XmlEvent::Empty(e)) if e.name().as_ref() == b"event" => {
                seen_event = true;
                for attr in e.attributes() {
                    let attr = attr
                        .map_err(|e| ParseError::XmlError(quick_xml::Error::InvalidAttr(e)))?;
                    match attr.key.as_ref() {
                        b"version" => version = Some(attr_string(&attr)?),
                        b"uid" => uid = Some(attr_string(&attr)?),
                        b"type" => event_type = Some(attr_string(&attr)?),
                        b"how" => how = Some(attr_string(&attr)?),
                        b"time" => time = Some(parse_datetime(&attr_string(&attr)?)?),
                        b"start" => start = Some(parse_datetime(&attr_string(&attr)?)?),
                        b"stale" => stale = Some(parse_datetime(&attr_string(&attr)?)?),
                        _ => {}
                    }
                }
            }
            Ok(XmlEvent::Start(e)) | Ok(XmlEvent::Empty(e)) if e.name().as_ref() == b"point" => {
                point = Some(parse_point(&e)?);
            }
            Ok(XmlEvent::Start(e)) if e.name().as_ref() == b"detail" => {
                in_detail = true;
            }
            Ok(XmlEvent::Eof) => break,
            Err(e) => return Err(ParseError::XmlError(e)),
            _ => {}
        }

        if in_detail {
            detail = parse_detail(&mut reader, &mut buf)?;
            in_detail = false;
        }
        buf.clear();
    }

    if !seen_event {
        return Err(ParseError::InvalidStructure(
            "no <event> element".to_string(),
        ));
    }

    let time = time.unwrap_or_else(Utc::now);
    let start = start.unwrap_or(time);
    let stale = stale.unwrap_or(time + Duration::minutes(DEFAULT_STALE_MINUTES));

    let event = Event {
        version: version.ok_or_else(|| ParseError::missing("version"))?,
        uid: uid.ok_or_else(|| ParseError::missing("uid"))?,
        event_type: event_type.ok_or_else(|| ParseError::missing("type"))?,
        time,
        start,
        stale,
        how: how.ok_or_else(|| ParseError::missing("how"))?,
        point: point.ok_or_else(|| ParseError::missing("point"))?,
        detail,
    };

    validate_event(&event)?;
    Ok(event)
}

fn attr_string(attr: &Attribute) -> Result<String, ParseError> {
    Ok(attr.unescape_value()?.into_owned())
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, ParseError> {
    s.parse::<DateTime<Utc>>()
        .map_err(|_| ParseError::InvalidDateTime(s.to_string()))
}

fn parse_f64(s: &str) -> Result<f64, ParseError> {
    s.trim()
        .parse::<f64>()
        .map_err(|_| ParseError::InvalidNumber(s.to_string()))
}

fn parse_i32(s: &str) -> Result<i32, ParseError> {
    s.trim()
        .parse::<i32>()
        .map_err(|_| ParseError::InvalidNumber(s.to_string()))
}

fn parse_point(element: &BytesStart) -> Result<Point, ParseError> {
    let mut lat = None;
    let mut lon = None;
    let mut hae = None;
    let mut ce = None;
    let mut le = None;

    for attr in element.attributes() {
        let attr = attr.map_err(|e| ParseError::XmlError(quick_xml::Error::InvalidAttr(e)))?;
        match attr.key.as_ref() {
            b"lat" => lat = Some(parse_f64(&attr_string(&attr)?)?),
            b"lon" => lon = Some(parse_f64(&attr_string(&attr)?)?),
            b"hae" => hae = Some(parse_f64(&attr_string(&attr)?)?),
            b"ce" => ce = Some(parse_f64(&attr_string(&attr)?)?),
            b"le" => le = Some(parse_f64(&attr_string(&attr)?)?),
            _ => {}
        }
    }

    Ok(Point {
        lat: lat.ok_or_else(|| ParseError::missing("lat"))?,
        lon: lon.ok_or_else(|| ParseError::missing("lon"))?,
        hae: hae.unwrap_or(0.0),
        ce: ce.unwrap_or(9999999.0),
        le: le.unwrap_or(9999999.0),
    })
}

/// Reads children of `<detail>` up to its closing tag. Elements we do not
/// model are skipped.
fn parse_detail(reader: &mut Reader<&[u8]>, buf: &mut Vec<u8>) -> Result<Detail, ParseError> {
    let mut detail = Detail::default();
    let mut depth = 1;
    let mut remarks: Option<String> = None;
    let mut in_remarks = false;

    loop {
        buf.clear();
        match reader.read_event_into(buf) {
            Ok(XmlEvent::Start(e)) => {
                depth += 1;
                if e.name().as_ref() == b"remarks" {
                    in_remarks = true;
                } else {
                    apply_detail_element(&mut detail, &e)?;
                }
            }
            Ok(XmlEvent::Empty(e)) => {
                apply_detail_element(&mut detail, &e)?;
            }
            Ok(XmlEvent::Text(text)) if in_remarks => {
                remarks
                    .get_or_insert_with(String::new)
                    .push_str(&text.unescape()?);
            }
            Ok(XmlEvent::CData(data)) if in_remarks => {
                remarks
                    .get_or_insert_with(String::new)
                    .push_str(&String::from_utf8_lossy(&data.into_inner()));
            }
            Ok(XmlEvent::End(e)) => {
                if e.name().as_ref() == b"remarks" {
                    in_remarks = false;
                }
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            Ok(XmlEvent::Eof) => {
                return Err(ParseError::InvalidStructure(
                    "unterminated <detail>".to_string(),
                ))
            }
            Err(e) => return Err(ParseError::XmlError(e)),
            _ => {}
        }
    }

    detail.remarks = remarks.filter(|r| !r.is_empty());
    Ok(detail)
}

fn apply_detail_element(detail: &mut Detail, element: &BytesStart) -> Result<(), ParseError> {
    match element.name().as_ref() {
        b"contact" => detail.contact = parse_contact(element)?,
        b"__group" => detail.group = Some(parse_group(element)?),
        b"track" => detail.track = Some(parse_track(element)?),
        b"color" => detail.color = parse_color(element)?,
        b"archive" => detail.archive = true,
        b"meshtastic" => detail.relay = true,
        _ => {}
    }
    Ok(())
}

/// A contact without a callsign carries nothing we use.
fn parse_contact(element: &BytesStart) -> Result<Option<Contact>, ParseError> {
    let mut endpoint = None;
    let mut callsign = None;

    for attr in element.attributes() {
        let attr = attr.map_err(|e| ParseError::XmlError(quick_xml::Error::InvalidAttr(e)))?;
        match attr.key.as_ref() {
            b"endpoint" => endpoint = Some(attr_string(&attr)?),
            b"callsign" => callsign = Some(attr_string(&attr)?),
            _ => {}
        }
    }

    Ok(callsign.map(|callsign| Contact { endpoint, callsign }))
}

fn parse_group(element: &BytesStart) -> Result<Group, ParseError> {
    let mut group = Group::default();

    for attr in element.attributes() {
        let attr = attr.map_err(|e| ParseError::XmlError(quick_xml::Error::InvalidAttr(e)))?;
        match attr.key.as_ref() {
            b"name" => group.name = Some(attr_string(&attr)?),
            b"role" => group.role = Some(attr_string(&attr)?),
            _ => {}
        }
    }

    Ok(group)
}

fn parse_track(element: &BytesStart) -> Result<Track, ParseError> {
    let mut track = Track::default();

    for attr in element.attributes() {
        let attr = attr.map_err(|e| ParseError::XmlError(quick_xml::Error::InvalidAttr(e)))?;
        match attr.key.as_ref() {
            b"speed" => track.speed = parse_f64(&attr_string(&attr)?)?,
            b"course" => track.course = parse_f64(&attr_string(&attr)?)?,
            _ => {}
        }
    }

    Ok(track)
}

/// `<color argb="-65536"/>`; some clients write `value` instead.
fn parse_color(element: &BytesStart) -> Result<Option<i32>, ParseError> {
    let mut color = None;

    for attr in element.attributes() {
        let attr = attr.map_err(|e| ParseError::XmlError(quick_xml::Error::InvalidAttr(e)))?;
        match attr.key.as_ref() {
            b"argb" => color = Some(parse_i32(&attr_string(&attr)?)?),
            b"value" if color.is_none() => color = Some(parse_i32(&attr_string(&attr)?)?),
            _ => {}
        }
    }

    Ok(color)
}
