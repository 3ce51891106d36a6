//! Table-driven translation between internal marker kinds and CoT type codes,
//! plus hex color / ARGB / team conversions.
//!
//! Wire-to-internal lookup walks an ordered `(prefix, kind)` table. The
//! longest matching prefix wins; among prefixes of equal length the earlier
//! entry wins. Anything unmatched is `unknown`.

use crate::event::{Event, Provenance};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Wire type for anything without a better mapping
pub const FALLBACK_WIRE_TYPE: &str = "a-u-G-U-C";

/// Spot-map marker type; the only type that carries a color element
pub const SPOT_MAP_TYPE: &str = "b-m-p-s-m";

/// Generic freehand drawing type
pub const DRAWING_TYPE: &str = "u-d-f";

/// The application's own classification of a map entity.
///
/// Deserialization accepts the canonical snake_case names, the legacy shape
/// names (`rechteck`, `raute`, `quadrat`, `blume`, `meshtastic_node`,
/// `tak_unit`) in any case, and maps anything else to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum MarkerKind {
    Friendly,
    Hostile,
    Neutral,
    Unknown,
    Pending,
    SpotMap,
    Drawing,
    GpsPosition,
    Node,
    RelayNode,
    DevicePosition,
}

const KIND_NAMES: &[(&str, MarkerKind)] = &[
    ("friendly", MarkerKind::Friendly),
    ("rechteck", MarkerKind::Friendly),
    ("hostile", MarkerKind::Hostile),
    ("raute", MarkerKind::Hostile),
    ("neutral", MarkerKind::Neutral),
    ("quadrat", MarkerKind::Neutral),
    ("unknown", MarkerKind::Unknown),
    ("blume", MarkerKind::Unknown),
    ("pending", MarkerKind::Pending),
    ("spot_map", MarkerKind::SpotMap),
    ("drawing", MarkerKind::Drawing),
    ("gps_position", MarkerKind::GpsPosition),
    ("node", MarkerKind::Node),
    ("relay_node", MarkerKind::RelayNode),
    ("meshtastic_node", MarkerKind::RelayNode),
    ("device_position", MarkerKind::DevicePosition),
    ("tak_unit", MarkerKind::DevicePosition),
];

impl MarkerKind {
    pub const ALL: [MarkerKind; 11] = [
        MarkerKind::Friendly,
        MarkerKind::Hostile,
        MarkerKind::Neutral,
        MarkerKind::Unknown,
        MarkerKind::Pending,
        MarkerKind::SpotMap,
        MarkerKind::Drawing,
        MarkerKind::GpsPosition,
        MarkerKind::Node,
        MarkerKind::RelayNode,
        MarkerKind::DevicePosition,
    ];

    /// Case-insensitive lookup over canonical and legacy names.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        KIND_NAMES
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, kind)| *kind)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MarkerKind::Friendly => "friendly",
            MarkerKind::Hostile => "hostile",
            MarkerKind::Neutral => "neutral",
            MarkerKind::Unknown => "unknown",
            MarkerKind::Pending => "pending",
            MarkerKind::SpotMap => "spot_map",
            MarkerKind::Drawing => "drawing",
            MarkerKind::GpsPosition => "gps_position",
            MarkerKind::Node => "node",
            MarkerKind::RelayNode => "relay_node",
            MarkerKind::DevicePosition => "device_position",
        }
    }

    /// Internal to wire type.
    pub fn wire_type(&self) -> &'static str {
        match self {
            MarkerKind::Friendly
            | MarkerKind::GpsPosition
            | MarkerKind::Node
            | MarkerKind::RelayNode
            | MarkerKind::DevicePosition => "a-f-G-U-C",
            MarkerKind::Hostile => "a-h-G-U-C",
            MarkerKind::Neutral => "a-n-G-U-C",
            MarkerKind::Unknown => FALLBACK_WIRE_TYPE,
            MarkerKind::Pending => "a-p-G-U-C",
            MarkerKind::SpotMap => SPOT_MAP_TYPE,
            MarkerKind::Drawing => DRAWING_TYPE,
        }
    }
}

impl Default for MarkerKind {
    fn default() -> Self {
        MarkerKind::Unknown
    }
}

impl From<String> for MarkerKind {
    fn from(name: String) -> Self {
        MarkerKind::from_name(&name).unwrap_or(MarkerKind::Unknown)
    }
}

impl fmt::Display for MarkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire type for a free-form internal name; unmapped names fall back to
/// the unknown ground unit code.
pub fn wire_type_for(name: &str) -> &'static str {
    MarkerKind::from_name(name)
        .map(|k| k.wire_type())
        .unwrap_or(FALLBACK_WIRE_TYPE)
}

/// Ordered prefix table for wire to internal lookup.
pub struct KindTable {
    entries: Vec<(&'static str, MarkerKind)>,
}

impl KindTable {
    pub fn new(entries: Vec<(&'static str, MarkerKind)>) -> Self {
        Self { entries }
    }

    /// Shared instance of the default table.
    pub fn standard() -> &'static KindTable {
        static STANDARD: OnceLock<KindTable> = OnceLock::new();
        STANDARD.get_or_init(KindTable::default)
    }

    /// Longest matching prefix, first entry on ties, `Unknown` otherwise.
    pub fn lookup(&self, wire_type: &str) -> MarkerKind {
        let mut best: Option<(&str, MarkerKind)> = None;
        for &(prefix, kind) in &self.entries {
            if !wire_type.starts_with(prefix) {
                continue;
            }
            match best {
                Some((p, _)) if p.len() >= prefix.len() => {}
                _ => best = Some((prefix, kind)),
            }
        }
        best.map(|(_, kind)| kind).unwrap_or(MarkerKind::Unknown)
    }
}

impl Default for KindTable {
    fn default() -> Self {
        Self::new(vec![
            ("a-f", MarkerKind::Friendly),
            ("a-h", MarkerKind::Hostile),
            ("a-n", MarkerKind::Neutral),
            ("a-u", MarkerKind::Unknown),
            ("a-p", MarkerKind::Pending),
            (SPOT_MAP_TYPE, MarkerKind::SpotMap),
            ("u-d", MarkerKind::Drawing),
        ])
    }
}

/// Internal kind for a decoded event.
///
/// A relay element forces `RelayNode`. A friendly unit placed by a human
/// (the device's own position report) becomes `DevicePosition`.
pub fn classify(table: &KindTable, event: &Event) -> MarkerKind {
    if event.detail.relay {
        return MarkerKind::RelayNode;
    }

    match table.lookup(&event.event_type) {
        MarkerKind::Friendly if event.provenance() == Provenance::Human => {
            MarkerKind::DevicePosition
        }
        kind => kind,
    }
}

/// True for types that receiving clients should keep past their stale time.
pub fn should_archive(wire_type: &str) -> bool {
    ["a-f", "a-h", "a-n", "a-u", SPOT_MAP_TYPE, "u-d"]
        .iter()
        .any(|prefix| wire_type.starts_with(prefix))
}

/// `#rrggbb` or `#aarrggbb` (the `#` is optional) to signed ARGB.
/// Six-digit input gets full alpha.
pub fn hex_to_argb(hex: &str) -> Option<i32> {
    let digits = hex.trim().trim_start_matches('#');
    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }

    let value = match digits.len() {
        6 => 0xFF00_0000 | u32::from_str_radix(digits, 16).ok()?,
        8 => u32::from_str_radix(digits, 16).ok()?,
        _ => return None,
    };
    Some(value as i32)
}

/// Signed ARGB back to `#rrggbb`, or `#aarrggbb` when not fully opaque.
pub fn argb_to_hex(argb: i32) -> String {
    let value = argb as u32;
    if value >> 24 == 0xFF {
        format!("#{:06x}", value & 0x00FF_FFFF)
    } else {
        format!("#{:08x}", value)
    }
}

const TEAM_COLORS: &[(&str, &str)] = &[
    ("#ffff00", "Yellow"),
    ("#0000ff", "Blue"),
    ("#00ff00", "Green"),
    ("#ff0000", "Red"),
];

/// Team name for one of the four canonical team colors.
pub fn color_to_team(hex: &str) -> Option<&'static str> {
    let hex = hex.trim();
    TEAM_COLORS
        .iter()
        .find(|(color, _)| color.eq_ignore_ascii_case(hex))
        .map(|(_, team)| *team)
}
