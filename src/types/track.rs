use chrono::{DateTime, Utc};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Latitudes at or beyond this magnitude mark the first point of a session.
pub const WAYPOINT_LATITUDE_OFFSET: f64 = 100.0;

/// One 12-byte header slot from the device's track listing.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrackHeader {
    /// Opaque device index used to read this track component.
    pub index: u32,
    /// `DD/MM/YY`
    pub date: String,
    /// `HH:MM:SS`
    pub time: String,
    pub first_in_session: bool,
    /// Number of components in the session this header opens; 0 on
    /// continuation slots.
    pub component_count: usize,
}

/// A recorded session: its opening header plus every component index.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrackSession {
    pub date: String,
    pub time: String,
    pub indices: Vec<u32>,
}

impl TrackSession {
    pub fn component_count(&self) -> usize {
        self.indices.len()
    }
}

/// Group a flat header listing into sessions, in listing order.
///
/// Slots that precede the first session marker are attached to a session of
/// their own so no component is lost.
pub fn group_sessions(headers: &[TrackHeader]) -> Vec<TrackSession> {
    let mut sessions: Vec<TrackSession> = Vec::new();
    for header in headers {
        match sessions.last_mut() {
            Some(session) if !header.first_in_session => session.indices.push(header.index),
            _ => sessions.push(TrackSession {
                date: header.date.clone(),
                time: header.time.clone(),
                indices: vec![header.index],
            }),
        }
    }
    sessions
}

/// Concatenated payloads of the two reads of one track component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTrackBlock {
    pub bytes: Vec<u8>,
}

impl RawTrackBlock {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Format marker stored in bytes 28..32 of the first record.
    pub fn format_marker(&self) -> Option<u32> {
        let field: [u8; 4] = self.bytes.get(28..32)?.try_into().ok()?;
        Some(u32::from_be_bytes(field))
    }
}

/// A decoded point.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrackPoint {
    /// Decimal degrees; offset by +100 on the first point of a session.
    pub latitude: f64,
    pub longitude: f64,
    /// `YYYY-MM-DDTHH:MM:SSZ`
    pub timestamp: String,
    /// Meters per second.
    pub speed: f64,
    /// Meters, only recorded in the altitude format.
    pub altitude: Option<f64>,
}

impl TrackPoint {
    pub fn is_waypoint(&self) -> bool {
        self.latitude.abs() > WAYPOINT_LATITUDE_OFFSET
    }

    pub fn is_track_point(&self) -> bool {
        self.latitude.abs() < WAYPOINT_LATITUDE_OFFSET
    }

    /// Latitude with the session-start offset removed.
    pub fn waypoint_latitude(&self) -> f64 {
        self.latitude - WAYPOINT_LATITUDE_OFFSET
    }

    /// Parsed timestamp, `None` if the device recorded an impossible date.
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// The points of one downloaded session, in device order.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Track {
    pub points: Vec<TrackPoint>,
}

impl Track {
    pub fn new(points: Vec<TrackPoint>) -> Self {
        Self { points }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn first_timestamp(&self) -> Option<&str> {
        self.points.first().map(|p| p.timestamp.as_str())
    }

    pub fn waypoints(&self) -> impl Iterator<Item = &TrackPoint> {
        self.points.iter().filter(|p| p.is_waypoint())
    }

    pub fn track_points(&self) -> impl Iterator<Item = &TrackPoint> {
        self.points.iter().filter(|p| p.is_track_point())
    }

    /// Time between first and last parseable timestamps.
    pub fn duration(&self) -> Option<chrono::Duration> {
        let start = self.points.iter().find_map(|p| p.datetime())?;
        let end = self.points.iter().rev().find_map(|p| p.datetime())?;
        Some(end - start)
    }
}
