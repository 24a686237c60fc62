#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// What the logger records for each point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum InfoType {
    /// Position, time, date, speed (20-byte records).
    Position,
    /// Position, time, date, speed, altitude (32-byte records).
    PositionAltitude,
    /// A value this crate does not know; written back unchanged.
    Other(u8),
}

impl InfoType {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            1 => InfoType::Position,
            2 => InfoType::PositionAltitude,
            other => InfoType::Other(other),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            InfoType::Position => 1,
            InfoType::PositionAltitude => 2,
            InfoType::Other(byte) => byte,
        }
    }
}

/// Snapshot of the logger settings as returned by one configuration query.
///
/// Never patched in place: every query returns a new value.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Configuration {
    pub info_type: InfoType,
    pub speed_threshold_disabled: bool,
    /// Minimum speed (km/h) for a point to be logged.
    pub speed_threshold: u32,
    pub distance_threshold_disabled: bool,
    /// Minimum distance (m) between logged points.
    pub distance_threshold: u32,
    pub time_interval_ms: u32,
    /// Log every `distance_interval` meters instead of every `time_interval_ms`.
    pub by_distance: bool,
    pub distance_interval: u32,
    pub waas_enabled: bool,
    /// Computed by the device; ignored when writing.
    pub memory_usage_percent: u8,
}

impl Configuration {
    pub fn time_interval_seconds(&self) -> f64 {
        self.time_interval_ms as f64 / 1000.0
    }

    pub fn records_altitude(&self) -> bool {
        self.info_type == InfoType::PositionAltitude
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            info_type: InfoType::Position,
            speed_threshold_disabled: true,
            speed_threshold: 0,
            distance_threshold_disabled: true,
            distance_threshold: 0,
            time_interval_ms: 5000,
            by_distance: false,
            distance_interval: 100,
            waas_enabled: false,
            memory_usage_percent: 0,
        }
    }
}
