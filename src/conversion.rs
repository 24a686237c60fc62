//! Data conversion utilities for DG-200 records
//!
//! Raw record fields are big-endian integers. Coordinates use a signed
//! fixed-point `DDDMMmmmm` encoding (degrees, then minutes with four
//! decimals); dates and times are decimal digit groups.

/// Values whose leading byte exceeds this are two's-complement negatives.
const SIGN_THRESHOLD: u32 = 128;

fn is_negative(raw: u32) -> bool {
    (raw >> 24) > SIGN_THRESHOLD
}

/// Magnitude of a raw field, two's-complement over the full 32 bits when
/// the leading byte marks it negative.
fn magnitude(raw: u32) -> u64 {
    if is_negative(raw) {
        (1u64 << 32) - raw as u64
    } else {
        raw as u64
    }
}

/// Convert a raw `DDDMMmmmm` coordinate to signed decimal degrees.
pub fn convert_coordinate(raw: u32) -> f64 {
    let magnitude = magnitude(raw);
    // Last six digits are minutes * 10^4.
    let degrees = (magnitude / 1_000_000) as f64;
    let fraction = (magnitude % 1_000_000) as f64 / 600_000.0;
    let value = degrees + fraction;
    if is_negative(raw) {
        -value
    } else {
        value
    }
}

/// Convert raw speed (km/h * 100) to meters per second.
pub fn convert_speed(raw: u32) -> f64 {
    raw as f64 / 100.0 / 3.6
}

/// Convert raw altitude (m * 10^4, signed) to meters.
pub fn convert_altitude(raw: u32) -> f64 {
    let meters = magnitude(raw) as f64 / 10_000.0;
    if is_negative(raw) {
        -meters
    } else {
        meters
    }
}

/// Zero-padded six-digit groups: `(first, second, third)` two-digit slices.
fn digit_pairs(raw: u32) -> (String, String, String) {
    let digits = format!("{raw:06}");
    (
        digits[0..2].to_string(),
        digits[2..4].to_string(),
        digits[4..6].to_string(),
    )
}

/// Assemble an ISO-8601 UTC timestamp from a `DDMMYY` date field and an
/// `HHMMSS` time field. Years count from 2000.
pub fn format_timestamp(date_raw: u32, time_raw: u32) -> String {
    let (day, month, year) = digit_pairs(date_raw);
    let (hour, minute, second) = digit_pairs(time_raw);
    format!("20{year}-{month}-{day}T{hour}:{minute}:{second}Z")
}

/// Header date as shown in listings, `DD/MM/YY`.
pub fn format_header_date(raw: u32) -> String {
    let (day, month, year) = digit_pairs(raw);
    format!("{day}/{month}/{year}")
}

/// Header time as shown in listings, `HH:MM:SS`.
pub fn format_header_time(raw: u32) -> String {
    let (hour, minute, second) = digit_pairs(raw);
    format!("{hour}:{minute}:{second}")
}

/// Convert meters per second to km/h for display.
pub fn convert_speed_to_kmh(meters_per_second: f64) -> f64 {
    meters_per_second * 3.6
}

#[cfg(test)]
mod tests {
    use super::*;

    // 48 deg 51.4933 min = 48 deg 51' 29.6"
    const PARIS_LAT_RAW: u32 = 48_514_933;

    #[test]
    fn test_convert_positive_coordinate() {
        assert!((convert_coordinate(PARIS_LAT_RAW) - 48.858222).abs() < 1e-6);
    }

    #[test]
    fn test_convert_negative_coordinate() {
        let raw = ((1u64 << 32) - PARIS_LAT_RAW as u64) as u32;
        assert!(raw >> 24 > 128);
        assert!((convert_coordinate(raw) + 48.858222).abs() < 1e-6);
    }

    #[test]
    fn test_convert_small_coordinates() {
        // 0 deg 30 min
        assert!((convert_coordinate(300_000) - 0.5).abs() < 1e-9);
        assert_eq!(convert_coordinate(0), 0.0);
        // -0 deg 30 min
        assert!((convert_coordinate(0u32.wrapping_sub(300_000)) + 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_leading_byte_128_is_not_negative() {
        assert!(convert_coordinate(0x8000_0000) > 0.0);
    }

    #[test]
    fn test_waypoint_offset_survives_conversion() {
        // 148 deg 30 min
        assert!((convert_coordinate(148_300_000) - 148.5).abs() < 1e-9);
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(150_321, 123_045), "2021-03-15T12:30:45Z");
        assert_eq!(format_timestamp(10_105, 5), "2005-01-01T00:00:05Z");
    }

    #[test]
    fn test_header_date_and_time() {
        assert_eq!(format_header_date(150_321), "15/03/21");
        assert_eq!(format_header_time(93_000), "09:30:00");
    }

    #[test]
    fn test_convert_speed() {
        assert!((convert_speed(3600) - 10.0).abs() < 1e-9);
        assert!((convert_speed_to_kmh(convert_speed(3600)) - 36.0).abs() < 1e-9);
    }

    #[test]
    fn test_convert_altitude() {
        assert!((convert_altitude(1_234_500) - 123.45).abs() < 1e-9);
        assert!((convert_altitude(0u32.wrapping_sub(50_000)) + 5.0).abs() < 1e-9);
    }
}
