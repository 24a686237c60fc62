//! Integration tests for export functionality
//!
//! Tests the export layer across different scenarios:
//! - GPX export with directory creation
//! - Waypoint/track point split in the written document
//! - Re-downloading a track overwrites its file
//! - Session listing export as CSV
//! - Error handling for edge cases

use dg200::export::*;
use dg200::{DeviceError, Track, TrackPoint};
use std::fs;
use tempfile::TempDir;

fn point(latitude: f64, timestamp: &str, altitude: Option<f64>) -> TrackPoint {
    TrackPoint {
        latitude,
        longitude: 2.2945,
        timestamp: timestamp.to_string(),
        speed: 3.25,
        altitude,
    }
}

fn sample_track() -> Track {
    Track::new(vec![
        point(148.8583, "2021-03-15T12:00:00Z", Some(35.0)),
        point(48.8584, "2021-03-15T12:00:05Z", Some(36.5)),
        point(48.8585, "2021-03-15T12:00:10Z", Some(37.0)),
    ])
}

#[test]
fn test_export_gpx_creates_output_directory() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let nonexistent_dir = temp_dir.path().join("nonexistent").join("output");

    let result = export_to_gpx(&nonexistent_dir, &sample_track());
    assert!(
        result.is_ok(),
        "GPX export should succeed and create directories"
    );

    assert!(
        nonexistent_dir.exists(),
        "Output directory should be created"
    );

    let gpx_path = nonexistent_dir.join("2021-03-15T12:00:00Z.gpx");
    assert_eq!(result.unwrap(), gpx_path);
    assert!(gpx_path.exists(), "GPX file should be named after the first point");
}

#[test]
fn test_export_gpx_document_contents() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = export_to_gpx(temp_dir.path(), &sample_track()).unwrap();
    let gpx = fs::read_to_string(&path).unwrap();

    assert!(gpx.starts_with("<?xml"));
    assert!(gpx.contains("version=\"1.1\""));
    assert_eq!(gpx.matches("<wpt ").count(), 1);
    assert_eq!(gpx.matches("<trkpt ").count(), 2);
    assert_eq!(gpx.matches("<trk>").count(), 1);
    assert_eq!(gpx.matches("<trkseg>").count(), 1);

    // Waypoint latitude has the session offset removed
    assert!(gpx.contains(r#"<wpt lat="48.8583000" lon="2.2945000">"#));
    assert!(gpx.contains(r#"<trkpt lat="48.8584000" lon="2.2945000">"#));
    assert!(gpx.contains("<ele>36.5</ele>"));
    assert!(gpx.contains("<time>2021-03-15T12:00:10Z</time>"));
    assert!(gpx.contains("<speed>3.25</speed>"));

    // Waypoints precede the track
    assert!(gpx.find("<wpt ").unwrap() < gpx.find("<trk>").unwrap());
}

#[test]
fn test_export_gpx_without_altitude_omits_ele() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let track = Track::new(vec![point(10.5, "2022-01-02T03:04:05Z", None)]);
    let path = export_to_gpx(temp_dir.path(), &track).unwrap();
    let gpx = fs::read_to_string(path).unwrap();
    assert!(!gpx.contains("<ele>"));
    assert!(!gpx.contains("<wpt "));
    assert_eq!(gpx.matches("<trkpt ").count(), 1);
}

#[test]
fn test_export_gpx_overwrites_existing_file() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let stale = temp_dir.path().join("2021-03-15T12:00:00Z.gpx");
    fs::write(&stale, "stale contents that are much longer than nothing at all").unwrap();

    let path = export_to_gpx(temp_dir.path(), &sample_track()).unwrap();
    assert_eq!(path, stale);
    let gpx = fs::read_to_string(&path).unwrap();
    assert!(!gpx.contains("stale contents"));
    assert!(gpx.trim_end().ends_with("</gpx>"));
}

#[test]
fn test_export_gpx_empty_track_is_error() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let result = export_to_gpx(temp_dir.path(), &Track::default());
    assert!(matches!(result, Err(DeviceError::Export(_))));
    assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);
}

#[cfg(feature = "csv")]
#[test]
fn test_export_sessions_to_csv() {
    use dg200::TrackSession;

    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let csv_path = temp_dir.path().join("listing").join("sessions.csv");
    let sessions = vec![
        TrackSession {
            date: "15/03/21".to_string(),
            time: "12:00:00".to_string(),
            indices: vec![10, 11, 12],
        },
        TrackSession {
            date: "16/03/21".to_string(),
            time: "08:00:00".to_string(),
            indices: vec![13],
        },
    ];

    export_sessions_to_csv(&csv_path, &sessions).unwrap();

    let content = fs::read_to_string(&csv_path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "session,date,time,components,indices");
    assert_eq!(lines[1], "1,15/03/21,12:00:00,3,10 11 12");
    assert_eq!(lines[2], "2,16/03/21,08:00:00,1,13");
}
