//! Export functionality for downloaded tracks
//!
//! Writes decoded tracks as GPX 1.1 documents and the session listing as CSV.

use crate::error::{DeviceError, Result};
use crate::types::{Track, TrackPoint};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

#[cfg(feature = "csv")]
use crate::types::TrackSession;

pub const GPX_EXTENSION: &str = "gpx";
pub const GPX_NAMESPACE: &str = "http://www.topografix.com/GPX/1/1";

/// Output location for a track: `<folder>/<first timestamp>.gpx`.
pub fn gpx_path(folder: &Path, track: &Track) -> Result<PathBuf> {
    let timestamp = track
        .first_timestamp()
        .ok_or_else(|| DeviceError::Export("cannot name an empty track".to_string()))?;
    Ok(folder.join(format!("{timestamp}.{GPX_EXTENSION}")))
}

/// Write `track` as GPX into `folder`, replacing any file of the same name.
///
/// Returns the path written.
pub fn export_to_gpx(folder: &Path, track: &Track) -> Result<PathBuf> {
    let path = gpx_path(folder, track)?;
    fs::create_dir_all(folder)?;

    let mut writer = BufWriter::new(File::create(&path)?);
    write_gpx(&mut writer, track)?;
    writer.flush()?;

    info!(
        path = %path.display(),
        waypoints = track.waypoints().count(),
        track_points = track.track_points().count(),
        "exported GPX"
    );
    Ok(path)
}

/// Decimal rendering that keeps a fractional part on whole numbers
/// (`100.0`, not `100`).
fn gpx_number(value: f64) -> String {
    let text = value.to_string();
    if value.is_finite() && !text.contains('.') {
        format!("{text}.0")
    } else {
        text
    }
}

fn write_point_fields<W: Write>(out: &mut W, point: &TrackPoint, indent: &str) -> std::io::Result<()> {
    writeln!(out, "{indent}<time>{}</time>", point.timestamp)?;
    writeln!(out, "{indent}<speed>{}</speed>", gpx_number(point.speed))?;
    if let Some(altitude) = point.altitude {
        writeln!(out, "{indent}<ele>{}</ele>", gpx_number(altitude))?;
    }
    Ok(())
}

/// Serialize a track as a GPX 1.1 document.
///
/// Session-start points (latitude offset by 100) become `<wpt>` elements with
/// the offset removed; every other point goes into a single `<trkseg>`.
pub fn write_gpx<W: Write>(out: &mut W, track: &Track) -> std::io::Result<()> {
    writeln!(out, r#"<?xml version="1.0" encoding="UTF-8" standalone="no" ?>"#)?;
    writeln!(
        out,
        r#"<gpx xmlns="{GPX_NAMESPACE}" creator="dg200 {}" version="1.1" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:schemaLocation="{GPX_NAMESPACE} {GPX_NAMESPACE}/gpx.xsd">"#,
        env!("CARGO_PKG_VERSION")
    )?;

    for point in track.waypoints() {
        writeln!(
            out,
            r#"  <wpt lat="{:.7}" lon="{:.7}">"#,
            point.waypoint_latitude(),
            point.longitude
        )?;
        write_point_fields(out, point, "    ")?;
        writeln!(out, "  </wpt>")?;
    }

    writeln!(out, "  <trk>")?;
    writeln!(
        out,
        "    <name>DG-200 {}</name>",
        track.first_timestamp().unwrap_or_default()
    )?;
    writeln!(out, "    <trkseg>")?;
    for point in track.track_points() {
        writeln!(
            out,
            r#"      <trkpt lat="{:.7}" lon="{:.7}">"#,
            point.latitude, point.longitude
        )?;
        write_point_fields(out, point, "        ")?;
        writeln!(out, "      </trkpt>")?;
    }
    writeln!(out, "    </trkseg>")?;
    writeln!(out, "  </trk>")?;
    writeln!(out, "</gpx>")?;
    Ok(())
}

/// Write the session listing as CSV: number, date, time, components, indices.
#[cfg(feature = "csv")]
pub fn export_sessions_to_csv(path: &Path, sessions: &[TrackSession]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["session", "date", "time", "components", "indices"])?;
    for (number, session) in sessions.iter().enumerate() {
        let indices = session
            .indices
            .iter()
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        writer.write_record([
            (number + 1).to_string(),
            session.date.clone(),
            session.time.clone(),
            session.component_count().to_string(),
            indices,
        ])?;
    }
    writer.flush()?;

    info!(path = %path.display(), sessions = sessions.len(), "exported session listing");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(latitude: f64, altitude: Option<f64>) -> TrackPoint {
        TrackPoint {
            latitude,
            longitude: -2.5,
            timestamp: "2021-03-15T12:30:45Z".to_string(),
            speed: 1.5,
            altitude,
        }
    }

    fn render(track: &Track) -> String {
        let mut out = Vec::new();
        write_gpx(&mut out, track).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_waypoint_and_track_point_split() {
        let gpx = render(&Track::new(vec![point(148.0, None), point(48.0, None)]));
        assert_eq!(gpx.matches("<wpt ").count(), 1);
        assert_eq!(gpx.matches("<trkpt ").count(), 1);
        assert!(gpx.contains(r#"<wpt lat="48.0000000" lon="-2.5000000">"#));
        assert!(gpx.contains(r#"<trkpt lat="48.0000000" lon="-2.5000000">"#));
        assert!(!gpx.contains("<ele>"));
    }

    #[test]
    fn test_fields_and_document_shape() {
        let gpx = render(&Track::new(vec![point(12.25, Some(-3.5))]));
        assert!(gpx.starts_with("<?xml version=\"1.0\""));
        assert!(gpx.contains(r#"xmlns="http://www.topografix.com/GPX/1/1""#));
        assert!(gpx.contains("<time>2021-03-15T12:30:45Z</time>"));
        assert!(gpx.contains("<speed>1.5</speed>"));
        assert!(gpx.contains("<ele>-3.5</ele>"));
        assert!(gpx.contains("<name>DG-200 2021-03-15T12:30:45Z</name>"));
        assert_eq!(gpx.matches("<trkseg>").count(), 1);
        assert!(gpx.trim_end().ends_with("</gpx>"));
    }

    #[test]
    fn test_point_fields_order_and_whole_numbers() {
        let mut p = point(12.25, Some(100.0));
        p.speed = 10.0;
        let gpx = render(&Track::new(vec![p]));
        assert!(gpx.contains("<speed>10.0</speed>"));
        assert!(gpx.contains("<ele>100.0</ele>"));
        let time = gpx.find("<time>").unwrap();
        let speed = gpx.find("<speed>").unwrap();
        let ele = gpx.find("<ele>").unwrap();
        assert!(time < speed && speed < ele);
    }

    #[test]
    fn test_gpx_number() {
        assert_eq!(gpx_number(0.0), "0.0");
        assert_eq!(gpx_number(-5.0), "-5.0");
        assert_eq!(gpx_number(1.5), "1.5");
        assert_eq!(gpx_number(-3.5), "-3.5");
    }

    #[test]
    fn test_track_points_keep_order() {
        let mut first = point(10.0, None);
        first.timestamp = "2021-03-15T12:30:45Z".to_string();
        let mut second = point(11.0, None);
        second.timestamp = "2021-03-15T12:30:50Z".to_string();
        let gpx = render(&Track::new(vec![first, second]));
        let a = gpx.find("12:30:45Z</time>").unwrap();
        let b = gpx.find("12:30:50Z</time>").unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_gpx_path_uses_first_timestamp() {
        let track = Track::new(vec![point(48.0, None)]);
        let path = gpx_path(Path::new("/tmp/out"), &track).unwrap();
        assert_eq!(path, Path::new("/tmp/out/2021-03-15T12:30:45Z.gpx"));
        assert!(matches!(
            gpx_path(Path::new("/tmp/out"), &Track::default()),
            Err(DeviceError::Export(_))
        ));
    }
}
