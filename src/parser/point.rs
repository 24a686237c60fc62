//! Track point decoding
//!
//! A raw track block comes in one of two layouts, selected by the format
//! marker in bytes 28..32 of the first record:
//!
//! - `1`: position/time/speed. The first record is 32 bytes (it carries the
//!   marker), every following record 20 bytes, and the block ends with a
//!   16-byte filler run.
//! - `2`: position/time/speed/altitude, every record 32 bytes.
//!
//! Unused space at the end of a block is filled with `0xFF`.

use crate::conversion::{convert_altitude, convert_coordinate, convert_speed, format_timestamp};
use crate::error::DecodeError;
use crate::parser::stream::RecordStream;
use crate::types::{RawTrackBlock, TrackPoint};
use tracing::debug;

pub const FILLER: u8 = 0xFF;

pub const FORMAT_POSITION: u32 = 1;
pub const FORMAT_ALTITUDE: u32 = 2;

/// First record of a block, and every record of the altitude layout.
pub const LONG_RECORD_SIZE: usize = 32;
/// Records after the first in the position layout.
pub const SHORT_RECORD_SIZE: usize = 20;
/// Filler run closing every position-layout block.
pub const POSITION_TRAILER_SIZE: usize = 16;

/// Decode one raw track block into points, in device order.
pub fn decode_block(block: &RawTrackBlock) -> Result<Vec<TrackPoint>, DecodeError> {
    let marker = block.format_marker().ok_or(DecodeError::Truncated {
        len: block.bytes.len(),
    })?;

    let points = match marker {
        FORMAT_POSITION => decode_position_block(&block.bytes)?,
        FORMAT_ALTITUDE => decode_altitude_block(&block.bytes)?,
        other => return Err(DecodeError::UnknownFormat(other)),
    };

    debug!(
        format = marker,
        raw_bytes = block.bytes.len(),
        points = points.len(),
        "decoded track block"
    );
    Ok(points)
}

/// Drop trailing `stride`-byte runs of filler, never cutting into the first
/// `keep` bytes.
fn strip_filler(mut data: &[u8], stride: usize, keep: usize) -> &[u8] {
    while data.len() >= keep + stride && data[data.len() - stride..].iter().all(|&b| b == FILLER) {
        data = &data[..data.len() - stride];
    }
    data
}

fn decode_position_block(bytes: &[u8]) -> Result<Vec<TrackPoint>, DecodeError> {
    if bytes.len() < LONG_RECORD_SIZE + POSITION_TRAILER_SIZE {
        return Err(DecodeError::Truncated { len: bytes.len() });
    }
    let data = &bytes[..bytes.len() - POSITION_TRAILER_SIZE];
    let data = strip_filler(data, SHORT_RECORD_SIZE, LONG_RECORD_SIZE);

    let (first, rest) = data.split_at(LONG_RECORD_SIZE);
    if rest.len() % SHORT_RECORD_SIZE != 0 {
        return Err(DecodeError::RaggedRecords {
            len: rest.len(),
            stride: SHORT_RECORD_SIZE,
        });
    }

    let mut points = Vec::with_capacity(1 + rest.len() / SHORT_RECORD_SIZE);
    points.push(decode_record(first, false)?);
    for record in rest.chunks_exact(SHORT_RECORD_SIZE) {
        points.push(decode_record(record, false)?);
    }
    Ok(points)
}

fn decode_altitude_block(bytes: &[u8]) -> Result<Vec<TrackPoint>, DecodeError> {
    let data = strip_filler(bytes, LONG_RECORD_SIZE, LONG_RECORD_SIZE);
    if data.len() % LONG_RECORD_SIZE != 0 {
        return Err(DecodeError::RaggedRecords {
            len: data.len(),
            stride: LONG_RECORD_SIZE,
        });
    }

    data.chunks_exact(LONG_RECORD_SIZE)
        .map(|record| decode_record(record, true))
        .collect()
}

/// Decode a single record.
///
/// Layout: latitude(4) longitude(4) unused(1) time(3) date(4) speed(4),
/// then altitude(4) when `with_altitude`.
pub fn decode_record(record: &[u8], with_altitude: bool) -> Result<TrackPoint, DecodeError> {
    let mut stream = RecordStream::new(record);

    let latitude = convert_coordinate(stream.read_u32()?);
    let longitude = convert_coordinate(stream.read_u32()?);
    stream.skip(1)?;
    let time = stream.read_u24()?;
    let date = stream.read_u32()?;
    let speed = convert_speed(stream.read_u32()?);
    let altitude = if with_altitude {
        Some(convert_altitude(stream.read_u32()?))
    } else {
        None
    };

    Ok(TrackPoint {
        latitude,
        longitude,
        timestamp: format_timestamp(date, time),
        speed,
        altitude,
    })
}
