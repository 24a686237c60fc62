//! Device commands
//!
//! One function per DG-200 operation. Each is a strict request/response
//! exchange over the frame codec; nothing here keeps state between calls.

use crate::conversion::{format_header_date, format_header_time};
use crate::error::{DeviceError, Result};
use crate::protocol::frame::{decode, exchange, send, RetryPolicy};
use crate::transport::Transport;
use crate::types::{ClearStatus, Configuration, InfoType, RawTrackBlock, TrackHeader};
use std::collections::HashSet;
use tracing::{debug, warn};

pub const CMD_READ_TRACK: u8 = 0xB5;
pub const CMD_GET_CONFIGURATION: u8 = 0xB7;
pub const CMD_SET_CONFIGURATION: u8 = 0xB8;
pub const CMD_CLEAR_MEMORY: u8 = 0xBA;
pub const CMD_LIST_HEADERS: u8 = 0xBB;
pub const CMD_IDENTIFY: u8 = 0xBF;

/// Configuration reply: command byte plus 43 bytes of settings.
pub const CONFIGURATION_REPLY_LEN: usize = 44;
/// Set-configuration request: command byte plus 42 bytes of settings.
pub const CONFIGURATION_REQUEST_LEN: usize = 43;

// Offsets inside configuration payloads, counted from the command byte.
const CFG_INFO_TYPE: usize = 1;
const CFG_SPEED_DISABLED: usize = 2;
const CFG_SPEED_THRESHOLD: usize = 3;
const CFG_DISTANCE_DISABLED: usize = 7;
const CFG_DISTANCE_THRESHOLD: usize = 8;
const CFG_TIME_INTERVAL: usize = 12;
const CFG_BY_DISTANCE: usize = 26;
const CFG_DISTANCE_INTERVAL: usize = 29;
const CFG_MODE: usize = 41;
const CFG_WAAS: usize = 42;
const CFG_MEMORY_USAGE: usize = 43;

/// Operation mode byte every set-configuration request carries.
const OPERATION_MODE: u8 = 4;

pub const HEADER_SLOT_SIZE: usize = 12;
/// First byte of a header slot that opens a new session.
pub const FIRST_IN_SESSION: u8 = 0x80;
/// Next-page index inside a header page reply.
const PAGE_NEXT_INDEX: usize = 3;
/// Header slots start after the command byte, the count field and the
/// next-page index.
const PAGE_RECORDS: usize = 5;

fn be_u32(payload: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        payload[offset],
        payload[offset + 1],
        payload[offset + 2],
        payload[offset + 3],
    ])
}

/// Ask the device to identify itself; returns the raw reply payload.
pub fn identify<T: Transport + ?Sized>(transport: &mut T, policy: &RetryPolicy) -> Result<Vec<u8>> {
    exchange(transport, policy, &[CMD_IDENTIFY])
}

/// Query the current configuration.
pub fn get_configuration<T: Transport + ?Sized>(
    transport: &mut T,
    policy: &RetryPolicy,
) -> Result<Configuration> {
    let reply = exchange(transport, policy, &[CMD_GET_CONFIGURATION])?;
    parse_configuration(&reply)
}

/// Parse a configuration reply (leading command byte included).
pub fn parse_configuration(payload: &[u8]) -> Result<Configuration> {
    if payload.len() < CONFIGURATION_REPLY_LEN {
        return Err(DeviceError::ConfigParse {
            len: payload.len(),
            min: CONFIGURATION_REPLY_LEN,
        });
    }

    Ok(Configuration {
        info_type: InfoType::from_byte(payload[CFG_INFO_TYPE]),
        speed_threshold_disabled: payload[CFG_SPEED_DISABLED] == 1,
        speed_threshold: be_u32(payload, CFG_SPEED_THRESHOLD),
        distance_threshold_disabled: payload[CFG_DISTANCE_DISABLED] == 1,
        distance_threshold: be_u32(payload, CFG_DISTANCE_THRESHOLD),
        time_interval_ms: be_u32(payload, CFG_TIME_INTERVAL),
        by_distance: payload[CFG_BY_DISTANCE] != 0,
        distance_interval: be_u32(payload, CFG_DISTANCE_INTERVAL),
        waas_enabled: payload[CFG_WAAS] == 1,
        memory_usage_percent: payload[CFG_MEMORY_USAGE],
    })
}

/// Serialize a configuration into a set-configuration request.
///
/// Reserved bytes are zero; memory usage is device-computed and not sent.
pub fn encode_configuration(config: &Configuration) -> Vec<u8> {
    let mut payload = vec![0u8; CONFIGURATION_REQUEST_LEN];
    payload[0] = CMD_SET_CONFIGURATION;
    payload[CFG_INFO_TYPE] = config.info_type.to_byte();
    payload[CFG_SPEED_DISABLED] = config.speed_threshold_disabled as u8;
    payload[CFG_SPEED_THRESHOLD..CFG_SPEED_THRESHOLD + 4]
        .copy_from_slice(&config.speed_threshold.to_be_bytes());
    payload[CFG_DISTANCE_DISABLED] = config.distance_threshold_disabled as u8;
    payload[CFG_DISTANCE_THRESHOLD..CFG_DISTANCE_THRESHOLD + 4]
        .copy_from_slice(&config.distance_threshold.to_be_bytes());
    payload[CFG_TIME_INTERVAL..CFG_TIME_INTERVAL + 4]
        .copy_from_slice(&config.time_interval_ms.to_be_bytes());
    payload[CFG_BY_DISTANCE] = config.by_distance as u8;
    payload[CFG_DISTANCE_INTERVAL..CFG_DISTANCE_INTERVAL + 4]
        .copy_from_slice(&config.distance_interval.to_be_bytes());
    payload[CFG_MODE] = OPERATION_MODE;
    payload[CFG_WAAS] = config.waas_enabled as u8;
    payload
}

/// Write a configuration; returns the device's acknowledgement payload.
///
/// Re-query afterwards: device-computed fields are not echoed back.
pub fn set_configuration<T: Transport + ?Sized>(
    transport: &mut T,
    policy: &RetryPolicy,
    config: &Configuration,
) -> Result<Vec<u8>> {
    let reply = exchange(transport, policy, &encode_configuration(config))?;
    debug!(reply = ?reply, "configuration written");
    Ok(reply)
}

/// Walk the paginated header listing and return every header slot in order.
pub fn list_headers<T: Transport + ?Sized>(
    transport: &mut T,
    policy: &RetryPolicy,
) -> Result<Vec<TrackHeader>> {
    let mut records = Vec::new();
    let mut visited = HashSet::new();
    let mut page: u16 = 0;

    loop {
        let [hi, lo] = page.to_be_bytes();
        let reply = exchange(transport, policy, &[CMD_LIST_HEADERS, hi, lo])?;
        if reply.len() < PAGE_RECORDS {
            return Err(DeviceError::Protocol(format!(
                "header page {page} reply too short: {} bytes",
                reply.len()
            )));
        }

        let next = u16::from_be_bytes([reply[PAGE_NEXT_INDEX], reply[PAGE_NEXT_INDEX + 1]]);
        records.extend_from_slice(&reply[PAGE_RECORDS..]);
        debug!(
            page,
            next,
            slots = (reply.len() - PAGE_RECORDS) / HEADER_SLOT_SIZE,
            "header page received"
        );

        if next == 0 {
            break;
        }
        visited.insert(page);
        if visited.contains(&next) {
            return Err(DeviceError::Protocol(format!(
                "header pagination loops back to page {next}"
            )));
        }
        page = next;
    }

    Ok(parse_headers(&records))
}

/// Parse accumulated header slots, filling each session opener's
/// component count.
pub fn parse_headers(records: &[u8]) -> Vec<TrackHeader> {
    let leftover = records.len() % HEADER_SLOT_SIZE;
    if leftover != 0 {
        warn!(leftover, "ignoring partial header slot");
    }

    let mut headers: Vec<TrackHeader> = Vec::with_capacity(records.len() / HEADER_SLOT_SIZE);
    let mut opener: Option<usize> = None;

    for slot in records.chunks_exact(HEADER_SLOT_SIZE) {
        let first_in_session = slot[0] == FIRST_IN_SESSION;
        let time = u32::from_be_bytes([0, slot[1], slot[2], slot[3]]);

        if first_in_session {
            opener = Some(headers.len());
        }
        headers.push(TrackHeader {
            index: be_u32(slot, 8),
            date: format_header_date(be_u32(slot, 4)),
            time: format_header_time(time),
            first_in_session,
            component_count: 0,
        });

        if let Some(at) = opener {
            headers[at].component_count += 1;
        }
    }

    headers
}

/// Read one track component: one request, two reply frames.
///
/// `on_part` is called after each reply so callers can report progress.
pub fn read_track_component<T, F>(
    transport: &mut T,
    policy: &RetryPolicy,
    index: u16,
    mut on_part: F,
) -> Result<RawTrackBlock>
where
    T: Transport + ?Sized,
    F: FnMut(),
{
    let [hi, lo] = index.to_be_bytes();
    send(transport, &[CMD_READ_TRACK, hi, lo])?;

    let mut bytes = Vec::new();
    for part in 1..=2 {
        let reply = decode(transport, policy)?;
        let (_, data) = reply.split_first().ok_or_else(|| {
            DeviceError::Protocol(format!("empty reply for part {part} of track {index}"))
        })?;
        bytes.extend_from_slice(data);
        on_part();
    }

    debug!(index, bytes = bytes.len(), "track component read");
    Ok(RawTrackBlock::new(bytes))
}

/// Erase every stored track.
pub fn clear_memory<T: Transport + ?Sized>(
    transport: &mut T,
    policy: &RetryPolicy,
) -> Result<ClearStatus> {
    let reply = exchange(transport, policy, &[CMD_CLEAR_MEMORY, 0xFF, 0xFF])?;
    if reply.len() < 5 {
        return Err(DeviceError::Protocol(format!(
            "clear memory reply too short: {} bytes",
            reply.len()
        )));
    }
    let status = ClearStatus::from_status(be_u32(&reply, 1));
    if let ClearStatus::Rejected(code) = status {
        warn!(code, "device reported non-zero status for memory erase");
    }
    Ok(status)
}
