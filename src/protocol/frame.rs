//! Frame codec
//!
//! Every exchange with the DG-200 is a frame:
//!
//! ```text
//! A0 A2 <len_hi> <len_lo> <payload...> <chk_hi> <chk_lo> B0 B3
//! ```
//!
//! The sending side reduces the payload sum modulo 32767 while the device's
//! replies are validated modulo 32768. Both moduli are kept as observed on the
//! wire; they only disagree once a payload sums past 32766.

use crate::error::{DeviceError, Result};
use crate::transport::Transport;
use std::thread;
use std::time::Duration;
use tracing::{trace, warn};

pub const START_MARKER: [u8; 2] = [0xA0, 0xA2];
pub const END_MARKER: [u8; 2] = [0xB0, 0xB3];

/// Modulus of the checksum we emit.
pub const SEND_CHECKSUM_MODULUS: u32 = 32767;
/// Modulus the device's checksums are validated against.
pub const RECEIVE_CHECKSUM_MODULUS: u32 = 32768;

/// Leading payload byte of a "not ready, ask me later" reply.
pub const NOT_READY: u8 = 0x12;

/// Length field plus start marker.
const HEADER_LEN: usize = 4;
/// Checksum plus end marker.
const TRAILER_LEN: usize = 4;

/// Bounded retry with exponential backoff for busy replies and bad checksums.
///
/// A retry re-reads the next frame from the channel; the request is never
/// sent again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total frame reads allowed, the first one included.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Retries without sleeping between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(1600),
        }
    }
}

/// Sum of `bytes` reduced modulo `modulus`.
pub fn checksum(bytes: &[u8], modulus: u32) -> u16 {
    let sum: u64 = bytes.iter().map(|&b| b as u64).sum();
    (sum % modulus as u64) as u16
}

/// Build a complete outgoing frame around `payload`.
pub fn encode(payload: &[u8]) -> Result<Vec<u8>> {
    let len = u16::try_from(payload.len())
        .map_err(|_| DeviceError::PayloadTooLarge(payload.len()))?;

    let mut frame = Vec::with_capacity(payload.len() + HEADER_LEN + TRAILER_LEN);
    frame.extend_from_slice(&START_MARKER);
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    frame.extend_from_slice(&checksum(payload, SEND_CHECKSUM_MODULUS).to_be_bytes());
    frame.extend_from_slice(&END_MARKER);
    Ok(frame)
}

/// Encode `payload` and write it to the channel.
pub fn send<T: Transport + ?Sized>(transport: &mut T, payload: &[u8]) -> Result<()> {
    let frame = encode(payload)?;
    trace!(target: "dg200::frame", "sent: {:02X?}", payload);
    transport.send(&frame).map_err(DeviceError::Transport)
}

/// Read exactly `len` bytes or fail with `ShortRead`.
fn read_exact<T: Transport + ?Sized>(transport: &mut T, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    let received = transport.receive(&mut buf).map_err(DeviceError::Transport)?;
    if received < len {
        return Err(DeviceError::ShortRead {
            expected: len,
            received,
        });
    }
    Ok(buf)
}

/// Read and validate a single frame, without any retry.
///
/// Returns the payload with its leading command/status byte.
pub fn read_frame<T: Transport + ?Sized>(transport: &mut T) -> Result<Vec<u8>> {
    let header = read_exact(transport, HEADER_LEN)?;
    if header[..2] != START_MARKER {
        return Err(DeviceError::Framing(format!(
            "bad start marker {:02X?}",
            &header[..2]
        )));
    }
    let payload_len = u16::from_be_bytes([header[2], header[3]]) as usize;

    let mut body = read_exact(transport, payload_len + TRAILER_LEN)?;
    let trailer = body.split_off(payload_len);
    if trailer[2..] != END_MARKER {
        return Err(DeviceError::Framing(format!(
            "bad end marker {:02X?}",
            &trailer[2..]
        )));
    }

    if body.first() == Some(&NOT_READY) {
        return Err(DeviceError::DeviceBusy);
    }

    let received = u16::from_be_bytes([trailer[0], trailer[1]]);
    let computed = checksum(&body, RECEIVE_CHECKSUM_MODULUS);
    if received != computed {
        return Err(DeviceError::ChecksumMismatch { received, computed });
    }

    trace!(target: "dg200::frame", "received: {:02X?}", body);
    Ok(body)
}

/// Read the next valid frame, re-reading on busy replies and checksum
/// mismatches until `policy` runs out.
pub fn decode<T: Transport + ?Sized>(transport: &mut T, policy: &RetryPolicy) -> Result<Vec<u8>> {
    let mut attempt = 1;
    loop {
        match read_frame(transport) {
            Ok(payload) => return Ok(payload),
            Err(e) if e.is_retryable() => {
                if attempt >= policy.max_attempts {
                    return Err(DeviceError::DeviceNotResponding {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                let delay = policy.backoff(attempt);
                warn!(
                    target: "dg200::frame",
                    attempt,
                    max_attempts = policy.max_attempts,
                    ?delay,
                    "{e}, reading next frame"
                );
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Send one request and wait for its reply.
pub fn exchange<T: Transport + ?Sized>(
    transport: &mut T,
    policy: &RetryPolicy,
    payload: &[u8],
) -> Result<Vec<u8>> {
    send(transport, payload)?;
    decode(transport, policy)
}

/// Build a device reply frame, checksummed the way replies are validated.
///
/// The device side of the protocol, for simulators and tests.
pub fn encode_reply(payload: &[u8]) -> Result<Vec<u8>> {
    let mut frame = encode(payload)?;
    let chk = checksum(payload, RECEIVE_CHECKSUM_MODULUS).to_be_bytes();
    let at = frame.len() - TRAILER_LEN;
    frame[at..at + 2].copy_from_slice(&chk);
    Ok(frame)
}
