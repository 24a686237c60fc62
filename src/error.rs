use thiserror::Error;

/// Errors raised while decoding a raw track block into points.
///
/// A decode error only ever concerns one track component; the download
/// loop records it and moves on to the next component.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unknown track format marker {0}")]
    UnknownFormat(u32),
    #[error("track block too short: {len} bytes")]
    Truncated { len: usize },
    #[error("{len} bytes of records do not divide into {stride}-byte records")]
    RaggedRecords { len: usize, stride: usize },
}

/// Errors raised while talking to the datalogger.
#[derive(Error, Debug)]
pub enum DeviceError {
    /// Reading from or writing to the serial channel failed.
    #[error("transport error: {0}")]
    Transport(#[source] std::io::Error),
    /// The serial port could not be opened.
    #[error("cannot open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: serialport::Error,
    },
    /// The session was closed; every further call fails with this.
    #[error("device is not connected")]
    NotConnected,
    #[error("payload of {0} bytes does not fit the 16-bit length field")]
    PayloadTooLarge(usize),
    /// The channel timed out before the frame was complete.
    #[error("short read: expected {expected} bytes, received {received}")]
    ShortRead { expected: usize, received: usize },
    #[error("framing error: {0}")]
    Framing(String),
    #[error("checksum mismatch: frame carries {received:#06x}, payload sums to {computed:#06x}")]
    ChecksumMismatch { received: u16, computed: u16 },
    /// The device answered with the not-ready sentinel.
    #[error("device busy")]
    DeviceBusy,
    /// Busy or checksum retries were exhausted.
    #[error("device not responding after {attempts} attempts (last: {last})")]
    DeviceNotResponding {
        attempts: u32,
        last: Box<DeviceError>,
    },
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("protocol error: {0}")]
    Decode(#[from] DecodeError),
    #[error("unexpected configuration payload length {len} (need at least {min})")]
    ConfigParse { len: usize, min: usize },
    #[error("export error: {0}")]
    Export(String),
    /// Local file I/O (GPX/CSV output), never the serial channel.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "csv")]
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl DeviceError {
    /// Whether the frame decoder may re-read the next frame after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DeviceError::DeviceBusy | DeviceError::ChecksumMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, DeviceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_busy_and_checksum_are_retryable() {
        assert!(DeviceError::DeviceBusy.is_retryable());
        assert!(DeviceError::ChecksumMismatch {
            received: 1,
            computed: 2
        }
        .is_retryable());
        assert!(!DeviceError::NotConnected.is_retryable());
        assert!(!DeviceError::ShortRead {
            expected: 4,
            received: 0
        }
        .is_retryable());
    }

    #[test]
    fn test_decode_error_surfaces_as_protocol_error() {
        let err: DeviceError = DecodeError::UnknownFormat(7).into();
        assert_eq!(err.to_string(), "protocol error: unknown track format marker 7");
    }
}
