//! Byte channel to the datalogger
//!
//! The protocol layer only needs two primitives: write a whole frame, and read
//! up to N bytes with a bounded timeout. [`SerialTransport`] provides them over
//! a real serial port; [`MemoryTransport`] replays scripted device bytes and
//! records what was written, for tests and dry runs.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::time::Duration;

/// Baud rate the DG-200 talks at.
pub const DEFAULT_BAUD: u32 = 230_400;

/// Read timeout applied to every receive call.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Reliable byte channel with bounded-timeout reads.
pub trait Transport {
    /// Write all bytes of `bytes` to the device.
    fn send(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Fill `buf` from the device.
    ///
    /// Returns the number of bytes read; fewer than `buf.len()` means the
    /// read timeout elapsed first.
    fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Human-readable channel name for logs.
    fn name(&self) -> String {
        "transport".to_string()
    }
}

/// Serial port transport backed by the `serialport` crate.
pub struct SerialTransport {
    port: Box<dyn serialport::SerialPort>,
    path: String,
}

impl SerialTransport {
    /// Open `path` at `baud_rate` (8N1, no flow control).
    pub fn open(path: &str, baud_rate: u32, read_timeout: Duration) -> serialport::Result<Self> {
        let port = serialport::new(path, baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(read_timeout)
            .open()?;

        Ok(Self {
            port,
            path: path.to_string(),
        })
    }
}

impl Transport for SerialTransport {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()
    }

    fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.port.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    fn name(&self) -> String {
        self.path.clone()
    }
}

/// In-memory transport: reads drain a scripted byte queue, writes are recorded.
///
/// An exhausted queue behaves like a read timeout.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    incoming: VecDeque<u8>,
    written: Vec<Vec<u8>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes the "device" will answer with.
    pub fn push_incoming(&mut self, bytes: &[u8]) {
        self.incoming.extend(bytes);
    }

    /// Every `send` call so far, in order.
    pub fn written(&self) -> &[Vec<u8>] {
        &self.written
    }

    /// Bytes still waiting to be read.
    pub fn pending(&self) -> usize {
        self.incoming.len()
    }
}

impl Transport for MemoryTransport {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.written.push(bytes.to_vec());
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.incoming.len());
        for (slot, byte) in buf.iter_mut().zip(self.incoming.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn name(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_transport_short_read_on_exhaustion() {
        let mut transport = MemoryTransport::new();
        transport.push_incoming(&[1, 2, 3]);

        let mut buf = [0u8; 5];
        let n = transport.receive(&mut buf).unwrap();
        assert_eq!(n, 3);
        assert_eq!(&buf[..3], &[1, 2, 3]);
        assert_eq!(transport.pending(), 0);
        assert_eq!(transport.receive(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_memory_transport_records_writes() {
        let mut transport = MemoryTransport::new();
        transport.send(&[0xA0, 0xA2]).unwrap();
        transport.send(&[0xB0, 0xB3]).unwrap();
        assert_eq!(transport.written(), &[vec![0xA0, 0xA2], vec![0xB0, 0xB3]]);
    }
}
