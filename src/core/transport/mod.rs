//! Transport layer
//!
//! The driver only needs a byte pipe with a mutable baud rate:
//! - [`ScannerTransport`] is that capability
//! - [`SerialTransport`] implements it over a real serial port
//! - [`Deadline`] bounds every read by wall-clock time

mod serial;

pub use serial::{list_ports, SerialConfig, SerialTransport};

use std::time::{Duration, Instant};
use thiserror::Error;

/// Transport error types
#[derive(Error, Debug)]
pub enum TransportError {
    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Port not found
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Baud rate rejected by the port
    #[error("Invalid baud rate: {0}")]
    InvalidBaudRate(u32),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Disconnected
    #[error("Disconnected")]
    Disconnected,
}

/// Wall-clock limit for one read phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// Deadline `timeout` from now
    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now() + timeout,
        }
    }

    /// Deadline at a fixed instant
    pub fn at(at: Instant) -> Self {
        Self { at }
    }

    /// Time left, zero once expired
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    /// Whether the deadline has passed
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// The instant itself
    pub fn instant(&self) -> Instant {
        self.at
    }
}

/// Byte pipe to one scanner
///
/// Owned exclusively by one driver: the wire protocol has no request IDs,
/// so two users of the same port would read each other's replies.
pub trait ScannerTransport {
    /// Write all of `data`
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Read up to `max_bytes` that arrive before `deadline`
    ///
    /// Returns as soon as any data is available. An empty result means
    /// nothing arrived in time; this never blocks past the deadline.
    fn read(&mut self, max_bytes: usize, deadline: &Deadline) -> Result<Vec<u8>, TransportError>;

    /// Current host-side baud rate
    fn baud_rate(&self) -> u32;

    /// Change the host-side baud rate, between complete exchanges only
    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<(), TransportError>;

    /// Collect everything that arrives before `deadline`
    fn read_until(&mut self, deadline: &Deadline) -> Result<Vec<u8>, TransportError> {
        let mut received = Vec::new();
        while !deadline.is_expired() {
            let chunk = self.read(READ_CHUNK, deadline)?;
            received.extend_from_slice(&chunk);
        }
        Ok(received)
    }
}

/// Largest single read request
pub const READ_CHUNK: usize = 1024;

impl<T: ScannerTransport + ?Sized> ScannerTransport for &mut T {
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        (**self).write(data)
    }

    fn read(&mut self, max_bytes: usize, deadline: &Deadline) -> Result<Vec<u8>, TransportError> {
        (**self).read(max_bytes, deadline)
    }

    fn baud_rate(&self) -> u32 {
        (**self).baud_rate()
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<(), TransportError> {
        (**self).set_baud_rate(baud_rate)
    }
}

impl<T: ScannerTransport + ?Sized> ScannerTransport for Box<T> {
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        (**self).write(data)
    }

    fn read(&mut self, max_bytes: usize, deadline: &Deadline) -> Result<Vec<u8>, TransportError> {
        (**self).read(max_bytes, deadline)
    }

    fn baud_rate(&self) -> u32 {
        (**self).baud_rate()
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<(), TransportError> {
        (**self).set_baud_rate(baud_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline() {
        let expired = Deadline::after(Duration::ZERO);
        assert!(expired.is_expired());
        assert_eq!(expired.remaining(), Duration::ZERO);

        let later = Deadline::after(Duration::from_secs(60));
        assert!(!later.is_expired());
        assert!(later.remaining() > Duration::from_secs(59));
    }
}
