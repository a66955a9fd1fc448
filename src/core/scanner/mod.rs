//! Scanner driver
//!
//! [`Scanner`] owns one transport and speaks one [`Dialect`]. Every command
//! is a single exchange: encode, write, collect bytes until a valid reply
//! decodes or the deadline passes.
//!
//! Where the dialects diverge in *how* a setting is changed, the driver
//! dispatches to a per-dialect strategy:
//! - [`gm65`]: read-modify-write of the settings register, then save
//! - [`m3yw`]: one discrete opcode per mode

pub mod gm65;
pub mod m3yw;

use crate::core::protocol::framing::{self, DecodeError, DecodedFrame, FrameDecoder};
use crate::core::protocol::{Command, Dialect, DialectDescriptor};
use crate::core::settings::{LightMode, ScanMode, SettingsRegister};
use crate::core::transport::{Deadline, ScannerTransport, TransportError, READ_CHUNK};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// Baud rates tried by [`Scanner::find_baudrate`], most common first
pub const BAUD_RATES: [u32; 8] = [9600, 115200, 57600, 38400, 19200, 14400, 4800, 1200];

/// Scanner error types
#[derive(Error, Debug)]
pub enum ScannerError {
    /// No valid reply frame arrived
    #[error("Invalid reply: {0}")]
    Decode(#[from] DecodeError),

    /// The dialect has no way to perform the operation
    #[error("{operation} is not supported by {dialect}")]
    UnsupportedOperation {
        /// Dialect of the driver
        dialect: Dialect,
        /// Requested operation
        operation: &'static str,
    },

    /// Argument outside what the protocol can encode, rejected before any I/O
    #[error("Value out of range: {0}")]
    DomainValue(String),

    /// No baud value is known for this rate
    #[error("Unsupported baud rate: {0}")]
    UnsupportedBaudRate(u32),

    /// The device did not answer at the new baud rate
    #[error("Baud rate change to {baud_rate} could not be confirmed")]
    BaudrateChangeUnconfirmed {
        /// Rate the transport was switched to
        baud_rate: u32,
    },

    /// A reply decoded but its contents are unusable
    #[error("Unexpected reply: {0}")]
    UnexpectedReply(String),

    /// Detection exhausted every dialect and baud rate
    #[error("No supported scanner found")]
    NoDeviceFound,

    /// Transport failure
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl ScannerError {
    /// Whether a retry or the next probe candidate may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::UnexpectedReply(_))
    }

    fn unsupported(dialect: Dialect, operation: &'static str) -> Self {
        Self::UnsupportedOperation { dialect, operation }
    }
}

/// Read windows per operation type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Command replies (register queries and writes)
    pub command_ms: u64,
    /// Detection and baud-sweep probes
    pub probe_ms: u64,
    /// Continuous-scan capture
    pub capture_ms: u64,
}

impl Timeouts {
    /// Command reply window
    pub fn command(&self) -> Duration {
        Duration::from_millis(self.command_ms)
    }

    /// Probe reply window
    pub fn probe(&self) -> Duration {
        Duration::from_millis(self.probe_ms)
    }

    /// Capture window
    pub fn capture(&self) -> Duration {
        Duration::from_millis(self.capture_ms)
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            command_ms: 500,
            probe_ms: 300,
            capture_ms: 10_000,
        }
    }
}

/// A decoded reply
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reply {
    /// Reply payload
    pub payload: Vec<u8>,
    /// Bytes received after the reply frame
    pub leftover: Vec<u8>,
    /// Bytes dropped ahead of the reply frame, such as barcode output
    pub skipped: Vec<u8>,
}

impl From<DecodedFrame<'_>> for Reply {
    fn from(frame: DecodedFrame<'_>) -> Self {
        Self {
            payload: frame.payload.to_vec(),
            leftover: frame.leftover.to_vec(),
            skipped: Vec::new(),
        }
    }
}

/// Result of a capture window
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Capture {
    /// Payloads of protocol frames seen in the stream
    pub frames: Vec<Vec<u8>>,
    /// Bytes outside any frame, typically raw barcode output
    pub unframed: Vec<u8>,
}

impl Capture {
    /// Whether anything at all was received
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty() && self.unframed.is_empty()
    }
}

/// Driver for one scanner on one transport
#[derive(Debug)]
pub struct Scanner<T: ScannerTransport> {
    transport: T,
    dialect: &'static DialectDescriptor,
    timeouts: Timeouts,
}

impl<T: ScannerTransport> Scanner<T> {
    /// Create a driver speaking `dialect` over `transport`
    pub fn new(transport: T, dialect: Dialect) -> Self {
        Self {
            transport,
            dialect: dialect.descriptor(),
            timeouts: Timeouts::default(),
        }
    }

    /// Replace the read windows
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Dialect spoken by this driver
    pub fn dialect(&self) -> Dialect {
        self.dialect.dialect
    }

    /// Static wire grammar
    pub fn descriptor(&self) -> &'static DialectDescriptor {
        self.dialect
    }

    /// Read windows in use
    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    /// Borrow the transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Release the transport
    pub fn into_transport(self) -> T {
        self.transport
    }

    // ============ Exchanges ============

    /// Send an opcode outside the command table
    pub fn send_raw(&mut self, opcode: &[u8]) -> Result<Reply, ScannerError> {
        self.exchange(opcode, &[], self.timeouts.command())
    }

    /// Send a table command with `argument`
    pub(crate) fn request(&mut self, command: Command, argument: &[u8]) -> Result<Reply, ScannerError> {
        let opcode = self.opcode(command)?;
        self.exchange(opcode, argument, self.timeouts.command())
    }

    pub(crate) fn opcode(&self, command: Command) -> Result<&'static [u8], ScannerError> {
        self.dialect
            .opcode(command)
            .ok_or_else(|| ScannerError::unsupported(self.dialect(), command.name()))
    }

    fn exchange(
        &mut self,
        opcode: &[u8],
        argument: &[u8],
        timeout: Duration,
    ) -> Result<Reply, ScannerError> {
        let frame = framing::encode(self.dialect, opcode, argument);
        debug!("{} TX: {}", self.dialect.name, hex::encode(&frame));
        self.transport.write(&frame)?;
        self.collect_reply(timeout)
    }

    /// Accumulate bytes until a frame decodes or the window closes
    ///
    /// Bytes that cannot start a reply are skipped up to the next header
    /// candidate. On timeout the most telling decode error is reported: a
    /// rejected frame wins over a merely truncated buffer.
    fn collect_reply(&mut self, timeout: Duration) -> Result<Reply, ScannerError> {
        let deadline = Deadline::after(timeout);
        let mut received = Vec::new();
        let mut skipped = Vec::new();
        let mut rejected: Option<DecodeError> = None;
        let mut incomplete = DecodeError::TruncatedHeader {
            needed: self.dialect.rx_header_len(),
            available: 0,
        };

        loop {
            let chunk = self.transport.read(READ_CHUNK, &deadline)?;
            if !chunk.is_empty() {
                received.extend_from_slice(&chunk);
                loop {
                    match framing::decode(self.dialect, &received) {
                        Ok(frame) => {
                            debug!(
                                "{} RX: {} (payload {}, leftover {})",
                                self.dialect.name,
                                hex::encode(&received),
                                hex::encode(frame.payload),
                                hex::encode(frame.leftover)
                            );
                            let mut reply = Reply::from(frame);
                            reply.skipped = skipped;
                            return Ok(reply);
                        }
                        Err(e) if e.is_incomplete() => {
                            incomplete = e;
                            break;
                        }
                        Err(e) => {
                            let skip = framing::resync_offset(self.dialect, &received);
                            trace!("{} RX: skipping {} bytes ({})", self.dialect.name, skip, e);
                            skipped.extend(received.drain(..skip));
                            rejected = Some(e);
                        }
                    }
                }
            }
            if deadline.is_expired() {
                break;
            }
        }

        let error = rejected.unwrap_or(incomplete);
        debug!(
            "{} RX timeout: {} skipped, {} pending ({})",
            self.dialect.name,
            hex::encode(&skipped),
            hex::encode(&received),
            error
        );
        Err(error.into())
    }

    // ============ Queries ============

    /// Hardware version reply
    pub fn get_hardware_version(&mut self) -> Result<Reply, ScannerError> {
        self.request(Command::GetHardwareVersion, &[])
    }

    /// Software version reply
    pub fn get_software_version(&mut self) -> Result<Reply, ScannerError> {
        self.request(Command::GetSoftwareVersion, &[])
    }

    /// Software year reply
    pub fn get_software_year(&mut self) -> Result<Reply, ScannerError> {
        self.request(Command::GetSoftwareYear, &[])
    }

    /// Software version query with the short probe window
    pub fn probe(&mut self) -> Result<Reply, ScannerError> {
        let opcode = self.opcode(Command::GetSoftwareVersion)?;
        self.exchange(opcode, &[], self.timeouts.probe())
    }

    // ============ Settings register ============

    /// Read the settings register
    pub fn get_settings(&mut self) -> Result<SettingsRegister, ScannerError> {
        let reply = self.request(Command::GetSettings, &[])?;
        reply
            .payload
            .first()
            .copied()
            .map(SettingsRegister::new)
            .ok_or_else(|| ScannerError::UnexpectedReply("empty settings payload".to_string()))
    }

    /// Write the settings register (not persisted until saved)
    pub fn set_settings(&mut self, settings: SettingsRegister) -> Result<Reply, ScannerError> {
        self.request(Command::SetSettings, &[settings.raw()])
    }

    /// Persist the settings register across power cycles
    pub fn save_settings(&mut self) -> Result<Reply, ScannerError> {
        self.request(Command::SaveSettings, &[])
    }

    // ============ Modes ============

    /// Illumination off, normal or on
    pub fn set_illumination(&mut self, mode: LightMode) -> Result<Reply, ScannerError> {
        match self.dialect() {
            Dialect::Gm65 => gm65::set_illumination(self, mode),
            Dialect::M3yw => m3yw::set_illumination(self, mode),
        }
    }

    /// Aimer off, normal or on
    pub fn set_aimer(&mut self, mode: LightMode) -> Result<Reply, ScannerError> {
        match self.dialect() {
            Dialect::Gm65 => gm65::set_aimer(self, mode),
            Dialect::M3yw => m3yw::set_aimer(self, mode),
        }
    }

    /// Beeper off or on; there is no normal beeper mode
    pub fn set_beeper(&mut self, mode: LightMode) -> Result<Reply, ScannerError> {
        if mode == LightMode::Normal {
            return Err(ScannerError::unsupported(self.dialect(), "beeper_normal"));
        }
        match self.dialect() {
            Dialect::Gm65 => gm65::set_beeper(self, mode == LightMode::On),
            Dialect::M3yw => m3yw::set_beeper(self, mode == LightMode::On),
        }
    }

    /// Pause between reads, in seconds
    pub fn set_read_interval(&mut self, seconds: f64) -> Result<Reply, ScannerError> {
        match self.dialect() {
            Dialect::Gm65 => gm65::set_read_interval(self, seconds),
            Dialect::M3yw => m3yw::set_read_interval(self, seconds),
        }
    }

    /// Suppression window for re-reading the same barcode, in seconds
    pub fn set_same_barcode_delay(&mut self, seconds: f64) -> Result<Reply, ScannerError> {
        match self.dialect() {
            Dialect::Gm65 => gm65::set_same_barcode_delay(self, seconds),
            Dialect::M3yw => m3yw::set_same_barcode_delay(self, seconds),
        }
    }

    /// Scan continuously
    pub fn enter_continuous_mode(&mut self) -> Result<Reply, ScannerError> {
        match self.dialect() {
            Dialect::Gm65 => gm65::set_scan_mode(self, ScanMode::Continuous),
            Dialect::M3yw => self.request(Command::ContinuousMode, &[]),
        }
    }

    /// Scan only when triggered by the host
    pub fn enter_command_mode(&mut self) -> Result<Reply, ScannerError> {
        match self.dialect() {
            Dialect::Gm65 => gm65::set_scan_mode(self, ScanMode::Command),
            Dialect::M3yw => self.request(Command::CommandMode, &[]),
        }
    }

    // ============ Scanning ============

    /// Trigger scanning
    pub fn start_scan(&mut self) -> Result<Reply, ScannerError> {
        self.request(Command::StartScan, &[])
    }

    /// Stop scanning
    pub fn stop_scan(&mut self) -> Result<Reply, ScannerError> {
        self.request(Command::StopScan, &[])
    }

    /// Collect frames from the stream until `deadline`
    ///
    /// Feeds `decoder` so frames split across calls are still assembled;
    /// returns only the payloads completed during this call.
    pub fn collect_frames(
        &mut self,
        decoder: &mut FrameDecoder,
        deadline: &Deadline,
    ) -> Result<Vec<Vec<u8>>, ScannerError> {
        let raw = self.transport.read_until(deadline)?;
        trace!("{} capture: {} bytes", self.dialect.name, raw.len());
        Ok(decoder.push(&raw))
    }

    /// Start scanning, collect for `window`, then stop
    pub fn capture(&mut self, window: Duration) -> Result<Capture, ScannerError> {
        let started = self.start_scan()?;
        let mut decoder = FrameDecoder::new(self.dialect);
        let mut unframed = started.skipped;
        let mut frames = decoder.push(&started.leftover);

        let collected = self.collect_frames(&mut decoder, &Deadline::after(window));

        if let Err(e) = self.stop_scan() {
            warn!("Failed to stop scanning: {}", e);
        }

        frames.extend(collected?);
        unframed.extend(decoder.take_discarded());
        unframed.extend_from_slice(decoder.pending());
        Ok(Capture { frames, unframed })
    }

    // ============ Baud rate ============

    /// Switch device and host to `baud_rate`, then confirm with a probe
    pub fn set_baudrate(&mut self, baud_rate: u32) -> Result<Reply, ScannerError> {
        let old_rate = self.transport.baud_rate();
        let acknowledged = match self.dialect() {
            Dialect::Gm65 => gm65::send_baudrate(self, baud_rate),
            Dialect::M3yw => m3yw::send_baudrate(self, baud_rate),
        };
        match acknowledged {
            Ok(_) => debug!("Baud change to {} acknowledged at {}", baud_rate, old_rate),
            Err(e) if e.is_recoverable() => {
                debug!("No acknowledgement for baud change to {}: {}", baud_rate, e);
            }
            Err(e) => return Err(e),
        }

        self.transport.set_baud_rate(baud_rate)?;

        match self.get_software_version() {
            Ok(reply) => {
                info!("{} now at {} baud", self.dialect.name, baud_rate);
                Ok(reply)
            }
            Err(e) if e.is_recoverable() => {
                warn!("{} silent after switching to {} baud: {}", self.dialect.name, baud_rate, e);
                Err(ScannerError::BaudrateChangeUnconfirmed { baud_rate })
            }
            Err(e) => Err(e),
        }
    }

    /// Probe each rate in turn and keep the first that answers
    ///
    /// Leaves the transport at the working rate, or at its original rate
    /// when nothing answered.
    pub fn find_baudrate(&mut self, rates: &[u32]) -> Result<Option<u32>, ScannerError> {
        let original = self.transport.baud_rate();

        for &rate in rates {
            match self.transport.set_baud_rate(rate) {
                Ok(()) => {}
                Err(TransportError::InvalidBaudRate(_)) => {
                    debug!("Skipping {} baud: rejected by port", rate);
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            match self.probe() {
                Ok(reply) => {
                    debug!(
                        "{} answered at {} baud: {}",
                        self.dialect.name,
                        rate,
                        hex::encode(&reply.payload)
                    );
                    return Ok(Some(rate));
                }
                Err(e) if e.is_recoverable() => {
                    trace!("{} @ {}: {}", self.dialect.name, rate, e);
                }
                Err(e) => return Err(e),
            }
        }

        self.transport.set_baud_rate(original)?;
        Ok(None)
    }
}

/// `round(seconds * per_second)`, rejecting negatives and non-finite values
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) fn scaled(seconds: f64, per_second: f64, what: &str) -> Result<u64, ScannerError> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(ScannerError::DomainValue(format!(
            "{what} must be a non-negative number of seconds, got {seconds}"
        )));
    }
    Ok((seconds * per_second).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::protocol::framing::encode_reply;
    use crate::core::protocol::GM65;
    use crate::core::simulator::SimulatedScanner;
    use mockall::mock;

    mock! {
        Port {}

        impl ScannerTransport for Port {
            fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;
            fn read(&mut self, max_bytes: usize, deadline: &Deadline) -> Result<Vec<u8>, TransportError>;
            fn baud_rate(&self) -> u32;
            fn set_baud_rate(&mut self, baud_rate: u32) -> Result<(), TransportError>;
        }
    }

    fn fast() -> Timeouts {
        Timeouts {
            command_ms: 50,
            probe_ms: 20,
            capture_ms: 50,
        }
    }

    #[test]
    fn test_software_version_exchange() {
        let mut port = MockPort::new();
        port.expect_write().times(1).returning(|data| {
            assert_eq!(data.to_vec(), vec![0x7E, 0x00, 0x07, 0x01, 0x00, 0xE2, 0x01, 0x77, 0x91]);
            Ok(())
        });
        port.expect_read()
            .times(1)
            .returning(|_, _| Ok(vec![0x02, 0x00, 0x00, 0x01, 0x87, 0xD2, 0x5E]));

        let mut scanner = Scanner::new(port, Dialect::Gm65).with_timeouts(fast());
        let reply = scanner.get_software_version().unwrap();
        assert_eq!(reply.payload, vec![0x87]);
        assert!(reply.leftover.is_empty());
    }

    #[test]
    fn test_reply_split_across_reads() {
        let reply = encode_reply(&GM65, &[0x3E]);
        let mut chunks = vec![reply[4..].to_vec(), reply[..4].to_vec()];

        let mut port = MockPort::new();
        port.expect_write().returning(|_| Ok(()));
        port.expect_read()
            .times(2)
            .returning(move |_, _| Ok(chunks.pop().unwrap_or_default()));

        let mut scanner = Scanner::new(port, Dialect::Gm65).with_timeouts(fast());
        assert_eq!(scanner.get_settings().unwrap().raw(), 0x3E);
    }

    #[test]
    fn test_stray_bytes_before_reply_are_skipped() {
        let mut chunks = vec![
            vec![0x00, 0x01, 0x87, 0xD2, 0x5E],
            vec![0xFF, 0x02, 0x00],
        ];

        let mut port = MockPort::new();
        port.expect_write().returning(|_| Ok(()));
        port.expect_read()
            .times(2)
            .returning(move |_, _| Ok(chunks.pop().unwrap_or_default()));

        let mut scanner = Scanner::new(port, Dialect::Gm65).with_timeouts(fast());
        let reply = scanner.get_software_version().unwrap();
        assert_eq!(reply.payload, vec![0x87]);
        assert_eq!(reply.skipped, vec![0xFF]);
    }

    #[test]
    fn test_corrupted_frame_then_valid_frame() {
        let sim = SimulatedScanner::gm65(9600);
        sim.inject(&[0x02, 0x00, 0x00, 0x01, 0x87, 0xD2, 0x5F]);

        let mut scanner = Scanner::new(sim, Dialect::Gm65).with_timeouts(fast());
        assert_eq!(scanner.get_software_version().unwrap().payload, vec![0x87]);
    }

    #[test]
    fn test_rejected_frame_reported_on_timeout() {
        let sim = SimulatedScanner::silent();
        sim.inject(&[0x02, 0x00, 0x00, 0x01, 0x87, 0xD2, 0x5F]);

        let mut scanner = Scanner::new(sim, Dialect::Gm65).with_timeouts(fast());
        assert!(matches!(
            scanner.probe(),
            Err(ScannerError::Decode(DecodeError::ChecksumMismatch))
        ));
    }

    #[test]
    fn test_transport_error_propagates() {
        let mut port = MockPort::new();
        port.expect_write()
            .returning(|_| Err(TransportError::Disconnected));

        let mut scanner = Scanner::new(port, Dialect::Gm65).with_timeouts(fast());
        let err = scanner.get_hardware_version().unwrap_err();
        assert!(matches!(err, ScannerError::Transport(TransportError::Disconnected)));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_silence_times_out_as_truncated_header() {
        let mut port = MockPort::new();
        port.expect_write().returning(|_| Ok(()));
        port.expect_read().returning(|_, _| Ok(Vec::new()));

        let mut scanner = Scanner::new(port, Dialect::M3yw).with_timeouts(fast());
        let err = scanner.probe().unwrap_err();
        assert!(matches!(
            err,
            ScannerError::Decode(DecodeError::TruncatedHeader { available: 0, .. })
        ));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_unsupported_before_io() {
        let port = MockPort::new();
        let mut scanner = Scanner::new(port, Dialect::M3yw).with_timeouts(fast());

        for result in [
            scanner.get_hardware_version().map(|_| ()),
            scanner.get_software_year().map(|_| ()),
            scanner.get_settings().map(|_| ()),
            scanner.save_settings().map(|_| ()),
        ] {
            assert!(matches!(result, Err(ScannerError::UnsupportedOperation { .. })));
        }
    }

    #[test]
    fn test_beeper_normal_unsupported() {
        let sim = SimulatedScanner::gm65(9600);
        let mut scanner = Scanner::new(sim.clone(), Dialect::Gm65).with_timeouts(fast());
        assert!(matches!(
            scanner.set_beeper(LightMode::Normal),
            Err(ScannerError::UnsupportedOperation { .. })
        ));
        assert!(sim.requests().is_empty());
    }

    #[test]
    fn test_scaled() {
        assert_eq!(scaled(1.25, 10.0, "x").unwrap(), 13);
        assert_eq!(scaled(0.3, 1000.0, "x").unwrap(), 300);
        assert_eq!(scaled(0.0, 1000.0, "x").unwrap(), 0);
        assert!(scaled(-0.1, 10.0, "x").is_err());
        assert!(scaled(f64::NAN, 10.0, "x").is_err());
    }
}
