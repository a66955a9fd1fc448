//! Virtual scanner
//!
//! [`SimulatedScanner`] plays the device side of either dialect behind the
//! [`ScannerTransport`] capability, so drivers, detection and the CLI can be
//! exercised without hardware. Clones share one device: keep a clone to
//! inspect requests and registers after handing the other to a driver.

use crate::core::protocol::framing::{decode_request, encode_reply};
use crate::core::protocol::{Command, Dialect, DialectDescriptor};
use crate::core::scanner::gm65::{baud_from_register, baud_register};
use crate::core::scanner::m3yw::ascii_value;
use crate::core::transport::{Deadline, ScannerTransport, TransportError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// GM65 register addresses used by the simulator
mod register {
    pub const SETTINGS: u16 = 0x0000;
    pub const SCAN_TRIGGER: u16 = 0x0002;
    pub const BAUD_RATE: u16 = 0x002A;
    pub const HARDWARE_VERSION: u16 = 0x00E1;
    pub const SOFTWARE_VERSION: u16 = 0x00E2;
    pub const SOFTWARE_YEAR: u16 = 0x00E3;
}

const GM65_READ: u8 = 0x07;
const GM65_WRITE: u8 = 0x08;
const GM65_SAVE: u8 = 0x09;
const GM65_ACK: [u8; 1] = [0x00];

/// Factory settings: command mode, normal lights, beeper on
pub const DEFAULT_SETTINGS: u8 = 0x55;

/// Default M3Y-W version string
pub const M3YW_VERSION: &[u8] = b"M3Y-W V1.2.5";

/// Poll interval while no reply is queued
const IDLE_POLL: Duration = Duration::from_millis(1);

/// Traffic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatorStats {
    /// Frames written by the host
    pub requests: u64,
    /// Reply frames queued
    pub replies: u64,
    /// Frames ignored (undecodable, wrong baud, unknown opcode)
    pub ignored: u64,
    /// Bytes handed back to the host
    pub bytes_read: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Profile {
    Device(Dialect),
    Silent,
}

#[derive(Debug)]
struct State {
    profile: Profile,
    host_baud: u32,
    device_baud: u32,
    noise_on_mismatch: bool,
    rejected_rates: Vec<u32>,
    registers: Vec<u8>,
    saved: Vec<u8>,
    m3yw_version: Vec<u8>,
    barcodes: VecDeque<Vec<u8>>,
    rx: VecDeque<u8>,
    requests: Vec<Vec<u8>>,
    stats: SimulatorStats,
}

impl State {
    fn new(profile: Profile, baud_rate: u32) -> Self {
        let mut registers = vec![0u8; 0x100];
        registers[usize::from(register::SETTINGS)] = DEFAULT_SETTINGS;
        registers[usize::from(register::HARDWARE_VERSION)] = 0x8A;
        registers[usize::from(register::SOFTWARE_VERSION)] = 0x87;
        registers[usize::from(register::SOFTWARE_YEAR)] = 0x12;
        let baud = baud_register(baud_rate).unwrap_or(0x0139);
        let [lo, hi] = baud.to_le_bytes();
        registers[usize::from(register::BAUD_RATE)] = lo;
        registers[usize::from(register::BAUD_RATE) + 1] = hi;

        Self {
            profile,
            host_baud: baud_rate,
            device_baud: baud_rate,
            noise_on_mismatch: false,
            rejected_rates: Vec::new(),
            saved: registers.clone(),
            registers,
            m3yw_version: M3YW_VERSION.to_vec(),
            barcodes: VecDeque::new(),
            rx: VecDeque::new(),
            requests: Vec::new(),
            stats: SimulatorStats::default(),
        }
    }

    fn handle(&mut self, frame: &[u8]) {
        self.requests.push(frame.to_vec());
        self.stats.requests += 1;

        let Profile::Device(dialect) = self.profile else {
            self.stats.ignored += 1;
            return;
        };

        if self.host_baud != self.device_baud {
            trace!("Simulator: {} byte frame at wrong baud", frame.len());
            self.stats.ignored += 1;
            if self.noise_on_mismatch {
                self.rx.extend(frame.iter().map(|b| !b | 0x80));
            }
            return;
        }

        let descriptor = dialect.descriptor();
        let request = match decode_request(descriptor, frame) {
            Ok(request) => request,
            Err(e) => {
                trace!("Simulator: undecodable request: {}", e);
                self.stats.ignored += 1;
                return;
            }
        };

        match dialect {
            Dialect::Gm65 => self.handle_gm65(descriptor, &request.body),
            Dialect::M3yw => self.handle_m3yw(descriptor, &request.body),
        }
    }

    fn reply(&mut self, descriptor: &DialectDescriptor, payload: &[u8]) {
        self.rx.extend(encode_reply(descriptor, payload));
        self.stats.replies += 1;
    }

    fn emit_barcodes(&mut self) {
        while let Some(code) = self.barcodes.pop_front() {
            self.rx.extend(code);
        }
    }

    fn handle_gm65(&mut self, descriptor: &DialectDescriptor, body: &[u8]) {
        let [kind, len, hi, lo, data @ ..] = body else {
            self.stats.ignored += 1;
            return;
        };
        let reg = u16::from_be_bytes([*hi, *lo]);
        let addr = usize::from(reg);
        let len = usize::from(*len);

        match *kind {
            GM65_READ => {
                // The trailing byte is the number of registers to read
                let count = data.first().map_or(len, |&n| usize::from(n));
                match self.registers.get(addr..addr + count) {
                    Some(values) => {
                        let values = values.to_vec();
                        self.reply(descriptor, &values);
                    }
                    None => self.stats.ignored += 1,
                }
            }
            GM65_WRITE if data.len() == len && addr + len <= self.registers.len() => {
                self.registers[addr..addr + len].copy_from_slice(data);
                self.reply(descriptor, &GM65_ACK);
                match reg {
                    register::SCAN_TRIGGER if data == [0x01] => self.emit_barcodes(),
                    register::BAUD_RATE if len == 2 => {
                        let value = u16::from_le_bytes([data[0], data[1]]);
                        if let Some(rate) = baud_from_register(value) {
                            self.device_baud = rate;
                        }
                    }
                    _ => {}
                }
            }
            GM65_SAVE => {
                self.saved.copy_from_slice(&self.registers);
                self.reply(descriptor, &GM65_ACK);
            }
            _ => self.stats.ignored += 1,
        }
    }

    fn handle_m3yw(&mut self, descriptor: &DialectDescriptor, body: &[u8]) {
        let opcode_for = |command: Command| descriptor.opcode(command).unwrap_or_default();

        if body == opcode_for(Command::GetSoftwareVersion) {
            let version = self.m3yw_version.clone();
            self.reply(descriptor, &version);
        } else if body.starts_with(b"S_CMD_") {
            self.reply(descriptor, body);
            if body == opcode_for(Command::StartScan) {
                self.emit_barcodes();
            } else if let Some(rate) = ascii_value(body, opcode_for(Command::SetBaudRate)) {
                if let Ok(rate) = u32::try_from(rate) {
                    self.device_baud = rate;
                }
            }
        } else {
            self.stats.ignored += 1;
        }
    }
}

/// Simulated GM65 or M3Y-W scanner
#[derive(Debug, Clone)]
pub struct SimulatedScanner {
    state: Arc<Mutex<State>>,
}

impl SimulatedScanner {
    /// GM65 listening at `baud_rate`
    pub fn gm65(baud_rate: u32) -> Self {
        Self::with_profile(Profile::Device(Dialect::Gm65), baud_rate)
    }

    /// M3Y-W listening at `baud_rate`
    pub fn m3yw(baud_rate: u32) -> Self {
        Self::with_profile(Profile::Device(Dialect::M3yw), baud_rate)
    }

    /// Device for `dialect` listening at `baud_rate`
    pub fn new(dialect: Dialect, baud_rate: u32) -> Self {
        Self::with_profile(Profile::Device(dialect), baud_rate)
    }

    /// A port with nothing attached
    pub fn silent() -> Self {
        Self::with_profile(Profile::Silent, 9600)
    }

    fn with_profile(profile: Profile, baud_rate: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::new(profile, baud_rate))),
        }
    }

    /// Answer frames sent at the wrong baud rate with garbage instead of silence
    #[must_use]
    pub fn with_noise(self) -> Self {
        self.state.lock().noise_on_mismatch = true;
        self
    }

    /// Make the host side refuse `baud_rate`, as some adapters do
    #[must_use]
    pub fn rejecting_baud(self, baud_rate: u32) -> Self {
        self.state.lock().rejected_rates.push(baud_rate);
        self
    }

    /// Override the M3Y-W version string
    #[must_use]
    pub fn with_version(self, version: &[u8]) -> Self {
        self.state.lock().m3yw_version = version.to_vec();
        self
    }

    /// Put the host side at `baud_rate` without touching the device
    #[must_use]
    pub fn with_host_baud(self, baud_rate: u32) -> Self {
        self.state.lock().host_baud = baud_rate;
        self
    }

    /// Barcode data emitted raw when the next scan starts
    pub fn load_barcode(&self, data: &[u8]) {
        self.state.lock().barcodes.push_back(data.to_vec());
    }

    /// Queue bytes for the host to read, as if sent unprompted
    pub fn inject(&self, data: &[u8]) {
        self.state.lock().rx.extend(data.iter().copied());
    }

    /// Every frame the host has written, in order
    pub fn requests(&self) -> Vec<Vec<u8>> {
        self.state.lock().requests.clone()
    }

    /// GM65 live register value
    pub fn register(&self, addr: u16) -> Option<u8> {
        self.state.lock().registers.get(usize::from(addr)).copied()
    }

    /// GM65 register value as last saved
    pub fn saved_register(&self, addr: u16) -> Option<u8> {
        self.state.lock().saved.get(usize::from(addr)).copied()
    }

    /// Overwrite a GM65 register without a request
    pub fn set_register(&self, addr: u16, value: u8) {
        if let Some(slot) = self.state.lock().registers.get_mut(usize::from(addr)) {
            *slot = value;
        }
    }

    /// Rate the device is listening at
    pub fn device_baud(&self) -> u32 {
        self.state.lock().device_baud
    }

    /// Traffic counters so far
    pub fn stats(&self) -> SimulatorStats {
        self.state.lock().stats
    }
}

impl ScannerTransport for SimulatedScanner {
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.state.lock().handle(data);
        Ok(())
    }

    fn read(&mut self, max_bytes: usize, deadline: &Deadline) -> Result<Vec<u8>, TransportError> {
        {
            let mut state = self.state.lock();
            if !state.rx.is_empty() {
                let n = max_bytes.min(state.rx.len());
                let data: Vec<u8> = state.rx.drain(..n).collect();
                state.stats.bytes_read += data.len() as u64;
                return Ok(data);
            }
        }
        std::thread::sleep(IDLE_POLL.min(deadline.remaining()));
        Ok(Vec::new())
    }

    fn baud_rate(&self) -> u32 {
        self.state.lock().host_baud
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.rejected_rates.contains(&baud_rate) {
            return Err(TransportError::InvalidBaudRate(baud_rate));
        }
        state.host_baud = baud_rate;
        state.rx.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::protocol::framing::{decode, encode};
    use crate::core::protocol::{GM65, M3YW};

    fn read_all(sim: &mut SimulatedScanner) -> Vec<u8> {
        sim.read(1024, &Deadline::after(Duration::from_millis(5))).unwrap()
    }

    #[test]
    fn test_gm65_version_read() {
        let mut sim = SimulatedScanner::gm65(9600);
        sim.write(&encode(&GM65, &[0x07, 0x01, 0x00, 0xE2, 0x01], &[])).unwrap();
        assert_eq!(read_all(&mut sim), vec![0x02, 0x00, 0x00, 0x01, 0x87, 0xD2, 0x5E]);
    }

    #[test]
    fn test_gm65_write_then_save() {
        let mut sim = SimulatedScanner::gm65(9600);
        sim.write(&encode(&GM65, &[0x08, 0x01, 0x00, 0x00], &[0x3E])).unwrap();
        assert_eq!(read_all(&mut sim), vec![0x02, 0x00, 0x00, 0x01, 0x00, 0x33, 0x31]);
        assert_eq!(sim.register(0x0000), Some(0x3E));
        assert_eq!(sim.saved_register(0x0000), Some(DEFAULT_SETTINGS));

        sim.write(&encode(&GM65, &[0x09, 0x01, 0x00, 0x00, 0x00], &[])).unwrap();
        read_all(&mut sim);
        assert_eq!(sim.saved_register(0x0000), Some(0x3E));
    }

    #[test]
    fn test_gm65_baud_switch_after_reply() {
        let mut sim = SimulatedScanner::gm65(9600);
        sim.write(&encode(&GM65, &[0x08, 0x02, 0x00, 0x2A], &[0x9C, 0x00])).unwrap();
        let reply = read_all(&mut sim);
        assert_eq!(decode(&GM65, &reply).unwrap().payload, &[0x00]);
        assert_eq!(sim.device_baud(), 19200);
        assert_eq!(sim.baud_rate(), 9600);
    }

    #[test]
    fn test_wrong_baud() {
        let mut sim = SimulatedScanner::gm65(19200).with_host_baud(9600);
        sim.write(&encode(&GM65, &[0x07, 0x01, 0x00, 0xE2, 0x01], &[])).unwrap();
        assert!(read_all(&mut sim).is_empty());
        assert_eq!(sim.stats().ignored, 1);

        let mut noisy = SimulatedScanner::gm65(19200).with_host_baud(9600).with_noise();
        noisy.write(&encode(&GM65, &[0x07, 0x01, 0x00, 0xE2, 0x01], &[])).unwrap();
        let noise = read_all(&mut noisy);
        assert!(!noise.is_empty());
        assert!(decode(&GM65, &noise).is_err());
    }

    #[test]
    fn test_m3yw_replies() {
        let mut sim = SimulatedScanner::m3yw(9600);
        sim.write(&encode(&M3YW, b"T_OUT_CVER", &[])).unwrap();
        let reply = read_all(&mut sim);
        assert_eq!(decode(&M3YW, &reply).unwrap().payload, M3YW_VERSION);

        sim.write(&encode(&M3YW, b"S_CMD_03L1", &[])).unwrap();
        let reply = read_all(&mut sim);
        assert_eq!(decode(&M3YW, &reply).unwrap().payload, b"S_CMD_03L1");

        sim.write(&encode(&M3YW, b"S_CMD_H3BR115200", &[])).unwrap();
        read_all(&mut sim);
        assert_eq!(sim.device_baud(), 115200);
    }

    #[test]
    fn test_other_dialect_ignored() {
        let mut sim = SimulatedScanner::m3yw(9600);
        sim.write(&encode(&GM65, &[0x07, 0x01, 0x00, 0xE2, 0x01], &[])).unwrap();
        assert!(read_all(&mut sim).is_empty());
        assert_eq!(sim.requests().len(), 1);
    }

    #[test]
    fn test_barcode_on_scan_start() {
        let mut sim = SimulatedScanner::gm65(9600);
        sim.load_barcode(b"4006381333931\r");
        sim.write(&encode(&GM65, &[0x08, 0x01, 0x00, 0x02, 0x01], &[])).unwrap();
        let raw = read_all(&mut sim);
        let frame = decode(&GM65, &raw).unwrap();
        assert_eq!(frame.payload, &[0x00]);
        assert_eq!(frame.leftover, b"4006381333931\r");
    }

    #[test]
    fn test_rejected_host_baud() {
        let mut sim = SimulatedScanner::gm65(9600).rejecting_baud(14400);
        assert!(matches!(
            sim.set_baud_rate(14400),
            Err(TransportError::InvalidBaudRate(14400))
        ));
        assert_eq!(sim.baud_rate(), 9600);
    }

    #[test]
    fn test_silent() {
        let mut sim = SimulatedScanner::silent();
        sim.write(&encode(&GM65, &[0x07, 0x01, 0x00, 0xE2, 0x01], &[])).unwrap();
        assert!(read_all(&mut sim).is_empty());
    }
}
