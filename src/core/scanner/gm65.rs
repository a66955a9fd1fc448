//! GM65 strategies
//!
//! Every mode change is a read-modify-write of the settings register: read
//! the byte, change the relevant bits, write it back, save it. Numeric
//! settings are single-byte registers in tenths of a second.

use super::{scaled, Reply, Scanner, ScannerError};
use crate::core::protocol::Command;
use crate::core::settings::{LightMode, ScanMode, SettingsRegister};
use crate::core::transport::ScannerTransport;
use tracing::debug;

/// Longest representable read interval: 0xFF tenths
pub const MAX_READ_INTERVAL_SECS: f64 = 25.5;

/// Same-barcode delay must stay below this (seven bits of tenths)
pub const MAX_SAME_BARCODE_DELAY_SECS: f64 = 12.7;

/// Enable flag in the same-barcode delay register
const DELAY_ENABLE: u8 = 0x80;

/// Baud register values, sent little-endian to 0x002A
const BAUD_TABLE: [(u32, u16); 8] = [
    (1200, 0x09C4),
    (4800, 0x0271),
    (9600, 0x0139),
    (14400, 0x00D0),
    (19200, 0x009C),
    (38400, 0x004E),
    (57600, 0x0034),
    (115200, 0x001A),
];

/// Firmware versions with known binary QR behaviour
const KNOWN_BAD_BINARY_QR: [u8; 1] = [69];
const KNOWN_GOOD_BINARY_QR: [u8; 1] = [87];

/// Register value for `baud_rate`
pub fn baud_register(baud_rate: u32) -> Option<u16> {
    BAUD_TABLE
        .iter()
        .find(|(rate, _)| *rate == baud_rate)
        .map(|(_, value)| *value)
}

/// Inverse of [`baud_register`]
pub fn baud_from_register(value: u16) -> Option<u32> {
    BAUD_TABLE
        .iter()
        .find(|(_, v)| *v == value)
        .map(|(rate, _)| *rate)
}

/// Whether firmware `version` reads binary QR codes reliably, if known
pub fn binary_qr_support(version: u8) -> Option<bool> {
    if KNOWN_GOOD_BINARY_QR.contains(&version) {
        Some(true)
    } else if KNOWN_BAD_BINARY_QR.contains(&version) {
        Some(false)
    } else {
        None
    }
}

/// Read interval register byte
pub fn read_interval_byte(seconds: f64) -> Result<u8, ScannerError> {
    let tenths = scaled(seconds, 10.0, "read interval")?;
    u8::try_from(tenths).map_err(|_| {
        ScannerError::DomainValue(format!(
            "read interval must be at most {MAX_READ_INTERVAL_SECS}s, got {seconds}s"
        ))
    })
}

/// Same-barcode delay register byte, enable flag set
pub fn same_barcode_delay_byte(seconds: f64) -> Result<u8, ScannerError> {
    if seconds >= MAX_SAME_BARCODE_DELAY_SECS {
        return Err(ScannerError::DomainValue(format!(
            "same barcode delay must be below {MAX_SAME_BARCODE_DELAY_SECS}s, got {seconds}s"
        )));
    }
    let tenths = u8::try_from(scaled(seconds, 10.0, "same barcode delay")?).unwrap_or(u8::MAX);
    Ok(DELAY_ENABLE | (tenths & !DELAY_ENABLE))
}

/// Fetch, mutate, write back and save the settings register
pub(super) fn update_settings<T, F>(scanner: &mut Scanner<T>, change: F) -> Result<Reply, ScannerError>
where
    T: ScannerTransport,
    F: FnOnce(&mut SettingsRegister),
{
    let mut settings = scanner.get_settings()?;
    let before = settings;
    change(&mut settings);
    debug!("GM65 settings {:#04x} -> {:#04x}", before.raw(), settings.raw());

    scanner.set_settings(settings)?;
    scanner.save_settings()
}

pub(super) fn set_illumination<T: ScannerTransport>(
    scanner: &mut Scanner<T>,
    mode: LightMode,
) -> Result<Reply, ScannerError> {
    update_settings(scanner, |s| s.set_illumination(mode))
}

pub(super) fn set_aimer<T: ScannerTransport>(
    scanner: &mut Scanner<T>,
    mode: LightMode,
) -> Result<Reply, ScannerError> {
    update_settings(scanner, |s| s.set_aimer(mode))
}

pub(super) fn set_beeper<T: ScannerTransport>(
    scanner: &mut Scanner<T>,
    on: bool,
) -> Result<Reply, ScannerError> {
    update_settings(scanner, |s| s.set_beeper(on))
}

pub(super) fn set_scan_mode<T: ScannerTransport>(
    scanner: &mut Scanner<T>,
    mode: ScanMode,
) -> Result<Reply, ScannerError> {
    update_settings(scanner, |s| s.set_scan_mode(mode))
}

pub(super) fn set_read_interval<T: ScannerTransport>(
    scanner: &mut Scanner<T>,
    seconds: f64,
) -> Result<Reply, ScannerError> {
    let value = read_interval_byte(seconds)?;
    scanner.request(Command::SetReadInterval, &[value])
}

pub(super) fn set_same_barcode_delay<T: ScannerTransport>(
    scanner: &mut Scanner<T>,
    seconds: f64,
) -> Result<Reply, ScannerError> {
    let value = same_barcode_delay_byte(seconds)?;
    scanner.request(Command::SetSameBarcodeDelay, &[value])
}

pub(super) fn send_baudrate<T: ScannerTransport>(
    scanner: &mut Scanner<T>,
    baud_rate: u32,
) -> Result<Reply, ScannerError> {
    let value = baud_register(baud_rate).ok_or(ScannerError::UnsupportedBaudRate(baud_rate))?;
    scanner.request(Command::SetBaudRate, &value.to_le_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_baud_register() {
        assert_eq!(baud_register(9600), Some(0x0139));
        assert_eq!(baud_register(9600).map(u16::to_le_bytes), Some([0x39, 0x01]));
        assert_eq!(baud_register(250_000), None);
        for (rate, value) in BAUD_TABLE {
            assert_eq!(baud_from_register(value), Some(rate));
        }
    }

    #[test]
    fn test_read_interval_byte() {
        assert_eq!(read_interval_byte(0.0).unwrap(), 0);
        assert_eq!(read_interval_byte(1.0).unwrap(), 10);
        assert_eq!(read_interval_byte(25.5).unwrap(), 255);
        assert!(matches!(read_interval_byte(25.6), Err(ScannerError::DomainValue(_))));
        assert!(matches!(read_interval_byte(-1.0), Err(ScannerError::DomainValue(_))));
    }

    #[test]
    fn test_same_barcode_delay_byte() {
        assert_eq!(same_barcode_delay_byte(0.0).unwrap(), 0x80);
        assert_eq!(same_barcode_delay_byte(0.5).unwrap(), 0x85);
        assert_eq!(same_barcode_delay_byte(12.6).unwrap(), 0x80 | 126);
        assert!(matches!(same_barcode_delay_byte(12.7), Err(ScannerError::DomainValue(_))));
        assert!(matches!(same_barcode_delay_byte(30.0), Err(ScannerError::DomainValue(_))));
    }

    #[test]
    fn test_binary_qr_support() {
        assert_eq!(binary_qr_support(87), Some(true));
        assert_eq!(binary_qr_support(69), Some(false));
        assert_eq!(binary_qr_support(100), None);
    }
}
