//! M3Y-W strategies
//!
//! The module has no settings register. Each mode is its own ASCII opcode,
//! and numeric settings are decimal ASCII appended to a base opcode.

use super::{scaled, Reply, Scanner, ScannerError};
use crate::core::protocol::Command;
use crate::core::settings::LightMode;
use crate::core::transport::ScannerTransport;

/// Base opcode followed by `value` in decimal ASCII
pub fn with_ascii_value(base: &[u8], value: u64) -> Vec<u8> {
    let mut opcode = base.to_vec();
    opcode.extend_from_slice(value.to_string().as_bytes());
    opcode
}

/// Parse the decimal suffix of an opcode built by [`with_ascii_value`]
pub fn ascii_value(opcode: &[u8], base: &[u8]) -> Option<u64> {
    let digits = opcode.strip_prefix(base)?;
    std::str::from_utf8(digits).ok()?.parse().ok()
}

fn send_with_value<T: ScannerTransport>(
    scanner: &mut Scanner<T>,
    command: Command,
    value: u64,
) -> Result<Reply, ScannerError> {
    let opcode = with_ascii_value(scanner.opcode(command)?, value);
    scanner.send_raw(&opcode)
}

pub(super) fn set_illumination<T: ScannerTransport>(
    scanner: &mut Scanner<T>,
    mode: LightMode,
) -> Result<Reply, ScannerError> {
    let command = match mode {
        LightMode::Off => Command::IlluminationOff,
        LightMode::Normal => Command::IlluminationNormal,
        LightMode::On => Command::IlluminationOn,
    };
    scanner.request(command, &[])
}

pub(super) fn set_aimer<T: ScannerTransport>(
    scanner: &mut Scanner<T>,
    mode: LightMode,
) -> Result<Reply, ScannerError> {
    let command = match mode {
        LightMode::Off => Command::AimerOff,
        LightMode::Normal => Command::AimerNormal,
        LightMode::On => Command::AimerOn,
    };
    scanner.request(command, &[])
}

pub(super) fn set_beeper<T: ScannerTransport>(
    scanner: &mut Scanner<T>,
    on: bool,
) -> Result<Reply, ScannerError> {
    let command = if on { Command::BeeperOn } else { Command::BeeperOff };
    scanner.request(command, &[])
}

pub(super) fn set_read_interval<T: ScannerTransport>(
    scanner: &mut Scanner<T>,
    seconds: f64,
) -> Result<Reply, ScannerError> {
    let millis = scaled(seconds, 1000.0, "read interval")?;
    send_with_value(scanner, Command::SetReadInterval, millis)
}

/// Enable and select the delay setting, then send the value
pub(super) fn set_same_barcode_delay<T: ScannerTransport>(
    scanner: &mut Scanner<T>,
    seconds: f64,
) -> Result<Reply, ScannerError> {
    let millis = scaled(seconds, 1000.0, "same barcode delay")?;
    scanner.request(Command::EnableSameBarcodeDelay, &[])?;
    scanner.request(Command::SelectSameBarcodeDelay, &[])?;
    send_with_value(scanner, Command::SetSameBarcodeDelay, millis)
}

pub(super) fn send_baudrate<T: ScannerTransport>(
    scanner: &mut Scanner<T>,
    baud_rate: u32,
) -> Result<Reply, ScannerError> {
    if !super::BAUD_RATES.contains(&baud_rate) {
        return Err(ScannerError::UnsupportedBaudRate(baud_rate));
    }
    send_with_value(scanner, Command::SetBaudRate, u64::from(baud_rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_value() {
        assert_eq!(with_ascii_value(b"S_CMD_H3BR", 115200), b"S_CMD_H3BR115200".to_vec());
        assert_eq!(ascii_value(b"S_CMD_MARR1500", b"S_CMD_MARR"), Some(1500));
        assert_eq!(ascii_value(b"S_CMD_MARR", b"S_CMD_MARR"), None);
        assert_eq!(ascii_value(b"S_CMD_03L1", b"S_CMD_MARR"), None);
    }
}
