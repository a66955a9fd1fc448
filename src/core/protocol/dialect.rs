//! Scanner dialects
//!
//! Static wire-grammar descriptions for the supported module families.
//! A [`DialectDescriptor`] is read-only and lives for the whole process;
//! drivers only hold a `&'static` reference to one.

use super::checksum::ChecksumType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Device family speaking a particular wire protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dialect {
    /// GM65 and compatible register-based modules
    #[serde(rename = "GM65", alias = "gm65")]
    Gm65,
    /// M3Y-W and compatible ASCII-command modules
    #[serde(rename = "M3Y-W", alias = "m3yw", alias = "m3y-w")]
    M3yw,
}

impl Dialect {
    /// Detection order: GM65 first
    pub fn all() -> &'static [Dialect] {
        &[Dialect::Gm65, Dialect::M3yw]
    }

    /// Display name
    pub fn name(&self) -> &'static str {
        self.descriptor().name
    }

    /// Static descriptor for this dialect
    pub fn descriptor(&self) -> &'static DialectDescriptor {
        match self {
            Dialect::Gm65 => &GM65,
            Dialect::M3yw => &M3YW,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "gm65" => Ok(Self::Gm65),
            "m3yw" => Ok(Self::M3yw),
            _ => Err(format!("Unknown scanner dialect: {s}")),
        }
    }
}

/// Logical commands with a fixed opcode in at least one dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Query hardware version
    GetHardwareVersion,
    /// Query software version (detection probe)
    GetSoftwareVersion,
    /// Query software year
    GetSoftwareYear,
    /// Read the settings register
    GetSettings,
    /// Write the settings register (byte argument follows)
    SetSettings,
    /// Persist settings across power cycles
    SaveSettings,
    /// Trigger scanning
    StartScan,
    /// Stop scanning
    StopScan,
    /// Switch to host-triggered mode
    CommandMode,
    /// Switch to continuous scanning
    ContinuousMode,
    /// Illumination always off
    IlluminationOff,
    /// Illumination only while scanning
    IlluminationNormal,
    /// Illumination always on
    IlluminationOn,
    /// Aimer always off
    AimerOff,
    /// Aimer only while scanning
    AimerNormal,
    /// Aimer always on
    AimerOn,
    /// Mute the beeper
    BeeperOff,
    /// Unmute the beeper
    BeeperOn,
    /// Read interval (value follows)
    SetReadInterval,
    /// Same-barcode delay (value follows)
    SetSameBarcodeDelay,
    /// Enable the same-barcode delay before setting it
    EnableSameBarcodeDelay,
    /// Select same-barcode delay editing
    SelectSameBarcodeDelay,
    /// Change the serial baud rate (value follows)
    SetBaudRate,
}

impl Command {
    /// Short name used in logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            Self::GetHardwareVersion => "get_hardware_version",
            Self::GetSoftwareVersion => "get_software_version",
            Self::GetSoftwareYear => "get_software_year",
            Self::GetSettings => "get_settings",
            Self::SetSettings => "set_settings",
            Self::SaveSettings => "save_settings",
            Self::StartScan => "start_scan",
            Self::StopScan => "stop_scan",
            Self::CommandMode => "enter_command_mode",
            Self::ContinuousMode => "enter_continuous_mode",
            Self::IlluminationOff => "illumination_off",
            Self::IlluminationNormal => "illumination_normal",
            Self::IlluminationOn => "illumination_on",
            Self::AimerOff => "aimer_off",
            Self::AimerNormal => "aimer_normal",
            Self::AimerOn => "aimer_on",
            Self::BeeperOff => "beeper_off",
            Self::BeeperOn => "beeper_on",
            Self::SetReadInterval => "set_read_interval",
            Self::SetSameBarcodeDelay => "set_same_barcode_delay",
            Self::EnableSameBarcodeDelay => "enable_same_barcode_delay",
            Self::SelectSameBarcodeDelay => "select_same_barcode_delay",
            Self::SetBaudRate => "set_baudrate",
        }
    }
}

/// Width of the length field closing the receive header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthField {
    /// Single byte
    U8,
    /// Two bytes, big-endian
    U16Be,
}

impl LengthField {
    /// Size in bytes
    pub fn size(&self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16Be => 2,
        }
    }

    /// Read the field from the start of `bytes`
    pub fn read(&self, bytes: &[u8]) -> Option<usize> {
        match self {
            Self::U8 => bytes.first().map(|&b| usize::from(b)),
            Self::U16Be => match bytes {
                [hi, lo, ..] => Some(usize::from(u16::from_be_bytes([*hi, *lo]))),
                _ => None,
            },
        }
    }

    /// Encode `len` for this field, saturating at the field's maximum
    pub fn encode(&self, len: usize) -> Vec<u8> {
        match self {
            Self::U8 => vec![u8::try_from(len).unwrap_or(u8::MAX)],
            Self::U16Be => u16::try_from(len).unwrap_or(u16::MAX).to_be_bytes().to_vec(),
        }
    }
}

/// Static wire grammar of one dialect
#[derive(Debug)]
pub struct DialectDescriptor {
    /// Tag for this descriptor
    pub dialect: Dialect,
    /// Display name
    pub name: &'static str,
    /// Bytes preceding every transmitted frame
    pub tx_header: &'static [u8],
    /// Whether the opcode is preceded by its own 2-byte big-endian length
    pub length_prefixed_opcode: bool,
    /// Checksum algorithm for both directions
    pub checksum: ChecksumType,
    /// Fixed receive tag accepted as a successful reply
    pub rx_header_ok: &'static [u8],
    /// Length field following the receive tag
    pub rx_length: LengthField,
    /// Offset into the frame where checksum coverage starts
    pub rx_checksum_start: usize,
    /// Bytes closing every frame
    pub trailer: &'static [u8],
    /// Fixed opcodes, by command
    pub commands: &'static [(Command, &'static [u8])],
}

impl DialectDescriptor {
    /// Size of tag plus length field
    pub fn rx_header_len(&self) -> usize {
        self.rx_header_ok.len() + self.rx_length.size()
    }

    /// Opcode registered for `command`, if the dialect has one
    pub fn opcode(&self, command: Command) -> Option<&'static [u8]> {
        self.commands
            .iter()
            .find(|(c, _)| *c == command)
            .map(|(_, op)| *op)
    }

    /// Whether `command` has a fixed opcode here
    pub fn supports(&self, command: Command) -> bool {
        self.opcode(command).is_some()
    }
}

/// GM65: `7E 00` header, CRC-16/XMODEM, `02 00 00` + 1-byte length replies
pub static GM65: DialectDescriptor = DialectDescriptor {
    dialect: Dialect::Gm65,
    name: "GM65",
    tx_header: &[0x7E, 0x00],
    length_prefixed_opcode: false,
    checksum: ChecksumType::Crc16Xmodem,
    rx_header_ok: &[0x02, 0x00, 0x00],
    rx_length: LengthField::U8,
    // The leading 0x02 is not covered
    rx_checksum_start: 1,
    trailer: &[],
    commands: &[
        (Command::GetHardwareVersion, &[0x07, 0x01, 0x00, 0xE1, 0x01]),
        (Command::GetSoftwareVersion, &[0x07, 0x01, 0x00, 0xE2, 0x01]),
        (Command::GetSoftwareYear, &[0x07, 0x01, 0x00, 0xE3, 0x01]),
        (Command::GetSettings, &[0x07, 0x01, 0x00, 0x00, 0x01]),
        (Command::SetSettings, &[0x08, 0x01, 0x00, 0x00]),
        (Command::SaveSettings, &[0x09, 0x01, 0x00, 0x00, 0x00]),
        (Command::StartScan, &[0x08, 0x01, 0x00, 0x02, 0x01]),
        (Command::StopScan, &[0x08, 0x01, 0x00, 0x02, 0x00]),
        (Command::SetReadInterval, &[0x08, 0x01, 0x00, 0x05]),
        (Command::SetSameBarcodeDelay, &[0x08, 0x01, 0x00, 0x13]),
        (Command::SetBaudRate, &[0x08, 0x02, 0x00, 0x2A]),
    ],
};

/// M3Y-W: `5A 00` header, BCC, `5A 01` + 2-byte length replies, `A5` trailer
pub static M3YW: DialectDescriptor = DialectDescriptor {
    dialect: Dialect::M3yw,
    name: "M3Y-W",
    tx_header: &[0x5A, 0x00],
    length_prefixed_opcode: true,
    checksum: ChecksumType::Bcc,
    rx_header_ok: &[0x5A, 0x01],
    rx_length: LengthField::U16Be,
    // Length field and payload are covered, as on transmit
    rx_checksum_start: 2,
    trailer: &[0xA5],
    commands: &[
        (Command::GetSoftwareVersion, b"T_OUT_CVER"),
        (Command::StartScan, b"S_CMD_020E"),
        (Command::StopScan, b"S_CMD_020D"),
        (Command::CommandMode, b"S_CMD_0200"),
        (Command::ContinuousMode, b"S_CMD_0202"),
        (Command::IlluminationOff, b"S_CMD_03L0"),
        (Command::IlluminationNormal, b"S_CMD_03L2"),
        (Command::IlluminationOn, b"S_CMD_03L1"),
        (Command::AimerOff, b"S_CMD_03A0"),
        (Command::AimerNormal, b"S_CMD_03A2"),
        (Command::AimerOn, b"S_CMD_03A1"),
        (Command::BeeperOff, b"S_CMD_04F0"),
        (Command::BeeperOn, b"S_CMD_04F1"),
        (Command::SetReadInterval, b"S_CMD_MARR"),
        (Command::EnableSameBarcodeDelay, b"S_CMD_MS31"),
        (Command::SelectSameBarcodeDelay, b"S_CMD_MSRE"),
        (Command::SetSameBarcodeDelay, b"S_CMD_MSRT"),
        (Command::SetBaudRate, b"S_CMD_H3BR"),
    ],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_dialect_has_probe() {
        for dialect in Dialect::all() {
            assert!(dialect.descriptor().supports(Command::GetSoftwareVersion));
            assert_eq!(dialect.descriptor().dialect, *dialect);
        }
    }

    #[test]
    fn test_m3yw_lacks_register_commands() {
        for command in [
            Command::GetHardwareVersion,
            Command::GetSoftwareYear,
            Command::GetSettings,
            Command::SetSettings,
            Command::SaveSettings,
        ] {
            assert!(!M3YW.supports(command), "{} unexpectedly supported", command.name());
        }
    }

    #[test]
    fn test_header_lengths() {
        assert_eq!(GM65.rx_header_len(), 4);
        assert_eq!(M3YW.rx_header_len(), 4);
    }

    #[test]
    fn test_length_field() {
        assert_eq!(LengthField::U8.read(&[0x05, 0xFF]), Some(5));
        assert_eq!(LengthField::U16Be.read(&[0x01, 0x02]), Some(0x0102));
        assert_eq!(LengthField::U16Be.read(&[0x01]), None);
        assert_eq!(LengthField::U16Be.encode(10), vec![0x00, 0x0A]);
        assert_eq!(LengthField::U8.encode(300), vec![0xFF]);
        assert_eq!(LengthField::U16Be.encode(70_000), vec![0xFF, 0xFF]);
    }

    #[test]
    fn test_dialect_from_str() {
        assert_eq!("GM65".parse::<Dialect>(), Ok(Dialect::Gm65));
        assert_eq!("m3y-w".parse::<Dialect>(), Ok(Dialect::M3yw));
        assert_eq!("M3YW".parse::<Dialect>(), Ok(Dialect::M3yw));
        assert!("gm66".parse::<Dialect>().is_err());
        assert_eq!(Dialect::M3yw.to_string(), "M3Y-W");
    }
}
