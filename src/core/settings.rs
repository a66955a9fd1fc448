//! Settings register model
//!
//! GM65 modules keep illumination, aimer, beeper and scan mode in a single
//! byte at register 0x0000:
//!
//! | bits | meaning |
//! |------|---------|
//! | 0-1  | scan mode: `00` manual, `01` command, `10` continuous, `11` sensing |
//! | 2-3  | illumination: `00` off, `01` normal, `11` on |
//! | 4-5  | aimer: `00` off, `01` normal, `11` on |
//! | 6    | beeper |
//! | 7    | decode LED |
//!
//! The register is never cached: the driver reads it fresh before each
//! change, writes it back and then saves it.

use std::fmt;
use std::str::FromStr;

/// Tri-state light setting shared by illumination and aimer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightMode {
    /// Always off
    Off,
    /// On only while scanning
    Normal,
    /// Always on
    On,
}

impl LightMode {
    /// Map the numeric CLI encoding (-1, 0, 1)
    pub fn from_level(level: i8) -> Self {
        match level {
            l if l < 0 => Self::Off,
            0 => Self::Normal,
            _ => Self::On,
        }
    }
}

impl FromStr for LightMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "off" | "-1" => Ok(Self::Off),
            "normal" | "0" => Ok(Self::Normal),
            "on" | "1" => Ok(Self::On),
            _ => Err(format!("Invalid light mode: {s} (expected off, normal or on)")),
        }
    }
}

/// Scan trigger mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Hardware trigger
    Manual,
    /// Host-triggered via start-scan command
    Command,
    /// Scanning continuously
    Continuous,
    /// Motion sensing
    Sensing,
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Manual => "manual",
            Self::Command => "command",
            Self::Continuous => "continuous",
            Self::Sensing => "sensing",
        };
        f.write_str(name)
    }
}

const MODE_MASK: u8 = 0b0000_0011;
const ILLUMINATION_LOW: u8 = 2;
const ILLUMINATION_HIGH: u8 = 3;
const AIMER_LOW: u8 = 4;
const AIMER_HIGH: u8 = 5;
const BEEPER: u8 = 6;

/// One settings byte as read from the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SettingsRegister(u8);

impl SettingsRegister {
    /// Wrap a raw byte
    pub fn new(raw: u8) -> Self {
        Self(raw)
    }

    /// Raw byte
    pub fn raw(&self) -> u8 {
        self.0
    }

    /// Whether `bit` is set
    pub fn bit(&self, bit: u8) -> bool {
        (self.0 >> bit) & 1 == 1
    }

    fn set_bit(&mut self, bit: u8, value: bool) {
        if value {
            self.0 |= 1 << bit;
        } else {
            self.0 &= !(1 << bit);
        }
    }

    fn light(&self, low: u8, high: u8) -> LightMode {
        match (self.bit(high), self.bit(low)) {
            (false, false) => LightMode::Off,
            (true, true) => LightMode::On,
            // 10 is undocumented; the module treats it as normal
            _ => LightMode::Normal,
        }
    }

    fn set_light(&mut self, low: u8, high: u8, mode: LightMode) {
        let (h, l) = match mode {
            LightMode::Off => (false, false),
            LightMode::Normal => (false, true),
            LightMode::On => (true, true),
        };
        self.set_bit(high, h);
        self.set_bit(low, l);
    }

    /// Illumination setting (bits 2-3)
    pub fn illumination(&self) -> LightMode {
        self.light(ILLUMINATION_LOW, ILLUMINATION_HIGH)
    }

    /// Set illumination bits
    pub fn set_illumination(&mut self, mode: LightMode) {
        self.set_light(ILLUMINATION_LOW, ILLUMINATION_HIGH, mode);
    }

    /// Aimer setting (bits 4-5)
    pub fn aimer(&self) -> LightMode {
        self.light(AIMER_LOW, AIMER_HIGH)
    }

    /// Set aimer bits
    pub fn set_aimer(&mut self, mode: LightMode) {
        self.set_light(AIMER_LOW, AIMER_HIGH, mode);
    }

    /// Beeper enabled (bit 6)
    pub fn beeper(&self) -> bool {
        self.bit(BEEPER)
    }

    /// Set beeper bit
    pub fn set_beeper(&mut self, on: bool) {
        self.set_bit(BEEPER, on);
    }

    /// Scan mode (bits 0-1)
    pub fn scan_mode(&self) -> ScanMode {
        match self.0 & MODE_MASK {
            0b00 => ScanMode::Manual,
            0b01 => ScanMode::Command,
            0b10 => ScanMode::Continuous,
            _ => ScanMode::Sensing,
        }
    }

    /// Set scan mode bits
    pub fn set_scan_mode(&mut self, mode: ScanMode) {
        let bits = match mode {
            ScanMode::Manual => 0b00,
            ScanMode::Command => 0b01,
            ScanMode::Continuous => 0b10,
            ScanMode::Sensing => 0b11,
        };
        self.0 = (self.0 & !MODE_MASK) | bits;
    }
}

impl From<u8> for SettingsRegister {
    fn from(raw: u8) -> Self {
        Self(raw)
    }
}

impl fmt::Display for SettingsRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "0x{:02X} (mode: {}, illumination: {:?}, aimer: {:?}, beeper: {})",
            self.0,
            self.scan_mode(),
            self.illumination(),
            self.aimer(),
            if self.beeper() { "on" } else { "off" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_illumination_bits() {
        let mut reg = SettingsRegister::new(0b1000_0001);
        reg.set_illumination(LightMode::On);
        assert!(reg.bit(2) && reg.bit(3));
        reg.set_illumination(LightMode::Off);
        assert!(!reg.bit(2) && !reg.bit(3));
        reg.set_illumination(LightMode::Normal);
        assert!(reg.bit(2) && !reg.bit(3));
        // Other bits untouched
        assert_eq!(reg.raw() & !0b0000_1100, 0b1000_0001);
    }

    #[test]
    fn test_aimer_and_beeper_bits() {
        let mut reg = SettingsRegister::default();
        reg.set_aimer(LightMode::On);
        assert_eq!(reg.raw(), 0b0011_0000);
        assert_eq!(reg.aimer(), LightMode::On);
        reg.set_beeper(true);
        assert_eq!(reg.raw(), 0b0111_0000);
        reg.set_aimer(LightMode::Normal);
        reg.set_beeper(false);
        assert_eq!(reg.raw(), 0b0001_0000);
    }

    #[test]
    fn test_scan_mode() {
        let mut reg = SettingsRegister::new(0xD5);
        assert_eq!(reg.scan_mode(), ScanMode::Command);
        reg.set_scan_mode(ScanMode::Continuous);
        assert_eq!(reg.raw(), 0xD6);
        assert_eq!(reg.scan_mode(), ScanMode::Continuous);
    }

    #[test]
    fn test_light_mode_parse() {
        assert_eq!("-1".parse::<LightMode>(), Ok(LightMode::Off));
        assert_eq!("Normal".parse::<LightMode>(), Ok(LightMode::Normal));
        assert_eq!(LightMode::from_level(5), LightMode::On);
        assert!("bright".parse::<LightMode>().is_err());
    }
}
