//! # Scanlink Core Library
//!
//! Serial driver for GM65 and M3Y-W barcode scanner modules:
//! - Frame encoding and decoding for both wire dialects
//! - CRC16-XMODEM and BCC checksums
//! - Settings register read-modify-write (GM65)
//! - Dialect and baud rate auto-detection
//! - Continuous capture of barcode output
//! - CLI exit codes and TOML configuration
//!
//! ## Example
//!
//! ```rust,no_run
//! use scanlink_core::{detect, LightMode, SerialConfig, SerialTransport, Timeouts, BAUD_RATES};
//!
//! fn main() -> anyhow::Result<()> {
//!     let port = SerialTransport::open(SerialConfig::new("/dev/ttyUSB0", 9600))?;
//!     let (found, mut scanner) = detect(port, &BAUD_RATES, Timeouts::default())?;
//!     println!("Found {}", found);
//!
//!     scanner.set_illumination(LightMode::On)?;
//!     let capture = scanner.capture(std::time::Duration::from_secs(5))?;
//!     println!("Read: {}", String::from_utf8_lossy(&capture.unframed));
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod core;

// Re-exports for convenience
pub use crate::cli::{CliResult, ExitCodes};
pub use crate::config::AppConfig;
pub use crate::core::detect::{detect, detect_among, DetectionResult};
pub use crate::core::protocol::{ChecksumType, Command, DecodeError, Dialect, FrameDecoder};
pub use crate::core::scanner::{Capture, Reply, Scanner, ScannerError, Timeouts, BAUD_RATES};
pub use crate::core::settings::{LightMode, ScanMode, SettingsRegister};
pub use crate::core::simulator::SimulatedScanner;
pub use crate::core::transport::{
    list_ports, Deadline, ScannerTransport, SerialConfig, SerialTransport, TransportError,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
