//! Core module containing the scanner driver
//!
//! This module provides:
//! - Wire protocol for the GM65 and M3Y-W dialects (checksums, framing)
//! - Settings register model
//! - Transport capability and its serial implementation
//! - Scanner driver with per-dialect strategies
//! - Device detection by dialect and baud sweep
//! - Simulated scanner for tests and dry runs

pub mod detect;
pub mod protocol;
pub mod scanner;
pub mod settings;
pub mod simulator;
pub mod transport;
