//! CLI Module
//!
//! Provides command-line interface functionality including:
//! - Exit codes for automation
//! - Output formatting for replies and captures

pub mod exit_codes;
pub mod output;

pub use exit_codes::{exit_code_description, print_exit_codes, CliResult, ExitCodes, UsageError};
pub use output::{format_bytes, OutputFormat};
