//! CLI Exit Codes
//!
//! Standard exit codes for CLI operations and automation.

use crate::config::ConfigError;
use crate::core::scanner::ScannerError;
use crate::core::transport::TransportError;
use std::process::ExitCode;
use thiserror::Error;

/// Bad or missing command-line input
#[derive(Error, Debug)]
#[error("{0}")]
pub struct UsageError(pub String);

/// Exit code constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCodes;

impl ExitCodes {
    /// Success
    pub const SUCCESS: u8 = 0;

    /// General error
    pub const ERROR: u8 = 1;

    /// Invalid arguments
    pub const INVALID_ARGS: u8 = 2;

    /// Connection failed
    pub const CONNECTION_FAILED: u8 = 3;

    /// No reply within the read window
    pub const TIMEOUT: u8 = 4;

    /// Permission denied
    pub const PERMISSION_DENIED: u8 = 7;

    /// Configuration error
    pub const CONFIG_ERROR: u8 = 8;

    /// Protocol error
    pub const PROTOCOL_ERROR: u8 = 9;

    /// User cancelled
    pub const CANCELLED: u8 = 11;

    /// Device not found
    pub const DEVICE_NOT_FOUND: u8 = 12;

    /// Port not found
    pub const PORT_NOT_FOUND: u8 = 14;

    /// Operation not available in this dialect
    pub const UNSUPPORTED: u8 = 18;

    /// Internal error
    pub const INTERNAL_ERROR: u8 = 127;
}

/// CLI operation result
#[derive(Debug)]
pub enum CliResult {
    /// Success
    Success,

    /// Error with code and message
    Error(u8, String),
}

impl CliResult {
    /// Success
    pub fn success() -> Self {
        Self::Success
    }

    /// Error with explicit code
    pub fn error(code: u8, msg: impl Into<String>) -> Self {
        Self::Error(code, msg.into())
    }

    /// Invalid command line
    pub fn invalid_args(msg: impl Into<String>) -> Self {
        Self::Error(ExitCodes::INVALID_ARGS, msg.into())
    }

    /// Get exit code
    pub fn code(&self) -> u8 {
        match self {
            Self::Success => ExitCodes::SUCCESS,
            Self::Error(code, _) => *code,
        }
    }

    /// Get message
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success => None,
            Self::Error(_, msg) => Some(msg),
        }
    }

    /// Convert to ExitCode
    pub fn to_exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }

    /// Is success?
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl From<&TransportError> for CliResult {
    fn from(err: &TransportError) -> Self {
        let code = match err {
            TransportError::PortNotFound(_) => ExitCodes::PORT_NOT_FOUND,
            TransportError::PermissionDenied(_) => ExitCodes::PERMISSION_DENIED,
            TransportError::InvalidBaudRate(_) => ExitCodes::INVALID_ARGS,
            TransportError::ConnectionFailed(_)
            | TransportError::Io(_)
            | TransportError::Disconnected => ExitCodes::CONNECTION_FAILED,
        };
        Self::Error(code, err.to_string())
    }
}

impl From<&ScannerError> for CliResult {
    fn from(err: &ScannerError) -> Self {
        let code = match err {
            ScannerError::Transport(e) => return Self::from(e),
            ScannerError::Decode(e) if e.is_incomplete() => ExitCodes::TIMEOUT,
            ScannerError::Decode(_)
            | ScannerError::UnexpectedReply(_)
            | ScannerError::BaudrateChangeUnconfirmed { .. } => ExitCodes::PROTOCOL_ERROR,
            ScannerError::UnsupportedOperation { .. } => ExitCodes::UNSUPPORTED,
            ScannerError::DomainValue(_) | ScannerError::UnsupportedBaudRate(_) => {
                ExitCodes::INVALID_ARGS
            }
            ScannerError::NoDeviceFound => ExitCodes::DEVICE_NOT_FOUND,
        };
        Self::Error(code, err.to_string())
    }
}

impl From<&ConfigError> for CliResult {
    fn from(err: &ConfigError) -> Self {
        Self::Error(ExitCodes::CONFIG_ERROR, err.to_string())
    }
}

impl From<&anyhow::Error> for CliResult {
    fn from(err: &anyhow::Error) -> Self {
        if let Some(e) = err.downcast_ref::<ScannerError>() {
            Self::from(e)
        } else if let Some(e) = err.downcast_ref::<TransportError>() {
            Self::from(e)
        } else if let Some(e) = err.downcast_ref::<ConfigError>() {
            Self::from(e)
        } else if let Some(e) = err.downcast_ref::<UsageError>() {
            Self::invalid_args(e.to_string())
        } else {
            Self::Error(ExitCodes::ERROR, format!("{:#}", err))
        }
    }
}

/// Every code this tool exits with, and what it means
const DESCRIPTIONS: [(u8, &str); 13] = [
    (ExitCodes::SUCCESS, "Success"),
    (ExitCodes::ERROR, "General error"),
    (ExitCodes::INVALID_ARGS, "Invalid arguments"),
    (ExitCodes::CONNECTION_FAILED, "Connection failed"),
    (ExitCodes::TIMEOUT, "No reply from device"),
    (ExitCodes::PERMISSION_DENIED, "Permission denied"),
    (ExitCodes::CONFIG_ERROR, "Configuration error"),
    (ExitCodes::PROTOCOL_ERROR, "Protocol error"),
    (ExitCodes::CANCELLED, "Operation cancelled"),
    (ExitCodes::DEVICE_NOT_FOUND, "Device not found"),
    (ExitCodes::PORT_NOT_FOUND, "Port not found"),
    (ExitCodes::UNSUPPORTED, "Not supported by this scanner"),
    (ExitCodes::INTERNAL_ERROR, "Internal error"),
];

/// Exit code description
pub fn exit_code_description(code: u8) -> &'static str {
    DESCRIPTIONS
        .iter()
        .find(|(c, _)| *c == code)
        .map_or("Unknown error", |(_, text)| text)
}

/// Print exit code table
pub fn print_exit_codes() {
    println!("Exit Codes:");
    for (code, text) in DESCRIPTIONS {
        println!("  {:>3}  {}", code, text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::protocol::{DecodeError, Dialect};

    #[test]
    fn test_cli_result() {
        let success = CliResult::success();
        assert!(success.is_success());
        assert_eq!(success.code(), 0);

        let error = CliResult::error(3, "Connection failed");
        assert!(!error.is_success());
        assert_eq!(error.code(), 3);
        assert_eq!(error.message(), Some("Connection failed"));
    }

    #[test]
    fn test_from_scanner_error() {
        let cases = [
            (ScannerError::NoDeviceFound, ExitCodes::DEVICE_NOT_FOUND),
            (
                ScannerError::UnsupportedOperation {
                    dialect: Dialect::M3yw,
                    operation: "get_settings",
                },
                ExitCodes::UNSUPPORTED,
            ),
            (ScannerError::DomainValue("too long".into()), ExitCodes::INVALID_ARGS),
            (ScannerError::Decode(DecodeError::ChecksumMismatch), ExitCodes::PROTOCOL_ERROR),
            (
                ScannerError::Decode(DecodeError::TruncatedHeader {
                    needed: 4,
                    available: 0,
                }),
                ExitCodes::TIMEOUT,
            ),
            (
                ScannerError::Transport(TransportError::PortNotFound("COM9".into())),
                ExitCodes::PORT_NOT_FOUND,
            ),
        ];
        for (err, code) in cases {
            assert_eq!(CliResult::from(&err).code(), code, "{err}");
        }
    }

    #[test]
    fn test_from_anyhow() {
        let err = anyhow::Error::new(ScannerError::NoDeviceFound).context("detecting");
        assert_eq!(CliResult::from(&err).code(), ExitCodes::DEVICE_NOT_FOUND);

        let usage = anyhow::Error::new(UsageError("no port given".into()));
        assert_eq!(CliResult::from(&usage).code(), ExitCodes::INVALID_ARGS);

        let other = anyhow::anyhow!("bad hex");
        assert_eq!(CliResult::from(&other).code(), ExitCodes::ERROR);
    }

    #[test]
    fn test_descriptions() {
        assert_eq!(exit_code_description(ExitCodes::UNSUPPORTED), "Not supported by this scanner");
        assert_eq!(exit_code_description(200), "Unknown error");
    }
}
