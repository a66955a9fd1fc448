//! Application settings

use crate::core::protocol::Dialect;
use crate::core::scanner::{Timeouts, BAUD_RATES};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File could not be read
    #[error("Cannot read {path}: {source}")]
    Read {
        /// Offending file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// File is not valid TOML for [`AppConfig`]
    #[error("Invalid configuration in {path}: {source}")]
    Parse {
        /// Offending file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: toml::de::Error,
    },

    /// Values parse but make no sense together
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Serial port; detection needs one given here or on the command line
    pub port: Option<String>,
    /// Initial host baud rate
    pub baud_rate: u32,
    /// Skip detection and speak this dialect
    pub dialect: Option<Dialect>,
    /// Read windows
    pub timeouts: Timeouts,
    /// Baud sweep order for detection
    pub baud_rates: Vec<u32>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: 9600,
            dialect: None,
            timeouts: Timeouts::default(),
            baud_rates: BAUD_RATES.to_vec(),
        }
    }
}

impl AppConfig {
    /// Load config from the default location, defaults if absent
    pub fn load() -> Result<Self, ConfigError> {
        match super::config_file() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load config from `path`, which must exist
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no scanner could work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.baud_rate == 0 {
            return Err(ConfigError::Invalid("baud_rate must be positive".to_string()));
        }
        if self.baud_rates.is_empty() {
            return Err(ConfigError::Invalid("baud_rates must not be empty".to_string()));
        }
        if self.timeouts.command_ms == 0 || self.timeouts.probe_ms == 0 {
            return Err(ConfigError::Invalid("timeouts must be positive".to_string()));
        }
        Ok(())
    }
}
