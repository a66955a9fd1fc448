//! Configuration module
//!
//! Read-only application settings: port, baud rate, dialect and timeouts

mod settings;

pub use settings::{AppConfig, ConfigError};

use directories::ProjectDirs;
use std::path::PathBuf;

/// Get the application configuration directory
pub fn config_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "scanlink", "Scanlink").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Default configuration file path
pub fn config_file() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}
