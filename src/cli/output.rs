//! Output formatting
//!
//! Stdout carries only command results; logs go to stderr.

use clap::ValueEnum;
use serde::Serialize;

/// How results are printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON object per result, for scripting
    Json,
    /// Bare hex, one result per line
    Hex,
}

/// Render `data` under `format`
///
/// Text shows printable ASCII as-is and escapes the rest.
pub fn format_bytes(data: &[u8], format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => escaped(data),
        OutputFormat::Hex => hex::encode(data),
        OutputFormat::Json => json_bytes(data).to_string(),
    }
}

/// `{"hex": ..., "text": ..., "length": ...}`
pub fn json_bytes(data: &[u8]) -> serde_json::Value {
    serde_json::json!({
        "hex": hex::encode(data),
        "text": String::from_utf8_lossy(data),
        "length": data.len(),
    })
}

/// Serialize a structured result, falling back to its Debug form
pub fn json_value<T: Serialize + std::fmt::Debug>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or_else(|_| serde_json::Value::String(format!("{value:?}")))
}

fn escaped(data: &[u8]) -> String {
    data.iter()
        .map(|&b| match b {
            0x00 => "\\0".to_string(),
            0x09 => "\\t".to_string(),
            0x0a => "\\n".to_string(),
            0x0d => "\\r".to_string(),
            0x20..=0x7e => char::from(b).to_string(),
            _ => format!("\\x{:02x}", b),
        })
        .collect()
}
