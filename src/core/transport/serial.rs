//! Serial port transport implementation

use super::{Deadline, ScannerTransport, TransportError};
use serde::{Deserialize, Serialize};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::{debug, trace};

/// Serial port configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Port name (e.g., COM3, /dev/ttyUSB0)
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
}

impl SerialConfig {
    /// Create a new serial configuration (8N1, no flow control)
    pub fn new(port: &str, baud_rate: u32) -> Self {
        Self {
            port: port.to_string(),
            baud_rate,
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self::new("/dev/ttyUSB0", 9600)
    }
}

/// Serial port transport
pub struct SerialTransport {
    config: SerialConfig,
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Open the port described by `config`
    pub fn open(config: SerialConfig) -> Result<Self, TransportError> {
        let port = serialport::new(&config.port, config.baud_rate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(100))
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => TransportError::PortNotFound(config.port.clone()),
                serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
                    TransportError::PermissionDenied(config.port.clone())
                }
                serialport::ErrorKind::Io(std::io::ErrorKind::NotFound) => {
                    TransportError::PortNotFound(config.port.clone())
                }
                _ => TransportError::ConnectionFailed(e.to_string()),
            })?;

        debug!("Opened {} @ {} baud", config.port, config.baud_rate);
        Ok(Self { config, port })
    }

    /// Port name and current rate
    pub fn connection_info(&self) -> String {
        format!("{} @ {} baud (8N1)", self.config.port, self.config.baud_rate)
    }
}

impl ScannerTransport for SerialTransport {
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.port.write_all(data)?;
        self.port.flush()?;
        Ok(())
    }

    fn read(&mut self, max_bytes: usize, deadline: &Deadline) -> Result<Vec<u8>, TransportError> {
        let remaining = deadline.remaining();
        if remaining.is_zero() || max_bytes == 0 {
            return Ok(Vec::new());
        }
        self.port
            .set_timeout(remaining)
            .map_err(|e| TransportError::Io(e.into()))?;

        let mut buffer = vec![0u8; max_bytes];
        match self.port.read(&mut buffer) {
            Ok(n) => {
                buffer.truncate(n);
                trace!("Read {} bytes from {}", n, self.config.port);
                Ok(buffer)
            }
            // No data available, return empty
            Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(Vec::new()),
            Err(e) => Err(TransportError::Io(e)),
        }
    }

    fn baud_rate(&self) -> u32 {
        self.config.baud_rate
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<(), TransportError> {
        self.port
            .set_baud_rate(baud_rate)
            .map_err(|_| TransportError::InvalidBaudRate(baud_rate))?;
        self.port
            .clear(serialport::ClearBuffer::All)
            .map_err(|e| TransportError::Io(e.into()))?;
        self.config.baud_rate = baud_rate;
        debug!("{} switched to {} baud", self.config.port, baud_rate);
        Ok(())
    }
}

/// List available serial ports
pub fn list_ports() -> Result<Vec<serialport::SerialPortInfo>, TransportError> {
    serialport::available_ports().map_err(|e| TransportError::Io(e.into()))
}
