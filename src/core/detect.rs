//! Device detection
//!
//! Probes every known dialect at every candidate baud rate, GM65 first,
//! and hands back a driver for the first combination that answers.

use crate::core::protocol::Dialect;
use crate::core::scanner::{Scanner, ScannerError, Timeouts};
use crate::core::transport::ScannerTransport;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

/// Dialect and rate a device answered on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionResult {
    /// Wire grammar the device speaks
    pub dialect: Dialect,
    /// Baud rate the device answered at
    pub baud_rate: u32,
}

impl fmt::Display for DetectionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {} baud", self.dialect, self.baud_rate)
    }
}

/// Find the scanner on `transport`
///
/// Takes at most `dialects × rates × probe timeout`. On success the
/// returned driver is already at the working rate.
pub fn detect<T: ScannerTransport>(
    transport: T,
    rates: &[u32],
    timeouts: Timeouts,
) -> Result<(DetectionResult, Scanner<T>), ScannerError> {
    detect_among(transport, Dialect::all(), rates, timeouts)
}

/// [`detect`] restricted to `dialects`, tried in order
pub fn detect_among<T: ScannerTransport>(
    mut transport: T,
    dialects: &[Dialect],
    rates: &[u32],
    timeouts: Timeouts,
) -> Result<(DetectionResult, Scanner<T>), ScannerError> {
    for &dialect in dialects {
        debug!("Probing for {} over {} rates", dialect, rates.len());
        let mut scanner = Scanner::new(transport, dialect).with_timeouts(timeouts);

        if let Some(baud_rate) = scanner.find_baudrate(rates)? {
            let result = DetectionResult { dialect, baud_rate };
            info!("Detected {}", result);
            return Ok((result, scanner));
        }
        transport = scanner.into_transport();
    }

    info!("No scanner answered on any dialect or baud rate");
    Err(ScannerError::NoDeviceFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scanner::BAUD_RATES;
    use crate::core::simulator::SimulatedScanner;

    fn fast() -> Timeouts {
        Timeouts {
            command_ms: 30,
            probe_ms: 10,
            capture_ms: 30,
        }
    }

    #[test]
    fn test_detect_gm65_at_19200() {
        let sim = SimulatedScanner::gm65(19200).with_host_baud(9600);
        let (result, scanner) = detect(sim.clone(), &BAUD_RATES, fast()).unwrap();
        assert_eq!(
            result,
            DetectionResult {
                dialect: Dialect::Gm65,
                baud_rate: 19200
            }
        );
        assert_eq!(scanner.dialect(), Dialect::Gm65);
        assert_eq!(scanner.transport().baud_rate(), 19200);
    }

    #[test]
    fn test_detect_m3yw_after_gm65_sweep() {
        let sim = SimulatedScanner::m3yw(115200).with_host_baud(9600);
        let (result, _) = detect(sim.clone(), &BAUD_RATES, fast()).unwrap();
        assert_eq!(result.dialect, Dialect::M3yw);
        assert_eq!(result.baud_rate, 115200);
        // Full GM65 sweep, then 9600 and 115200 for M3Y-W
        assert_eq!(sim.requests().len(), BAUD_RATES.len() + 2);
    }

    #[test]
    fn test_detect_through_noise() {
        let sim = SimulatedScanner::gm65(4800).with_host_baud(9600).with_noise();
        let (result, _) = detect(sim, &BAUD_RATES, fast()).unwrap();
        assert_eq!(result.baud_rate, 4800);
    }

    #[test]
    fn test_no_device_found() {
        let sim = SimulatedScanner::silent();
        let err = detect(sim.clone(), &BAUD_RATES, fast()).unwrap_err();
        assert!(matches!(err, ScannerError::NoDeviceFound));
        assert_eq!(sim.requests().len(), Dialect::all().len() * BAUD_RATES.len());
        assert_eq!(sim.baud_rate(), 9600);
    }

    #[test]
    fn test_detect_among_limits_dialects() {
        let sim = SimulatedScanner::m3yw(9600);
        let err = detect_among(sim, &[Dialect::Gm65], &BAUD_RATES, fast()).unwrap_err();
        assert!(matches!(err, ScannerError::NoDeviceFound));
    }
}
