//! MijiaScan - passive BLE telemetry capture for Mijia sensors
//!
//! This library scans Bluetooth LE advertisement traffic over a raw kernel
//! HCI socket, restricted to a whitelist of device addresses, decodes the
//! Mijia vendor service-data payloads (temperature, humidity, battery) and
//! accumulates per-device running averages. It also exposes a lower-level
//! capture primitive that returns raw advertisement payloads for a host
//! environment to decode itself.

pub mod address;
pub mod aggregate;
pub mod cancel;
pub mod capture;
pub mod decoder;
pub mod error;
pub mod hci;
pub mod reader;
pub mod session;

// Re-export common types for convenience
pub use address::{DeviceAddress, ParseAddressError};
pub use aggregate::{AggregationStore, Averaged, AveragedReadings, DeviceAggregate};
pub use cancel::CancelToken;
pub use capture::BleCapture;
pub use decoder::{decode, scaled, Reading, ReadingValue};
pub use error::{Error, HciError};
pub use hci::{HciCommand, HciEvent, HciFilter, HciSocket, LeAdvertisingReport};
pub use reader::{run_loop, ReportSource, ScanOutcome, ScanPolicy, POLL_INTERVAL};
pub use session::{parse_whitelist, ScanParameters, ScanSession};
