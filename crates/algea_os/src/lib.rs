//! Host adapters backed by `sysinfo`.
//!
//! - `SysinfoSensor`: global CPU and RAM pressure as [`algea_core::HardwareSensor`]
//! - `SysinfoScanner`: the hungriest process as [`algea_core::ThreatScanner`]

pub mod scanner;
pub mod sensor;

pub use scanner::SysinfoScanner;
pub use sensor::SysinfoSensor;
