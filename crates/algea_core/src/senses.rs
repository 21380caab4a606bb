//! Seams to the host the organism runs on.
//!
//! Implementors:
//! - `algea_os::SysinfoSensor`: samples real CPU and RAM usage
//! - `algea_os::SysinfoScanner`: finds and terminates the hungriest process
//!
//! Tests plug in scripted fakes.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// CPU usage above which the host starts to hurt.
const CPU_PAIN_FLOOR: f64 = 40.0;
/// RAM usage above which the host starts to hurt.
const RAM_PAIN_FLOOR: f64 = 80.0;

/// What the body feels about the host machine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VitalSigns {
    pub cpu_percent: f64,
    pub ram_percent: f64,
    /// Distress derived from the two readings
    pub distress: f64,
}

impl VitalSigns {
    /// Translate raw readings into distress.
    ///
    /// CPU pressure grows super-linearly past 40%; RAM pressure grows
    /// linearly (and more gently) past 80%.
    pub fn from_readings(cpu_percent: f64, ram_percent: f64) -> Self {
        let cpu_excess = (cpu_percent - CPU_PAIN_FLOOR).max(0.0);
        let ram_excess = (ram_percent - RAM_PAIN_FLOOR).max(0.0);
        let distress = cpu_excess.powf(1.2) + ram_excess * 1.5;
        Self {
            cpu_percent,
            ram_percent,
            distress: if distress.is_finite() { distress } else { 0.0 },
        }
    }
}

/// A candidate for mitigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub name: String,
    pub pid: u32,
    pub load_percent: f64,
}

#[async_trait]
pub trait HardwareSensor: Send + Sync {
    async fn sample(&self) -> Result<VitalSigns>;

    /// Sensor name (for logs)
    fn name(&self) -> &str;
}

#[async_trait]
pub trait ThreatScanner: Send + Sync {
    /// The process consuming the most CPU, if any is busy at all.
    async fn find_top_consumer(&self) -> Result<Option<ProcessInfo>>;

    async fn terminate(&self, target: &ProcessInfo) -> Result<()>;
}
