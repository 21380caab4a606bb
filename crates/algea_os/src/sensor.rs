use algea_core::{HardwareSensor, VitalSigns};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Mutex;
use sysinfo::System;

/// Reads global CPU and memory usage from the local host.
pub struct SysinfoSensor {
    system: Mutex<System>,
}

impl Default for SysinfoSensor {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoSensor {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }

    fn refresh_cpu(&self) -> Result<()> {
        let mut sys = self
            .system
            .lock()
            .map_err(|_| anyhow!("sysinfo handle poisoned"))?;
        sys.refresh_cpu();
        Ok(())
    }

    fn read(&self) -> Result<(f64, f64)> {
        let mut sys = self
            .system
            .lock()
            .map_err(|_| anyhow!("sysinfo handle poisoned"))?;
        sys.refresh_cpu();
        sys.refresh_memory();

        let cpu = sys.global_cpu_info().cpu_usage() as f64;
        let total = sys.total_memory();
        let ram = if total == 0 {
            0.0
        } else {
            sys.used_memory() as f64 / total as f64 * 100.0
        };
        Ok((cpu, ram))
    }
}

#[async_trait]
impl HardwareSensor for SysinfoSensor {
    async fn sample(&self) -> Result<VitalSigns> {
        // CPU usage is a delta between two refreshes
        self.refresh_cpu()?;
        tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
        let (cpu, ram) = self.read()?;

        let vitals = VitalSigns::from_readings(cpu, ram);
        tracing::trace!(
            "Host sample: cpu {:.1}% ram {:.1}% distress {:.2}",
            vitals.cpu_percent,
            vitals.ram_percent,
            vitals.distress
        );
        Ok(vitals)
    }

    fn name(&self) -> &str {
        "sysinfo"
    }
}
