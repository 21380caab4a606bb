use algea_core::{ProcessInfo, ThreatScanner};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::Mutex;
use sysinfo::{Pid, System};

/// Processes below this CPU share are never blamed.
const IDLE_CPU: f32 = 0.1;

/// Finds the process with the highest CPU usage and kills it on request.
pub struct SysinfoScanner {
    system: Mutex<System>,
}

impl Default for SysinfoScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoScanner {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }

    fn with_system<T>(&self, f: impl FnOnce(&mut System) -> T) -> Result<T> {
        let mut sys = self
            .system
            .lock()
            .map_err(|_| anyhow!("sysinfo handle poisoned"))?;
        Ok(f(&mut sys))
    }
}

#[async_trait]
impl ThreatScanner for SysinfoScanner {
    async fn find_top_consumer(&self) -> Result<Option<ProcessInfo>> {
        self.with_system(|sys| sys.refresh_processes())?;
        tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;

        self.with_system(|sys| {
            sys.refresh_processes();
            sys.processes()
                .values()
                .filter(|p| p.cpu_usage() > IDLE_CPU)
                .max_by(|a, b| a.cpu_usage().total_cmp(&b.cpu_usage()))
                .map(|p| ProcessInfo {
                    name: p.name().to_string(),
                    pid: p.pid().as_u32(),
                    load_percent: p.cpu_usage() as f64,
                })
        })
    }

    async fn terminate(&self, target: &ProcessInfo) -> Result<()> {
        let killed = self.with_system(|sys| {
            sys.refresh_processes();
            match sys.process(Pid::from_u32(target.pid)) {
                // The pid may have been recycled since the scan
                Some(p) if p.name() == target.name => Some(p.kill()),
                _ => None,
            }
        })?;

        match killed {
            Some(true) => {
                tracing::info!("Killed {} ({})", target.name, target.pid);
                Ok(())
            }
            Some(false) => bail!("kill signal for {} ({}) was refused", target.name, target.pid),
            None => bail!("process {} ({}) is gone", target.name, target.pid),
        }
    }
}
