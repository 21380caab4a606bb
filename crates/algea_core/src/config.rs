use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AlgeaConfig {
    pub pool: PoolConfig,
    pub worker: WorkerConfig,
    pub regulator: RegulatorConfig,
    pub persistence: PersistenceConfig,
}

impl AlgeaConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    /// After loading, env var overrides are applied.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config: AlgeaConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML config")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Try to load from path; if file doesn't exist, return defaults with env overrides.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::info!("Config file not found or invalid ({}), using defaults", e);
                let mut cfg = Self::default();
                cfg.apply_env_overrides();
                cfg
            }
        }
    }

    /// Apply environment variable overrides on top of file-based config.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("ALGEA_WORKERS") {
            if let Ok(n) = v.parse() {
                self.pool.worker_count = n;
            }
        }
        if let Ok(v) = std::env::var("ALGEA_SNAPSHOT") {
            self.persistence.snapshot_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("ALGEA_MITIGATION") {
            if let Ok(b) = v.parse() {
                self.regulator.mitigation_enabled = b;
            }
        }
    }
}

// ============================================================================
// Sub-configs
// ============================================================================

/// Shape of the worker pool and its channels.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub worker_count: usize,
    /// Per-worker inbox capacity. Submissions beyond this are rejected, never queued.
    pub inbox_capacity: usize,
    /// Capacity of the shared distress channel (workers + sensor → regulator).
    pub distress_capacity: usize,
    /// Worker ids are `{id_prefix}-{n}`, numbered from 1.
    pub id_prefix: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_count: 5,
            inbox_capacity: 10,
            distress_capacity: 100,
            id_prefix: "N".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub base_latency_ms: u64,
    /// Extra processing latency per unit of load.
    pub latency_per_load_ms: f64,
    pub cooldown_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            base_latency_ms: 100,
            latency_per_load_ms: 5.0,
            cooldown_ms: 500,
        }
    }
}

impl WorkerConfig {
    /// Processing latency for a worker carrying `load`.
    pub fn latency_for(&self, load: f64) -> Duration {
        let extra = (load.max(0.0) * self.latency_per_load_ms).round() as u64;
        Duration::from_millis(self.base_latency_ms + extra)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    /// Near-zero latencies for tests.
    pub fn testing() -> Self {
        Self {
            base_latency_ms: 1,
            latency_per_load_ms: 0.0,
            cooldown_ms: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegulatorConfig {
    pub decay_interval_ms: u64,
    pub decay_step: f64,
    /// Alarm is raised once aggregate distress rises above this.
    pub alarm_enter: f64,
    /// Alarm is cleared only once aggregate distress falls below this.
    pub alarm_exit: f64,
    /// Above this the threat scanner is consulted (when enabled).
    pub critical_threshold: f64,
    pub mitigation_relief: f64,
    pub mitigation_enabled: bool,
    /// Anticipated fear above this refuses the task.
    pub fear_threshold: f64,
    pub soothe_delta: f64,
    pub sensor_enabled: bool,
    pub sensor_interval_ms: u64,
    /// Sensor readings at or below this are not forwarded as distress.
    pub sensor_floor: f64,
    /// Process names the scanner must never target.
    pub self_names: Vec<String>,
}

impl Default for RegulatorConfig {
    fn default() -> Self {
        Self {
            decay_interval_ms: 1000,
            decay_step: 2.0,
            alarm_enter: 80.0,
            alarm_exit: 50.0,
            critical_threshold: 95.0,
            mitigation_relief: 30.0,
            mitigation_enabled: false,
            fear_threshold: 60.0,
            soothe_delta: 0.15,
            sensor_enabled: true,
            sensor_interval_ms: 2000,
            sensor_floor: 5.0,
            self_names: vec!["algea".to_string()],
        }
    }
}

impl RegulatorConfig {
    pub fn decay_interval(&self) -> Duration {
        Duration::from_millis(self.decay_interval_ms)
    }

    pub fn sensor_interval(&self) -> Duration {
        Duration::from_millis(self.sensor_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub snapshot_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("algea_state.json"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
