//! # Algea Core
//!
//! Types shared by every Algea crate:
//!
//! - **config**: TOML configuration with env overrides
//! - **error**: typed failures for repair, soothe and persistence
//! - **task**: the unit of work dispatched to workers
//! - **temperament**: the small trait model shaped by distress
//! - **senses**: seams for the host collaborators (hardware sensor, threat scanner)

pub mod config;
pub mod error;
pub mod senses;
pub mod task;
pub mod temperament;

pub use config::{
    AlgeaConfig, PersistenceConfig, PoolConfig, RegulatorConfig, WorkerConfig,
};
pub use error::{PersistenceError, RepairError, SootheError};
pub use senses::{HardwareSensor, ProcessInfo, ThreatScanner, VitalSigns};
pub use task::{complexity_from_scale, Task};
pub use temperament::{Temperament, TraitEntry, TraitKind, TrustShift};
