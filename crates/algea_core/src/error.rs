//! Typed failures surfaced to callers.
//!
//! Admission rejections and backpressure are ordinary dispatch outcomes, not
//! errors; only the operations below can fail.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepairError {
    #[error("worker {0} is dead and cannot be repaired; it needs a restart")]
    WorkerDead(String),
    #[error("no worker with id {0}")]
    UnknownWorker(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum SootheError {
    #[error("alarm is active, soothing refused")]
    Alarm,
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to access snapshot {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("snapshot {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode snapshot: {0}")]
    Encode(#[source] serde_json::Error),
}
