//! # Algea Limbic System
//!
//! The living part of Algea: a pool of worker actors that get tired, hurt and
//! die, and the regulator that listens to their distress.
//!
//! ## Architecture
//!
//! Every worker runs its own consumption loop over a bounded inbox. Workers
//! report damage on a shared bounded distress channel, always with a
//! non-blocking send; a full channel simply loses the signal.
//!
//! The regulator runs three background loops:
//! 1. Listener: folds each distress signal into aggregate distress, the
//!    alarm and the temperament
//! 2. Decay: lets aggregate distress ebb away and clears the alarm
//! 3. Sensor: forwards host pressure as ordinary distress
//!
//! New work passes an admission pipeline before it reaches a worker:
//! alarm → trust → remembered fear → least-loaded live worker.

mod heartbeat;
mod regulator;
mod worker;

pub use regulator::{DispatchOutcome, RegulatorStatus, RejectReason, Regulator};
pub use worker::{TaskOutcome, Vitals, Worker, WorkerState, WorkerStatus};
