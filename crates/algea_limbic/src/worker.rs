//! Worker actor - one node of the body
//!
//! A worker consumes its bounded inbox one task at a time. Each task adds
//! load; load above 50 damages integrity, and every bit of damage is reported
//! as distress. Load above 60 forces a cooldown. Integrity reaching zero is
//! death, which is final.

use algea_core::{RepairError, Task, WorkerConfig};
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const MAX_INTEGRITY: f64 = 100.0;
/// Load above which new work hits harder.
const ANXIETY_LOAD: f64 = 30.0;
const ANXIETY_MULTIPLIER: f64 = 1.5;
/// Load above which the worker takes damage.
const DAMAGE_LOAD: f64 = 50.0;
/// Load above which the worker must cool down.
const COOLDOWN_LOAD: f64 = 60.0;
const COOLDOWN_RELIEF: f64 = 30.0;
const PASSIVE_RELIEF: f64 = 5.0;
/// Distress emitted by a dying worker.
const DEATH_CRY: f64 = 100.0;
/// Integrity below which a live worker is reported critical.
const CRITICAL_INTEGRITY: f64 = 50.0;

/// Clinical state, derived from vitals for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Healthy,
    Stressed,
    Critical,
    Dead,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerState::Healthy => "healthy",
            WorkerState::Stressed => "stressed",
            WorkerState::Critical => "critical",
            WorkerState::Dead => "dead",
        };
        f.pad(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Vitals {
    /// 100.0 (pristine) → 0.0 (dead)
    pub integrity: f64,
    pub load: f64,
    pub dead: bool,
    pub cooldown: bool,
}

impl Default for Vitals {
    fn default() -> Self {
        Self {
            integrity: MAX_INTEGRITY,
            load: 0.0,
            dead: false,
            cooldown: false,
        }
    }
}

impl Vitals {
    pub fn state(&self) -> WorkerState {
        if self.dead || self.integrity <= 0.0 {
            WorkerState::Dead
        } else if self.integrity < CRITICAL_INTEGRITY {
            WorkerState::Critical
        } else if self.load > ANXIETY_LOAD {
            WorkerState::Stressed
        } else {
            WorkerState::Healthy
        }
    }

    pub fn is_alive(&self) -> bool {
        !self.dead && self.integrity > 0.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerStatus {
    pub id: String,
    pub state: WorkerState,
    pub integrity: f64,
    pub load: f64,
}

/// What happened to one task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TaskOutcome {
    /// The worker is dead; the task had no effect
    DroppedDead,
    /// The worker was cooling down; the task had no effect
    DroppedCooldown,
    /// Processed, followed by passive recovery
    Completed { load: f64, damage: f64 },
    /// Processed, then forced to cool down
    CooledDown { load: f64, damage: f64 },
    /// This task killed the worker
    Died,
}

pub struct Worker {
    id: String,
    vitals: RwLock<Vitals>,
    inbox_tx: mpsc::Sender<Task>,
    /// Taken by the consumption loop when the worker starts
    inbox_rx: Mutex<Option<mpsc::Receiver<Task>>>,
    distress_tx: mpsc::Sender<f64>,
    config: WorkerConfig,
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker").field("id", &self.id).finish()
    }
}

impl Worker {
    pub fn new(
        id: impl Into<String>,
        inbox_capacity: usize,
        distress_tx: mpsc::Sender<f64>,
        config: WorkerConfig,
    ) -> Arc<Self> {
        let (inbox_tx, inbox_rx) = mpsc::channel(inbox_capacity.max(1));
        Arc::new(Self {
            id: id.into(),
            vitals: RwLock::new(Vitals::default()),
            inbox_tx,
            inbox_rx: Mutex::new(Some(inbox_rx)),
            distress_tx,
            config,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Spawn the consumption loop. Returns `None` if it is already running.
    pub fn start(self: &Arc<Self>, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        let inbox = self.inbox_rx.lock().ok().and_then(|mut rx| rx.take())?;
        let worker = Arc::clone(self);
        Some(tokio::spawn(async move {
            worker.run(inbox, cancel).await;
        }))
    }

    async fn run(&self, mut inbox: mpsc::Receiver<Task>, cancel: CancellationToken) {
        tracing::debug!("Worker {} online", self.id);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                task = inbox.recv() => match task {
                    Some(task) => {
                        let outcome = self.process(task).await;
                        tracing::trace!("Worker {}: {:?}", self.id, outcome);
                    }
                    None => break,
                },
            }
        }
        tracing::debug!("Worker {} stopped", self.id);
    }

    /// Non-blocking enqueue. A full inbox hands the task back.
    pub fn submit(&self, task: Task) -> Result<(), TrySendError<Task>> {
        self.inbox_tx.try_send(task)
    }

    /// Tasks waiting in the inbox.
    pub fn pending(&self) -> usize {
        self.inbox_tx.max_capacity() - self.inbox_tx.capacity()
    }

    /// Run one task through the body.
    pub async fn process(&self, task: Task) -> TaskOutcome {
        let load = {
            let mut v = self.vitals.write().await;
            if v.dead {
                return TaskOutcome::DroppedDead;
            }
            if v.cooldown {
                tracing::debug!("Worker {} busy cooling down, dropping '{}'", self.id, task.id);
                return TaskOutcome::DroppedCooldown;
            }

            let mut impact = task.magnitude * 10.0;
            if v.load > ANXIETY_LOAD {
                impact *= ANXIETY_MULTIPLIER;
            }
            v.load += impact;
            v.load
        };

        tokio::time::sleep(self.config.latency_for(load)).await;

        let mut damage = 0.0;
        if load > DAMAGE_LOAD {
            damage = (load - DAMAGE_LOAD).powf(1.5) * 0.05;
            {
                let mut v = self.vitals.write().await;
                if !v.is_alive() {
                    return TaskOutcome::DroppedDead;
                }
                v.integrity -= damage;
                // Death happens under the same guard as the damage
                if v.integrity <= 0.0 {
                    self.die(&mut v);
                    return TaskOutcome::Died;
                }
            }
            self.emit(damage);
        }

        {
            let mut v = self.vitals.write().await;
            if !v.is_alive() {
                return TaskOutcome::DroppedDead;
            }
            if load <= COOLDOWN_LOAD {
                v.load = (v.load - PASSIVE_RELIEF).max(0.0);
                tracing::debug!(
                    "Worker {} finished '{}' (load {:.1})",
                    self.id,
                    task.id,
                    load
                );
                return TaskOutcome::Completed { load, damage };
            }
            v.cooldown = true;
        }

        tracing::debug!("Worker {} overloaded ({:.1}), cooling down", self.id, load);
        tokio::time::sleep(self.config.cooldown()).await;

        let mut v = self.vitals.write().await;
        v.load = (v.load - COOLDOWN_RELIEF).max(0.0);
        v.cooldown = false;
        TaskOutcome::CooledDown { load, damage }
    }

    /// Callers hold the vitals guard and have checked the worker was alive.
    fn die(&self, v: &mut Vitals) {
        v.dead = true;
        v.integrity = 0.0;
        v.cooldown = false;
        self.emit(DEATH_CRY);
        tracing::warn!("Worker {} has died", self.id);
    }

    /// Best-effort distress report; lost if the channel is full.
    fn emit(&self, distress: f64) {
        match self.distress_tx.try_send(distress) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::trace!("Distress channel full, {} lost {:.2}", self.id, distress);
            }
            Err(TrySendError::Closed(_)) => {
                tracing::trace!("Distress channel closed, {} lost {:.2}", self.id, distress);
            }
        }
    }

    /// Restore integrity and clear all load. Dead workers stay dead.
    pub async fn repair(&self, amount: f64) -> Result<f64, RepairError> {
        let mut v = self.vitals.write().await;
        if !v.is_alive() {
            tracing::warn!("Worker {} is dead and cannot be repaired", self.id);
            return Err(RepairError::WorkerDead(self.id.clone()));
        }
        let amount = if amount.is_finite() { amount.max(0.0) } else { 0.0 };
        v.integrity = (v.integrity + amount).min(MAX_INTEGRITY);
        v.load = 0.0;
        tracing::info!("Worker {} repaired, integrity {:.1}%", self.id, v.integrity);
        Ok(v.integrity)
    }

    pub async fn vitals(&self) -> Vitals {
        self.vitals.read().await.clone()
    }

    pub async fn status(&self) -> WorkerStatus {
        let v = self.vitals.read().await;
        WorkerStatus {
            id: self.id.clone(),
            state: v.state(),
            integrity: v.integrity,
            load: v.load,
        }
    }

    #[cfg(test)]
    pub(crate) async fn set_vitals(&self, vitals: Vitals) {
        *self.vitals.write().await = vitals;
    }
}
