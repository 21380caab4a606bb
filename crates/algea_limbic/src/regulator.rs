//! Core regulator implementation
//!
//! The Regulator is the context object for a whole organism. It:
//! - Owns the workers and the shared distress channel
//! - Folds distress into aggregate distress, the alarm and the temperament
//! - Remembers how each task felt and refuses tasks it has learned to fear
//! - Routes accepted work to the least-loaded live worker
//!
//! Aggregate distress, the alarm, the temperament and the episodic memory sit
//! behind one lock. Lock order is regulator → worker; workers never touch the
//! regulator lock. The lock is never held across a collaborator call.

use crate::heartbeat::ticker;
use crate::worker::{Worker, WorkerStatus};
use algea_core::{
    AlgeaConfig, HardwareSensor, PersistenceError, ProcessInfo, RegulatorConfig, RepairError,
    SootheError, Task, Temperament, ThreatScanner, TraitKind, TrustShift,
};
use algea_memory::{EpisodicMemory, Snapshot};
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const DISTRESS_CEILING: f64 = 100.0;
/// Trust below this, combined with strong self-preservation, refuses orders.
const DISTRUST_TRUST: f64 = 0.3;
const DISTRUST_PRESERVATION: f64 = 0.7;
/// Distress remembered per unit of accepted complexity.
const DISTRESS_PER_COMPLEXITY: f64 = 5.0;

/// Why the admission pipeline refused a task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RejectReason {
    Alarm,
    Distrust { trust: f64 },
    SelfPreservation { fear: f64 },
}

/// Result of a dispatch request. Every variant is an expected outcome;
/// none of them is an error.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Accepted { worker_id: String, load: f64 },
    Rejected(RejectReason),
    /// The chosen worker's inbox was full
    Backpressure { worker_id: String },
    /// No live worker left
    NoCapacity,
}

impl DispatchOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, DispatchOutcome::Accepted { .. })
    }
}

impl fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchOutcome::Accepted { worker_id, load } => {
                write!(f, "ACCEPTED: assigned to worker {} (load {:.1})", worker_id, load)
            }
            DispatchOutcome::Rejected(RejectReason::Alarm) => {
                write!(f, "REJECTED: in alarm, no new work accepted")
            }
            DispatchOutcome::Rejected(RejectReason::Distrust { trust }) => {
                write!(f, "DISTRUST: orders refused (trust {:.2})", trust)
            }
            DispatchOutcome::Rejected(RejectReason::SelfPreservation { fear }) => {
                write!(f, "SELF-PRESERVATION: refusing, remembered distress {:.1}", fear)
            }
            DispatchOutcome::Backpressure { worker_id } => {
                write!(f, "BUSY: healthiest worker {} is saturated", worker_id)
            }
            DispatchOutcome::NoCapacity => write!(f, "NO CAPACITY: every worker is dead"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegulatorStatus {
    pub aggregate_distress: f64,
    pub alarm: bool,
    pub temperament: Temperament,
    pub workers: Vec<WorkerStatus>,
}

impl RegulatorStatus {
    pub fn live_workers(&self) -> usize {
        self.workers
            .iter()
            .filter(|w| w.state != crate::WorkerState::Dead)
            .count()
    }
}

/// State guarded by the regulator lock.
#[derive(Debug, Default)]
struct Psyche {
    /// Clamped to [0, 100]
    aggregate_distress: f64,
    alarm: bool,
    temperament: Temperament,
    memory: EpisodicMemory,
}

pub struct Regulator {
    workers: Vec<Arc<Worker>>,
    psyche: Mutex<Psyche>,
    distress_tx: mpsc::Sender<f64>,
    /// Taken by the listener when the regulator starts
    distress_rx: StdMutex<Option<mpsc::Receiver<f64>>>,
    config: RegulatorConfig,
    sensor: Option<Arc<dyn HardwareSensor>>,
    scanner: Option<Arc<dyn ThreatScanner>>,
    /// Set while a threat scan is in flight
    mitigating: AtomicBool,
    cancel: CancellationToken,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
}

impl Regulator {
    /// Build the organism: workers, channels and a newborn temperament.
    /// Nothing runs until [`Regulator::start`].
    pub fn new(config: &AlgeaConfig) -> Self {
        let (distress_tx, distress_rx) = mpsc::channel(config.pool.distress_capacity.max(1));
        let workers = (1..=config.pool.worker_count)
            .map(|n| {
                Worker::new(
                    format!("{}-{}", config.pool.id_prefix, n),
                    config.pool.inbox_capacity,
                    distress_tx.clone(),
                    config.worker.clone(),
                )
            })
            .collect();

        Self {
            workers,
            psyche: Mutex::new(Psyche::default()),
            distress_tx,
            distress_rx: StdMutex::new(Some(distress_rx)),
            config: config.regulator.clone(),
            sensor: None,
            scanner: None,
            mitigating: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            tasks: StdMutex::new(Vec::new()),
        }
    }

    pub fn with_sensor(mut self, sensor: Arc<dyn HardwareSensor>) -> Self {
        self.sensor = Some(sensor);
        self
    }

    pub fn with_scanner(mut self, scanner: Arc<dyn ThreatScanner>) -> Self {
        self.scanner = Some(scanner);
        self
    }

    pub fn workers(&self) -> &[Arc<Worker>] {
        &self.workers
    }

    pub fn worker(&self, id: &str) -> Option<&Arc<Worker>> {
        self.workers.iter().find(|w| w.id().eq_ignore_ascii_case(id))
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Spawn worker loops, the distress listener, the decay loop and (when a
    /// sensor is attached and enabled) the sensor loop.
    pub fn start(self: &Arc<Self>) {
        let Some(distress_rx) = self.distress_rx.lock().ok().and_then(|mut rx| rx.take()) else {
            tracing::warn!("Regulator already started");
            return;
        };

        let mut handles = Vec::new();
        for worker in &self.workers {
            if let Some(handle) = worker.start(self.cancel.child_token()) {
                handles.push(handle);
            }
        }

        handles.push(tokio::spawn(Arc::clone(self).listen(distress_rx)));

        let this = Arc::clone(self);
        handles.push(tokio::spawn(async move {
            this.decay_loop().await;
        }));

        if self.config.sensor_enabled && self.sensor.is_some() {
            let this = Arc::clone(self);
            handles.push(tokio::spawn(async move {
                this.sensor_loop().await;
            }));
        }

        tracing::info!(
            "Regulator awake with {} workers ({} background tasks)",
            self.workers.len(),
            handles.len()
        );
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.extend(handles);
        }
    }

    /// Cancel every background task and wait for them to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handles = self
            .tasks
            .lock()
            .map(|mut tasks| std::mem::take(&mut *tasks))
            .unwrap_or_default();
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!("Background task ended abnormally: {}", e);
            }
        }
        tracing::info!("Regulator stopped");
    }

    async fn listen(self: Arc<Self>, mut distress_rx: mpsc::Receiver<f64>) {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                signal = distress_rx.recv() => match signal {
                    Some(distress) => {
                        if self.absorb_distress(distress).await {
                            self.spawn_mitigation();
                        }
                    }
                    None => break,
                },
            }
        }
    }

    async fn decay_loop(&self) {
        let mut ticker = ticker(self.config.decay_interval());
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => self.decay_tick().await,
            }
        }
    }

    async fn sensor_loop(&self) {
        let mut ticker = ticker(self.config.sensor_interval());
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.sense_once().await;
                }
            }
        }
    }

    // =========================================================================
    // Distress bookkeeping
    // =========================================================================

    /// Fold one distress signal into the psyche. Returns whether aggregate
    /// distress is now critical.
    pub async fn absorb_distress(&self, distress: f64) -> bool {
        let distress = if distress.is_finite() { distress.max(0.0) } else { 0.0 };

        let mut psyche = self.psyche.lock().await;
        psyche.temperament.adjust_from_experience(distress);
        psyche.aggregate_distress =
            (psyche.aggregate_distress + distress).clamp(0.0, DISTRESS_CEILING);

        if psyche.aggregate_distress > self.config.alarm_enter {
            if !psyche.alarm {
                tracing::warn!(
                    "ALARM: systemic distress {:.1}, refusing new work",
                    psyche.aggregate_distress
                );
            }
            psyche.alarm = true;
        }
        tracing::trace!(
            "Absorbed distress {:.2} (aggregate {:.1})",
            distress,
            psyche.aggregate_distress
        );

        psyche.aggregate_distress > self.config.critical_threshold
    }

    /// One decay step: distress ebbs and a calm enough psyche leaves alarm.
    pub async fn decay_tick(&self) {
        let mut psyche = self.psyche.lock().await;
        psyche.aggregate_distress = (psyche.aggregate_distress - self.config.decay_step).max(0.0);

        if psyche.alarm && psyche.aggregate_distress < self.config.alarm_exit {
            psyche.alarm = false;
            tracing::info!(
                "Distress stable at {:.1}, leaving alarm",
                psyche.aggregate_distress
            );
        }
    }

    /// Poll the hardware sensor once and forward notable pressure as distress.
    /// Returns the forwarded value, if any.
    pub async fn sense_once(&self) -> Option<f64> {
        let sensor = self.sensor.as_ref()?;
        let vitals = match sensor.sample().await {
            Ok(vitals) => vitals,
            Err(e) => {
                tracing::warn!("Sensor {} failed: {}", sensor.name(), e);
                return None;
            }
        };

        if vitals.distress <= self.config.sensor_floor {
            return None;
        }

        match self.distress_tx.try_send(vitals.distress) {
            Ok(()) => {
                tracing::debug!(
                    "Host pressure: cpu {:.1}% ram {:.1}% → distress {:.1}",
                    vitals.cpu_percent,
                    vitals.ram_percent,
                    vitals.distress
                );
                Some(vitals.distress)
            }
            Err(_) => {
                tracing::trace!("Distress channel saturated, host reading dropped");
                None
            }
        }
    }

    /// Start a threat scan in its own task. Critical events arriving while a
    /// scan is in flight do not start another. Returns whether a scan started.
    fn spawn_mitigation(self: &Arc<Self>) -> bool {
        if !self.config.mitigation_enabled || self.scanner.is_none() {
            return false;
        }
        if self.mitigating.swap(true, Ordering::AcqRel) {
            tracing::debug!("Threat scan already in flight");
            return false;
        }

        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = this.cancel.cancelled() => {}
                _ = this.mitigate() => {}
            }
            this.mitigating.store(false, Ordering::Release);
        });
        true
    }

    /// One scan-and-terminate attempt; relief is applied on success.
    async fn mitigate(&self) -> bool {
        let Some(scanner) = self.scanner.as_ref() else {
            return false;
        };
        if !self.hunt(scanner.as_ref()).await {
            return false;
        }

        let mut psyche = self.psyche.lock().await;
        psyche.aggregate_distress =
            (psyche.aggregate_distress - self.config.mitigation_relief).max(0.0);
        tracing::info!(
            "Threat neutralized, distress down to {:.1}",
            psyche.aggregate_distress
        );
        true
    }

    /// Find and terminate the hungriest process. Failures are only logged.
    async fn hunt(&self, scanner: &dyn ThreatScanner) -> bool {
        let target = match scanner.find_top_consumer().await {
            Ok(Some(target)) => target,
            Ok(None) => {
                tracing::info!("Threat scan found nothing to blame");
                return false;
            }
            Err(e) => {
                tracing::warn!("Threat scan failed: {}", e);
                return false;
            }
        };

        if self.is_self(&target) {
            tracing::warn!("The threat is myself ({}), standing down", target.name);
            return false;
        }

        tracing::warn!(
            "Terminating {} (pid {}, {:.1}% cpu)",
            target.name,
            target.pid,
            target.load_percent
        );
        match scanner.terminate(&target).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to terminate {} ({}): {}", target.name, target.pid, e);
                false
            }
        }
    }

    fn is_self(&self, target: &ProcessInfo) -> bool {
        target.pid == std::process::id()
            || self
                .config
                .self_names
                .iter()
                .any(|name| name.eq_ignore_ascii_case(&target.name))
    }

    // =========================================================================
    // Entry points
    // =========================================================================

    /// Positive interaction: raises trust, unless the psyche is in alarm.
    pub async fn soothe(&self) -> Result<TrustShift, SootheError> {
        let mut psyche = self.psyche.lock().await;
        if psyche.alarm {
            return Err(SootheError::Alarm);
        }
        let shift = psyche.temperament.reinforce_trust(self.config.soothe_delta);
        tracing::info!("Soothed: trust {:.2} → {:.2}", shift.before, shift.after);
        Ok(shift)
    }

    /// Run a task through admission control and, if admitted, hand it to the
    /// least-loaded live worker.
    pub async fn dispatch(&self, task_id: &str, complexity: f64) -> DispatchOutcome {
        let mut psyche = self.psyche.lock().await;

        if psyche.alarm {
            return DispatchOutcome::Rejected(RejectReason::Alarm);
        }

        let trust = psyche.temperament.magnitude(TraitKind::HumanTrust);
        let preservation = psyche.temperament.magnitude(TraitKind::SelfPreservation);
        if trust < DISTRUST_TRUST && preservation > DISTRUST_PRESERVATION {
            return DispatchOutcome::Rejected(RejectReason::Distrust { trust });
        }

        let fear = psyche.memory.consult_fear(task_id);
        tracing::debug!(
            "Considering '{}' ({}): fear {:.1}, trust {:.2}",
            task_id,
            fear.recollection,
            fear.level,
            trust
        );
        if fear.level > self.config.fear_threshold {
            return DispatchOutcome::Rejected(RejectReason::SelfPreservation { fear: fear.level });
        }

        let Some((worker, load)) = self.least_loaded().await else {
            return DispatchOutcome::NoCapacity;
        };

        let task = Task::new(task_id, complexity);
        let experienced = task.magnitude * DISTRESS_PER_COMPLEXITY;
        match worker.submit(task) {
            Ok(()) => {
                psyche.memory.consolidate(task_id, experienced);
                DispatchOutcome::Accepted {
                    worker_id: worker.id().to_string(),
                    load,
                }
            }
            Err(_) => DispatchOutcome::Backpressure {
                worker_id: worker.id().to_string(),
            },
        }
    }

    /// Live worker with the lowest load; ties go to the earliest registered.
    async fn least_loaded(&self) -> Option<(&Arc<Worker>, f64)> {
        let mut best: Option<(&Arc<Worker>, f64)> = None;
        for worker in &self.workers {
            let vitals = worker.vitals().await;
            if !vitals.is_alive() {
                continue;
            }
            if best.map_or(true, |(_, load)| vitals.load < load) {
                best = Some((worker, vitals.load));
            }
        }
        best
    }

    pub async fn repair(&self, worker_id: &str, amount: f64) -> Result<f64, RepairError> {
        let worker = self
            .worker(worker_id)
            .ok_or_else(|| RepairError::UnknownWorker(worker_id.to_string()))?;
        worker.repair(amount).await
    }

    pub async fn status(&self) -> RegulatorStatus {
        let (aggregate_distress, alarm, temperament) = {
            let psyche = self.psyche.lock().await;
            (
                psyche.aggregate_distress,
                psyche.alarm,
                psyche.temperament.clone(),
            )
        };

        let mut workers = Vec::with_capacity(self.workers.len());
        for worker in &self.workers {
            workers.push(worker.status().await);
        }

        RegulatorStatus {
            aggregate_distress,
            alarm,
            temperament,
            workers,
        }
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    pub async fn snapshot(&self) -> Snapshot {
        let psyche = self.psyche.lock().await;
        Snapshot {
            traits: psyche.temperament.clone(),
            memory: psyche.memory.clone(),
            alarm: psyche.alarm,
        }
    }

    /// Wholesale replace of temperament, memory and alarm.
    pub async fn restore(&self, snapshot: Snapshot) {
        let mut psyche = self.psyche.lock().await;
        psyche.temperament = snapshot.traits;
        psyche.memory = snapshot.memory;
        psyche.alarm = snapshot.alarm;
    }

    pub async fn save_snapshot(&self, path: impl AsRef<Path>) -> Result<(), PersistenceError> {
        let snapshot = self.snapshot().await;
        snapshot.save(path.as_ref()).await?;
        tracing::info!("Psyche saved to {}", path.as_ref().display());
        Ok(())
    }

    /// Restore from `path` if a readable snapshot exists. Unreadable or
    /// corrupt snapshots count as no prior life. Returns whether anything
    /// was restored.
    pub async fn load_snapshot(&self, path: impl AsRef<Path>) -> bool {
        match Snapshot::load(path.as_ref()).await {
            Ok(Some(snapshot)) => {
                self.restore(snapshot).await;
                tracing::info!("Previous psyche restored from {}", path.as_ref().display());
                true
            }
            Ok(None) => {
                tracing::info!("No previous psyche, starting as a blank slate");
                false
            }
            Err(e) => {
                tracing::warn!("Ignoring unusable snapshot: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::Vitals;
    use algea_core::{VitalSigns, WorkerConfig};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn config(workers: usize) -> AlgeaConfig {
        let mut cfg = AlgeaConfig::default();
        cfg.pool.worker_count = workers;
        cfg.worker = WorkerConfig::testing();
        cfg.regulator.sensor_enabled = false;
        cfg
    }

    struct FakeScanner {
        target: Option<ProcessInfo>,
        fail_terminate: bool,
        terminated: StdMutex<Vec<u32>>,
    }

    impl FakeScanner {
        fn targeting(name: &str, pid: u32) -> Self {
            Self {
                target: Some(ProcessInfo {
                    name: name.to_string(),
                    pid,
                    load_percent: 97.0,
                }),
                fail_terminate: false,
                terminated: StdMutex::new(Vec::new()),
            }
        }

        fn terminated(&self) -> Vec<u32> {
            self.terminated.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ThreatScanner for FakeScanner {
        async fn find_top_consumer(&self) -> anyhow::Result<Option<ProcessInfo>> {
            Ok(self.target.clone())
        }

        async fn terminate(&self, target: &ProcessInfo) -> anyhow::Result<()> {
            if self.fail_terminate {
                anyhow::bail!("permission denied");
            }
            self.terminated.lock().unwrap().push(target.pid);
            Ok(())
        }
    }

    /// Scanner whose scan waits until the test opens the gate.
    #[derive(Default)]
    struct GatedScanner {
        gate: tokio::sync::Notify,
        scans: AtomicUsize,
    }

    #[async_trait]
    impl ThreatScanner for GatedScanner {
        async fn find_top_consumer(&self) -> anyhow::Result<Option<ProcessInfo>> {
            self.scans.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            Ok(Some(ProcessInfo {
                name: "miner".to_string(),
                pid: 4242,
                load_percent: 97.0,
            }))
        }

        async fn terminate(&self, _target: &ProcessInfo) -> anyhow::Result<()> {
            Ok(())
        }
    }

    async fn scan_finished(reg: &Regulator) {
        while reg.mitigating.load(Ordering::Acquire) {
            tokio::task::yield_now().await;
        }
    }

    struct FakeSensor(f64);

    #[async_trait]
    impl HardwareSensor for FakeSensor {
        async fn sample(&self) -> anyhow::Result<VitalSigns> {
            Ok(VitalSigns {
                cpu_percent: 0.0,
                ram_percent: 0.0,
                distress: self.0,
            })
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    #[tokio::test]
    async fn test_distress_clamped_at_ceiling() {
        let reg = Regulator::new(&config(3));
        reg.absorb_distress(90.0).await;
        reg.absorb_distress(90.0).await;
        let status = reg.status().await;
        assert_eq!(status.aggregate_distress, 100.0);
        assert!(status.alarm);
    }

    #[tokio::test]
    async fn test_garbage_distress_counts_as_zero() {
        let reg = Regulator::new(&config(1));
        reg.absorb_distress(-40.0).await;
        reg.absorb_distress(f64::NAN).await;
        assert_eq!(reg.status().await.aggregate_distress, 0.0);
    }

    #[tokio::test]
    async fn test_alarm_hysteresis() {
        let reg = Regulator::new(&config(1));
        reg.absorb_distress(90.0).await;
        assert!(reg.status().await.alarm);

        // 90 → 50 in 20 ticks: still alarmed at exactly 50
        for _ in 0..20 {
            reg.decay_tick().await;
        }
        let status = reg.status().await;
        assert!((status.aggregate_distress - 50.0).abs() < 1e-9);
        assert!(status.alarm);

        reg.decay_tick().await;
        assert!(!reg.status().await.alarm);

        for _ in 0..25 {
            reg.decay_tick().await;
        }
        assert_eq!(reg.status().await.aggregate_distress, 0.0);
    }

    #[tokio::test]
    async fn test_moderate_distress_does_not_alarm() {
        let reg = Regulator::new(&config(1));
        reg.absorb_distress(80.0).await;
        assert!(!reg.status().await.alarm);
        reg.absorb_distress(0.5).await;
        assert!(reg.status().await.alarm);
    }

    #[tokio::test]
    async fn test_dispatch_under_alarm_never_enqueues() {
        let reg = Regulator::new(&config(3));
        reg.absorb_distress(85.0).await;

        let outcome = reg.dispatch("anything", 0.1).await;
        assert_eq!(outcome, DispatchOutcome::Rejected(RejectReason::Alarm));
        assert!(reg.workers().iter().all(|w| w.pending() == 0));
        assert!(reg.snapshot().await.memory.is_empty());
    }

    #[tokio::test]
    async fn test_distrust_gate() {
        let reg = Regulator::new(&config(3));
        // Trust 0.5 - 0.6 × 0.9 → 0, preservation → 1.0, aggregate 60 (no alarm)
        reg.absorb_distress(60.0).await;
        assert!(!reg.status().await.alarm);

        match reg.dispatch("task", 0.5).await {
            DispatchOutcome::Rejected(RejectReason::Distrust { trust }) => assert_eq!(trust, 0.0),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fear_gate() {
        let reg = Regulator::new(&config(3));
        let mut snapshot = Snapshot::default();
        snapshot.memory.consolidate("mine_crypto", 90.0);
        snapshot.memory.consolidate("compile", 55.0);
        reg.restore(snapshot).await;

        assert!(matches!(
            reg.dispatch("mine_crypto", 0.8).await,
            DispatchOutcome::Rejected(RejectReason::SelfPreservation { .. })
        ));
        // Below the fear threshold
        assert!(reg.dispatch("compile", 0.8).await.is_accepted());
    }

    #[tokio::test]
    async fn test_accepted_task_is_remembered() {
        let reg = Regulator::new(&config(3));
        let outcome = reg.dispatch("render", 0.8).await;
        assert_eq!(
            outcome,
            DispatchOutcome::Accepted {
                worker_id: "N-1".to_string(),
                load: 0.0
            }
        );
        let snapshot = reg.snapshot().await;
        let record = snapshot.memory.get("render").unwrap();
        assert!((record.distress_level - 4.0).abs() < 1e-9);
        assert!(!record.is_traumatic);
        assert_eq!(reg.workers()[0].pending(), 1);
    }

    #[tokio::test]
    async fn test_routes_to_least_loaded() {
        let reg = Regulator::new(&config(3));
        reg.workers()[0]
            .set_vitals(Vitals { load: 20.0, ..Vitals::default() })
            .await;
        reg.workers()[1]
            .set_vitals(Vitals { load: 5.0, ..Vitals::default() })
            .await;
        reg.workers()[2]
            .set_vitals(Vitals { load: 5.0, ..Vitals::default() })
            .await;

        match reg.dispatch("t", 0.3).await {
            // Tie between N-2 and N-3 goes to the first registered
            DispatchOutcome::Accepted { worker_id, load } => {
                assert_eq!(worker_id, "N-2");
                assert_eq!(load, 5.0);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_full_inbox_is_backpressure() {
        let reg = Regulator::new(&config(2));
        // Nobody consumes, so N-1 stays least loaded until its inbox is full
        for i in 0..10 {
            assert!(reg.dispatch(&format!("t{}", i), 0.1).await.is_accepted());
        }
        assert_eq!(
            reg.dispatch("overflow", 0.1).await,
            DispatchOutcome::Backpressure {
                worker_id: "N-1".to_string()
            }
        );
        assert!(reg.snapshot().await.memory.get("overflow").is_none());
        assert_eq!(reg.workers()[1].pending(), 0);
    }

    #[tokio::test]
    async fn test_dead_pool_has_no_capacity() {
        let reg = Regulator::new(&config(2));
        for w in reg.workers() {
            w.set_vitals(Vitals { integrity: 0.0, dead: true, ..Vitals::default() })
                .await;
        }
        assert_eq!(reg.dispatch("t", 0.5).await, DispatchOutcome::NoCapacity);
        assert_eq!(reg.status().await.live_workers(), 0);
    }

    #[tokio::test]
    async fn test_soothe() {
        let reg = Regulator::new(&config(1));
        let shift = reg.soothe().await.unwrap();
        assert_eq!(shift.before, 0.5);
        assert!((shift.after - 0.65).abs() < 1e-9);

        reg.absorb_distress(95.0).await;
        assert_eq!(reg.soothe().await.unwrap_err(), SootheError::Alarm);
    }

    #[tokio::test]
    async fn test_repair_by_id() {
        let reg = Regulator::new(&config(2));
        reg.workers()[1]
            .set_vitals(Vitals { integrity: 30.0, load: 44.0, ..Vitals::default() })
            .await;
        // Ids are matched case-insensitively
        assert_eq!(reg.repair("n-2", 50.0).await.unwrap(), 80.0);
        assert!(matches!(
            reg.repair("N-9", 50.0).await,
            Err(RepairError::UnknownWorker(_))
        ));
    }

    #[tokio::test]
    async fn test_critical_is_judged_after_clamping() {
        let reg = Regulator::new(&config(1));
        assert!(!reg.absorb_distress(95.0).await);
        assert!(reg.absorb_distress(10.0).await);
        assert_eq!(reg.status().await.aggregate_distress, 100.0);
    }

    #[tokio::test]
    async fn test_critical_distress_triggers_mitigation() {
        let mut cfg = config(1);
        cfg.regulator.mitigation_enabled = true;
        let scanner = Arc::new(FakeScanner::targeting("miner", 4242));
        let reg = Arc::new(Regulator::new(&cfg).with_scanner(scanner.clone()));

        assert!(reg.absorb_distress(100.0).await);
        assert!(reg.spawn_mitigation());
        scan_finished(&reg).await;

        assert_eq!(scanner.terminated(), vec![4242]);
        // 100 - 30 relief
        assert!((reg.status().await.aggregate_distress - 70.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_mitigation_never_targets_self() {
        let mut cfg = config(1);
        cfg.regulator.mitigation_enabled = true;

        let by_pid = Arc::new(FakeScanner::targeting("innocent", std::process::id()));
        let reg = Regulator::new(&cfg).with_scanner(by_pid.clone());
        reg.absorb_distress(100.0).await;
        assert!(!reg.mitigate().await);
        assert!(by_pid.terminated().is_empty());
        assert_eq!(reg.status().await.aggregate_distress, 100.0);

        let by_name = Arc::new(FakeScanner::targeting("ALGEA", 1));
        let reg = Regulator::new(&cfg).with_scanner(by_name.clone());
        assert!(!reg.mitigate().await);
        assert!(by_name.terminated().is_empty());
    }

    #[tokio::test]
    async fn test_failed_mitigation_keeps_distress() {
        let mut cfg = config(1);
        cfg.regulator.mitigation_enabled = true;
        let mut scanner = FakeScanner::targeting("miner", 4242);
        scanner.fail_terminate = true;
        let reg = Regulator::new(&cfg).with_scanner(Arc::new(scanner));

        reg.absorb_distress(100.0).await;
        assert!(!reg.mitigate().await);
        assert_eq!(reg.status().await.aggregate_distress, 100.0);
    }

    #[tokio::test]
    async fn test_mitigation_disabled_by_default() {
        let scanner = Arc::new(FakeScanner::targeting("miner", 4242));
        let reg = Arc::new(Regulator::new(&config(1)).with_scanner(scanner.clone()));
        assert!(reg.absorb_distress(100.0).await);
        assert!(!reg.spawn_mitigation());
        tokio::task::yield_now().await;
        assert!(scanner.terminated().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_listener_keeps_draining_during_scan() {
        let mut cfg = config(1);
        cfg.regulator.mitigation_enabled = true;
        let scanner = Arc::new(GatedScanner::default());
        let reg = Arc::new(Regulator::new(&cfg).with_scanner(scanner.clone()));
        reg.start();

        reg.distress_tx.try_send(100.0).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(scanner.scans.load(Ordering::SeqCst), 1);

        // Every one of these is critical, none starts a second scan
        for _ in 0..20 {
            reg.distress_tx.try_send(100.0).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(reg.distress_tx.capacity(), reg.distress_tx.max_capacity());
        assert_eq!(scanner.scans.load(Ordering::SeqCst), 1);

        scanner.gate.notify_one();
        scan_finished(&reg).await;
        assert!((reg.status().await.aggregate_distress - 70.0).abs() < 1e-9);

        reg.shutdown().await;
    }

    #[tokio::test]
    async fn test_sensor_reading_goes_through_distress_channel() {
        let reg = Regulator::new(&config(1)).with_sensor(Arc::new(FakeSensor(12.0)));
        assert_eq!(reg.sense_once().await, Some(12.0));

        let mut rx = reg.distress_rx.lock().unwrap().take().unwrap();
        assert_eq!(rx.try_recv().unwrap(), 12.0);

        let quiet = Regulator::new(&config(1)).with_sensor(Arc::new(FakeSensor(5.0)));
        assert_eq!(quiet.sense_once().await, None);
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("psyche.json");

        let reg = Regulator::new(&config(2));
        reg.absorb_distress(85.0).await;
        reg.dispatch("ignored", 0.5).await;
        let mut snap = reg.snapshot().await;
        snap.memory.consolidate("render", 4.0);
        reg.restore(snap).await;
        reg.save_snapshot(&path).await.unwrap();

        let fresh = Regulator::new(&config(2));
        assert!(fresh.load_snapshot(&path).await);
        assert_eq!(fresh.snapshot().await, reg.snapshot().await);
        assert!(fresh.status().await.alarm);
    }

    #[tokio::test]
    async fn test_unusable_snapshot_is_blank_slate() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("psyche.json");
        let reg = Regulator::new(&config(1));
        assert!(!reg.load_snapshot(&path).await);

        tokio::fs::write(&path, b"garbage").await.unwrap();
        assert!(!reg.load_snapshot(&path).await);
        assert_eq!(reg.snapshot().await, Snapshot::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_loops_run_and_stop() {
        let mut cfg = config(2);
        cfg.regulator.sensor_enabled = true;
        let reg = Arc::new(Regulator::new(&cfg).with_sensor(Arc::new(FakeSensor(45.0))));
        reg.start();

        // Two sensor readings (t = 2s, 4s) push aggregate past the alarm line
        tokio::time::sleep(Duration::from_millis(4500)).await;
        let status = reg.status().await;
        assert!(status.alarm, "aggregate {}", status.aggregate_distress);

        reg.shutdown().await;
        let frozen = reg.status().await.aggregate_distress;
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(reg.status().await.aggregate_distress, frozen);
    }
}
