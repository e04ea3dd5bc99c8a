//! Polling engine — one tokio task per target, supervised by handle.
//!
//! The per-target task is the concurrency guarantee: cycles for a target
//! run strictly one after another because only that task ever runs them.
//! The engine only hands signals into the task (force, shutdown) and reads
//! signals out (phase, completed-cycle counter).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;

use gradewatch_core::config::{PollingConfig, RetryConfig};
use gradewatch_core::error::{GradewatchError, Result};
use gradewatch_core::types::SnapshotKind;

use crate::backoff;
use crate::cycle::{CyclePhase, CycleReport, PhaseReporter, PollCycle, TargetId};

/// Timing and retry policy for one target's loop.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub interval: Duration,
    pub jitter: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    pub phase_timeout: Duration,
    pub force_update: bool,
}

impl SchedulerSettings {
    /// Settings for `kind`, taken from the operator config.
    pub fn from_config(polling: &PollingConfig, retry: &RetryConfig, kind: SnapshotKind) -> Self {
        let interval_secs = match kind {
            SnapshotKind::Grades => polling.grades_interval_secs,
            SnapshotKind::Schedule => polling.schedule_interval_secs,
        };
        Self {
            interval: Duration::from_secs(interval_secs),
            jitter: Duration::from_secs(polling.jitter_secs),
            max_retries: retry.max_retries,
            backoff_base: Duration::from_secs(retry.backoff_base_secs),
            backoff_cap: Duration::from_secs(retry.backoff_cap_secs),
            phase_timeout: Duration::from_secs(retry.phase_timeout_secs),
            force_update: polling.force_update,
        }
    }
}

struct TargetHandle {
    force: Arc<Notify>,
    completed: watch::Receiver<u64>,
    phase: watch::Receiver<CyclePhase>,
    last_error: watch::Receiver<Option<String>>,
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

/// Owns the per-target polling tasks.
#[derive(Default)]
pub struct PollingScheduler {
    targets: Mutex<HashMap<TargetId, TargetHandle>>,
}

impl PollingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a loop for the cycle's target. The first cycle runs
    /// immediately; each following wait is measured from cycle end.
    /// Restarting an already-running target replaces its loop.
    pub async fn start(&self, cycle: Arc<dyn PollCycle>, settings: SchedulerSettings) {
        let target = cycle.target();
        let force = Arc::new(Notify::new());
        let (completed_tx, completed_rx) = watch::channel(0u64);
        let (phase_tx, phase_rx) = watch::channel(CyclePhase::Idle);
        let (error_tx, error_rx) = watch::channel(None);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tracing::info!(
            "⏰ Polling started: {target} (every {}s ± {}s)",
            settings.interval.as_secs(),
            settings.jitter.as_secs()
        );
        let join = tokio::spawn(run_target(
            cycle,
            settings,
            Arc::clone(&force),
            completed_tx,
            phase_tx,
            error_tx,
            shutdown_rx,
        ));

        let handle = TargetHandle {
            force,
            completed: completed_rx,
            phase: phase_rx,
            last_error: error_rx,
            shutdown: shutdown_tx,
            join,
        };
        if let Some(old) = self.targets.lock().await.insert(target.clone(), handle) {
            tracing::warn!("⚠️ Replacing running loop for {target}");
            stop_handle(old).await;
        }
    }

    /// Run one cycle for a target ahead of schedule and wait for it.
    ///
    /// If a cycle is already in flight the call coalesces: it waits for
    /// that cycle instead of queueing another. Returns `NotFound` for an
    /// unknown target.
    pub async fn force_cycle(&self, target: &TargetId) -> Result<()> {
        let (force, mut completed, phase) = {
            let targets = self.targets.lock().await;
            let handle = targets
                .get(target)
                .ok_or_else(|| GradewatchError::NotFound(target.to_string()))?;
            (
                Arc::clone(&handle.force),
                handle.completed.clone(),
                handle.phase.clone(),
            )
        };
        // Only count completions from this point on
        completed.mark_unchanged();
        let in_flight = *phase.borrow() != CyclePhase::Idle;
        if in_flight {
            tracing::info!("⏳ {target}: cycle already in flight, joining it");
        } else {
            force.notify_one();
        }
        completed
            .changed()
            .await
            .map_err(|_| GradewatchError::State(format!("polling loop for {target} is gone")))
    }

    /// Current phase, `Cancelled` for unknown targets.
    pub async fn phase(&self, target: &TargetId) -> CyclePhase {
        match self.targets.lock().await.get(target) {
            Some(handle) => *handle.phase.borrow(),
            None => CyclePhase::Cancelled,
        }
    }

    /// Most recent cycle outcome: `None` after a clean cycle, the error
    /// text after a cycle that gave up (exhausted retries, phase timeout,
    /// or processing failure). Cleared by the next clean cycle.
    pub async fn last_error(&self, target: &TargetId) -> Option<String> {
        match self.targets.lock().await.get(target) {
            Some(handle) => handle.last_error.borrow().clone(),
            None => None,
        }
    }

    /// Completed-cycle count for a target.
    pub async fn cycles_completed(&self, target: &TargetId) -> u64 {
        match self.targets.lock().await.get(target) {
            Some(handle) => *handle.completed.borrow(),
            None => 0,
        }
    }

    pub async fn target_count(&self) -> usize {
        self.targets.lock().await.len()
    }

    /// Stop one target's loop. A cycle in flight finishes first.
    pub async fn stop(&self, target: &TargetId) -> bool {
        let handle = self.targets.lock().await.remove(target);
        match handle {
            Some(handle) => {
                tracing::info!("🛑 Polling stopped: {target}");
                stop_handle(handle).await;
                true
            }
            None => false,
        }
    }

    /// Stop everything; returns once all loops have wound down.
    pub async fn shutdown(&self) {
        let handles: Vec<(TargetId, TargetHandle)> =
            self.targets.lock().await.drain().collect();
        if handles.is_empty() {
            return;
        }
        tracing::info!("🛑 Scheduler shutdown: stopping {} targets", handles.len());
        for (_, handle) in handles {
            stop_handle(handle).await;
        }
    }
}

async fn stop_handle(handle: TargetHandle) {
    let _ = handle.shutdown.send(true);
    handle.force.notify_one();
    if handle.join.await.is_err() {
        tracing::warn!("⚠️ Polling task panicked during shutdown");
    }
}

async fn run_target(
    cycle: Arc<dyn PollCycle>,
    settings: SchedulerSettings,
    force: Arc<Notify>,
    completed: watch::Sender<u64>,
    phase: watch::Sender<CyclePhase>,
    last_error: watch::Sender<Option<String>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let target = cycle.target();
    loop {
        if *shutdown.borrow() {
            break;
        }

        match run_once(&*cycle, &settings, &phase, &mut shutdown).await {
            Ok(report) => {
                if report.events > 0 {
                    tracing::info!(
                        "📊 {target}: {} changes, {} delivered, {} failed",
                        report.events,
                        report.delivered,
                        report.failed
                    );
                } else {
                    tracing::debug!("{target}: no changes");
                }
                let _ = last_error.send(None);
            }
            Err(e) => {
                let _ = last_error.send(Some(e.to_string()));
            }
        }
        let _ = phase.send(CyclePhase::Idle);
        completed.send_modify(|n| *n += 1);

        if *shutdown.borrow() {
            break;
        }
        let wait = backoff::jittered(settings.interval, settings.jitter);
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = force.notified() => {
                tracing::info!("🔔 {target}: forced cycle");
            }
            _ = shutdown.changed() => {}
        }
    }
    let _ = phase.send(CyclePhase::Cancelled);
    tracing::debug!("{target}: loop ended");
}

/// One cycle: fetch (with retries), then process. An `Err` is the cycle
/// giving up — exhausted retries, a phase timeout, a process error, or
/// shutdown mid-backoff — reported once per cycle. The loop's cadence is
/// unaffected either way.
async fn run_once(
    cycle: &dyn PollCycle,
    settings: &SchedulerSettings,
    phase: &watch::Sender<CyclePhase>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<CycleReport> {
    let target = cycle.target();

    let mut attempt = 0u32;
    let records = loop {
        let _ = phase.send(CyclePhase::Fetching);
        let result = match tokio::time::timeout(
            settings.phase_timeout,
            cycle.fetch(settings.force_update),
        )
        .await
        {
            Ok(r) => r,
            Err(_) => Err(GradewatchError::FetchFailed(format!(
                "{target}: fetch exceeded {}s",
                settings.phase_timeout.as_secs()
            ))),
        };

        match result {
            Ok(records) => break records,
            Err(e) if e.is_transient() && attempt < settings.max_retries => {
                attempt += 1;
                let delay =
                    backoff::delay_for_attempt(attempt, settings.backoff_base, settings.backoff_cap);
                tracing::warn!(
                    "⚠️ {target}: fetch attempt {attempt}/{} failed ({e}), retrying in {}s",
                    settings.max_retries,
                    delay.as_secs()
                );
                let _ = phase.send(CyclePhase::Backoff);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.changed() => return Err(e),
                }
            }
            Err(e) => {
                tracing::error!("❌ {target}: fetch failed, keeping last snapshot: {e}");
                return Err(e);
            }
        }
    };

    let _ = phase.send(CyclePhase::Diffing);
    let reporter = PhaseReporter::new(phase.clone());
    match tokio::time::timeout(settings.phase_timeout, cycle.process(records, &reporter)).await {
        Ok(Ok(report)) => Ok(report),
        Ok(Err(e)) => {
            tracing::error!("❌ {target}: cycle processing failed: {e}");
            Err(e)
        }
        Err(_) => {
            tracing::error!(
                "❌ {target}: processing exceeded {}s",
                settings.phase_timeout.as_secs()
            );
            Err(GradewatchError::State(format!(
                "{target}: processing exceeded {}s",
                settings.phase_timeout.as_secs()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gradewatch_core::types::Record;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockCycle {
        target: TargetId,
        fetches: Arc<AtomicUsize>,
        fail_first: usize,
        fetch_delay: Duration,
    }

    impl MockCycle {
        fn new(fail_first: usize, fetch_delay: Duration) -> (Arc<Self>, Arc<AtomicUsize>) {
            let fetches = Arc::new(AtomicUsize::new(0));
            let cycle = Arc::new(Self {
                target: TargetId::new("10546:student1", SnapshotKind::Grades),
                fetches: Arc::clone(&fetches),
                fail_first,
                fetch_delay,
            });
            (cycle, fetches)
        }
    }

    #[async_trait]
    impl PollCycle for MockCycle {
        fn target(&self) -> TargetId {
            self.target.clone()
        }

        async fn fetch(&self, _force_update: bool) -> Result<Vec<Record>> {
            let n = self.fetches.fetch_add(1, Ordering::SeqCst);
            if !self.fetch_delay.is_zero() {
                tokio::time::sleep(self.fetch_delay).await;
            }
            if n < self.fail_first {
                Err(GradewatchError::FetchFailed("upstream down".into()))
            } else {
                Ok(Vec::new())
            }
        }

        async fn process(
            &self,
            _records: Vec<Record>,
            _phase: &PhaseReporter,
        ) -> Result<CycleReport> {
            Ok(CycleReport::default())
        }
    }

    fn settings(interval_secs: u64) -> SchedulerSettings {
        SchedulerSettings {
            interval: Duration::from_secs(interval_secs),
            jitter: Duration::ZERO,
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(10),
            phase_timeout: Duration::from_secs(1000),
            force_update: false,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_cycle_runs_immediately() {
        let scheduler = PollingScheduler::new();
        let (cycle, fetches) = MockCycle::new(0, Duration::ZERO);
        let target = cycle.target();
        scheduler.start(cycle, settings(3600)).await;

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.cycles_completed(&target).await, 1);
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_retry_with_backoff() {
        let scheduler = PollingScheduler::new();
        let (cycle, fetches) = MockCycle::new(2, Duration::ZERO);
        let target = cycle.target();
        scheduler.start(cycle, settings(100)).await;

        // t=0 fail, +1s fail, +2s success
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fetches.load(Ordering::SeqCst), 3);
        assert_eq!(scheduler.cycles_completed(&target).await, 1);

        // Regular cadence resumes from cycle end
        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(fetches.load(Ordering::SeqCst), 4);
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_keep_the_loop_alive() {
        let scheduler = PollingScheduler::new();
        let (cycle, fetches) = MockCycle::new(100, Duration::ZERO);
        let target = cycle.target();
        scheduler.start(cycle, settings(50)).await;

        // Cycle 1: 4 attempts (1 + 3 retries) over 1+2+4 = 7s of backoff
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fetches.load(Ordering::SeqCst), 4);
        assert_eq!(scheduler.cycles_completed(&target).await, 1);

        // Cycle 2 still happens on schedule
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(fetches.load(Ordering::SeqCst), 8);
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_fetch_failure_is_observable() {
        let scheduler = PollingScheduler::new();
        let (cycle, _fetches) = MockCycle::new(4, Duration::ZERO);
        let target = cycle.target();
        scheduler.start(cycle, settings(50)).await;

        // Cycle 1 exhausts its 4 attempts and surfaces the error once
        tokio::time::sleep(Duration::from_secs(10)).await;
        let err = scheduler.last_error(&target).await.unwrap();
        assert!(err.contains("upstream down"));

        // Cycle 2 succeeds and clears it
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(scheduler.last_error(&target).await.is_none());
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_during_cycle_coalesces() {
        let scheduler = Arc::new(PollingScheduler::new());
        let (cycle, fetches) = MockCycle::new(0, Duration::from_secs(50));
        let target = cycle.target();
        scheduler.start(cycle, settings(100_000)).await;

        // Let the first (slow) fetch get in flight
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(fetches.load(Ordering::SeqCst), 1);

        let forced = {
            let scheduler = Arc::clone(&scheduler);
            let target = target.clone();
            tokio::spawn(async move { scheduler.force_cycle(&target).await })
        };
        tokio::time::sleep(Duration::from_secs(60)).await;
        forced.await.unwrap().unwrap();

        // The force joined the in-flight cycle instead of adding one
        assert_eq!(fetches.load(Ordering::SeqCst), 1);

        // Forcing while idle runs exactly one extra cycle
        scheduler.force_cycle(&target).await.unwrap();
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_prevents_further_cycles() {
        let scheduler = PollingScheduler::new();
        let (cycle, fetches) = MockCycle::new(0, Duration::ZERO);
        let target = cycle.target();
        scheduler.start(cycle, settings(10)).await;

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(fetches.load(Ordering::SeqCst), 1);

        assert!(scheduler.stop(&target).await);
        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.phase(&target).await, CyclePhase::Cancelled);
        assert_eq!(scheduler.target_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_unknown_target_is_not_found() {
        let scheduler = PollingScheduler::new();
        let missing = TargetId::new("nobody:nowhere", SnapshotKind::Schedule);
        let err = scheduler.force_cycle(&missing).await.unwrap_err();
        assert!(matches!(err, GradewatchError::NotFound(_)));
    }
}
