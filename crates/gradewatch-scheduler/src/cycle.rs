//! Poll cycle contract — what the scheduler runs, without knowing how.
//!
//! The scheduler owns timing, retries, and lifecycle; the cycle owns the
//! actual fetch and the downstream diff/dispatch/persist pipeline.

use async_trait::async_trait;
use tokio::sync::watch;

use gradewatch_core::error::Result;
use gradewatch_core::types::{Record, SnapshotKind};

/// One polling target: a single kind of data for a single account.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetId {
    /// "school_code:username".
    pub account_key: String,
    pub kind: SnapshotKind,
}

impl TargetId {
    pub fn new(account_key: &str, kind: SnapshotKind) -> Self {
        Self {
            account_key: account_key.to_string(),
            kind,
        }
    }
}

impl std::fmt::Display for TargetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.account_key, self.kind)
    }
}

/// Where a target's loop currently is. `Idle` covers the inter-cycle
/// wait; `Cancelled` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    Fetching,
    Backoff,
    Diffing,
    Dispatching,
    Cancelled,
}

/// Lets a running cycle publish its phase transitions without knowing
/// anything else about the loop that hosts it.
#[derive(Clone)]
pub struct PhaseReporter(watch::Sender<CyclePhase>);

impl PhaseReporter {
    pub fn new(tx: watch::Sender<CyclePhase>) -> Self {
        Self(tx)
    }

    /// A reporter nobody listens to, for cycles run outside a loop.
    pub fn detached() -> Self {
        let (tx, _rx) = watch::channel(CyclePhase::Idle);
        Self(tx)
    }

    pub fn set(&self, phase: CyclePhase) {
        let _ = self.0.send(phase);
    }
}

/// What one completed cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Detected change events (zero on a quiet cycle and on first run).
    pub events: usize,
    /// Channels that accepted the notification.
    pub delivered: usize,
    /// Channels that failed or timed out.
    pub failed: usize,
    pub snapshot_saved: bool,
}

/// One fetch→process pass for a target.
///
/// `fetch` returning `Err` means the upstream could not be read and the
/// scheduler may retry; `Ok(vec![])` is a confirmed-empty result and flows
/// into `process` like any other data. `process` errors are not retried —
/// the next scheduled cycle re-derives everything from fresh data.
#[async_trait]
pub trait PollCycle: Send + Sync + 'static {
    fn target(&self) -> TargetId;

    async fn fetch(&self, force_update: bool) -> Result<Vec<Record>>;

    /// Diff against the stored snapshot, dispatch, and persist, marking
    /// `Diffing`/`Dispatching` on the reporter as it goes.
    async fn process(&self, records: Vec<Record>, phase: &PhaseReporter) -> Result<CycleReport>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_display_and_hash() {
        let a = TargetId::new("10546:student1", SnapshotKind::Grades);
        let b = TargetId::new("10546:student1", SnapshotKind::Schedule);
        assert_eq!(a.to_string(), "10546:student1/grades");
        assert_ne!(a, b);

        let mut set = std::collections::HashSet::new();
        set.insert(a.clone());
        assert!(set.contains(&a));
        assert!(!set.contains(&b));
    }
}
