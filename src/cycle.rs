//! The concrete poll cycle: adapter fetch → diff → notify → persist.
//!
//! Ordering matters at the tail: the new snapshot is saved only after
//! dispatch has been attempted, so a crash between diff and save re-diffs
//! against the old baseline rather than silently dropping a change.

use std::sync::Arc;

use async_trait::async_trait;

use gradewatch_channels::NotificationDispatcher;
use gradewatch_core::error::Result;
use gradewatch_core::traits::SchoolAdapter;
use gradewatch_core::types::{Record, Snapshot, SnapshotKind};
use gradewatch_scheduler::{CyclePhase, CycleReport, PhaseReporter, PollCycle, TargetId};
use gradewatch_state::StateStore;

pub struct AccountCycle {
    target: TargetId,
    adapter: Arc<dyn SchoolAdapter>,
    username: String,
    password: String,
    store: Arc<StateStore>,
    dispatcher: Arc<NotificationDispatcher>,
}

impl AccountCycle {
    pub fn new(
        target: TargetId,
        adapter: Arc<dyn SchoolAdapter>,
        username: &str,
        password: &str,
        store: Arc<StateStore>,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            target,
            adapter,
            username: username.to_string(),
            password: password.to_string(),
            store,
            dispatcher,
        }
    }
}

#[async_trait]
impl PollCycle for AccountCycle {
    fn target(&self) -> TargetId {
        self.target.clone()
    }

    async fn fetch(&self, force_update: bool) -> Result<Vec<Record>> {
        match self.target.kind {
            SnapshotKind::Grades => Ok(self
                .adapter
                .fetch_grades(&self.username, &self.password, force_update)
                .await?
                .into_iter()
                .map(Record::Grade)
                .collect()),
            SnapshotKind::Schedule => Ok(self
                .adapter
                .fetch_schedule(&self.username, &self.password, force_update)
                .await?
                .into_iter()
                .map(Record::Schedule)
                .collect()),
        }
    }

    async fn process(&self, records: Vec<Record>, phase: &PhaseReporter) -> Result<CycleReport> {
        let account_key = &self.target.account_key;
        let kind = self.target.kind;

        phase.set(CyclePhase::Diffing);
        let previous = self.store.load(account_key, kind);
        let first_run = previous.is_none();
        let current = Snapshot::new(kind, account_key, records);
        let events = gradewatch_detect::diff(previous.as_ref(), &current);

        let mut report = CycleReport {
            events: events.len(),
            ..Default::default()
        };

        if first_run {
            tracing::info!(
                "💾 {}: first run, baseline of {} records stored silently",
                self.target,
                current.records.len()
            );
        } else if !events.is_empty() {
            let (subject, content) = gradewatch_detect::render(kind, account_key, &events);
            tracing::info!("📣 {}: {} changes detected", self.target, events.len());
            phase.set(CyclePhase::Dispatching);
            let results = self.dispatcher.dispatch(&subject, &content).await;
            report.delivered = results.values().filter(|ok| **ok).count();
            report.failed = results.len() - report.delivered;
        }

        // Persist after dispatch was attempted, never before
        self.store.save(&current)?;
        report.snapshot_saved = true;
        Ok(report)
    }
}
