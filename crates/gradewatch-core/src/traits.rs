//! Capability traits at the system seams.
//!
//! Adapters and channels are explicit interface types checked at
//! registration time — no duck typing, no ambient lookup.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{GradeRecord, ScheduleEntry};

/// Fetches grade and schedule data for one institution.
///
/// `Err(FetchFailed)` means the backend could not be read (credentials,
/// network, upstream parse). `Ok(vec![])` means the backend was reachable
/// and confirmed there are no records. The two must never be conflated:
/// treating a failed fetch as "zero records" would make the next diff
/// report everything as removed.
#[async_trait]
pub trait SchoolAdapter: Send + Sync {
    /// Stable institution code this adapter serves (e.g. "10546").
    fn school_code(&self) -> &str;

    /// Human-readable institution name.
    fn school_name(&self) -> &str;

    async fn fetch_grades(
        &self,
        username: &str,
        password: &str,
        force_update: bool,
    ) -> Result<Vec<GradeRecord>>;

    async fn fetch_schedule(
        &self,
        username: &str,
        password: &str,
        force_update: bool,
    ) -> Result<Vec<ScheduleEntry>>;
}

/// One notification delivery transport.
///
/// `Ok(())` counts as delivered; any `Err` is recorded as a failure for
/// this channel only and never propagates out of the dispatcher.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Unique channel name (e.g. "email", "feishu").
    fn name(&self) -> &str;

    async fn send(&self, subject: &str, content: &str) -> Result<()>;
}
