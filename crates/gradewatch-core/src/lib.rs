//! # Gradewatch Core
//!
//! Shared foundation for the Gradewatch workspace: record types, the
//! adapter/channel capability traits, configuration, and the error taxonomy.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::GradewatchConfig;
pub use error::{GradewatchError, Result};
pub use traits::{NotificationChannel, SchoolAdapter};
pub use types::{
    ChangeEvent, ChangeKind, GradeRecord, Record, RecordIdentity, ScheduleEntry, Snapshot,
    SnapshotKind, WeekSet,
};
