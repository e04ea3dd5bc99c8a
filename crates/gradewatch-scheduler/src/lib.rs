//! # Gradewatch Scheduler
//!
//! Drives one independent polling loop per (account, kind) target. Each
//! loop is a single tokio task, so a target never runs two cycles at once
//! by construction: a cycle is fetch → diff → dispatch → persist, and the
//! next wait starts only after the previous cycle ends.
//!
//! Transient fetch failures retry with capped exponential backoff inside
//! the cycle; an exhausted cycle is reported once and the loop keeps its
//! regular cadence. A forced cycle on an idle target fires immediately;
//! forcing a target mid-cycle coalesces into the in-flight cycle instead
//! of queueing another.

pub mod backoff;
pub mod cycle;
pub mod engine;

pub use cycle::{CyclePhase, CycleReport, PhaseReporter, PollCycle, TargetId};
pub use engine::{PollingScheduler, SchedulerSettings};
