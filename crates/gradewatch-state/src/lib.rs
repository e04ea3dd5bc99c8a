//! # Gradewatch State
//!
//! Persists the last-observed snapshot per (account, kind) for diffing
//! across cycles. JSON files — human-readable, git-friendly.

mod store;

pub use store::StateStore;
