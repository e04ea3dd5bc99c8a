//! # Gradewatch Detect
//!
//! Computes ordered, deterministic diffs between record snapshots and
//! renders detected changes into notification text.

mod diff;
mod render;

pub use diff::diff;
pub use render::render;
