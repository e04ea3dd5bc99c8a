//! Error taxonomy shared across the workspace.
//!
//! Integrity and load errors abort only the affected install/resolve call.
//! Fetch and dispatch errors are absorbed at the scheduler/dispatcher
//! boundary as structured results — a bad cycle never kills the scheduler.

use thiserror::Error;

/// All errors produced by Gradewatch components.
#[derive(Error, Debug)]
pub enum GradewatchError {
    /// Plugin artifact digest did not match the descriptor. The install is
    /// never partially applied.
    #[error("integrity check failed for plugin '{code}': expected {expected}, got {actual}")]
    Integrity {
        code: String,
        expected: String,
        actual: String,
    },

    /// Unknown institution code, or adapter never installed.
    #[error("no adapter found for institution code '{0}'")]
    NotFound(String),

    /// Installed adapter does not expose the required capabilities.
    #[error("adapter load failed: {0}")]
    Load(String),

    /// Transient fetch failure (network, auth, upstream parse). Retried
    /// with backoff before being surfaced.
    #[error("fetch failed: {0}")]
    FetchFailed(String),

    /// A single channel failed to deliver. Isolated per channel, never
    /// fatal to the cycle.
    #[error("dispatch via '{channel}' failed: {reason}")]
    Dispatch { channel: String, reason: String },

    #[error("config error: {0}")]
    Config(String),

    #[error("plugin error: {0}")]
    Plugin(String),

    #[error("state store error: {0}")]
    State(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(String),
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, GradewatchError>;

impl From<serde_json::Error> for GradewatchError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serde(e.to_string())
    }
}

impl GradewatchError {
    /// Whether a retry with backoff is worthwhile.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::FetchFailed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_code() {
        let err = GradewatchError::Integrity {
            code: "10546".into(),
            expected: "aa".into(),
            actual: "bb".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("10546"));
        assert!(msg.contains("aa"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(GradewatchError::FetchFailed("timeout".into()).is_transient());
        assert!(!GradewatchError::NotFound("x".into()).is_transient());
    }
}
