//! File-based snapshot store.
//!
//! One file per (account_key, kind), replaced atomically via
//! write-temp-then-rename so a crash mid-write never leaves a truncated
//! snapshot visible to the next read. Saves happen only after dispatch has
//! been attempted; a crash before save re-diffs against the old baseline.

use std::path::{Path, PathBuf};

use gradewatch_core::error::{GradewatchError, Result};
use gradewatch_core::types::{Snapshot, SnapshotKind};

/// Snapshot store rooted at one directory.
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    /// Create a store at the given directory, creating it if needed.
    pub fn new(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// Default store path (~/.gradewatch/state).
    pub fn default_path() -> PathBuf {
        gradewatch_core::config::GradewatchConfig::home_dir().join("state")
    }

    fn file_for(&self, account_key: &str, kind: SnapshotKind) -> PathBuf {
        // Account keys contain "school:user"; percent-encode everything
        // outside [A-Za-z0-9_-]. '%' itself is always encoded, so the
        // mapping is injective and distinct keys never share a file.
        let safe: String = account_key
            .bytes()
            .map(|b| match b {
                b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_' | b'-' => {
                    (b as char).to_string()
                }
                _ => format!("%{b:02X}"),
            })
            .collect();
        self.dir.join(format!("{safe}.{kind}.json"))
    }

    /// Load the current snapshot, or `None` on first run.
    ///
    /// A corrupt or unreadable file is logged and treated as first run —
    /// the next save overwrites it.
    pub fn load(&self, account_key: &str, kind: SnapshotKind) -> Option<Snapshot> {
        let file = self.file_for(account_key, kind);
        if !file.exists() {
            return None;
        }
        match std::fs::read_to_string(&file) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    tracing::warn!("⚠️ Corrupt snapshot {}: {e}", file.display());
                    None
                }
            },
            Err(e) => {
                tracing::warn!("⚠️ Failed to read snapshot {}: {e}", file.display());
                None
            }
        }
    }

    /// Atomically replace the current snapshot.
    pub fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let file = self.file_for(&snapshot.account_key, snapshot.kind);
        let tmp = file.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(snapshot)
            .map_err(|e| GradewatchError::State(format!("Serialize snapshot: {e}")))?;
        std::fs::write(&tmp, &json)
            .map_err(|e| GradewatchError::State(format!("Write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &file)
            .map_err(|e| GradewatchError::State(format!("Rename {}: {e}", file.display())))?;
        tracing::debug!(
            "💾 Saved {} snapshot for {} ({} records)",
            snapshot.kind,
            snapshot.account_key,
            snapshot.records.len()
        );
        Ok(())
    }

    /// Remove the stored snapshot, if any.
    pub fn clear(&self, account_key: &str, kind: SnapshotKind) -> Result<()> {
        let file = self.file_for(account_key, kind);
        if file.exists() {
            std::fs::remove_file(&file)?;
        }
        Ok(())
    }
}
