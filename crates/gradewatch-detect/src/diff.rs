//! Structural snapshot diff.
//!
//! Identity-keyed comparison producing a deterministic change sequence:
//! added, then removed, then modified, each group in identity sort order.
//! Identical inputs always produce identical output.

use std::collections::BTreeMap;

use gradewatch_core::types::{ChangeEvent, ChangeKind, Record, RecordIdentity, Snapshot};

/// Diff `current` against `previous`.
///
/// A `None` previous is the first-ever observation: no events are emitted
/// (no notification storm on first run); the caller still persists the
/// snapshot.
pub fn diff(previous: Option<&Snapshot>, current: &Snapshot) -> Vec<ChangeEvent> {
    let Some(previous) = previous else {
        tracing::debug!(
            "First observation for {} {}; baseline only",
            current.account_key,
            current.kind
        );
        return Vec::new();
    };

    let before = index(&previous.records);
    let after = index(&current.records);

    let mut added = Vec::new();
    let mut removed = Vec::new();
    let mut modified = Vec::new();

    // BTreeMap iteration gives identity sort order within each group.
    for (id, rec) in &after {
        if !before.contains_key(id) {
            added.push(ChangeEvent {
                kind: ChangeKind::Added,
                identity: id.clone(),
                before: None,
                after: Some((*rec).clone()),
            });
        }
    }
    for (id, rec) in &before {
        if !after.contains_key(id) {
            removed.push(ChangeEvent {
                kind: ChangeKind::Removed,
                identity: id.clone(),
                before: Some((*rec).clone()),
                after: None,
            });
        }
    }
    for (id, new) in &after {
        if let Some(old) = before.get(id) {
            if old.normalized() != new.normalized() {
                modified.push(ChangeEvent {
                    kind: ChangeKind::Modified,
                    identity: id.clone(),
                    before: Some((*old).clone()),
                    after: Some((*new).clone()),
                });
            }
        }
    }

    let mut events = added;
    events.append(&mut removed);
    events.append(&mut modified);
    events
}

fn index(records: &[Record]) -> BTreeMap<RecordIdentity, &Record> {
    let mut map = BTreeMap::new();
    for rec in records {
        // Identity keys are unique within one snapshot; a duplicate would
        // mean the adapter emitted the same record twice — keep the last.
        map.insert(rec.identity(), rec);
    }
    map
}
