//! Plugin version tokens.
//!
//! Versions are opaque timestamp-like strings ("20260201_000000"). The
//! total order: well-formed tokens compare by their integer value after
//! separators are stripped; two malformed tokens fall back to lexicographic
//! comparison; a malformed token is always older than any well-formed one.
//! Comparison never fails on garbage input.

use std::cmp::Ordering;

/// An opaque, comparable version token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionToken {
    raw: String,
    numeric: Option<u128>,
}

impl VersionToken {
    pub fn new(raw: &str) -> Self {
        Self {
            raw: raw.trim().to_string(),
            numeric: parse_numeric(raw.trim()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether the token follows the numeric timestamp scheme.
    pub fn is_well_formed(&self) -> bool {
        self.numeric.is_some()
    }
}

/// Digits with `_`, `-`, `.` separators; anything else is malformed.
fn parse_numeric(raw: &str) -> Option<u128> {
    if raw.is_empty() {
        return None;
    }
    let mut digits = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '0'..='9' => digits.push(c),
            '_' | '-' | '.' => {}
            _ => return None,
        }
    }
    digits.parse().ok()
}

impl Ord for VersionToken {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric, other.numeric) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.raw.cmp(&other.raw)),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => self.raw.cmp(&other.raw),
        }
    }
}

impl PartialOrd for VersionToken {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for VersionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// `remote` is strictly newer than `local`.
pub fn is_newer(remote: &str, local: &str) -> bool {
    VersionToken::new(remote) > VersionToken::new(local)
}
