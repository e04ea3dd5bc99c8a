//! Record types — the data model for snapshots and detected changes.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which kind of data a snapshot or polling target covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    Grades,
    Schedule,
}

impl std::fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Grades => write!(f, "grades"),
            Self::Schedule => write!(f, "schedule"),
        }
    }
}

/// One graded course as reported by an institution backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeRecord {
    pub term: String,
    pub course_name: String,
    pub score: String,
    pub credit: String,
    pub course_category: String,
    /// Not every backend exposes a course code; identity falls back to the
    /// course name when absent.
    #[serde(default)]
    pub course_code: Option<String>,
}

/// One timetable slot as reported by an institution backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    /// 1 = Monday .. 7 = Sunday.
    pub weekday: u8,
    pub start_period: u8,
    pub end_period: u8,
    pub course_name: String,
    pub room: String,
    pub teacher: String,
    pub weeks: WeekSet,
}

/// The set of semester weeks a schedule entry applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeekSet {
    /// The entry applies every week of the semester.
    All,
    Weeks(BTreeSet<u32>),
}

impl WeekSet {
    pub fn from_weeks<I: IntoIterator<Item = u32>>(weeks: I) -> Self {
        Self::Weeks(weeks.into_iter().collect())
    }

    /// Parse the week expressions institution backends emit:
    /// "1-16", "1,3,5-9", "1-16周", odd/even suffixes "单"/"双",
    /// and the all-weeks sentinel "全周" / "all".
    pub fn parse(raw: &str) -> Self {
        let s = raw.trim();
        if s.is_empty() || s == "全周" || s.eq_ignore_ascii_case("all") {
            return Self::All;
        }
        let odd_only = s.contains('单');
        let even_only = s.contains('双');
        let cleaned: String = s
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '-' || *c == ',' || *c == '，')
            .collect();

        let mut weeks = BTreeSet::new();
        for part in cleaned.split([',', '，']) {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            if let Some((lo, hi)) = part.split_once('-') {
                if let (Ok(lo), Ok(hi)) = (lo.trim().parse::<u32>(), hi.trim().parse::<u32>()) {
                    for w in lo..=hi {
                        weeks.insert(w);
                    }
                }
            } else if let Ok(w) = part.parse::<u32>() {
                weeks.insert(w);
            }
        }
        if odd_only {
            weeks.retain(|w| w % 2 == 1);
        } else if even_only {
            weeks.retain(|w| w % 2 == 0);
        }
        if weeks.is_empty() {
            // Nothing parseable; safest reading is "applies every week".
            Self::All
        } else {
            Self::Weeks(weeks)
        }
    }
}

/// Stable diff key for one record. Built from normalized identity fields so
/// the same logical record maps to the same key across cycles.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordIdentity(pub String);

impl std::fmt::Display for RecordIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A record of either kind. Snapshots hold a homogeneous sequence of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Record {
    Grade(GradeRecord),
    Schedule(ScheduleEntry),
}

/// Collapse internal whitespace runs and trim. Backends pad fields
/// inconsistently between requests; identity and equality ignore that.
pub fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl Record {
    /// Identity key for diffing.
    ///
    /// Grades: (term, course_name, course_code-or-course_name fallback).
    /// Schedule: (weekday, start_period, course_name).
    pub fn identity(&self) -> RecordIdentity {
        match self {
            Record::Grade(g) => {
                let code = g
                    .course_code
                    .as_deref()
                    .filter(|c| !c.trim().is_empty())
                    .unwrap_or(&g.course_name);
                RecordIdentity(format!(
                    "{}|{}|{}",
                    normalize_ws(&g.term),
                    normalize_ws(&g.course_name),
                    normalize_ws(code)
                ))
            }
            Record::Schedule(s) => RecordIdentity(format!(
                "{}|{}|{}",
                s.weekday,
                s.start_period,
                normalize_ws(&s.course_name)
            )),
        }
    }

    /// Whitespace-normalized copy used for field-level comparison.
    pub fn normalized(&self) -> Record {
        match self {
            Record::Grade(g) => Record::Grade(GradeRecord {
                term: normalize_ws(&g.term),
                course_name: normalize_ws(&g.course_name),
                score: normalize_ws(&g.score),
                credit: normalize_ws(&g.credit),
                course_category: normalize_ws(&g.course_category),
                course_code: g.course_code.as_deref().map(normalize_ws),
            }),
            Record::Schedule(s) => Record::Schedule(ScheduleEntry {
                weekday: s.weekday,
                start_period: s.start_period,
                end_period: s.end_period,
                course_name: normalize_ws(&s.course_name),
                room: normalize_ws(&s.room),
                teacher: normalize_ws(&s.teacher),
                weeks: s.weeks.clone(),
            }),
        }
    }
}

/// The last-observed full set of records of one kind for one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub kind: SnapshotKind,
    pub account_key: String,
    pub records: Vec<Record>,
    pub captured_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(kind: SnapshotKind, account_key: &str, records: Vec<Record>) -> Self {
        Self {
            kind,
            account_key: account_key.to_string(),
            records,
            captured_at: Utc::now(),
        }
    }
}

/// What happened to one record between two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
}

/// One detected difference. `before` and `after` are never both `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub identity: RecordIdentity,
    pub before: Option<Record>,
    pub after: Option<Record>,
}
