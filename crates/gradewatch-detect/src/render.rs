//! Notification rendering.
//!
//! Pure function of the change sequence — same events, same text — so
//! message content can be snapshot-tested.

use gradewatch_core::types::{ChangeEvent, ChangeKind, Record, SnapshotKind, WeekSet};

/// Render a change sequence into (subject, content).
pub fn render(kind: SnapshotKind, account_key: &str, events: &[ChangeEvent]) -> (String, String) {
    let subject = match kind {
        SnapshotKind::Grades => format!("成绩变动通知 ({} 项)", events.len()),
        SnapshotKind::Schedule => format!("课表变动通知 ({} 项)", events.len()),
    };

    let mut lines = Vec::with_capacity(events.len() + 2);
    lines.push(format!("账户: {account_key}"));
    lines.push(String::new());
    for ev in events {
        lines.push(render_event(ev));
    }
    (subject, lines.join("\n"))
}

fn render_event(ev: &ChangeEvent) -> String {
    match ev.kind {
        ChangeKind::Added => format!("[新增] {}", describe(ev.after.as_ref())),
        ChangeKind::Removed => format!("[移除] {}", describe(ev.before.as_ref())),
        ChangeKind::Modified => format!(
            "[变更] {} → {}",
            describe(ev.before.as_ref()),
            delta(ev.before.as_ref(), ev.after.as_ref())
        ),
    }
}

fn describe(record: Option<&Record>) -> String {
    match record {
        Some(Record::Grade(g)) => format!(
            "{} {}：成绩 {}，学分 {}",
            g.term, g.course_name, g.score, g.credit
        ),
        Some(Record::Schedule(s)) => format!(
            "周{} 第{}-{}节 {}（{}，{}，{}）",
            weekday_name(s.weekday),
            s.start_period,
            s.end_period,
            s.course_name,
            s.room,
            s.teacher,
            weeks_text(&s.weeks)
        ),
        None => "(无)".into(),
    }
}

/// Only the fields that actually changed, so a score bump reads as
/// "成绩 90 → 95" rather than a full record dump.
fn delta(before: Option<&Record>, after: Option<&Record>) -> String {
    match (before, after) {
        (Some(Record::Grade(old)), Some(Record::Grade(new))) => {
            let mut parts = Vec::new();
            if old.score != new.score {
                parts.push(format!("成绩 {} → {}", old.score, new.score));
            }
            if old.credit != new.credit {
                parts.push(format!("学分 {} → {}", old.credit, new.credit));
            }
            if old.course_category != new.course_category {
                parts.push(format!(
                    "类别 {} → {}",
                    old.course_category, new.course_category
                ));
            }
            if parts.is_empty() {
                describe(after)
            } else {
                parts.join("，")
            }
        }
        (Some(Record::Schedule(old)), Some(Record::Schedule(new))) => {
            let mut parts = Vec::new();
            if old.room != new.room {
                parts.push(format!("教室 {} → {}", old.room, new.room));
            }
            if old.teacher != new.teacher {
                parts.push(format!("教师 {} → {}", old.teacher, new.teacher));
            }
            if old.end_period != new.end_period {
                parts.push(format!("节次至 {} → {}", old.end_period, new.end_period));
            }
            if old.weeks != new.weeks {
                parts.push(format!(
                    "周次 {} → {}",
                    weeks_text(&old.weeks),
                    weeks_text(&new.weeks)
                ));
            }
            if parts.is_empty() {
                describe(after)
            } else {
                parts.join("，")
            }
        }
        _ => describe(after),
    }
}

fn weeks_text(weeks: &WeekSet) -> String {
    match weeks {
        WeekSet::All => "全周".into(),
        WeekSet::Weeks(set) => {
            let parts: Vec<String> = set.iter().map(|w| w.to_string()).collect();
            format!("第{}周", parts.join(","))
        }
    }
}

fn weekday_name(weekday: u8) -> &'static str {
    match weekday {
        1 => "一",
        2 => "二",
        3 => "三",
        4 => "四",
        5 => "五",
        6 => "六",
        7 => "日",
        _ => "?",
    }
}
