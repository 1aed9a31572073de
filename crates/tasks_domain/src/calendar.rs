use chrono::{DateTime, Utc};

use crate::task::Task;

const PRODUCT_ID: &str = "-//tasks//tasks_domain//EN";
/// Content lines longer than this many octets are folded.
const MAX_LINE_OCTETS: usize = 75;

/// Renders the task list as an iCalendar document with one VTODO per task.
pub fn to_ics(tasks: &[Task], now: DateTime<Utc>) -> String {
    let stamp = format_timestamp(now);
    let mut lines = vec![
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        format!("PRODID:{PRODUCT_ID}"),
        "CALSCALE:GREGORIAN".to_string(),
    ];

    for task in tasks {
        lines.push("BEGIN:VTODO".to_string());
        lines.push(format!("UID:task-{}@tasks", task.id));
        lines.push(format!("DTSTAMP:{stamp}"));
        lines.push(format!("CREATED:{}", format_timestamp(task.created_at)));
        lines.push(format!("SUMMARY:{}", escape_text(&task.text)));
        if task.completed {
            lines.push("STATUS:COMPLETED".to_string());
            lines.push("PERCENT-COMPLETE:100".to_string());
        } else {
            lines.push("STATUS:NEEDS-ACTION".to_string());
        }
        lines.push("END:VTODO".to_string());
    }

    lines.push("END:VCALENDAR".to_string());
    let mut out = String::new();
    for line in &lines {
        fold_line(line, &mut out);
    }
    out
}

/// Appends `line` and its CRLF, breaking it into continuation lines that
/// start with a single space. Breaks never split a UTF-8 sequence.
fn fold_line(line: &str, out: &mut String) {
    let mut budget = MAX_LINE_OCTETS;
    let mut used = 0;
    for ch in line.chars() {
        if used + ch.len_utf8() > budget {
            out.push_str("\r\n ");
            // the leading space counts against the continuation line
            budget = MAX_LINE_OCTETS - 1;
            used = 0;
        }
        out.push(ch);
        used += ch.len_utf8();
    }
    out.push_str("\r\n");
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%dT%H%M%SZ").to_string()
}

fn escape_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            ';' => escaped.push_str("\\;"),
            ',' => escaped.push_str("\\,"),
            '\n' => escaped.push_str("\\n"),
            '\r' => {}
            other => escaped.push(other),
        }
    }
    escaped
}
