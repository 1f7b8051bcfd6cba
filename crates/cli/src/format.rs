use std::fmt::Display;

use chrono::{DateTime, TimeZone, Utc};

use crate::model::{Priority, Task};
use crate::views::{Section, SectionCounts};

pub fn task_line<Tz: TimeZone>(task: &Task, tz: &Tz) -> String
where
    Tz::Offset: Display,
{
    let mark = if task.completed { "[x]" } else { "[ ]" };
    let mut line = format!(
        "{mark} #{:<4} {}  ({}",
        task.id.to_string(),
        task.title,
        Priority::label(task.priority)
    );
    if let Some(deadline) = &task.deadline_at {
        line.push_str(&format!(", due {}", format_datetime(deadline, tz)));
    }
    if let Some(done) = task.completed_at.as_ref().filter(|_| task.completed) {
        line.push_str(&format!(", done {}", format_datetime(done, tz)));
    }
    line.push(')');
    line
}

/// Label/value pairs for a single task.
pub fn task_detail_entries<Tz: TimeZone>(task: &Task, tz: &Tz) -> Vec<(&'static str, String)>
where
    Tz::Offset: Display,
{
    let mut entries = vec![
        ("Title", task.title.clone()),
        ("ID", task.id.to_string()),
        (
            "Status",
            if task.completed { "completed" } else { "open" }.to_string(),
        ),
        ("Priority", Priority::label(task.priority).to_string()),
    ];
    if let Some(deadline) = &task.deadline_at {
        entries.push(("Deadline", format_datetime(deadline, tz)));
    }
    if let Some(created) = &task.created_at {
        entries.push(("Created", format_datetime(created, tz)));
    }
    if let Some(done) = &task.completed_at {
        entries.push(("Completed", format_datetime(done, tz)));
    }
    if let Some(description) = task.description.as_deref().filter(|d| !d.trim().is_empty()) {
        entries.push(("Description", description.to_string()));
    }
    entries
}

pub fn counts_lines(counts: &SectionCounts) -> Vec<String> {
    let width = Section::ALL
        .iter()
        .map(|section| section.title().len())
        .max()
        .unwrap_or(0);
    Section::ALL
        .iter()
        .map(|section| format!("{:<width$}  {}", section.title(), counts.get(*section)))
        .collect()
}

pub fn format_datetime<Tz: TimeZone>(value: &DateTime<Utc>, tz: &Tz) -> String
where
    Tz::Offset: Display,
{
    value.with_timezone(tz).format("%Y-%m-%d %H:%M").to_string()
}
