use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Task identifier. Server ids are positive; ids handed out by the store before
/// the server confirms a create are negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub i64);

impl TaskId {
    pub fn is_provisional(&self) -> bool {
        self.0 < 0
    }

    /// Larger means newer. Provisional ids are newer than any confirmed id and
    /// count down from -1, so the most negative one is the latest.
    pub(crate) fn recency(&self) -> (bool, i64) {
        if self.is_provisional() {
            (true, -self.0)
        } else {
            (false, self.0)
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .trim_start_matches('#')
            .parse::<i64>()
            .map(TaskId)
            .map_err(|_| anyhow!("Invalid task id '{}': expected an integer", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    /// Sort rank: high first. A task without a priority ranks as medium.
    pub fn rank(priority: Option<Priority>) -> u8 {
        match priority {
            Some(Priority::High) => 0,
            Some(Priority::Medium) | None => 1,
            Some(Priority::Low) => 2,
        }
    }

    pub fn label(priority: Option<Priority>) -> &'static str {
        match priority {
            Some(p) => p.as_str(),
            None => "no priority",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" | "l" => Ok(Priority::Low),
            "medium" | "med" | "m" => Ok(Priority::Medium),
            "high" | "h" => Ok(Priority::High),
            other => Err(anyhow!(
                "Unknown priority '{}': expected low|medium|high|none",
                other
            )),
        }
    }
}

/// Parse a priority where `none` (or an empty string) means no priority.
pub fn parse_priority(spec: &str) -> Result<Option<Priority>> {
    let trimmed = spec.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    trimmed.parse().map(Some)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(
        default,
        deserialize_with = "deserialize_priority",
        skip_serializing_if = "Option::is_none"
    )]
    pub priority: Option<Priority>,
    #[serde(default, alias = "created_at", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "completed_at", skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "deadline_at", skip_serializing_if = "Option::is_none")]
    pub deadline_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Build the local stand-in shown while a create is pending.
    pub fn provisional(id: TaskId, draft: &NewTask, now: DateTime<Utc>) -> Self {
        Self {
            id,
            title: draft.title.clone(),
            description: draft.description.clone(),
            completed: false,
            priority: draft.priority,
            created_at: Some(now),
            completed_at: None,
            deadline_at: draft.deadline_at,
        }
    }

    /// Set completion, keeping `completed_at` present exactly when completed.
    pub fn set_completed(&mut self, completed: bool, now: DateTime<Utc>) {
        self.completed_at = match (self.completed, completed) {
            (false, true) => Some(now),
            (true, true) => self.completed_at.or(Some(now)),
            (_, false) => None,
        };
        self.completed = completed;
    }

    pub fn apply(&mut self, patch: &TaskPatch, now: DateTime<Utc>) {
        if let Some(title) = &patch.title {
            self.title = title.trim().to_string();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(deadline_at) = patch.deadline_at {
            self.deadline_at = deadline_at;
        }
        if let Some(completed) = patch.completed {
            self.set_completed(completed, now);
        }
    }

    /// Restore the completion invariant on a record that came off the wire.
    /// `fallback` supplies `completed_at` for a completed record that lacks one.
    pub fn normalized(mut self, fallback: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        if self.completed {
            if self.completed_at.is_none() {
                self.completed_at = fallback.or(Some(now));
            }
        } else {
            self.completed_at = None;
        }
        self
    }
}

/// Fields for creating a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NewTask {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(rename = "deadline_at", skip_serializing_if = "Option::is_none")]
    pub deadline_at: Option<DateTime<Utc>>,
}

impl NewTask {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Trim the title and drop blank descriptions. `None` when the title is blank.
    pub fn cleaned(&self) -> Option<NewTask> {
        let title = self.title.trim();
        if title.is_empty() {
            return None;
        }
        Some(NewTask {
            title: title.to_string(),
            description: clean_text(self.description.as_deref()),
            priority: self.priority,
            deadline_at: self.deadline_at,
        })
    }
}

/// Partial update. Outer `None` leaves a field alone; `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Option<DateTime<Utc>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Option<Priority>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline_at: Option<Option<DateTime<Utc>>>,
}

impl TaskPatch {
    /// The completion fields of `task`, as sent for a toggle.
    pub fn completion_of(task: &Task) -> Self {
        Self {
            completed: Some(task.completed),
            completed_at: Some(task.completed_at),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &TaskPatch::default()
    }

    pub fn has_blank_title(&self) -> bool {
        self.title
            .as_deref()
            .map(|title| title.trim().is_empty())
            .unwrap_or(false)
    }

    /// Copy of the patch with `completed_at` filled in from the applied task, so
    /// the server stores the same timestamp the client shows.
    pub(crate) fn with_completion_from(mut self, task: &Task) -> Self {
        if self.completed.is_some() {
            self.completed_at = Some(task.completed_at);
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteAck {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl DeleteAck {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }
}

fn deserialize_priority<'de, D>(deserializer: D) -> Result<Option<Priority>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) => parse_priority(&raw).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

fn clean_text(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, hour, 0, 0).unwrap()
    }

    fn task(id: i64) -> Task {
        Task {
            id: TaskId(id),
            title: format!("Task {id}"),
            description: None,
            completed: false,
            priority: None,
            created_at: Some(at(8)),
            completed_at: None,
            deadline_at: None,
        }
    }

    #[test]
    fn set_completed_keeps_timestamp_in_step() {
        let mut t = task(1);
        t.set_completed(true, at(10));
        assert!(t.completed);
        assert_eq!(t.completed_at, Some(at(10)));

        t.set_completed(false, at(11));
        assert!(!t.completed);
        assert_eq!(t.completed_at, None);
    }

    #[test]
    fn normalized_drops_stale_completed_at() {
        let mut t = task(1);
        t.completed_at = Some(at(9));
        let t = t.normalized(None, at(12));
        assert_eq!(t.completed_at, None);

        let mut done = task(2);
        done.completed = true;
        let done = done.normalized(Some(at(10)), at(12));
        assert_eq!(done.completed_at, Some(at(10)));
    }

    #[test]
    fn deserializes_camel_and_snake_case_fields() {
        let camel: Task = serde_json::from_value(serde_json::json!({
            "id": 42,
            "title": "Buy milk",
            "completed": false,
            "createdAt": "2026-10-19T08:00:00Z",
            "deadlineAt": "2026-10-20T09:00:00Z"
        }))
        .unwrap();
        let snake: Task = serde_json::from_value(serde_json::json!({
            "id": 42,
            "title": "Buy milk",
            "completed": false,
            "created_at": "2026-10-19T08:00:00Z",
            "deadline_at": "2026-10-20T09:00:00Z"
        }))
        .unwrap();
        assert_eq!(camel, snake);
        assert_eq!(camel.id, TaskId(42));
        assert_eq!(camel.priority, None);
    }

    #[test]
    fn deserializes_none_priority_as_absent() {
        let parsed: Task = serde_json::from_value(serde_json::json!({
            "id": 3,
            "title": "Later",
            "priority": "none"
        }))
        .unwrap();
        assert_eq!(parsed.priority, None);
        assert!(!parsed.completed);
    }

    #[test]
    fn new_task_serializes_deadline_in_snake_case() {
        let draft = NewTask {
            title: "Ship".into(),
            description: None,
            priority: Some(Priority::High),
            deadline_at: Some(at(9)),
        };
        let value = serde_json::to_value(&draft).unwrap();
        assert_eq!(value["deadline_at"], "2026-10-19T09:00:00Z");
        assert_eq!(value["priority"], "high");
        assert!(value.get("description").is_none());
    }

    #[test]
    fn patch_serializes_cleared_fields_as_null() {
        let patch = TaskPatch {
            deadline_at: Some(None),
            ..TaskPatch::default()
        };
        let value = serde_json::to_value(&patch).unwrap();
        assert_eq!(value, serde_json::json!({ "deadlineAt": null }));
    }

    #[test]
    fn cleaned_rejects_blank_titles() {
        assert!(NewTask::titled("   ").cleaned().is_none());
        let draft = NewTask {
            title: "  Buy milk ".into(),
            description: Some("  ".into()),
            ..NewTask::default()
        };
        let cleaned = draft.cleaned().unwrap();
        assert_eq!(cleaned.title, "Buy milk");
        assert_eq!(cleaned.description, None);
    }

    #[test]
    fn parses_priority_and_none() {
        assert_eq!(parse_priority("HIGH").unwrap(), Some(Priority::High));
        assert_eq!(parse_priority("med").unwrap(), Some(Priority::Medium));
        assert_eq!(parse_priority("none").unwrap(), None);
        assert!(parse_priority("urgent").is_err());
    }

    #[test]
    fn provisional_ids_are_newest() {
        assert!(TaskId(-2).recency() > TaskId(-1).recency());
        assert!(TaskId(-1).recency() > TaskId(500).recency());
        assert!(TaskId(7).recency() > TaskId(3).recency());
        assert_eq!("#12".parse::<TaskId>().unwrap(), TaskId(12));
    }
}
