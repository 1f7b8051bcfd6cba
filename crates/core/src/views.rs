//! Derived, read-only views over a task snapshot.
//!
//! Everything here is a pure function of the snapshot, the current time and
//! the requested section; nothing mutates the tasks it is given.

use std::cmp::{Ordering, Reverse};
use std::fmt;

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use clap::ValueEnum;
use serde::Serialize;

use crate::model::{Priority, Task};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
#[clap(rename_all = "kebab-case")]
pub enum Section {
    Inbox,
    Today,
    Upcoming,
    Overdue,
    #[value(alias = "nodeadline", alias = "someday")]
    NoDeadline,
    #[value(alias = "done")]
    Completed,
}

impl Section {
    pub const ALL: [Section; 6] = [
        Section::Inbox,
        Section::Today,
        Section::Upcoming,
        Section::Overdue,
        Section::NoDeadline,
        Section::Completed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Section::Inbox => "inbox",
            Section::Today => "today",
            Section::Upcoming => "upcoming",
            Section::Overdue => "overdue",
            Section::NoDeadline => "no-deadline",
            Section::Completed => "completed",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Section::Inbox => "Inbox",
            Section::Today => "Today",
            Section::Upcoming => "Upcoming",
            Section::Overdue => "Overdue",
            Section::NoDeadline => "No Deadline",
            Section::Completed => "Completed",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Section::Inbox => {
                "Inbox is your go-to spot for quick task entry. Clear your mind now, organize when you're ready."
            }
            Section::Today => "Focus on what needs to be done today.",
            Section::Upcoming => "Plan ahead with your upcoming tasks.",
            Section::Overdue => "These tasks have missed their deadlines. Prioritize them now!",
            Section::NoDeadline => "These tasks have no deadline. Set one to manage them better.",
            Section::Completed => "Review your completed tasks.",
        }
    }

    pub fn contains(self, task: &Task, window: &DayWindow) -> bool {
        match self {
            Section::Completed => task.completed,
            Section::Inbox => !task.completed,
            bucketed => !task.completed && window.bucket(task) == bucketed,
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// `[start_of_today, start_of_tomorrow)` for the calendar day containing "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub start_of_today: DateTime<Utc>,
    pub start_of_tomorrow: DateTime<Utc>,
}

impl DayWindow {
    /// The day is taken in `now`'s own time zone.
    pub fn containing<Tz: TimeZone>(now: &DateTime<Tz>) -> Self {
        let zone = now.timezone();
        let today = now.date_naive();
        let tomorrow = today + Duration::days(1);
        Self {
            start_of_today: local_midnight(&zone, today),
            start_of_tomorrow: local_midnight(&zone, tomorrow),
        }
    }

    /// Deadline bucket of an incomplete task: `Today`, `Upcoming`, `Overdue`
    /// or `NoDeadline`.
    pub fn bucket(&self, task: &Task) -> Section {
        match task.deadline_at {
            None => Section::NoDeadline,
            Some(deadline) if deadline < self.start_of_today => Section::Overdue,
            Some(deadline) if deadline < self.start_of_tomorrow => Section::Today,
            Some(_) => Section::Upcoming,
        }
    }
}

fn local_midnight<Tz: TimeZone>(zone: &Tz, date: chrono::NaiveDate) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    // A DST jump can skip local midnight; fall back to the first valid instant.
    zone.from_local_datetime(&midnight)
        .earliest()
        .or_else(|| {
            zone.from_local_datetime(&(midnight + Duration::hours(1)))
                .earliest()
        })
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
}

/// Tasks of `section`, in snapshot order.
pub fn partition(tasks: &[Task], section: Section, window: &DayWindow) -> Vec<Task> {
    tasks
        .iter()
        .filter(|task| section.contains(task, window))
        .cloned()
        .collect()
}

/// Display order: open before done, high priority first (missing counts as
/// medium), nearest deadline first with undated last, newest first.
pub fn rank(tasks: &[Task]) -> Vec<Task> {
    let mut ranked = tasks.to_vec();
    ranked.sort_by(compare_for_display);
    ranked
}

pub fn compare_for_display(a: &Task, b: &Task) -> Ordering {
    a.completed
        .cmp(&b.completed)
        .then_with(|| Priority::rank(a.priority).cmp(&Priority::rank(b.priority)))
        .then_with(|| compare_deadlines(a.deadline_at, b.deadline_at))
        .then_with(|| Reverse(a.id.recency()).cmp(&Reverse(b.id.recency())))
}

fn compare_deadlines(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionCounts {
    pub inbox: usize,
    pub today: usize,
    pub upcoming: usize,
    pub overdue: usize,
    pub no_deadline: usize,
    pub completed: usize,
}

impl SectionCounts {
    pub fn get(&self, section: Section) -> usize {
        match section {
            Section::Inbox => self.inbox,
            Section::Today => self.today,
            Section::Upcoming => self.upcoming,
            Section::Overdue => self.overdue,
            Section::NoDeadline => self.no_deadline,
            Section::Completed => self.completed,
        }
    }

    fn bump(&mut self, section: Section) {
        let slot = match section {
            Section::Inbox => &mut self.inbox,
            Section::Today => &mut self.today,
            Section::Upcoming => &mut self.upcoming,
            Section::Overdue => &mut self.overdue,
            Section::NoDeadline => &mut self.no_deadline,
            Section::Completed => &mut self.completed,
        };
        *slot += 1;
    }
}

pub fn counts(tasks: &[Task], window: &DayWindow) -> SectionCounts {
    let mut counts = SectionCounts::default();
    for task in tasks {
        if task.completed {
            counts.bump(Section::Completed);
        } else {
            counts.bump(Section::Inbox);
            counts.bump(window.bucket(task));
        }
    }
    counts
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewOrder {
    /// Snapshot order (newest additions on top).
    #[default]
    Stored,
    Ranked,
}

/// One section ready to render, plus the counts for every section.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewSnapshot {
    pub section: Section,
    pub tasks: Vec<Task>,
    pub counts: SectionCounts,
}

impl ViewSnapshot {
    pub fn build<Tz: TimeZone>(
        tasks: &[Task],
        section: Section,
        now: &DateTime<Tz>,
        order: ViewOrder,
    ) -> Self {
        let window = DayWindow::containing(now);
        let selected = partition(tasks, section, &window);
        let selected = match order {
            ViewOrder::Stored => selected,
            ViewOrder::Ranked => rank(&selected),
        };
        Self {
            section,
            tasks: selected,
            counts: counts(tasks, &window),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
