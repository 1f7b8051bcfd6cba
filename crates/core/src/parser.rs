use anyhow::{anyhow, Context, Result};
use chrono::{prelude::*, Duration, Months};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::capture::{CaptureError, TaskInput};
use crate::model::{parse_priority, NewTask, Priority};

static RELATIVE_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^\+(\d{1,4})([dwm])$").ok());
static PUNCT_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"[[:punct:]]+$").ok());

const DEFAULT_HOUR: u32 = 9;

/// Tokens pulled out of the capture text.
#[derive(Debug, Default)]
struct InlineTokens {
    title_words: Vec<String>,
    due_at: Option<DateTime<Utc>>,
    priority: Option<Option<Priority>>,
}

/// Turn raw capture input into a draft, resolving dates against `now`.
///
/// Explicit `priority`/`due` fields win over inline `p:`/`due:` tokens.
pub fn prepare_new_task<Tz: TimeZone>(input: &TaskInput, now: &DateTime<Tz>) -> Result<NewTask> {
    input.require_text()?;
    let raw_text = input.text.join(" ");
    let inline = parse_inline_tokens(&raw_text, now)?;

    let title = inline.title_words.join(" ").trim().to_string();
    if title.is_empty() {
        return Err(CaptureError::EmptyTitle.into());
    }

    let priority = match &input.priority {
        Some(spec) => parse_priority(spec)?,
        None => inline.priority.flatten(),
    };

    let deadline_at = match &input.due {
        Some(spec) => Some(parse_deadline(spec, now)?),
        None => inline.due_at,
    };

    let description = input
        .description
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string);

    Ok(NewTask {
        title,
        description,
        priority,
        deadline_at,
    })
}

fn parse_inline_tokens<Tz: TimeZone>(text: &str, now: &DateTime<Tz>) -> Result<InlineTokens> {
    let mut result = InlineTokens::default();

    for raw_piece in text.split_whitespace() {
        let (piece, trailing) = strip_trailing_punctuation(raw_piece);
        if let Some(spec) = piece.strip_prefix("due:").filter(|s| !s.is_empty()) {
            result.due_at = Some(parse_deadline(spec, now)?);
        } else if let Some(spec) = piece.strip_prefix("p:").filter(|s| !s.is_empty()) {
            result.priority = Some(parse_priority(spec)?);
        } else {
            result.title_words.push(raw_piece.to_string());
            continue;
        }
        if let Some(rest) = trailing {
            push_trailing(&mut result.title_words, rest);
        }
    }

    Ok(result)
}

fn strip_trailing_punctuation(input: &str) -> (String, Option<String>) {
    let found = PUNCT_RE.as_ref().and_then(|re| re.find(input));
    match found {
        // Keep the whole piece when it is nothing but punctuation.
        Some(mat) if mat.start() > 0 => (
            input[..mat.start()].to_string(),
            Some(input[mat.start()..].to_string()),
        ),
        _ => (input.to_string(), None),
    }
}

fn push_trailing(words: &mut Vec<String>, trailing: String) {
    if let Some(last) = words.last_mut() {
        last.push_str(&trailing);
    }
}

/// Local-time form of [`parse_deadline`].
pub fn parse_date_spec(spec: &str) -> Result<DateTime<Utc>> {
    parse_deadline(spec, &Local::now())
}

/// Resolve a deadline spec relative to `now`, in `now`'s time zone.
///
/// Date-only forms land at 09:00 local time.
pub fn parse_deadline<Tz: TimeZone>(spec: &str, now: &DateTime<Tz>) -> Result<DateTime<Utc>> {
    let trimmed = spec.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("Date specification cannot be empty"));
    }

    let lower = trimmed.to_ascii_lowercase();
    let tz = now.timezone();
    let today = now.date_naive();

    match lower.as_str() {
        "now" => return Ok(now.with_timezone(&Utc)),
        "today" => return at_default_hour(&tz, today),
        "tomorrow" => return at_default_hour(&tz, today + Duration::days(1)),
        _ => {}
    }

    if lower.starts_with('+') {
        return parse_relative_spec(&lower, now);
    }

    if let Some(weekday) = parse_weekday(&lower) {
        let mut days_ahead = (weekday.num_days_from_monday() as i64
            - now.weekday().num_days_from_monday() as i64)
            .rem_euclid(7);
        if days_ahead == 0 {
            days_ahead = 7;
        }
        return at_default_hour(&tz, today + Duration::days(days_ahead));
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return at_default_hour(&tz, date);
    }

    if let Ok(time) = NaiveTime::parse_from_str(trimmed, "%H:%M") {
        return resolve_local(&tz, today.and_time(time), trimmed);
    }

    Err(anyhow!(
        "Unrecognized date specification '{}'. Try YYYY-MM-DD, today, tomorrow, +3d, mon",
        spec
    ))
}

fn parse_relative_spec<Tz: TimeZone>(spec: &str, now: &DateTime<Tz>) -> Result<DateTime<Utc>> {
    let captures = RELATIVE_RE
        .as_ref()
        .and_then(|re| re.captures(spec))
        .ok_or_else(|| anyhow!("Invalid relative date '{}'. Use +3d, +2w or +1m.", spec))?;
    let value: u32 = captures[1].parse().context("Invalid relative offset")?;
    let shifted = match &captures[2] {
        "d" => now.clone().checked_add_signed(Duration::days(value.into())),
        "w" => now.clone().checked_add_signed(Duration::weeks(value.into())),
        _ => now.clone().checked_add_months(Months::new(value)),
    };
    shifted
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| anyhow!("Relative date '{}' is out of range", spec))
}

fn at_default_hour<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> Result<DateTime<Utc>> {
    let naive = date
        .and_hms_opt(DEFAULT_HOUR, 0, 0)
        .ok_or_else(|| anyhow!("Invalid time for {}", date))?;
    resolve_local(tz, naive, &date.to_string())
}

fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime, spec: &str) -> Result<DateTime<Utc>> {
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| anyhow!("Could not resolve local time for '{}'", spec))
}

fn parse_weekday(label: &str) -> Option<Weekday> {
    match label {
        "mon" | "monday" => Some(Weekday::Mon),
        "tue" | "tuesday" => Some(Weekday::Tue),
        "wed" | "wednesday" => Some(Weekday::Wed),
        "thu" | "thursday" => Some(Weekday::Thu),
        "fri" | "friday" => Some(Weekday::Fri),
        "sat" | "saturday" => Some(Weekday::Sat),
        "sun" | "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}
