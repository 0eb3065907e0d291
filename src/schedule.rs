//! Trigger schedule parsing.
//!
//! Schedules are classic five-field cron expressions
//! (`minute hour day month weekday`). The `cron` crate wants a seconds
//! field and counts weekdays 1-7 from Sunday, so expressions are
//! normalized from the POSIX form (0-7, both 0 and 7 meaning Sunday)
//! before parsing.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;
use thiserror::Error;

/// Schedule used when the configured expression does not parse
/// (Friday 01:00).
pub const FALLBACK_SCHEDULE: &str = "0 1 * * 5";

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid cron expression '{expr}': {source}")]
    Invalid {
        expr: String,
        #[source]
        source: cron::error::Error,
    },

    #[error("cron expression '{0}' must have five fields (minute hour day month weekday)")]
    FieldCount(String),
}

/// Shift numeric weekday tokens from POSIX numbering to the parser's
/// Sunday-is-1 numbering. Names and `*` pass through untouched.
fn shift_weekdays(field: &str) -> String {
    fn shift_token(token: &str) -> String {
        match token.parse::<u8>() {
            Ok(n) => ((n % 7) + 1).to_string(),
            Err(_) => token.to_string(),
        }
    }

    field
        .split(',')
        .map(|part| {
            let (range, step) = match part.split_once('/') {
                Some((range, step)) => (range, Some(step)),
                None => (part, None),
            };

            let shifted = if range == "*" {
                range.to_string()
            } else if let Some((lo, hi)) = range.split_once('-') {
                format!("{}-{}", shift_token(lo), shift_token(hi))
            } else {
                shift_token(range)
            };

            match step {
                Some(step) => format!("{shifted}/{step}"),
                None => shifted,
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse a five-field cron expression.
pub fn parse(expr: &str) -> Result<Schedule, ScheduleError> {
    let trimmed = expr.trim();
    let fields: Vec<&str> = trimmed.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(ScheduleError::FieldCount(trimmed.to_string()));
    }

    // Pin seconds to zero so five-field expressions keep their meaning.
    let with_seconds = format!(
        "0 {} {} {} {} {}",
        fields[0],
        fields[1],
        fields[2],
        fields[3],
        shift_weekdays(fields[4]),
    );
    Schedule::from_str(&with_seconds).map_err(|source| ScheduleError::Invalid {
        expr: trimmed.to_string(),
        source,
    })
}

/// Next fire time after `now` for a five-field expression.
pub fn next_fire(expr: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
    let schedule = parse(expr)?;
    schedule
        .after(&now)
        .next()
        .ok_or_else(|| ScheduleError::FieldCount(expr.to_string()))
}
