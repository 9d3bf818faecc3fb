//! Relative-time expressions for "next run" hints.
//!
//! The crate runs no timers. A submitter only reports when its next sweep
//! or purge is due, evaluated against a caller-supplied time, and an
//! external scheduler acts on it.
//!
//! Accepted forms (case-insensitive):
//!
//! - `+15min`, `+2 hours`, `30 seconds`, `1 day from now`, `+1 month`
//! - `tomorrow`, `midnight`
//! - `first day of next month`, `first day of next month midnight`

use chrono::{DateTime, Datelike, Duration, Months, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::str::FromStr;

/// A relative point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Fixed offset from now.
    After(Duration),
    /// Calendar months from now, same time of day.
    AfterMonths(u32),
    /// Next midnight (start of tomorrow).
    Tomorrow,
    /// Start of today.
    Midnight,
    /// First day of next month; `at_midnight` resets the time of day.
    FirstDayOfNextMonth { at_midnight: bool },
}

impl Schedule {
    /// Evaluates the expression relative to `now`.
    ///
    /// Returns `None` only when the result falls outside chrono's range.
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match *self {
            Schedule::After(offset) => now.checked_add_signed(offset),
            Schedule::AfterMonths(months) => now.checked_add_months(Months::new(months)),
            Schedule::Tomorrow => {
                let date = now.date_naive().succ_opt()?;
                Some(Utc.from_utc_datetime(&date.and_time(start_of_day())))
            }
            Schedule::Midnight => {
                Some(Utc.from_utc_datetime(&now.date_naive().and_time(start_of_day())))
            }
            Schedule::FirstDayOfNextMonth { at_midnight } => {
                let first_of_month = now.date_naive().with_day(1)?;
                let date = first_of_month.checked_add_months(Months::new(1))?;
                let time = if at_midnight { start_of_day() } else { now.time() };
                Some(Utc.from_utc_datetime(&date.and_time(time)))
            }
        }
    }
}

fn start_of_day() -> NaiveTime {
    NaiveTime::default()
}

/// Error for unparseable schedule expressions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleParseError(String);

impl fmt::Display for ScheduleParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognized schedule expression: '{}'", self.0)
    }
}

impl std::error::Error for ScheduleParseError {}

impl FromStr for Schedule {
    type Err = ScheduleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        let err = || ScheduleParseError(s.to_string());

        match normalized.as_str() {
            "tomorrow" => return Ok(Schedule::Tomorrow),
            "midnight" | "today" => return Ok(Schedule::Midnight),
            "first day of next month" => {
                return Ok(Schedule::FirstDayOfNextMonth { at_midnight: false })
            }
            "first day of next month midnight" | "midnight first day of next month" => {
                return Ok(Schedule::FirstDayOfNextMonth { at_midnight: true })
            }
            _ => {}
        }

        let body = normalized.trim_start_matches('+').trim();
        let body = body
            .strip_suffix("from now")
            .or_else(|| body.strip_suffix("later"))
            .unwrap_or(body)
            .trim();

        let split = body
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(body.len());
        let (amount, unit) = body.split_at(split);
        let amount: i64 = amount.parse().map_err(|_| err())?;
        let unit = unit.trim();

        let offset = match unit {
            "s" | "sec" | "secs" | "second" | "seconds" => Duration::try_seconds(amount),
            "m" | "min" | "mins" | "minute" | "minutes" => Duration::try_minutes(amount),
            "h" | "hour" | "hours" => Duration::try_hours(amount),
            "d" | "day" | "days" => Duration::try_days(amount),
            "w" | "week" | "weeks" => Duration::try_weeks(amount),
            "month" | "months" => {
                let months = u32::try_from(amount).map_err(|_| err())?;
                return Ok(Schedule::AfterMonths(months));
            }
            _ => None,
        };

        offset.map(Schedule::After).ok_or_else(err)
    }
}

impl<'de> Deserialize<'de> for Schedule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
