//! Parsing of human time notation (`"2:00 PM"`, `"2:00 PM - 3:00 PM"`) into
//! concrete UTC instants on a given date.
//!
//! The grammar is deliberately narrow: one optional `" - "` separator and
//! `h:mm AM|PM` on each side. Anything else is an error; callers decide
//! whether to skip the entry.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveTime, SecondsFormat, TimeZone, Utc};
use thiserror::Error;

/// Length of an entry that names only a start time.
pub const DEFAULT_DURATION_MINUTES: i64 = 30;

const RANGE_SEPARATOR: &str = " - ";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeParseError {
    #[error("empty time specification")]
    Empty,

    #[error("'{0}' has more than one range separator")]
    TooManySeparators(String),

    #[error("'{0}' is not a 12-hour clock time (expected h:mm AM|PM)")]
    InvalidClock(String),

    #[error("range '{0}' does not end after it starts")]
    EndBeforeStart(String),

    #[error("{time} does not exist on {date} in the configured timezone")]
    NonexistentLocalTime { date: NaiveDate, time: NaiveTime },
}

/// Start and end instants of a schedule entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn start_rfc3339(&self) -> String {
        self.start.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    pub fn end_rfc3339(&self) -> String {
        self.end.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Parse `spec` as wall-clock time on `date` in UTC.
pub fn parse_time_range(spec: &str, date: NaiveDate) -> Result<TimeRange, TimeParseError> {
    parse_time_range_in(spec, date, &Utc)
}

/// Parse `spec` as wall-clock time on `date` in `tz`, returning UTC instants.
///
/// Ambiguous local times (DST fall-back) resolve to the earlier instant.
pub fn parse_time_range_in<Tz: TimeZone>(
    spec: &str,
    date: NaiveDate,
    tz: &Tz,
) -> Result<TimeRange, TimeParseError> {
    let normalized = normalize(spec);
    if normalized.is_empty() {
        return Err(TimeParseError::Empty);
    }

    let parts: Vec<&str> = normalized.split(RANGE_SEPARATOR).collect();
    match parts.as_slice() {
        [single] => {
            let start = to_utc(date, parse_clock(single)?, tz)?;
            Ok(TimeRange {
                start,
                end: start + Duration::minutes(DEFAULT_DURATION_MINUTES),
            })
        }
        [from, to] => {
            let start = to_utc(date, parse_clock(from)?, tz)?;
            let end = to_utc(date, parse_clock(to)?, tz)?;
            if end <= start {
                return Err(TimeParseError::EndBeforeStart(normalized));
            }
            Ok(TimeRange { start, end })
        }
        _ => Err(TimeParseError::TooManySeparators(normalized)),
    }
}

/// Uppercase, put a space before the meridiem, collapse whitespace.
fn normalize(spec: &str) -> String {
    spec.to_ascii_uppercase()
        .replace("AM", " AM")
        .replace("PM", " PM")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// `h:mm AM|PM` with hour 1-12 and a two-digit minute.
fn parse_clock(text: &str) -> Result<NaiveTime, TimeParseError> {
    let invalid = || TimeParseError::InvalidClock(text.to_string());

    let (clock, meridiem) = text.split_once(' ').ok_or_else(invalid)?;
    let (hour, minute) = clock.split_once(':').ok_or_else(invalid)?;

    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(hour) || hour.len() > 2 || !all_digits(minute) || minute.len() != 2 {
        return Err(invalid());
    }

    let hour: u32 = hour.parse().map_err(|_| invalid())?;
    let minute: u32 = minute.parse().map_err(|_| invalid())?;
    if !(1..=12).contains(&hour) || minute > 59 {
        return Err(invalid());
    }

    let hour24 = match meridiem {
        "AM" => hour % 12,
        "PM" => hour % 12 + 12,
        _ => return Err(invalid()),
    };

    NaiveTime::from_hms_opt(hour24, minute, 0).ok_or_else(invalid)
}

fn to_utc<Tz: TimeZone>(
    date: NaiveDate,
    time: NaiveTime,
    tz: &Tz,
) -> Result<DateTime<Utc>, TimeParseError> {
    match tz.from_local_datetime(&date.and_time(time)) {
        LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
        LocalResult::None => Err(TimeParseError::NonexistentLocalTime { date, time }),
    }
}
