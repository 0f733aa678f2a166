//! Calendar reconciliation: make one day's events match a schedule.
//!
//! Every pass lists the day's events, deletes all of them, then inserts one
//! event per entry whose time parses. Per-event failures are logged and
//! counted, never retried. A crash between the delete and insert phases
//! leaves the day empty until the next pass, which rebuilds it from scratch:
//! the calendar is eventually consistent with the schedule, not exactly-once.

use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use daywise_calendar::{CalendarError, EventDraft};
use daywise_schedule::{parse_time_range_in, ScheduleEntry, TimeParseError};
use serde::Serialize;
use tracing::instrument;

use crate::calendar::CalendarBackend;

/// An entry left off the calendar because its time did not parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedEntry {
    pub name: String,
    pub time: String,
    pub reason: String,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub deleted: usize,
    pub delete_failures: usize,
    pub created: usize,
    pub create_failures: usize,
    pub skipped: Vec<SkippedEntry>,
}

impl SyncReport {
    /// True when every listed event was removed and every entry was created.
    pub fn is_clean(&self) -> bool {
        self.delete_failures == 0 && self.create_failures == 0 && self.skipped.is_empty()
    }

    pub fn summary(&self) -> String {
        let mut parts = vec![
            format!("deleted {}", self.deleted),
            format!("created {}", self.created),
        ];
        if !self.skipped.is_empty() {
            parts.push(format!("skipped {}", self.skipped.len()));
        }
        if self.delete_failures > 0 {
            parts.push(format!("{} delete failures", self.delete_failures));
        }
        if self.create_failures > 0 {
            parts.push(format!("{} create failures", self.create_failures));
        }
        parts.join(", ")
    }
}

/// UTC bounds of `date` as observed in `tz`: `[local midnight, next local midnight)`.
pub fn day_window(date: NaiveDate, tz: &Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    let next = date.checked_add_days(Days::new(1)).unwrap_or(date);
    (local_midnight(date, tz), local_midnight(next, tz))
}

fn local_midnight(date: NaiveDate, tz: &Tz) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        // Zones that skip midnight: fall back to the UTC reading.
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

pub struct CalendarReconciler<'a> {
    calendar: &'a dyn CalendarBackend,
    timezone: Tz,
}

impl<'a> CalendarReconciler<'a> {
    pub fn new(calendar: &'a dyn CalendarBackend, timezone: Tz) -> Self {
        Self { calendar, timezone }
    }

    /// Rebuild `date`'s events from `entries`.
    ///
    /// Only a failure to list the day's events aborts the pass; nothing has
    /// been changed at that point.
    #[instrument(skip_all, fields(%date, entries = entries.len()), level = "info")]
    pub async fn reconcile(
        &self,
        date: NaiveDate,
        entries: &[ScheduleEntry],
    ) -> Result<SyncReport, CalendarError> {
        let (time_min, time_max) = day_window(date, &self.timezone);
        let existing = self.calendar.list_events(time_min, time_max).await?;

        let mut report = SyncReport::default();

        for event in &existing {
            match self.calendar.delete_event(&event.id).await {
                Ok(()) => {
                    tracing::info!(id = %event.id, summary = %event.summary, "Deleted event");
                    report.deleted += 1;
                }
                Err(CalendarError::EventNotFound(_)) => {
                    tracing::debug!(id = %event.id, "Event already gone");
                    report.deleted += 1;
                }
                Err(e) => {
                    tracing::warn!(id = %event.id, error = %e, retryable = e.is_retryable(), "Failed to delete event, continuing");
                    report.delete_failures += 1;
                }
            }
        }

        for entry in entries {
            let range = match parse_time_range_in(&entry.time, date, &self.timezone) {
                Ok(range) => range,
                Err(e) => {
                    tracing::warn!(name = %entry.name, time = %entry.time, error = %e, "Skipping entry with unparseable time");
                    report.skipped.push(skipped(entry, &e));
                    continue;
                }
            };

            let draft = EventDraft::new(entry.name.clone(), range.start, range.end);
            match self.calendar.insert_event(&draft).await {
                Ok(event) => {
                    tracing::info!(
                        id = %event.id,
                        summary = %draft.summary,
                        link = event.html_link.as_deref().unwrap_or(""),
                        "Created event"
                    );
                    report.created += 1;
                }
                Err(e) => {
                    tracing::warn!(summary = %draft.summary, error = %e, retryable = e.is_retryable(), "Failed to create event, continuing");
                    report.create_failures += 1;
                }
            }
        }

        tracing::info!(summary = %report.summary(), "Calendar reconciled");
        Ok(report)
    }
}

fn skipped(entry: &ScheduleEntry, error: &TimeParseError) -> SkippedEntry {
    SkippedEntry {
        name: entry.name.clone(),
        time: entry.time.clone(),
        reason: error.to_string(),
    }
}
