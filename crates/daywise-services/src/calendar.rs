//! Calendar access used by the reconciler.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use daywise_calendar::{CalendarClient, CalendarError, Event, EventDraft};

/// The three calendar operations reconciliation needs.
#[async_trait]
pub trait CalendarBackend: Send + Sync {
    /// Every event overlapping `[time_min, time_max)`.
    async fn list_events(
        &self,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<Event>, CalendarError>;

    async fn delete_event(&self, event_id: &str) -> Result<(), CalendarError>;

    async fn insert_event(&self, draft: &EventDraft) -> Result<Event, CalendarError>;
}

/// Google Calendar, bound to one calendar id.
///
/// Built without a token it fails every call with `AuthRequired`, so commands
/// that never touch the calendar still work.
pub struct GoogleCalendar {
    client: Option<CalendarClient>,
    calendar_id: String,
}

impl GoogleCalendar {
    pub fn new(client: Option<CalendarClient>, calendar_id: impl Into<String>) -> Self {
        Self {
            client,
            calendar_id: calendar_id.into(),
        }
    }

    fn client(&self) -> Result<&CalendarClient, CalendarError> {
        self.client.as_ref().ok_or(CalendarError::AuthRequired)
    }
}

#[async_trait]
impl CalendarBackend for GoogleCalendar {
    async fn list_events(
        &self,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<Event>, CalendarError> {
        self.client()?
            .list_all_events(&self.calendar_id, time_min, time_max)
            .await
    }

    async fn delete_event(&self, event_id: &str) -> Result<(), CalendarError> {
        self.client()?.delete_event(&self.calendar_id, event_id).await
    }

    async fn insert_event(&self, draft: &EventDraft) -> Result<Event, CalendarError> {
        self.client()?.create_event(&self.calendar_id, draft).await
    }
}
