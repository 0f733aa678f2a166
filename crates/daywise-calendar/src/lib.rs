//! Google Calendar integration for Daywise.
//!
//! Provides the Calendar API client used to keep a day's events in step with
//! the stored schedule.

pub mod client;
pub mod error;
pub mod types;

pub use client::CalendarClient;
pub use error::CalendarError;
pub use types::{Event, EventDraft, EventStatus, EventTime};
