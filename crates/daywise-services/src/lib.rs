//! Reschedule-and-synchronize pipeline.
//!
//! [`RescheduleOrchestrator`] reads the stored schedule, asks the model for a
//! revision, repairs and persists the answer, then has
//! [`CalendarReconciler`] rebuild the day's calendar events.

pub mod calendar;
pub mod context;
pub mod model;
pub mod orchestrator;
pub mod reconcile;

pub use calendar::{CalendarBackend, GoogleCalendar};
pub use context::{DocumentStore, ScheduleContext};
pub use model::{ChatCompletionClient, ModelError, ScheduleModel};
pub use orchestrator::{
    build_instruction, Acknowledgment, RescheduleError, RescheduleOrchestrator, RescheduleOutcome,
    RescheduleRequest,
};
pub use reconcile::{day_window, CalendarReconciler, SkippedEntry, SyncReport};
