//! The reschedule unit of work.
//!
//! Read the stored schedule, ask the model for a revision, repair it, and
//! only once a valid `Schedule` exists replace the stored document and
//! rebuild today's calendar. A rejected model answer changes nothing.

use chrono::{NaiveDate, Utc};
use daywise_calendar::CalendarError;
use daywise_schedule::{repair_schedule, RepairError, Schedule, ScheduleDocument, StoreError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::instrument;

use crate::context::ScheduleContext;
use crate::model::ModelError;
use crate::reconcile::{CalendarReconciler, SyncReport};

/// Body of a reschedule request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RescheduleRequest {
    pub prompt: String,
}

/// Reply sent once a request has been handled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgment {
    pub message: String,
}

#[derive(Debug, Error)]
pub enum RescheduleError {
    #[error("Schedule store error: {0}")]
    Store(#[from] StoreError),

    #[error("Model request failed: {0}")]
    Model(#[from] ModelError),

    #[error("Model output rejected: {0}")]
    Repair(#[from] RepairError),

    /// The new schedule was saved; only the calendar is behind.
    #[error("Schedule saved, but calendar sync failed: {0}")]
    CalendarSync(#[source] CalendarError),

    /// A sync-only pass could not list the day's events.
    #[error("Calendar sync failed: {0}")]
    Calendar(#[source] CalendarError),
}

impl RescheduleError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Store(_) => "Could not read or save your schedule.".to_string(),
            Self::Model(e) => e.user_message().to_string(),
            Self::Repair(_) => {
                "The assistant's answer was not a usable schedule. Nothing was changed.".to_string()
            }
            Self::CalendarSync(e) => format!(
                "Your schedule was updated, but the calendar was not: {}{}",
                e.user_message(),
                retry_hint(e)
            ),
            Self::Calendar(e) => format!("{}{}", e.user_message(), retry_hint(e)),
        }
    }

    /// Whether the stored schedule changed before the failure.
    pub fn schedule_was_saved(&self) -> bool {
        matches!(self, Self::CalendarSync(_))
    }
}

fn retry_hint(e: &CalendarError) -> &'static str {
    if e.is_retryable() {
        " Run `daywise sync` again later."
    } else {
        ""
    }
}

/// Result of a successful reschedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RescheduleOutcome {
    pub schedule: Schedule,
    pub sync: SyncReport,
}

impl RescheduleOutcome {
    pub fn acknowledgment(&self) -> Acknowledgment {
        let message = if self.sync.is_clean() {
            "Schedule updated and calendar synced".to_string()
        } else {
            format!("Schedule updated; calendar synced with issues ({})", self.sync.summary())
        };
        Acknowledgment { message }
    }
}

const SENTENCE_END: [char; 6] = ['.', '!', '?', ',', ';', ':'];

/// Instruction text for the model: the current schedule, the disruption, and
/// a demand for bare JSON.
pub fn build_instruction(schedule: &Schedule, disruption: &str) -> String {
    format!(
        "{schedule} is my schedule for today, but something came up: {disruption}. \
         Reschedule my day around it. Each item needs a \"name\" and a \"time\" written as \
         \"h:mm AM\" or \"h:mm AM - h:mm PM\". \
         Respond with only a JSON array of these items. \
         No prose before or after it, no quotes around it, no markdown or code fences.",
        schedule = schedule.to_json(),
        disruption = disruption
            .trim()
            .trim_end_matches(|c: char| SENTENCE_END.contains(&c) || c.is_whitespace()),
    )
}

pub struct RescheduleOrchestrator {
    ctx: ScheduleContext,
    // Serializes read-modify-write cycles issued through this orchestrator.
    write_lock: Mutex<()>,
}

impl RescheduleOrchestrator {
    pub fn new(ctx: ScheduleContext) -> Self {
        Self {
            ctx,
            write_lock: Mutex::new(()),
        }
    }

    pub fn context(&self) -> &ScheduleContext {
        &self.ctx
    }

    /// Today's date in the calendar's timezone.
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.ctx.timezone()).date_naive()
    }

    /// The stored entries, read fresh. A missing document is an empty schedule.
    pub async fn current_schedule(&self) -> Result<Schedule, StoreError> {
        Ok(self
            .ctx
            .store()
            .load(self.ctx.document_id())
            .await?
            .map(|doc| doc.tasks)
            .unwrap_or_default())
    }

    /// Handle a reschedule request for today.
    pub async fn handle(&self, request: &RescheduleRequest) -> Result<Acknowledgment, RescheduleError> {
        let outcome = self.reschedule(&request.prompt).await?;
        Ok(outcome.acknowledgment())
    }

    /// Reschedule today around `disruption`.
    pub async fn reschedule(&self, disruption: &str) -> Result<RescheduleOutcome, RescheduleError> {
        self.reschedule_on(self.today(), disruption).await
    }

    /// Reschedule `date` around `disruption`.
    #[instrument(skip(self, disruption), fields(document = %self.ctx.document_id()), level = "info")]
    pub async fn reschedule_on(
        &self,
        date: NaiveDate,
        disruption: &str,
    ) -> Result<RescheduleOutcome, RescheduleError> {
        let _guard = self.write_lock.lock().await;

        let current = self.current_schedule().await?;
        tracing::info!(entries = current.len(), "Loaded current schedule");

        let instruction = build_instruction(&current, disruption);
        let raw = self.ctx.model().complete(&instruction).await?;

        let revised = repair_schedule(&raw).inspect_err(|e| {
            tracing::warn!(error = %e, "Rejected model output; schedule and calendar left unchanged");
        })?;
        tracing::info!(entries = revised.len(), "Model output repaired");

        self.apply(date, revised).await
    }

    /// Replace the stored schedule with `schedule` and sync `date`.
    pub async fn replace_schedule_on(
        &self,
        date: NaiveDate,
        schedule: Schedule,
    ) -> Result<RescheduleOutcome, RescheduleError> {
        let _guard = self.write_lock.lock().await;
        self.apply(date, schedule).await
    }

    /// Rebuild today's calendar from the stored schedule, without the model.
    pub async fn sync_today(&self) -> Result<SyncReport, RescheduleError> {
        self.sync_on(self.today()).await
    }

    pub async fn sync_on(&self, date: NaiveDate) -> Result<SyncReport, RescheduleError> {
        let _guard = self.write_lock.lock().await;
        let current = self.current_schedule().await?;
        self.reconciler()
            .reconcile(date, current.entries())
            .await
            .map_err(RescheduleError::Calendar)
    }

    async fn apply(
        &self,
        date: NaiveDate,
        schedule: Schedule,
    ) -> Result<RescheduleOutcome, RescheduleError> {
        let document = ScheduleDocument::new(self.ctx.document_id(), schedule.clone());
        self.ctx.store().replace(document).await?;
        tracing::info!(entries = schedule.len(), "Stored revised schedule");

        let sync = self
            .reconciler()
            .reconcile(date, schedule.entries())
            .await
            .map_err(RescheduleError::CalendarSync)?;

        Ok(RescheduleOutcome { schedule, sync })
    }

    fn reconciler(&self) -> CalendarReconciler<'_> {
        CalendarReconciler::new(self.ctx.calendar(), self.ctx.timezone())
    }
}
