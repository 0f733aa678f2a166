//! Request-scoped handles to the store, the model, and the calendar.
//!
//! A `ScheduleContext` is built once per command and dropped when it ends;
//! dropping it closes the SQLite connection and the HTTP clients.

use std::sync::Arc;

use anyhow::Context as _;
use chrono_tz::Tz;
use daywise_calendar::CalendarClient;
use daywise_core::Config;
use daywise_schedule::{ScheduleDocument, ScheduleStore, SqliteScheduleStore, StoreError};
use parking_lot::Mutex;

use crate::calendar::{CalendarBackend, GoogleCalendar};
use crate::model::{ChatCompletionClient, ScheduleModel};

/// Async access to a blocking `ScheduleStore`.
#[derive(Clone)]
pub struct DocumentStore {
    inner: Arc<Mutex<Box<dyn ScheduleStore>>>,
}

impl DocumentStore {
    pub fn new(store: impl ScheduleStore + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(store))),
        }
    }

    pub async fn load(&self, id: &str) -> Result<Option<ScheduleDocument>, StoreError> {
        let store = self.inner.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || store.lock().load(&id))
            .await
            .map_err(|e| StoreError::Other(anyhow::anyhow!("store task failed: {}", e)))?
    }

    pub async fn replace(&self, document: ScheduleDocument) -> Result<(), StoreError> {
        let store = self.inner.clone();
        tokio::task::spawn_blocking(move || store.lock().replace(&document))
            .await
            .map_err(|e| StoreError::Other(anyhow::anyhow!("store task failed: {}", e)))?
    }
}

pub struct ScheduleContext {
    document_id: String,
    store: DocumentStore,
    model: Arc<dyn ScheduleModel>,
    calendar: Arc<dyn CalendarBackend>,
    timezone: Tz,
}

impl ScheduleContext {
    /// Assemble a context from explicit parts. The timezone defaults to UTC.
    pub fn new(
        document_id: impl Into<String>,
        store: DocumentStore,
        model: Arc<dyn ScheduleModel>,
        calendar: Arc<dyn CalendarBackend>,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            store,
            model,
            calendar,
            timezone: chrono_tz::UTC,
        }
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    /// Open the configured SQLite store and build the HTTP clients.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        if let Some(parent) = config.store.database_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }
        let sqlite = SqliteScheduleStore::new(&config.store.database_path).with_context(|| {
            format!(
                "Failed to open schedule store at {}",
                config.store.database_path.display()
            )
        })?;

        let model = ChatCompletionClient::new(&config.model)
            .map_err(|e| anyhow::anyhow!("Failed to build model client: {}", e))?;

        let calendar_client = config
            .calendar
            .resolved_access_token()
            .map(|token| CalendarClient::with_base_url(&token, &config.calendar.base_url));
        if calendar_client.is_none() {
            tracing::debug!("No calendar token; calendar calls will fail with AuthRequired");
        }
        let calendar = GoogleCalendar::new(calendar_client, config.calendar.calendar_id.clone());

        Ok(Self::new(
            config.store.document_id.clone(),
            DocumentStore::new(sqlite),
            Arc::new(model),
            Arc::new(calendar),
        )
        .with_timezone(config.calendar.tz()?))
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    pub fn model(&self) -> &dyn ScheduleModel {
        self.model.as_ref()
    }

    pub fn calendar(&self) -> &dyn CalendarBackend {
        self.calendar.as_ref()
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daywise_schedule::{Schedule, ScheduleEntry};

    #[tokio::test]
    async fn test_document_store_round_trip() {
        let store = DocumentStore::new(SqliteScheduleStore::in_memory().unwrap());
        assert!(store.load("default").await.unwrap().is_none());

        let doc = ScheduleDocument::new(
            "default",
            Schedule::new(vec![ScheduleEntry::new("Gym", "6:00 PM")]),
        );
        store.replace(doc.clone()).await.unwrap();

        assert_eq!(store.load("default").await.unwrap(), Some(doc));
    }

    #[tokio::test]
    async fn test_from_config_uses_configured_paths() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.config_dir = dir.path().to_path_buf();
        config.store.database_path = dir.path().join("daywise.db");
        config.store.document_id = "alice".to_string();
        config.calendar.timezone = "Asia/Tokyo".to_string();

        let ctx = ScheduleContext::from_config(&config).unwrap();

        assert_eq!(ctx.document_id(), "alice");
        assert_eq!(ctx.timezone(), chrono_tz::Asia::Tokyo);
        assert!(config.store.database_path.exists());
    }

    #[test]
    fn test_from_config_rejects_unknown_timezone() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.store.database_path = dir.path().join("daywise.db");
        config.calendar.timezone = "Nowhere/Special".to_string();

        assert!(ScheduleContext::from_config(&config).is_err());
    }
}
