//! Schedule document storage.
//!
//! One document per tracked user, shaped `{_id, tasks}`. Writes replace the
//! whole document; there are no field-level updates.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use thiserror::Error;

use crate::types::{Schedule, ScheduleDocument};

/// Errors that can occur during document store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database failure (open, query, write).
    #[error("Storage error: {0}")]
    Storage(String),

    /// A stored document could not be decoded.
    #[error("Document {id} is corrupt: {reason}")]
    Corrupt { id: String, reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StoreError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Trait for schedule document backends.
///
/// Implementations don't need to be Sync; callers wrap them in a Mutex.
pub trait ScheduleStore: Send {
    /// Fetch the document with the given `_id`, if any.
    fn load(&self, id: &str) -> StoreResult<Option<ScheduleDocument>>;

    /// Replace the document with the same `_id`, creating it if needed.
    fn replace(&self, document: &ScheduleDocument) -> StoreResult<()>;
}

/// SQLite-based document storage.
pub struct SqliteScheduleStore {
    conn: Connection,
}

impl SqliteScheduleStore {
    /// Open (or create) the store at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store.
    pub fn in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> anyhow::Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schedule_documents (
                id TEXT PRIMARY KEY,
                tasks TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Number of stored documents.
    pub fn count(&self) -> StoreResult<usize> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM schedule_documents", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

impl ScheduleStore for SqliteScheduleStore {
    fn load(&self, id: &str) -> StoreResult<Option<ScheduleDocument>> {
        let tasks_json: Option<String> = self
            .conn
            .query_row(
                "SELECT tasks FROM schedule_documents WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        let Some(tasks_json) = tasks_json else {
            return Ok(None);
        };

        let tasks: Schedule =
            serde_json::from_str(&tasks_json).map_err(|e| StoreError::Corrupt {
                id: id.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Some(ScheduleDocument::new(id, tasks)))
    }

    fn replace(&self, document: &ScheduleDocument) -> StoreResult<()> {
        let tasks_json = serde_json::to_string(&document.tasks)
            .map_err(|e| StoreError::storage(format!("Failed to encode tasks: {}", e)))?;

        self.conn.execute(
            "INSERT INTO schedule_documents (id, tasks, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET tasks = excluded.tasks, updated_at = excluded.updated_at",
            params![document.id, tasks_json, Utc::now().to_rfc3339()],
        )?;

        tracing::debug!(id = %document.id, entries = document.tasks.len(), "Replaced schedule document");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScheduleEntry;

    fn doc(id: &str, entries: &[(&str, &str)]) -> ScheduleDocument {
        ScheduleDocument::new(
            id,
            entries
                .iter()
                .map(|(name, time)| ScheduleEntry::new(*name, *time))
                .collect(),
        )
    }

    #[test]
    fn test_missing_document() {
        let store = SqliteScheduleStore::in_memory().unwrap();
        assert!(store.load("default").unwrap().is_none());
    }

    #[test]
    fn test_replace_then_load() {
        let store = SqliteScheduleStore::in_memory().unwrap();
        let original = doc("default", &[("Write report", "2:00 PM"), ("Gym", "6:00 PM")]);

        store.replace(&original).unwrap();

        assert_eq!(store.load("default").unwrap(), Some(original));
    }

    #[test]
    fn test_replace_discards_previous_entries() {
        let store = SqliteScheduleStore::in_memory().unwrap();
        store
            .replace(&doc("default", &[("Write report", "2:00 PM"), ("Gym", "6:00 PM")]))
            .unwrap();

        let revised = doc("default", &[("Emergency meeting", "2:30 PM - 3:30 PM")]);
        store.replace(&revised).unwrap();

        assert_eq!(store.load("default").unwrap(), Some(revised));
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_documents_are_keyed_by_id() {
        let store = SqliteScheduleStore::in_memory().unwrap();
        store.replace(&doc("alice", &[("Run", "7:00 AM")])).unwrap();
        store.replace(&doc("bob", &[("Swim", "8:00 AM")])).unwrap();

        assert_eq!(store.load("alice").unwrap().unwrap().tasks.entries()[0].name, "Run");
        assert_eq!(store.load("bob").unwrap().unwrap().tasks.entries()[0].name, "Swim");
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_corrupt_document_is_reported() {
        let store = SqliteScheduleStore::in_memory().unwrap();
        store
            .conn
            .execute(
                "INSERT INTO schedule_documents (id, tasks, updated_at) VALUES ('default', 'nope', '')",
                [],
            )
            .unwrap();

        let err = store.load("default").unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { ref id, .. } if id == "default"));
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daywise.db");

        {
            let store = SqliteScheduleStore::new(&path).unwrap();
            store.replace(&doc("default", &[("Gym", "6:00 PM")])).unwrap();
        }

        let reopened = SqliteScheduleStore::new(&path).unwrap();
        let loaded = reopened.load("default").unwrap().unwrap();
        assert_eq!(loaded.tasks.len(), 1);
    }
}
