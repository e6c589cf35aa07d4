//! SQLite-backed metadata store.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{ProviderStore, StatusStore, StoreError};
use crate::provider::ProviderDefinition;
use crate::status::ProviderStatus;

const DEFINITION_COLUMNS: &str = "id, name, implementation, priority, enable_author_search, \
     enable_book_search, enable_automatic_refresh, settings, tags";

const STATUS_COLUMNS: &str = "provider_id, last_successful_query, successful_query_count, \
     failed_query_count, escalation_level, initial_failure, most_recent_failure, disabled_till";

/// Stores provider definitions and status rows in one SQLite database.
pub struct SqliteMetadataStore {
    conn: Mutex<Connection>,
}

impl SqliteMetadataStore {
    /// Open (or create) the database file and its tables.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS providers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                implementation TEXT NOT NULL,
                priority INTEGER NOT NULL,
                enable_author_search INTEGER NOT NULL DEFAULT 0,
                enable_book_search INTEGER NOT NULL DEFAULT 0,
                enable_automatic_refresh INTEGER NOT NULL DEFAULT 0,
                settings TEXT NOT NULL DEFAULT 'null',
                tags TEXT NOT NULL DEFAULT '[]'
            );

            CREATE TABLE IF NOT EXISTS provider_status (
                provider_id INTEGER PRIMARY KEY,
                last_successful_query TEXT,
                successful_query_count INTEGER NOT NULL DEFAULT 0,
                failed_query_count INTEGER NOT NULL DEFAULT 0,
                escalation_level INTEGER NOT NULL DEFAULT 0,
                initial_failure TEXT,
                most_recent_failure TEXT,
                disabled_till TEXT
            );
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Database(format!("connection lock poisoned: {}", e)))
    }

    fn row_to_definition(row: &rusqlite::Row) -> rusqlite::Result<ProviderDefinition> {
        let settings_json: String = row.get(7)?;
        let tags_json: String = row.get(8)?;

        Ok(ProviderDefinition {
            id: row.get(0)?,
            name: row.get(1)?,
            implementation: row.get(2)?,
            priority: row.get(3)?,
            enable_author_search: row.get(4)?,
            enable_book_search: row.get(5)?,
            enable_automatic_refresh: row.get(6)?,
            settings: serde_json::from_str(&settings_json).unwrap_or(serde_json::Value::Null),
            tags: serde_json::from_str(&tags_json).unwrap_or_default(),
            status: None,
        })
    }

    fn row_to_status(row: &rusqlite::Row) -> rusqlite::Result<ProviderStatus> {
        Ok(ProviderStatus {
            provider_id: row.get(0)?,
            last_successful_query: parse_timestamp(row.get(1)?),
            successful_query_count: row.get::<_, i64>(2)?.max(0) as u64,
            failed_query_count: row.get::<_, i64>(3)?.max(0) as u64,
            escalation_level: row.get(4)?,
            initial_failure: parse_timestamp(row.get(5)?),
            most_recent_failure: parse_timestamp(row.get(6)?),
            disabled_till: parse_timestamp(row.get(7)?),
        })
    }
}

fn parse_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    value.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    })
}

fn format_timestamp(value: Option<DateTime<Utc>>) -> Option<String> {
    value.map(|dt| dt.to_rfc3339())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Database(e.to_string()))
}

impl ProviderStore for SqliteMetadataStore {
    fn insert(&self, definition: &ProviderDefinition) -> Result<ProviderDefinition, StoreError> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO providers (name, implementation, priority, enable_author_search, enable_book_search, enable_automatic_refresh, settings, tags) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                definition.name,
                definition.implementation,
                definition.priority,
                definition.enable_author_search,
                definition.enable_book_search,
                definition.enable_automatic_refresh,
                to_json(&definition.settings)?,
                to_json(&definition.tags)?,
            ],
        )?;

        let mut stored = definition.clone();
        stored.id = conn.last_insert_rowid();
        stored.status = None;
        Ok(stored)
    }

    fn update(&self, definition: &ProviderDefinition) -> Result<ProviderDefinition, StoreError> {
        let conn = self.conn()?;

        let changed = conn.execute(
            "UPDATE providers SET name = ?, implementation = ?, priority = ?, enable_author_search = ?, enable_book_search = ?, enable_automatic_refresh = ?, settings = ?, tags = ? WHERE id = ?",
            params![
                definition.name,
                definition.implementation,
                definition.priority,
                definition.enable_author_search,
                definition.enable_book_search,
                definition.enable_automatic_refresh,
                to_json(&definition.settings)?,
                to_json(&definition.tags)?,
                definition.id,
            ],
        )?;

        if changed == 0 {
            return Err(StoreError::NotFound(definition.id));
        }

        let mut stored = definition.clone();
        stored.status = None;
        Ok(stored)
    }

    fn delete(&self, id: i64) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let changed = tx.execute("DELETE FROM providers WHERE id = ?", params![id])?;
        if changed == 0 {
            return Err(StoreError::NotFound(id));
        }
        tx.execute(
            "DELETE FROM provider_status WHERE provider_id = ?",
            params![id],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn find_by_id(&self, id: i64) -> Result<Option<ProviderDefinition>, StoreError> {
        let conn = self.conn()?;

        let definition = conn
            .query_row(
                &format!("SELECT {} FROM providers WHERE id = ?", DEFINITION_COLUMNS),
                params![id],
                Self::row_to_definition,
            )
            .optional()?;
        Ok(definition)
    }

    fn all(&self) -> Result<Vec<ProviderDefinition>, StoreError> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM providers ORDER BY id",
            DEFINITION_COLUMNS
        ))?;
        let definitions = stmt
            .query_map([], Self::row_to_definition)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(definitions)
    }
}

impl StatusStore for SqliteMetadataStore {
    fn find_by_provider(&self, provider_id: i64) -> Result<Option<ProviderStatus>, StoreError> {
        let conn = self.conn()?;

        let status = conn
            .query_row(
                &format!(
                    "SELECT {} FROM provider_status WHERE provider_id = ?",
                    STATUS_COLUMNS
                ),
                params![provider_id],
                Self::row_to_status,
            )
            .optional()?;
        Ok(status)
    }

    fn all(&self) -> Result<Vec<ProviderStatus>, StoreError> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM provider_status ORDER BY provider_id",
            STATUS_COLUMNS
        ))?;
        let statuses = stmt
            .query_map([], Self::row_to_status)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(statuses)
    }

    fn upsert(&self, status: &ProviderStatus) -> Result<(), StoreError> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO provider_status (provider_id, last_successful_query, successful_query_count, failed_query_count, escalation_level, initial_failure, most_recent_failure, disabled_till)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(provider_id) DO UPDATE SET
                last_successful_query = excluded.last_successful_query,
                successful_query_count = excluded.successful_query_count,
                failed_query_count = excluded.failed_query_count,
                escalation_level = excluded.escalation_level,
                initial_failure = excluded.initial_failure,
                most_recent_failure = excluded.most_recent_failure,
                disabled_till = excluded.disabled_till
            "#,
            params![
                status.provider_id,
                format_timestamp(status.last_successful_query),
                status.successful_query_count as i64,
                status.failed_query_count as i64,
                status.escalation_level,
                format_timestamp(status.initial_failure),
                format_timestamp(status.most_recent_failure),
                format_timestamp(status.disabled_till),
            ],
        )?;
        Ok(())
    }

    fn delete_by_provider(&self, provider_id: i64) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM provider_status WHERE provider_id = ?",
            params![provider_id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    fn open_library() -> ProviderDefinition {
        ProviderDefinition::new("Open Library", "OpenLibrary")
            .with_priority(60)
            .with_settings(serde_json::json!({"requests_per_minute": 30}))
    }

    #[test]
    fn test_insert_assigns_id_and_roundtrips() {
        let store = SqliteMetadataStore::in_memory().unwrap();
        let mut def = open_library();
        def.tags = vec!["primary".to_string()];

        let stored = store.insert(&def).unwrap();
        assert!(stored.id > 0);

        let found = store.find_by_id(stored.id).unwrap().unwrap();
        assert_eq!(found, stored);
        assert_eq!(found.settings["requests_per_minute"], 30);
        assert_eq!(found.tags, vec!["primary".to_string()]);
    }

    #[test]
    fn test_all_in_insertion_order() {
        let store = SqliteMetadataStore::in_memory().unwrap();
        store.insert(&ProviderDefinition::new("B", "Mock")).unwrap();
        store.insert(&ProviderDefinition::new("A", "Mock")).unwrap();

        let names: Vec<_> = ProviderStore::all(&store)
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["B", "A"]);
    }

    #[test]
    fn test_update_missing_is_not_found() {
        let store = SqliteMetadataStore::in_memory().unwrap();
        let mut def = open_library();
        def.id = 42;
        assert!(matches!(store.update(&def), Err(StoreError::NotFound(42))));
    }

    #[test]
    fn test_update_changes_fields() {
        let store = SqliteMetadataStore::in_memory().unwrap();
        let mut stored = store.insert(&open_library()).unwrap();
        stored.priority = 90;
        stored.enable_automatic_refresh = false;
        store.update(&stored).unwrap();

        let found = store.find_by_id(stored.id).unwrap().unwrap();
        assert_eq!(found.priority, 90);
        assert!(!found.enable_automatic_refresh);
    }

    #[test]
    fn test_delete_removes_status_row() {
        let store = SqliteMetadataStore::in_memory().unwrap();
        let stored = store.insert(&open_library()).unwrap();
        let failed = ProviderStatus::new(stored.id).with_failure(Utc::now(), Duration::from_secs(60));
        store.upsert(&failed).unwrap();

        store.delete(stored.id).unwrap();

        assert!(store.find_by_id(stored.id).unwrap().is_none());
        assert!(store.find_by_provider(stored.id).unwrap().is_none());
        assert!(matches!(store.delete(stored.id), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_status_upsert_replaces() {
        let store = SqliteMetadataStore::in_memory().unwrap();
        let now = Utc::now();

        let failed = ProviderStatus::new(7).with_failure(now, Duration::from_secs(60));
        store.upsert(&failed).unwrap();
        let recovered = failed.with_success(now);
        store.upsert(&recovered).unwrap();

        let all = StatusStore::all(&store).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].escalation_level, 0);
        assert_eq!(all[0].failed_query_count, 1);
        assert_eq!(all[0].successful_query_count, 1);
        assert!(all[0].disabled_till.is_none());
    }

    #[test]
    fn test_timestamps_survive_roundtrip() {
        let store = SqliteMetadataStore::in_memory().unwrap();
        let now = Utc::now();
        let status = ProviderStatus::new(1).with_failure(now, Duration::from_secs(300));
        store.upsert(&status).unwrap();

        let found = store.find_by_provider(1).unwrap().unwrap();
        assert_eq!(found, status);
    }

    #[test]
    fn test_persists_to_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bookshelf.db");

        let id = {
            let store = SqliteMetadataStore::new(&path).unwrap();
            store.insert(&open_library()).unwrap().id
        };

        let store = SqliteMetadataStore::new(&path).unwrap();
        assert_eq!(store.find_by_id(id).unwrap().unwrap().name, "Open Library");
    }
}
