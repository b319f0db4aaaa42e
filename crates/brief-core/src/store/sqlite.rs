//! `SQLite`-backed key-value store

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};

use super::{check_quota, KeyValueStore};
use crate::error::{Error, Result};

/// Persistent store keeping every key in one `kv` table.
///
/// Each `set` is a single upsert statement, so a crash leaves either the old
/// or the new value for that key, never a mix.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    quota_bytes: Option<usize>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SqliteStore")
            .field("quota_bytes", &self.quota_bytes)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open a store at the given path, creating it if it doesn't exist
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|error| Error::Storage(error.to_string()))?;
            }
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory store (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Refuse writes that would grow keys + values beyond `quota_bytes`
    #[must_use]
    pub const fn with_quota(mut self, quota_bytes: usize) -> Self {
        self.quota_bytes = Some(quota_bytes);
        self
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            quota_bytes: None,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|error| Error::Storage(error.to_string()))
    }

    fn bytes_used_except(conn: &Connection, key: &str) -> Result<usize> {
        let used: i64 = conn.query_row(
            "SELECT COALESCE(SUM(LENGTH(CAST(key AS BLOB)) + LENGTH(CAST(value AS BLOB))), 0)
             FROM kv WHERE key != ?1",
            params![key],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(used).unwrap_or(usize::MAX))
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        let value = conn
            .query_row(
                "SELECT value FROM kv WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.lock()?;
        if self.quota_bytes.is_some() {
            let used = Self::bytes_used_except(&conn, key)?;
            check_quota(key, self.quota_bytes, used, key.len() + value.len())?;
        }
        conn.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, crate::util::unix_millis_now()],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("brief.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.set("history", "[]").unwrap();
            store.set("history", "[1]").unwrap();
        }

        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.get("history").unwrap().as_deref(), Some("[1]"));
    }

    #[test]
    fn remove_deletes_key() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.set("k", "v").unwrap();
        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[test]
    fn quota_exceeded_is_surfaced() {
        let store = SqliteStore::open_in_memory().unwrap().with_quota(16);
        store.set("a", "12345").unwrap();

        let error = store.set("b", "1234567890").unwrap_err();
        assert!(matches!(error, Error::QuotaExceeded { ref key, .. } if key == "b"));
        assert_eq!(store.get("b").unwrap(), None);
        assert_eq!(store.get("a").unwrap().as_deref(), Some("12345"));
    }
}
