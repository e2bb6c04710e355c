//! SQLite-backed store implementation.

use super::traits::{StoreBackend, StoreEntry};
use crate::error::{Result, ScoutError};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// SQLite-based store backend.
///
/// One shared database holds all namespaces. Thread-safe via an internal
/// mutex on the connection; WAL mode keeps concurrent readers cheap.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) a store at the given database path.
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ScoutError::Io {
                message: format!("Failed to create store directory: {}", e),
                path: Some(parent.to_path_buf()),
                source: Some(e),
            })?;
        }

        let conn = Connection::open(db_path).map_err(|e| ScoutError::Database {
            message: format!("Failed to open store database: {}", e),
            source: Some(e),
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| ScoutError::Database {
                message: format!("Failed to set pragmas: {}", e),
                source: Some(e),
            })?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// In-memory store for tests and ephemeral runs.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| ScoutError::Database {
            message: format!("Failed to open in-memory store: {}", e),
            source: Some(e),
        })?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS store_entries (
                namespace TEXT NOT NULL,
                key TEXT NOT NULL,
                value BLOB NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                PRIMARY KEY (namespace, key)
            );

            CREATE INDEX IF NOT EXISTS idx_store_expires
                ON store_entries(namespace, expires_at);
            "#,
        )
        .map_err(|e| ScoutError::Database {
            message: format!("Failed to initialize store schema: {}", e),
            source: Some(e),
        })?;
        Ok(())
    }

    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| ScoutError::Database {
            message: format!("Failed to lock database: {}", e),
            source: None,
        })
    }

    fn expiry_for(ttl: Duration) -> String {
        (Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_default()).to_rfc3339()
    }
}

impl StoreBackend for SqliteStore {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>> {
        self.get_entry(namespace, key)
            .map(|opt| opt.map(|e| e.value))
    }

    fn get_entry(&self, namespace: &str, key: &str) -> Result<Option<StoreEntry>> {
        let conn = self.lock_conn()?;
        let now = Utc::now();
        let now_str = now.to_rfc3339();

        let row: Option<(Vec<u8>, String, String)> = conn
            .query_row(
                r#"
                SELECT value, created_at, expires_at
                FROM store_entries
                WHERE namespace = ?1 AND key = ?2 AND expires_at > ?3
                "#,
                params![namespace, key, now_str],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(|e| ScoutError::Database {
                message: format!("Failed to query store entry: {}", e),
                source: Some(e),
            })?;

        Ok(row.map(|(value, created_str, expires_str)| StoreEntry {
            value,
            created_at: DateTime::parse_from_rfc3339(&created_str)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or(now),
            expires_at: DateTime::parse_from_rfc3339(&expires_str)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or(now),
        }))
    }

    fn set(&self, namespace: &str, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let conn = self.lock_conn()?;
        let now = Utc::now().to_rfc3339();
        let expires = Self::expiry_for(ttl);

        conn.execute(
            r#"
            INSERT OR REPLACE INTO store_entries
            (namespace, key, value, created_at, expires_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![namespace, key, value, now, expires],
        )
        .map_err(|e| ScoutError::Database {
            message: format!("Failed to set store entry: {}", e),
            source: Some(e),
        })?;

        Ok(())
    }

    fn register_if_absent(
        &self,
        namespace: &str,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<bool> {
        let conn = self.lock_conn()?;
        let now = Utc::now().to_rfc3339();
        let expires = Self::expiry_for(ttl);

        // Single upsert: inserts when absent, steals the slot only when the
        // existing entry has expired. Changed-row count tells us who won.
        let changed = conn
            .execute(
                r#"
                INSERT INTO store_entries (namespace, key, value, created_at, expires_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(namespace, key) DO UPDATE SET
                    value = excluded.value,
                    created_at = excluded.created_at,
                    expires_at = excluded.expires_at
                WHERE store_entries.expires_at <= ?4
                "#,
                params![namespace, key, value, now, expires],
            )
            .map_err(|e| ScoutError::Database {
                message: format!("Failed to register store entry: {}", e),
                source: Some(e),
            })?;

        Ok(changed > 0)
    }

    fn invalidate(&self, namespace: &str, key: &str) -> Result<bool> {
        let conn = self.lock_conn()?;
        let deleted = conn
            .execute(
                "DELETE FROM store_entries WHERE namespace = ?1 AND key = ?2",
                params![namespace, key],
            )
            .map_err(|e| ScoutError::Database {
                message: format!("Failed to invalidate store entry: {}", e),
                source: Some(e),
            })?;
        Ok(deleted > 0)
    }

    fn is_live(&self, namespace: &str, key: &str) -> Result<bool> {
        let conn = self.lock_conn()?;
        let now = Utc::now().to_rfc3339();

        let exists: bool = conn
            .query_row(
                r#"
                SELECT 1 FROM store_entries
                WHERE namespace = ?1 AND key = ?2 AND expires_at > ?3
                LIMIT 1
                "#,
                params![namespace, key, now],
                |_| Ok(true),
            )
            .optional()
            .map_err(|e| ScoutError::Database {
                message: format!("Failed to check store entry: {}", e),
                source: Some(e),
            })?
            .unwrap_or(false);

        Ok(exists)
    }

    fn cleanup_expired(&self) -> Result<usize> {
        let conn = self.lock_conn()?;
        let now = Utc::now().to_rfc3339();

        let deleted = conn
            .execute(
                "DELETE FROM store_entries WHERE expires_at <= ?1",
                params![now],
            )
            .map_err(|e| ScoutError::Database {
                message: format!("Failed to cleanup expired entries: {}", e),
                source: Some(e),
            })?;

        if deleted > 0 {
            debug!("Cleaned up {} expired store entries", deleted);
        }

        Ok(deleted)
    }

    fn export_namespace(&self, namespace: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let conn = self.lock_conn()?;
        let now = Utc::now().to_rfc3339();

        let mut stmt = conn
            .prepare(
                r#"
                SELECT key, value FROM store_entries
                WHERE namespace = ?1 AND expires_at > ?2
                ORDER BY key
                "#,
            )
            .map_err(|e| ScoutError::Database {
                message: format!("Failed to prepare export query: {}", e),
                source: Some(e),
            })?;

        let rows: Vec<(String, Vec<u8>)> = stmt
            .query_map(params![namespace, now], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .map_err(|e| ScoutError::Database {
                message: format!("Failed to export namespace: {}", e),
                source: Some(e),
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (TempDir, SqliteStore) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test_store.sqlite");
        let store = SqliteStore::new(&db_path).unwrap();
        (temp_dir, store)
    }

    #[test]
    fn test_set_and_get() {
        let (_temp, store) = create_test_store();

        store
            .set("resolutions", "key1", b"hello world", Duration::from_secs(3600))
            .unwrap();

        let value = store.get("resolutions", "key1").unwrap();
        assert_eq!(value.unwrap(), b"hello world");
    }

    #[test]
    fn test_expired_entry_is_absent() {
        let (_temp, store) = create_test_store();

        store
            .set("stage-cache", "stale", b"old data", Duration::ZERO)
            .unwrap();

        assert!(store.get("stage-cache", "stale").unwrap().is_none());
        assert!(!store.is_live("stage-cache", "stale").unwrap());
    }

    #[test]
    fn test_register_if_absent_wins_once() {
        let (_temp, store) = create_test_store();

        let first = store
            .register_if_absent("jobs", "/models/a.safetensors", b"job-1", Duration::from_secs(60))
            .unwrap();
        let second = store
            .register_if_absent("jobs", "/models/a.safetensors", b"job-2", Duration::from_secs(60))
            .unwrap();

        assert!(first);
        assert!(!second);
        // Loser did not overwrite the winner's registration
        assert_eq!(store.get("jobs", "/models/a.safetensors").unwrap().unwrap(), b"job-1");
    }

    #[test]
    fn test_register_if_absent_steals_expired_slot() {
        let (_temp, store) = create_test_store();

        store
            .set("jobs", "path", b"dead", Duration::ZERO)
            .unwrap();

        let won = store
            .register_if_absent("jobs", "path", b"alive", Duration::from_secs(60))
            .unwrap();
        assert!(won);
        assert_eq!(store.get("jobs", "path").unwrap().unwrap(), b"alive");
    }

    #[test]
    fn test_invalidate() {
        let (_temp, store) = create_test_store();

        store
            .set("ns", "key1", b"data", Duration::from_secs(3600))
            .unwrap();
        assert!(store.invalidate("ns", "key1").unwrap());
        assert!(store.get("ns", "key1").unwrap().is_none());
        assert!(!store.invalidate("ns", "key1").unwrap());
    }

    #[test]
    fn test_namespace_isolation() {
        let (_temp, store) = create_test_store();

        store
            .set("ns1", "shared", b"value1", Duration::from_secs(3600))
            .unwrap();
        store
            .set("ns2", "shared", b"value2", Duration::from_secs(3600))
            .unwrap();

        assert_eq!(store.get("ns1", "shared").unwrap().unwrap(), b"value1");
        assert_eq!(store.get("ns2", "shared").unwrap().unwrap(), b"value2");
    }

    #[test]
    fn test_cleanup_expired() {
        let (_temp, store) = create_test_store();

        store.set("ns", "old1", b"x", Duration::ZERO).unwrap();
        store.set("ns", "old2", b"x", Duration::ZERO).unwrap();
        store.set("ns", "new1", b"x", Duration::from_secs(3600)).unwrap();

        let cleaned = store.cleanup_expired().unwrap();
        assert_eq!(cleaned, 2);
        assert!(store.is_live("ns", "new1").unwrap());
    }

    #[test]
    fn test_export_skips_expired() {
        let (_temp, store) = create_test_store();

        store.set("jobs", "b", b"2", Duration::from_secs(3600)).unwrap();
        store.set("jobs", "a", b"1", Duration::from_secs(3600)).unwrap();
        store.set("jobs", "dead", b"0", Duration::ZERO).unwrap();

        let exported = store.export_namespace("jobs").unwrap();
        assert_eq!(exported.len(), 2);
        assert_eq!(exported[0].0, "a");
        assert_eq!(exported[1].0, "b");
    }
}
