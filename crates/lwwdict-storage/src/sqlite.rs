//! SQLite storage backend

use crate::{Storage, StorageError, StorageStats};
use async_trait::async_trait;
use lwwdict_core::{ReplicaMeta, ReplicaName};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// SQLite storage backend
///
/// Embedded persistence for single-node tools and edge replicas.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Create a new SQLite storage with the given path
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::with_connection(conn)
    }

    /// Create an in-memory SQLite database (for testing)
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS replicas (
                name TEXT PRIMARY KEY,
                meta BLOB NOT NULL,
                data BLOB NOT NULL,
                created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now') * 1000),
                updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now') * 1000)
            );

            CREATE INDEX IF NOT EXISTS idx_replicas_updated_at ON replicas(updated_at);
            "#,
        )
        .map_err(db_err)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn db_err(e: rusqlite::Error) -> StorageError {
    StorageError::Database(e.to_string())
}

/// Escape GLOB metacharacters by wrapping each in a bracket class
fn escape_glob(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '*' | '?' | '[' => {
                out.push('[');
                out.push(c);
                out.push(']');
            }
            _ => out.push(c),
        }
    }
    out
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn store(
        &self,
        name: &ReplicaName,
        meta: &ReplicaMeta,
        data: &[u8],
    ) -> Result<(), StorageError> {
        let meta_bytes = serde_json::to_vec(meta)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let conn = self.conn.lock();

        conn.execute(
            r#"
            INSERT INTO replicas (name, meta, data, updated_at)
            VALUES (?1, ?2, ?3, strftime('%s', 'now') * 1000)
            ON CONFLICT(name) DO UPDATE SET
                meta = excluded.meta,
                data = excluded.data,
                updated_at = excluded.updated_at
            "#,
            params![name.as_str(), meta_bytes, data],
        )
        .map_err(db_err)?;

        Ok(())
    }

    async fn load(
        &self,
        name: &ReplicaName,
    ) -> Result<Option<(ReplicaMeta, Vec<u8>)>, StorageError> {
        let conn = self.conn.lock();

        let result: Option<(Vec<u8>, Vec<u8>)> = conn
            .query_row(
                "SELECT meta, data FROM replicas WHERE name = ?1",
                params![name.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(db_err)?;

        match result {
            Some((meta_bytes, data)) => {
                let meta: ReplicaMeta = serde_json::from_slice(&meta_bytes)
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                Ok(Some((meta, data)))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, name: &ReplicaName) -> Result<bool, StorageError> {
        let conn = self.conn.lock();

        let affected = conn
            .execute("DELETE FROM replicas WHERE name = ?1", params![name.as_str()])
            .map_err(db_err)?;

        Ok(affected > 0)
    }

    async fn list(&self, pattern: Option<&str>) -> Result<Vec<ReplicaName>, StorageError> {
        // GLOB and `=` are case-sensitive, matching ReplicaName equality
        let (sql, arg) = match pattern {
            None | Some("*") => ("SELECT name FROM replicas ORDER BY name", None),
            Some(p) if p.ends_with('*') => (
                "SELECT name FROM replicas WHERE name GLOB ?1 ORDER BY name",
                Some(format!("{}*", escape_glob(p.trim_end_matches('*')))),
            ),
            Some(p) if p.starts_with('*') => (
                "SELECT name FROM replicas WHERE name GLOB ?1 ORDER BY name",
                Some(format!("*{}", escape_glob(p.trim_start_matches('*')))),
            ),
            Some(p) => (
                "SELECT name FROM replicas WHERE name = ?1 ORDER BY name",
                Some(p.to_string()),
            ),
        };

        let conn = self.conn.lock();

        let mut stmt = conn.prepare(sql).map_err(db_err)?;
        let name_of = |row: &rusqlite::Row<'_>| row.get::<_, String>(0);
        let rows = match &arg {
            Some(arg) => stmt.query_map(params![arg], name_of),
            None => stmt.query_map([], name_of),
        }
        .map_err(db_err)?;

        let names: Vec<ReplicaName> = rows
            .filter_map(|r| r.ok())
            .filter_map(|name| ReplicaName::new(name).ok())
            .collect();

        Ok(names)
    }

    async fn exists(&self, name: &ReplicaName) -> Result<bool, StorageError> {
        let conn = self.conn.lock();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM replicas WHERE name = ?1",
                params![name.as_str()],
                |row| row.get(0),
            )
            .map_err(db_err)?;

        Ok(count > 0)
    }

    async fn stats(&self) -> Result<StorageStats, StorageError> {
        let conn = self.conn.lock();

        let replica_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM replicas", [], |row| row.get(0))
            .map_err(db_err)?;

        let total_size: i64 = conn
            .query_row(
                "SELECT COALESCE(SUM(LENGTH(meta) + LENGTH(data)), 0) FROM replicas",
                [],
                |row| row.get(0),
            )
            .map_err(db_err)?;

        Ok(StorageStats {
            replica_count: replica_count as usize,
            total_size_bytes: total_size as usize,
        })
    }
}
