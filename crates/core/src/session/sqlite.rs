//! SQLite-backed session store.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{SessionError, SessionStore, StoredCookie, StoredSession};

/// Session store persisted in a SQLite database.
pub struct SqliteSessionStore {
    conn: Mutex<Connection>,
}

impl SqliteSessionStore {
    /// Open (or create) the database at `path`.
    pub fn new(path: &Path) -> Result<Self, SessionError> {
        let conn = Connection::open(path).map_err(|e| SessionError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, SessionError> {
        let conn =
            Connection::open_in_memory().map_err(|e| SessionError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), SessionError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                source_id TEXT PRIMARY KEY,
                cookies TEXT NOT NULL,
                token TEXT,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| SessionError::Database(e.to_string()))?;

        Ok(())
    }
}

impl SessionStore for SqliteSessionStore {
    fn load(&self, source_id: &str) -> Result<Option<StoredSession>, SessionError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| SessionError::Database(e.to_string()))?;

        let row: Option<(String, Option<String>, String)> = conn
            .query_row(
                "SELECT cookies, token, updated_at FROM sessions WHERE source_id = ?",
                params![source_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(|e| SessionError::Database(e.to_string()))?;

        let Some((cookies_json, token, updated_at)) = row else {
            return Ok(None);
        };

        let cookies: Vec<StoredCookie> = serde_json::from_str(&cookies_json)
            .map_err(|e| SessionError::Serialization(e.to_string()))?;
        let saved_at = DateTime::parse_from_rfc3339(&updated_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(Some(StoredSession {
            cookies,
            token,
            saved_at,
        }))
    }

    fn save(&self, source_id: &str, session: &StoredSession) -> Result<(), SessionError> {
        let cookies_json = serde_json::to_string(&session.cookies)
            .map_err(|e| SessionError::Serialization(e.to_string()))?;
        let conn = self
            .conn
            .lock()
            .map_err(|e| SessionError::Database(e.to_string()))?;

        conn.execute(
            "INSERT INTO sessions (source_id, cookies, token, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(source_id) DO UPDATE SET
                cookies = excluded.cookies,
                token = excluded.token,
                updated_at = excluded.updated_at",
            params![
                source_id,
                cookies_json,
                session.token,
                session.saved_at.to_rfc3339()
            ],
        )
        .map_err(|e| SessionError::Database(e.to_string()))?;

        Ok(())
    }

    fn clear(&self, source_id: &str) -> Result<(), SessionError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| SessionError::Database(e.to_string()))?;
        conn.execute("DELETE FROM sessions WHERE source_id = ?", params![source_id])
            .map_err(|e| SessionError::Database(e.to_string()))?;
        Ok(())
    }
}
