//! Persistence of per-source sessions (cookies and tokens) between searches.

mod sqlite;

pub use sqlite::SqliteSessionStore;

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A cookie as persisted in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCookie {
    pub domain: String,
    pub name: String,
    pub value: String,
    #[serde(default = "default_path")]
    pub path: String,
    /// Sent only to the exact host it was received from.
    #[serde(default)]
    pub host_only: bool,
    #[serde(default)]
    pub secure: bool,
    /// `None` for cookies that live until the end of the session.
    #[serde(default)]
    pub expires: Option<DateTime<Utc>>,
}

fn default_path() -> String {
    "/".to_string()
}

impl StoredCookie {
    /// A session cookie valid for `domain` and its subdomains on every path.
    pub fn new(domain: impl Into<String>, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            name: name.into(),
            value: value.into(),
            path: default_path(),
            host_only: false,
            secure: false,
            expires: None,
        }
    }
}

/// Session state of one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    pub cookies: Vec<StoredCookie>,
    pub token: Option<String>,
    pub saved_at: DateTime<Utc>,
}

impl StoredSession {
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty() && self.token.is_none()
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Keyed store of source sessions.
pub trait SessionStore: Send + Sync {
    fn load(&self, source_id: &str) -> Result<Option<StoredSession>, SessionError>;

    fn save(&self, source_id: &str, session: &StoredSession) -> Result<(), SessionError>;

    fn clear(&self, source_id: &str) -> Result<(), SessionError>;
}

/// Process-local session store.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, StoredSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self, source_id: &str) -> Result<Option<StoredSession>, SessionError> {
        let sessions = self
            .sessions
            .read()
            .map_err(|e| SessionError::Database(e.to_string()))?;
        Ok(sessions.get(source_id).cloned())
    }

    fn save(&self, source_id: &str, session: &StoredSession) -> Result<(), SessionError> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|e| SessionError::Database(e.to_string()))?;
        sessions.insert(source_id.to_string(), session.clone());
        Ok(())
    }

    fn clear(&self, source_id: &str) -> Result<(), SessionError> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|e| SessionError::Database(e.to_string()))?;
        sessions.remove(source_id);
        Ok(())
    }
}
