//! Session Store (C2)
//! Mission: durable, transactional home for analysis sessions and their
//! section/execution-log children

mod executions;
mod fixtures;
mod preferences;
mod sections;
mod sessions;

pub use executions::*;
pub use fixtures::*;
pub use preferences::*;
pub use sections::*;
pub use sessions::*;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::sync::Arc;

/// Durable session store backed by SQLite in WAL mode.
///
/// Connections are short-lived (opened per call, like `UserStore`), but
/// multi-statement transactional writes — `finalize_session`
/// and `upsert_agent_status` — are serialized behind a mutex so a crash
/// mid-transaction can't be observed by a concurrent reader.
#[derive(Clone)]
pub struct SessionStore {
    db_path: String,
    write_lock: Arc<Mutex<()>>,
}

impl SessionStore {
    pub fn new(db_path: &str) -> Result<Self> {
        let store = Self {
            db_path: db_path.to_string(),
            write_lock: Arc::new(Mutex::new(())),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path).context("failed to open session store")?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")?;
        Ok(conn)
    }

    /// Cheap liveness check for the health endpoint: open a connection and
    /// run a trivial query.
    pub fn ping(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.query_row("SELECT 1", [], |_| Ok(())).context("health check query failed")?;
        Ok(())
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS analysis_sessions (
                session_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                owner_username TEXT NOT NULL,
                ticker TEXT NOT NULL,
                analysis_date TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                completed_at TEXT,
                final_decision TEXT,
                confidence REAL,
                execution_seconds REAL,
                config_snapshot TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS report_sections (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                section_type TEXT NOT NULL,
                agent_name TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE(session_id, section_type),
                FOREIGN KEY (session_id) REFERENCES analysis_sessions(session_id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS agent_executions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                agent_name TEXT NOT NULL,
                status TEXT NOT NULL,
                started_at TEXT,
                completed_at TEXT,
                execution_seconds REAL,
                error_message TEXT,
                UNIQUE(session_id, agent_name),
                FOREIGN KEY (session_id) REFERENCES analysis_sessions(session_id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS user_preferences (
                user_id TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                category TEXT NOT NULL DEFAULT 'general',
                updated_at TEXT NOT NULL,
                PRIMARY KEY (user_id, key)
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_user ON analysis_sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_sections_session ON report_sections(session_id);
            CREATE INDEX IF NOT EXISTS idx_executions_session ON agent_executions(session_id);
            ",
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    pub(crate) fn test_store() -> (SessionStore, NamedTempFile) {
        let temp = NamedTempFile::new().unwrap();
        let store = SessionStore::new(temp.path().to_str().unwrap()).unwrap();
        (store, temp)
    }

    #[test]
    fn schema_creation_is_idempotent() {
        let (store, _temp) = test_store();
        store.init_schema().unwrap();
        store.init_schema().unwrap();
    }
}
