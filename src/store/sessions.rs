//! Session lifecycle operations: create, finalize, list, fetch, delete.

use super::SessionStore;
use crate::error::AppError;
use crate::models::{AnalysisSession, Decision, SessionStatus, SessionSummary};
use chrono::{NaiveDate, Utc};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

/// Max rows a single `list_sessions` call may return (spec.md §6, list endpoint).
pub const MAX_LIST_LIMIT: u32 = 100;
pub const DEFAULT_LIST_LIMIT: u32 = 20;

/// Optional narrowing for `list_sessions`. `limit` is clamped to
/// [`MAX_LIST_LIMIT`] regardless of the caller-supplied value.
#[derive(Debug, Clone, Default)]
pub struct SessionListFilter {
    pub ticker: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub limit: u32,
}

impl SessionListFilter {
    pub fn new() -> Self {
        Self { limit: DEFAULT_LIST_LIMIT, ..Default::default() }
    }
}

impl SessionStore {
    /// Create a new `running` session for `(user, ticker, analysis_date)`.
    pub fn create_session(
        &self,
        user_id: Uuid,
        owner_username: &str,
        ticker: &str,
        analysis_date: NaiveDate,
        config_snapshot: serde_json::Value,
    ) -> Result<AnalysisSession, AppError> {
        let session = AnalysisSession {
            session_id: Uuid::new_v4(),
            user_id,
            owner_username: owner_username.to_string(),
            ticker: ticker.to_string(),
            analysis_date,
            status: SessionStatus::Running,
            created_at: Utc::now(),
            completed_at: None,
            final_decision: None,
            confidence: None,
            execution_seconds: None,
            config_snapshot,
        };

        let conn = self.conn().map_err(AppError::internal)?;
        conn.execute(
            "INSERT INTO analysis_sessions
             (session_id, user_id, owner_username, ticker, analysis_date, status,
              created_at, completed_at, final_decision, confidence, execution_seconds, config_snapshot)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, NULL, NULL, NULL, ?8)",
            params![
                session.session_id.to_string(),
                session.user_id.to_string(),
                session.owner_username,
                session.ticker,
                session.analysis_date.to_string(),
                session.status.as_str(),
                session.created_at.to_rfc3339(),
                session.config_snapshot.to_string(),
            ],
        )
        .map_err(AppError::internal)?;

        Ok(session)
    }

    /// Write-once terminal transition. Fails with `InvalidTransition` if the
    /// session is already in a terminal state.
    pub fn finalize_session(
        &self,
        session_id: Uuid,
        status: SessionStatus,
        final_decision: Option<Decision>,
        confidence: Option<f64>,
        execution_seconds: f64,
    ) -> Result<(), AppError> {
        if !status.is_terminal() {
            return Err(AppError::InvalidArgument(
                "finalize_session requires a terminal status".into(),
            ));
        }

        let _guard = self.write_lock.lock();
        let conn = self.conn().map_err(AppError::internal)?;

        let current: Option<String> = conn
            .query_row(
                "SELECT status FROM analysis_sessions WHERE session_id = ?1",
                params![session_id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(AppError::internal)?;

        let Some(current) = current else {
            return Err(AppError::NotFound(format!("session {session_id}")));
        };

        let current_status = SessionStatus::from_str(&current)
            .ok_or_else(|| AppError::internal("corrupt session status"))?;
        if current_status.is_terminal() {
            return Err(AppError::InvalidTransition(format!(
                "session {session_id} is already {}",
                current_status.as_str()
            )));
        }

        conn.execute(
            "UPDATE analysis_sessions
             SET status = ?1, completed_at = ?2, final_decision = ?3, confidence = ?4, execution_seconds = ?5
             WHERE session_id = ?6",
            params![
                status.as_str(),
                Utc::now().to_rfc3339(),
                final_decision.map(|d| d.as_str().to_string()),
                confidence,
                execution_seconds,
                session_id.to_string(),
            ],
        )
        .map_err(AppError::internal)?;

        Ok(())
    }

    pub fn get_session(&self, session_id: Uuid) -> Result<AnalysisSession, AppError> {
        let conn = self.conn().map_err(AppError::internal)?;
        conn.query_row(
            "SELECT session_id, user_id, owner_username, ticker, analysis_date, status,
                    created_at, completed_at, final_decision, confidence, execution_seconds, config_snapshot
             FROM analysis_sessions WHERE session_id = ?1",
            params![session_id.to_string()],
            row_to_session,
        )
        .optional()
        .map_err(AppError::internal)?
        .ok_or_else(|| AppError::NotFound(format!("session {session_id}")))
    }

    /// List sessions owned by `user_id`, ordered by `analysis_date desc,
    /// created_at desc` (spec.md §4.2), optionally narrowed by ticker and/or
    /// analysis-date range and capped at `limit` (caller is responsible for
    /// clamping `limit` to the documented max).
    pub fn list_sessions(&self, user_id: Uuid, filter: &SessionListFilter) -> Result<Vec<SessionSummary>, AppError> {
        let conn = self.conn().map_err(AppError::internal)?;

        let mut sql = String::from(
            "SELECT session_id, user_id, owner_username, ticker, analysis_date, status,
                    created_at, completed_at, final_decision, confidence, execution_seconds, config_snapshot
             FROM analysis_sessions WHERE user_id = ?1",
        );
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(user_id.to_string())];

        if let Some(ticker) = &filter.ticker {
            sql.push_str(&format!(" AND ticker = ?{}", args.len() + 1));
            args.push(Box::new(ticker.clone()));
        }
        if let Some(start_date) = &filter.start_date {
            sql.push_str(&format!(" AND analysis_date >= ?{}", args.len() + 1));
            args.push(Box::new(start_date.to_string()));
        }
        if let Some(end_date) = &filter.end_date {
            sql.push_str(&format!(" AND analysis_date <= ?{}", args.len() + 1));
            args.push(Box::new(end_date.to_string()));
        }
        sql.push_str(&format!(" ORDER BY analysis_date DESC, created_at DESC LIMIT ?{}", args.len() + 1));
        args.push(Box::new(filter.limit.min(MAX_LIST_LIMIT) as i64));

        let mut stmt = conn.prepare(&sql).map_err(AppError::internal)?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = args.iter().map(|b| b.as_ref()).collect();

        let sessions = stmt
            .query_map(param_refs.as_slice(), row_to_session)
            .map_err(AppError::internal)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(AppError::internal)?;

        Ok(sessions.iter().map(SessionSummary::from).collect())
    }

    /// Delete a session and cascade its sections/executions. Caller must have
    /// already checked ownership; this only confirms existence.
    pub fn delete_session(&self, session_id: Uuid, requester: Uuid) -> Result<(), AppError> {
        let session = self.get_session(session_id)?;
        if session.user_id != requester {
            return Err(AppError::Forbidden);
        }

        let conn = self.conn().map_err(AppError::internal)?;
        conn.execute(
            "DELETE FROM analysis_sessions WHERE session_id = ?1",
            params![session_id.to_string()],
        )
        .map_err(AppError::internal)?;
        Ok(())
    }
}

fn row_to_session(row: &rusqlite::Row) -> rusqlite::Result<AnalysisSession> {
    let status_str: String = row.get(5)?;
    let decision_str: Option<String> = row.get(8)?;
    let config_str: String = row.get(11)?;

    Ok(AnalysisSession {
        session_id: parse_uuid(row, 0)?,
        user_id: parse_uuid(row, 1)?,
        owner_username: row.get(2)?,
        ticker: row.get(3)?,
        analysis_date: row
            .get::<_, String>(4)?
            .parse()
            .unwrap_or_else(|_| Utc::now().date_naive()),
        status: SessionStatus::from_str(&status_str).unwrap_or(SessionStatus::Failed),
        created_at: parse_dt(row, 6)?,
        completed_at: row
            .get::<_, Option<String>>(7)?
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc)),
        final_decision: decision_str.and_then(|s| Decision::from_str(&s)),
        confidence: row.get(9)?,
        execution_seconds: row.get(10)?,
        config_snapshot: serde_json::from_str(&config_str).unwrap_or(serde_json::Value::Null),
    })
}

fn parse_uuid(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Uuid> {
    let s: String = row.get(idx)?;
    Uuid::parse_str(&s)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

fn parse_dt(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<chrono::DateTime<Utc>> {
    let s: String = row.get(idx)?;
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::super::tests::test_store;
    use super::*;

    #[test]
    fn create_then_finalize_then_get() {
        let (store, _temp) = test_store();
        let user_id = Uuid::new_v4();
        let session = store
            .create_session(user_id, "alice", "AAPL", Utc::now().date_naive(), serde_json::json!({}))
            .unwrap();
        assert_eq!(session.status, SessionStatus::Running);

        store
            .finalize_session(session.session_id, SessionStatus::Completed, Some(Decision::Buy), Some(0.8), 12.5)
            .unwrap();

        let fetched = store.get_session(session.session_id).unwrap();
        assert_eq!(fetched.status, SessionStatus::Completed);
        assert_eq!(fetched.final_decision, Some(Decision::Buy));
    }

    #[test]
    fn finalize_twice_is_invalid_transition() {
        let (store, _temp) = test_store();
        let user_id = Uuid::new_v4();
        let session = store
            .create_session(user_id, "alice", "AAPL", Utc::now().date_naive(), serde_json::json!({}))
            .unwrap();

        store
            .finalize_session(session.session_id, SessionStatus::Completed, Some(Decision::Hold), Some(0.5), 1.0)
            .unwrap();

        let second = store.finalize_session(session.session_id, SessionStatus::Failed, None, None, 1.0);
        assert!(matches!(second, Err(AppError::InvalidTransition(_))));
    }

    #[test]
    fn delete_requires_ownership() {
        let (store, _temp) = test_store();
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();
        let session = store
            .create_session(owner, "alice", "AAPL", Utc::now().date_naive(), serde_json::json!({}))
            .unwrap();

        let result = store.delete_session(session.session_id, other);
        assert!(matches!(result, Err(AppError::Forbidden)));

        store.delete_session(session.session_id, owner).unwrap();
        assert!(matches!(store.get_session(session.session_id), Err(AppError::NotFound(_))));
    }

    #[test]
    fn list_sessions_orders_most_recent_first() {
        let (store, _temp) = test_store();
        let user_id = Uuid::new_v4();
        let first = store
            .create_session(user_id, "alice", "AAPL", Utc::now().date_naive(), serde_json::json!({}))
            .unwrap();
        let second = store
            .create_session(user_id, "alice", "MSFT", Utc::now().date_naive(), serde_json::json!({}))
            .unwrap();

        let list = store.list_sessions(user_id, &SessionListFilter::new()).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].session_id, second.session_id);
        assert_eq!(list[1].session_id, first.session_id);
    }

    #[test]
    fn list_sessions_orders_by_analysis_date_over_creation_order() {
        let (store, _temp) = test_store();
        let user_id = Uuid::new_v4();
        let today = Utc::now().date_naive();
        let last_week = today - chrono::Duration::days(7);

        // A backdated re-run submitted after the newer analysis still lists
        // behind it: analysis_date desc wins over created_at desc.
        let newer = store.create_session(user_id, "alice", "AAPL", today, serde_json::json!({})).unwrap();
        let backdated = store.create_session(user_id, "alice", "AAPL", last_week, serde_json::json!({})).unwrap();

        let list = store.list_sessions(user_id, &SessionListFilter::new()).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].session_id, newer.session_id);
        assert_eq!(list[1].session_id, backdated.session_id);
    }

    #[test]
    fn list_sessions_filters_by_ticker_and_respects_limit() {
        let (store, _temp) = test_store();
        let user_id = Uuid::new_v4();
        store.create_session(user_id, "alice", "AAPL", Utc::now().date_naive(), serde_json::json!({})).unwrap();
        store.create_session(user_id, "alice", "MSFT", Utc::now().date_naive(), serde_json::json!({})).unwrap();
        store.create_session(user_id, "alice", "AAPL", Utc::now().date_naive(), serde_json::json!({})).unwrap();

        let filter = SessionListFilter { ticker: Some("AAPL".to_string()), limit: DEFAULT_LIST_LIMIT, ..Default::default() };
        let list = store.list_sessions(user_id, &filter).unwrap();
        assert_eq!(list.len(), 2);
        assert!(list.iter().all(|s| s.ticker == "AAPL"));

        let capped = store.list_sessions(user_id, &SessionListFilter { limit: 1, ..Default::default() }).unwrap();
        assert_eq!(capped.len(), 1);

        let over_max = store.list_sessions(user_id, &SessionListFilter { limit: MAX_LIST_LIMIT + 50, ..Default::default() }).unwrap();
        assert_eq!(over_max.len(), 3);
    }
}
