//! Per-agent execution status tracking.

use super::SessionStore;
use crate::error::AppError;
use crate::models::{AgentExecution, AgentExecutionStatus};
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

impl SessionStore {
    /// Upsert the status row for `(session_id, agent_name)`. The first
    /// transition to `Running` stamps `started_at`; the first transition to
    /// a terminal status stamps `completed_at` and `execution_seconds`.
    pub fn upsert_agent_status(
        &self,
        session_id: Uuid,
        agent_name: &str,
        status: AgentExecutionStatus,
        error_message: Option<&str>,
    ) -> Result<(), AppError> {
        let _guard = self.write_lock.lock();
        let conn = self.conn().map_err(AppError::internal)?;

        let existing: Option<(String, Option<String>)> = conn
            .query_row(
                "SELECT status, started_at FROM agent_executions WHERE session_id = ?1 AND agent_name = ?2",
                params![session_id.to_string(), agent_name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(AppError::internal)?;

        let now = Utc::now().to_rfc3339();
        let started_at = match &existing {
            Some((_, Some(started))) => started.clone(),
            _ => now.clone(),
        };

        let is_terminal = matches!(
            status,
            AgentExecutionStatus::Completed | AgentExecutionStatus::Failed
        );
        let completed_at = if is_terminal { Some(now.clone()) } else { None };
        let execution_seconds = completed_at.as_ref().map(|_| {
            let start = chrono::DateTime::parse_from_rfc3339(&started_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now());
            (Utc::now() - start).num_milliseconds() as f64 / 1000.0
        });

        conn.execute(
            "INSERT INTO agent_executions (session_id, agent_name, status, started_at, completed_at, execution_seconds, error_message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(session_id, agent_name) DO UPDATE SET
                status = excluded.status,
                started_at = COALESCE(agent_executions.started_at, excluded.started_at),
                completed_at = excluded.completed_at,
                execution_seconds = excluded.execution_seconds,
                error_message = excluded.error_message",
            params![
                session_id.to_string(),
                agent_name,
                status.as_str(),
                started_at,
                completed_at,
                execution_seconds,
                error_message,
            ],
        )
        .map_err(AppError::internal)?;

        Ok(())
    }

    pub fn get_executions(&self, session_id: Uuid) -> Result<Vec<AgentExecution>, AppError> {
        let conn = self.conn().map_err(AppError::internal)?;
        let mut stmt = conn
            .prepare(
                "SELECT id, session_id, agent_name, status, started_at, completed_at, execution_seconds, error_message
                 FROM agent_executions WHERE session_id = ?1 ORDER BY id ASC",
            )
            .map_err(AppError::internal)?;

        let rows = stmt
            .query_map(params![session_id.to_string()], |row| {
                let status_str: String = row.get(3)?;
                Ok(AgentExecution {
                    id: row.get(0)?,
                    session_id,
                    agent_name: row.get(2)?,
                    status: AgentExecutionStatus::from_str(&status_str)
                        .unwrap_or(AgentExecutionStatus::Pending),
                    started_at: row
                        .get::<_, Option<String>>(4)?
                        .and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok())
                        .map(|dt| dt.with_timezone(&Utc)),
                    completed_at: row
                        .get::<_, Option<String>>(5)?
                        .and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok())
                        .map(|dt| dt.with_timezone(&Utc)),
                    execution_seconds: row.get(6)?,
                    error_message: row.get(7)?,
                })
            })
            .map_err(AppError::internal)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(AppError::internal)?;

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::test_store;
    use super::*;
    use chrono::Utc as ChronoUtc;

    #[test]
    fn upsert_progresses_through_states() {
        let (store, _temp) = test_store();
        let user_id = Uuid::new_v4();
        let session = store
            .create_session(user_id, "alice", "AAPL", ChronoUtc::now().date_naive(), serde_json::json!({}))
            .unwrap();

        store
            .upsert_agent_status(session.session_id, "market_analyst", AgentExecutionStatus::Running, None)
            .unwrap();
        store
            .upsert_agent_status(session.session_id, "market_analyst", AgentExecutionStatus::Completed, None)
            .unwrap();

        let executions = store.get_executions(session.session_id).unwrap();
        assert_eq!(executions.len(), 1);
        assert_eq!(executions[0].status, AgentExecutionStatus::Completed);
        assert!(executions[0].started_at.is_some());
        assert!(executions[0].completed_at.is_some());
    }

    #[test]
    fn upsert_records_failure_message() {
        let (store, _temp) = test_store();
        let user_id = Uuid::new_v4();
        let session = store
            .create_session(user_id, "alice", "AAPL", ChronoUtc::now().date_naive(), serde_json::json!({}))
            .unwrap();

        store
            .upsert_agent_status(
                session.session_id,
                "news_analyst",
                AgentExecutionStatus::Failed,
                Some("upstream timeout"),
            )
            .unwrap();

        let executions = store.get_executions(session.session_id).unwrap();
        assert_eq!(executions[0].error_message.as_deref(), Some("upstream timeout"));
    }
}
