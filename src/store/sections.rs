//! Report section upserts and full-report assembly.

use super::SessionStore;
use crate::error::AppError;
use crate::models::{ReportSection, SectionType};
use chrono::Utc;
use rusqlite::params;
use uuid::Uuid;

impl SessionStore {
    /// Upsert by `(session_id, section_type)` — a later write for the same
    /// type replaces the content, it does not append a new row.
    pub fn append_section(
        &self,
        session_id: Uuid,
        section_type: SectionType,
        agent_name: &str,
        content: &str,
    ) -> Result<(), AppError> {
        let conn = self.conn().map_err(AppError::internal)?;
        conn.execute(
            "INSERT INTO report_sections (session_id, section_type, agent_name, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(session_id, section_type) DO UPDATE SET
                agent_name = excluded.agent_name,
                content = excluded.content,
                created_at = excluded.created_at",
            params![
                session_id.to_string(),
                section_type.as_str(),
                agent_name,
                content,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(AppError::internal)?;
        Ok(())
    }

    pub fn get_sections(&self, session_id: Uuid) -> Result<Vec<ReportSection>, AppError> {
        let conn = self.conn().map_err(AppError::internal)?;
        let mut stmt = conn
            .prepare(
                "SELECT id, session_id, section_type, agent_name, content, created_at
                 FROM report_sections WHERE session_id = ?1 ORDER BY id ASC",
            )
            .map_err(AppError::internal)?;

        let sections = stmt
            .query_map(params![session_id.to_string()], |row| {
                let section_type_str: String = row.get(2)?;
                let created_at_str: String = row.get(5)?;
                Ok(ReportSection {
                    id: row.get(0)?,
                    session_id,
                    section_type: SectionType::from_str(&section_type_str)
                        .unwrap_or(SectionType::MarketReport),
                    agent_name: row.get(3)?,
                    content: row.get(4)?,
                    created_at: chrono::DateTime::parse_from_rfc3339(&created_at_str)
                        .map(|dt| dt.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                })
            })
            .map_err(AppError::internal)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(AppError::internal)?;

        Ok(sections)
    }

    /// Full report = session row + every section written so far, regardless
    /// of whether the session has finished.
    pub fn get_full_report(
        &self,
        session_id: Uuid,
    ) -> Result<(crate::models::AnalysisSession, Vec<ReportSection>), AppError> {
        let session = self.get_session(session_id)?;
        let sections = self.get_sections(session_id)?;
        Ok((session, sections))
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::test_store;
    use super::*;

    #[test]
    fn append_section_upserts_by_type() {
        let (store, _temp) = test_store();
        let user_id = Uuid::new_v4();
        let session = store
            .create_session(user_id, "alice", "AAPL", Utc::now().date_naive(), serde_json::json!({}))
            .unwrap();

        store
            .append_section(session.session_id, SectionType::MarketReport, "market_analyst", "draft")
            .unwrap();
        store
            .append_section(session.session_id, SectionType::MarketReport, "market_analyst", "final")
            .unwrap();

        let sections = store.get_sections(session.session_id).unwrap();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].content, "final");
    }

    #[test]
    fn full_report_includes_all_sections_in_order() {
        let (store, _temp) = test_store();
        let user_id = Uuid::new_v4();
        let session = store
            .create_session(user_id, "alice", "AAPL", Utc::now().date_naive(), serde_json::json!({}))
            .unwrap();

        store
            .append_section(session.session_id, SectionType::MarketReport, "market_analyst", "m")
            .unwrap();
        store
            .append_section(session.session_id, SectionType::NewsReport, "news_analyst", "n")
            .unwrap();

        let (_, sections) = store.get_full_report(session.session_id).unwrap();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].section_type, SectionType::MarketReport);
        assert_eq!(sections[1].section_type, SectionType::NewsReport);
    }
}
