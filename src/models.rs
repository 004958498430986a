//! Core domain model
//! Mission: the entities and invariants an analysis run is built from

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Terminal/non-terminal lifecycle of an `AnalysisSession`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
    Canceled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Canceled => "canceled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "running" => Some(SessionStatus::Running),
            "completed" => Some(SessionStatus::Completed),
            "failed" => Some(SessionStatus::Failed),
            "canceled" => Some(SessionStatus::Canceled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Running)
    }
}

/// Final buy/hold/sell call, or none if the pipeline never produced one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Buy,
    Hold,
    Sell,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Buy => "BUY",
            Decision::Hold => "HOLD",
            Decision::Sell => "SELL",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "BUY" => Some(Decision::Buy),
            "HOLD" => Some(Decision::Hold),
            "SELL" => Some(Decision::Sell),
            _ => None,
        }
    }
}

/// Fixed enumeration of report section types (GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionType {
    MarketReport,
    SentimentReport,
    NewsReport,
    FundamentalsReport,
    BenGrahamReport,
    WarrenBuffettReport,
    InvestmentPlan,
    TraderInvestmentPlan,
    FinalTradeDecision,
}

impl SectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionType::MarketReport => "market_report",
            SectionType::SentimentReport => "sentiment_report",
            SectionType::NewsReport => "news_report",
            SectionType::FundamentalsReport => "fundamentals_report",
            SectionType::BenGrahamReport => "ben_graham_report",
            SectionType::WarrenBuffettReport => "warren_buffett_report",
            SectionType::InvestmentPlan => "investment_plan",
            SectionType::TraderInvestmentPlan => "trader_investment_plan",
            SectionType::FinalTradeDecision => "final_trade_decision",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "market_report" => Some(SectionType::MarketReport),
            "sentiment_report" => Some(SectionType::SentimentReport),
            "news_report" => Some(SectionType::NewsReport),
            "fundamentals_report" => Some(SectionType::FundamentalsReport),
            "ben_graham_report" => Some(SectionType::BenGrahamReport),
            "warren_buffett_report" => Some(SectionType::WarrenBuffettReport),
            "investment_plan" => Some(SectionType::InvestmentPlan),
            "trader_investment_plan" => Some(SectionType::TraderInvestmentPlan),
            "final_trade_decision" => Some(SectionType::FinalTradeDecision),
            _ => None,
        }
    }

    pub const ALL: [SectionType; 9] = [
        SectionType::MarketReport,
        SectionType::SentimentReport,
        SectionType::NewsReport,
        SectionType::FundamentalsReport,
        SectionType::BenGrahamReport,
        SectionType::WarrenBuffettReport,
        SectionType::InvestmentPlan,
        SectionType::TraderInvestmentPlan,
        SectionType::FinalTradeDecision,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl AgentExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentExecutionStatus::Pending => "pending",
            AgentExecutionStatus::Running => "running",
            AgentExecutionStatus::Completed => "completed",
            AgentExecutionStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(AgentExecutionStatus::Pending),
            "running" => Some(AgentExecutionStatus::Running),
            "completed" => Some(AgentExecutionStatus::Completed),
            "failed" => Some(AgentExecutionStatus::Failed),
            _ => None,
        }
    }
}

/// `{id, username (unique, lowercase), password_hash, is_active, is_admin, created_at}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_active: bool,
    pub is_admin: bool,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One end-to-end run for one `(user, ticker, analysis_date)` triple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSession {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub owner_username: String,
    pub ticker: String,
    pub analysis_date: NaiveDate,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub final_decision: Option<Decision>,
    pub confidence: Option<f64>,
    pub execution_seconds: Option<f64>,
    pub config_snapshot: serde_json::Value,
}

/// `(session_id, section_type)` is upsert-unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSection {
    pub id: i64,
    pub session_id: Uuid,
    pub section_type: SectionType,
    pub agent_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Exactly one row per `(session_id, agent_name)` after first transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentExecution {
    pub id: i64,
    pub session_id: Uuid,
    pub agent_name: String,
    pub status: AgentExecutionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub execution_seconds: Option<f64>,
    pub error_message: Option<String>,
}

/// Unique per `(user_id, key)`; last-write-wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPreference {
    pub user_id: Uuid,
    pub key: String,
    pub value: String,
    pub category: String,
    pub updated_at: DateTime<Utc>,
}

/// Immutable after insert; queried by nearest-neighbor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: i64,
    pub situation: String,
    pub recommendation: String,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

/// `{session_id, ticker, analysis_date, status, final_decision, confidence, completed_at}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub ticker: String,
    pub analysis_date: NaiveDate,
    pub status: SessionStatus,
    pub final_decision: Option<Decision>,
    pub confidence: Option<f64>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&AnalysisSession> for SessionSummary {
    fn from(s: &AnalysisSession) -> Self {
        SessionSummary {
            session_id: s.session_id,
            ticker: s.ticker.clone(),
            analysis_date: s.analysis_date,
            status: s.status,
            final_decision: s.final_decision,
            confidence: s.confidence,
            completed_at: s.completed_at,
        }
    }
}

/// Ticker validation (spec §6, property #6):
/// `isValid(t) ⇔ t matches [A-Z0-9]{1,9}(\.[A-Z0-9]{1,3})?` after uppercasing.
pub fn validate_ticker(raw: &str) -> Option<String> {
    let upper = raw.to_ascii_uppercase();
    if upper.is_empty() || upper.len() > 10 {
        return None;
    }

    let (base, suffix) = match upper.split_once('.') {
        Some((b, s)) => (b, Some(s)),
        None => (upper.as_str(), None),
    };

    let is_alnum = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric());

    if base.is_empty() || base.len() > 9 || !is_alnum(base) {
        return None;
    }

    if let Some(suffix) = suffix {
        if suffix.is_empty() || suffix.len() > 3 || !is_alnum(suffix) {
            return None;
        }
    }

    Some(upper)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_tickers_pass() {
        assert_eq!(validate_ticker("aapl"), Some("AAPL".to_string()));
        assert_eq!(validate_ticker("BRK.B"), Some("BRK.B".to_string()));
        assert_eq!(validate_ticker("a"), Some("A".to_string()));
        assert_eq!(validate_ticker("123456789"), Some("123456789".to_string()));
    }

    #[test]
    fn invalid_tickers_fail() {
        assert_eq!(validate_ticker(""), None);
        assert_eq!(validate_ticker("TOOLONGTICKER"), None);
        assert_eq!(validate_ticker("AAPL."), None);
        assert_eq!(validate_ticker("AAPL.TOOLONG"), None);
        assert_eq!(validate_ticker("AA PL"), None);
        assert_eq!(validate_ticker("AA-PL"), None);
        assert_eq!(validate_ticker("A.B.C"), None);
    }

    #[test]
    fn session_status_terminal_states_do_not_revert() {
        assert!(!SessionStatus::Running.is_terminal());
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Failed.is_terminal());
        assert!(SessionStatus::Canceled.is_terminal());
    }

    #[test]
    fn section_type_roundtrips() {
        for t in SectionType::ALL {
            assert_eq!(SectionType::from_str(t.as_str()), Some(t));
        }
    }

    #[test]
    fn decision_parses_case_insensitively() {
        assert_eq!(Decision::from_str("buy"), Some(Decision::Buy));
        assert_eq!(Decision::from_str("Hold"), Some(Decision::Hold));
        assert_eq!(Decision::from_str("SELL"), Some(Decision::Sell));
        assert_eq!(Decision::from_str("maybe"), None);
    }
}
