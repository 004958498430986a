//! Pipeline Orchestrator (C5)
//! Mission: drive one analysis session through the fixed phase graph
//! (spec.md §4.5), merging each agent's output into session state and
//! persisting it through the Session Store as it goes.

pub mod decision;
pub mod investment_debate;
pub mod risk_debate;
pub mod state;

use crate::agent::{tools::tools_for_role, AgentRole, AgentRuntime, SessionView};
use crate::config::Config;
use crate::error::AppError;
use crate::gateway::Gateway;
use crate::memory::MemoryStore;
use crate::models::{AgentExecutionStatus, Decision, SectionType, SessionStatus};
use crate::progress::{ProgressBus, ProgressEventKind};
use crate::store::SessionStore;
use chrono::NaiveDate;
use state::{InvestmentDebateState, RiskDebateState};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use uuid::Uuid;

/// Cooperative cancel signal shared between the HTTP surface and a running
/// orchestrator task. Checked at phase/turn boundaries, never mid-call.
#[derive(Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Orchestrator {
    store: Arc<SessionStore>,
    memory: Arc<MemoryStore>,
    agent_runtime: Arc<AgentRuntime>,
    progress: Arc<ProgressBus>,
    max_debate_rounds: u32,
    max_risk_rounds: u32,
    session_deadline: Duration,
    online_tools: bool,
}

impl Orchestrator {
    pub fn new(
        store: Arc<SessionStore>,
        memory: Arc<MemoryStore>,
        gateway: Arc<Gateway>,
        progress: Arc<ProgressBus>,
        config: &Config,
    ) -> Self {
        let agent_runtime = Arc::new(AgentRuntime::new(
            gateway,
            config.max_tool_rounds,
            config.agent_step_budget_secs,
        ));
        Self {
            store,
            memory,
            agent_runtime,
            progress,
            max_debate_rounds: config.max_debate_rounds,
            max_risk_rounds: config.max_risk_rounds,
            session_deadline: Duration::from_secs(config.session_deadline_secs),
            online_tools: config.online_tools,
        }
    }

    /// Creates a `running` session row and returns its id; the caller spawns
    /// `run` against that id on its own task so the HTTP handler can return
    /// immediately.
    pub fn start_session(
        &self,
        user_id: Uuid,
        owner_username: &str,
        ticker: &str,
        analysis_date: NaiveDate,
        config_snapshot: serde_json::Value,
    ) -> Result<Uuid, AppError> {
        let session = self
            .store
            .create_session(user_id, owner_username, ticker, analysis_date, config_snapshot)?;
        // Registers the session's broadcast channel before the caller returns
        // `session_id` to the client, closing a race where an immediate SSE
        // subscribe would otherwise see `progress.subscribe()` return `None`.
        self.progress.publish(session.session_id, ProgressEventKind::PhaseChanged { phase: "queued".to_string() });
        Ok(session.session_id)
    }

    pub async fn run(&self, session_id: Uuid, cancel: CancelToken) {
        let started = Instant::now();
        let session = match self.store.get_session(session_id) {
            Ok(s) => s,
            Err(e) => {
                warn!(%session_id, error = %e, "orchestrator could not load session to run");
                return;
            }
        };

        match self.run_inner(session_id, &session.ticker, &session.analysis_date.to_string(), &cancel, started).await {
            Ok(RunOutcome::Completed { decision, confidence }) => {
                let secs = started.elapsed().as_secs_f64();
                if let Err(e) = self.store.finalize_session(session_id, SessionStatus::Completed, decision, confidence, secs) {
                    warn!(%session_id, error = %e, "failed to finalize completed session");
                }
                self.progress.publish_terminal(session_id, SessionStatus::Completed);

                let recommendation = decision.map(|d| d.as_str().to_string()).unwrap_or_else(|| "HOLD".to_string());
                let situation = format!("{} on {}", session.ticker, session.analysis_date);
                if let Err(e) = self.memory.record(&situation, &recommendation).await {
                    warn!(%session_id, error = %e, "failed to record memory entry");
                }
            }
            Ok(RunOutcome::Canceled) => {
                let secs = started.elapsed().as_secs_f64();
                if let Err(e) = self.store.finalize_session(session_id, SessionStatus::Canceled, None, None, secs) {
                    warn!(%session_id, error = %e, "failed to finalize canceled session");
                }
                self.progress.publish_terminal(session_id, SessionStatus::Canceled);
            }
            Err(e) => {
                warn!(%session_id, error = %e, "session run failed");
                let secs = started.elapsed().as_secs_f64();
                if let Err(finalize_err) = self.store.finalize_session(session_id, SessionStatus::Failed, None, None, secs) {
                    warn!(%session_id, error = %finalize_err, "failed to finalize failed session");
                }
                self.progress.publish_terminal(session_id, SessionStatus::Failed);
            }
        }
    }

    async fn run_inner(
        &self,
        session_id: Uuid,
        ticker: &str,
        analysis_date: &str,
        cancel: &CancelToken,
        started: Instant,
    ) -> Result<RunOutcome, AppError> {
        let mut sections: HashMap<SectionType, String> = HashMap::new();

        let recalled = self
            .memory
            .recall(&format!("{ticker} on {analysis_date}"), 3)
            .await
            .unwrap_or_default();
        let recalled_memories: Vec<String> = recalled
            .into_iter()
            .map(|r| format!("{} -> {}", r.entry.situation, r.entry.recommendation))
            .collect();

        let base_view = SessionView {
            ticker: ticker.to_string(),
            analysis_date: analysis_date.to_string(),
            sections: sections.clone(),
            debate_transcript: String::new(),
            recalled_memories,
        };

        // Phases A (analysts) and B (legendary investors) run concurrently:
        // neither depends on the other, both depend only on the base view.
        self.progress.publish(session_id, ProgressEventKind::PhaseChanged { phase: "analysts_and_investors".to_string() });
        if self.check_stop(session_id, cancel, started) {
            return Ok(RunOutcome::Canceled);
        }

        let fanout_roles = [
            AgentRole::Market,
            AgentRole::Social,
            AgentRole::News,
            AgentRole::Fundamentals,
            AgentRole::BenGraham,
            AgentRole::WarrenBuffett,
        ];

        let mut handles = Vec::with_capacity(fanout_roles.len());
        for role in fanout_roles {
            let agent_runtime = self.agent_runtime.clone();
            let view = base_view.clone();
            let store = self.store.clone();
            let progress = self.progress.clone();
            let online_tools = self.online_tools;
            handles.push(tokio::spawn(async move {
                run_reporting_role(agent_runtime, store, progress, session_id, role, view, online_tools).await
            }));
        }

        for handle in handles {
            let result = handle
                .await
                .map_err(|e| AppError::Internal(format!("analyst/investor task panicked: {e}")))?;
            let (section_type, content) = result?;
            sections.insert(section_type, content);
        }

        if self.check_stop(session_id, cancel, started) {
            return Ok(RunOutcome::Canceled);
        }

        // Phase C: investment debate.
        self.progress.publish(session_id, ProgressEventKind::PhaseChanged { phase: "investment_debate".to_string() });
        let mut investment_debate = InvestmentDebateState::default();
        let debate_view = SessionView { sections: sections.clone(), ..base_view.clone() };
        investment_debate::run(
            &self.agent_runtime,
            &self.store,
            &self.progress,
            session_id,
            &debate_view,
            &mut investment_debate,
            self.max_debate_rounds,
            self.online_tools,
        )
        .await?;

        if self.check_stop(session_id, cancel, started) {
            return Ok(RunOutcome::Canceled);
        }

        // Phase D: research manager.
        self.progress.publish(session_id, ProgressEventKind::PhaseChanged { phase: "research_manager".to_string() });
        let mut manager_view = SessionView { sections: sections.clone(), ..base_view.clone() };
        manager_view.debate_transcript = investment_debate.history.clone();
        let (section_type, content) = run_reporting_role(
            self.agent_runtime.clone(),
            self.store.clone(),
            self.progress.clone(),
            session_id,
            AgentRole::ResearchManager,
            manager_view,
            self.online_tools,
        )
        .await?;
        sections.insert(section_type, content);

        if self.check_stop(session_id, cancel, started) {
            return Ok(RunOutcome::Canceled);
        }

        // Phase E: trader.
        self.progress.publish(session_id, ProgressEventKind::PhaseChanged { phase: "trader".to_string() });
        let trader_view = SessionView { sections: sections.clone(), ..base_view.clone() };
        let (section_type, content) = run_reporting_role(
            self.agent_runtime.clone(),
            self.store.clone(),
            self.progress.clone(),
            session_id,
            AgentRole::Trader,
            trader_view,
            self.online_tools,
        )
        .await?;
        sections.insert(section_type, content);

        if self.check_stop(session_id, cancel, started) {
            return Ok(RunOutcome::Canceled);
        }

        // Phase F: risk debate.
        self.progress.publish(session_id, ProgressEventKind::PhaseChanged { phase: "risk_debate".to_string() });
        let mut risk_debate = RiskDebateState::default();
        let risk_view = SessionView { sections: sections.clone(), ..base_view.clone() };
        risk_debate::run(
            &self.agent_runtime,
            &self.store,
            &self.progress,
            session_id,
            &risk_view,
            &mut risk_debate,
            self.max_risk_rounds,
            self.online_tools,
        )
        .await?;

        if self.check_stop(session_id, cancel, started) {
            return Ok(RunOutcome::Canceled);
        }

        // Phase G: risk manager -> final trade decision.
        self.progress.publish(session_id, ProgressEventKind::PhaseChanged { phase: "risk_manager".to_string() });
        let mut final_view = SessionView { sections: sections.clone(), ..base_view.clone() };
        final_view.debate_transcript = risk_debate.history.clone();
        let (_section_type, content) = run_reporting_role(
            self.agent_runtime.clone(),
            self.store.clone(),
            self.progress.clone(),
            session_id,
            AgentRole::RiskManager,
            final_view,
            self.online_tools,
        )
        .await?;

        let final_decision = decision::extract_final_decision(&content);
        let confidence = decision::extract_confidence(&content);

        info!(%session_id, ?final_decision, ?confidence, "session produced final decision");
        Ok(RunOutcome::Completed { decision: final_decision, confidence })
    }

    fn check_stop(&self, session_id: Uuid, cancel: &CancelToken, started: Instant) -> bool {
        if cancel.is_canceled() {
            return true;
        }
        if started.elapsed() >= self.session_deadline {
            warn!(%session_id, "session deadline exceeded, treating as cancellation");
            return true;
        }
        false
    }
}

enum RunOutcome {
    Completed { decision: Option<Decision>, confidence: Option<f64> },
    Canceled,
}

/// Runs one role that writes a designated section, persisting its status
/// and section content as it goes. Used for both single-step phases
/// (analysts, managers, trader) and the fan-out in phase A/B.
#[allow(clippy::too_many_arguments)]
async fn run_reporting_role(
    agent_runtime: Arc<AgentRuntime>,
    store: Arc<SessionStore>,
    progress: Arc<ProgressBus>,
    session_id: Uuid,
    role: AgentRole,
    view: SessionView,
    online_tools: bool,
) -> Result<(SectionType, String), AppError> {
    let agent_name = role.as_str().to_string();
    let section_type = role
        .section_type()
        .expect("run_reporting_role is only called for roles with a designated section");

    if let Err(e) = store.upsert_agent_status(session_id, &agent_name, AgentExecutionStatus::Running, None) {
        warn!(%session_id, agent = %agent_name, error = %e, "failed to record agent status (running)");
    }
    progress.publish(session_id, ProgressEventKind::AgentStarted { agent: agent_name.clone() });

    let tools = tools_for_role(role, online_tools);
    let result = agent_runtime.run_step(role, &view, &tools).await;

    match result {
        Ok(output) => {
            let content = output
                .updated_fields
                .get(&section_type)
                .cloned()
                .unwrap_or_default();
            store.append_section(session_id, section_type, &agent_name, &content)?;
            if let Err(e) = store.upsert_agent_status(session_id, &agent_name, AgentExecutionStatus::Completed, None) {
                warn!(%session_id, agent = %agent_name, error = %e, "failed to record agent status (completed)");
            }
            progress.publish(session_id, ProgressEventKind::SectionAppended { section_type: section_type.as_str().to_string() });
            progress.publish(session_id, ProgressEventKind::AgentFinished { agent: agent_name });
            Ok((section_type, content))
        }
        Err(e) => {
            if let Err(store_err) = store.upsert_agent_status(session_id, &agent_name, AgentExecutionStatus::Failed, Some(&e.to_string())) {
                warn!(%session_id, agent = %agent_name, error = %store_err, "failed to record agent status (failed)");
            }
            progress.publish(session_id, ProgressEventKind::AgentFinished { agent: agent_name });
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_starts_uncanceled_and_latches() {
        let token = CancelToken::new();
        assert!(!token.is_canceled());
        token.cancel();
        assert!(token.is_canceled());

        let clone = token.clone();
        assert!(clone.is_canceled());
    }
}
