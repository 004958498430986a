//! Phase C driver: bull/bear investment debate loop.

use crate::agent::{tools::tools_for_role, AgentRuntime, SessionView};
use crate::error::AppError;
use crate::models::AgentExecutionStatus;
use crate::orchestrator::state::InvestmentDebateState;
use crate::progress::{ProgressBus, ProgressEventKind};
use crate::store::SessionStore;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Runs turns until `2 * max_debate_rounds` have been taken, mutating
/// `state` and the shared `view.debate_transcript` in place between turns.
/// Each turn is recorded as an `AgentExecution` row and publishes
/// start/finish progress events, the same as any other agent step
/// (`run_reporting_role` in `orchestrator/mod.rs`) — a debate turn is a real
/// Agent Runtime step per spec.md §4.4/§4.5, not exempt from the audit trail.
#[allow(clippy::too_many_arguments)]
pub async fn run(
    agent_runtime: &Arc<AgentRuntime>,
    store: &Arc<SessionStore>,
    progress: &Arc<ProgressBus>,
    session_id: Uuid,
    base_view: &SessionView,
    state: &mut InvestmentDebateState,
    max_debate_rounds: u32,
    online_tools: bool,
) -> Result<(), AppError> {
    while !state.is_complete(max_debate_rounds) {
        let speaker = state.next_speaker();
        let agent_name = speaker.as_str().to_string();
        let mut view = base_view.clone();
        view.debate_transcript = state.history.clone();

        if let Err(e) = store.upsert_agent_status(session_id, &agent_name, AgentExecutionStatus::Running, None) {
            warn!(%session_id, agent = %agent_name, error = %e, "failed to record agent status (running)");
        }
        progress.publish(session_id, ProgressEventKind::AgentStarted { agent: agent_name.clone() });

        let tools = tools_for_role(speaker, online_tools);
        let result = agent_runtime.run_step(speaker, &view, &tools).await;

        let output = match result {
            Ok(output) => {
                if let Err(e) = store.upsert_agent_status(session_id, &agent_name, AgentExecutionStatus::Completed, None) {
                    warn!(%session_id, agent = %agent_name, error = %e, "failed to record agent status (completed)");
                }
                progress.publish(session_id, ProgressEventKind::AgentFinished { agent: agent_name.clone() });
                output
            }
            Err(e) => {
                if let Err(store_err) = store.upsert_agent_status(session_id, &agent_name, AgentExecutionStatus::Failed, Some(&e.to_string())) {
                    warn!(%session_id, agent = %agent_name, error = %store_err, "failed to record agent status (failed)");
                }
                progress.publish(session_id, ProgressEventKind::AgentFinished { agent: agent_name });
                return Err(e);
            }
        };

        let argument = output.new_messages.into_iter().next().unwrap_or_default();
        state.record_turn(speaker, &argument);
    }
    Ok(())
}
