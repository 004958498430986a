//! Agent Runtime (C4)
//! Mission: run one bounded LLM interaction for one pipeline role — build a
//! prompt from the session state view, resolve tool calls through the
//! Gateway, and terminate on a tool-free final response or a round bound.

pub mod tools;

use crate::error::AppError;
use crate::gateway::{Gateway, GatewayOp};
use crate::models::SectionType;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentRole {
    Market,
    Social,
    News,
    Fundamentals,
    BenGraham,
    WarrenBuffett,
    Bull,
    Bear,
    ResearchManager,
    Trader,
    Risky,
    Safe,
    Neutral,
    RiskManager,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Market => "market",
            AgentRole::Social => "social",
            AgentRole::News => "news",
            AgentRole::Fundamentals => "fundamentals",
            AgentRole::BenGraham => "ben_graham",
            AgentRole::WarrenBuffett => "warren_buffett",
            AgentRole::Bull => "bull",
            AgentRole::Bear => "bear",
            AgentRole::ResearchManager => "research_manager",
            AgentRole::Trader => "trader",
            AgentRole::Risky => "risky",
            AgentRole::Safe => "safe",
            AgentRole::Neutral => "neutral",
            AgentRole::RiskManager => "risk_manager",
        }
    }

    /// The designated section type this role writes, if any. Debate
    /// participants (bull/bear/risky/safe/neutral) append to debate-state
    /// histories instead of writing a designated section.
    pub fn section_type(&self) -> Option<SectionType> {
        match self {
            AgentRole::Market => Some(SectionType::MarketReport),
            AgentRole::Social => Some(SectionType::SentimentReport),
            AgentRole::News => Some(SectionType::NewsReport),
            AgentRole::Fundamentals => Some(SectionType::FundamentalsReport),
            AgentRole::BenGraham => Some(SectionType::BenGrahamReport),
            AgentRole::WarrenBuffett => Some(SectionType::WarrenBuffettReport),
            AgentRole::ResearchManager => Some(SectionType::InvestmentPlan),
            AgentRole::Trader => Some(SectionType::TraderInvestmentPlan),
            AgentRole::RiskManager => Some(SectionType::FinalTradeDecision),
            AgentRole::Bull | AgentRole::Bear | AgentRole::Risky | AgentRole::Safe | AgentRole::Neutral => None,
        }
    }

    fn system_prompt(&self) -> &'static str {
        match self {
            AgentRole::Market => "You are a market analyst. Use the quote tool to ground your report in current price action, then write a concise market report.",
            AgentRole::Social => "You are a social-sentiment analyst. Use the sentiment tool, then summarize the crowd's mood toward this ticker.",
            AgentRole::News => "You are a news analyst. Use the news tool to gather recent headlines, then summarize what matters for this ticker.",
            AgentRole::Fundamentals => "You are a fundamentals analyst. Use the quote and fear_greed_history tools as needed, then write a fundamentals report.",
            AgentRole::BenGraham => "You are Ben Graham. Evaluate this ticker through a value-investing lens: margin of safety, balance-sheet strength, earnings stability.",
            AgentRole::WarrenBuffett => "You are Warren Buffett. Evaluate this ticker through a quality-compounder lens: durable moat, owner earnings, management quality.",
            AgentRole::Bull => "You are the bull researcher in an investment debate. Argue for investing, rebutting the bear's most recent point if any.",
            AgentRole::Bear => "You are the bear researcher in an investment debate. Argue against investing, rebutting the bull's most recent point if any.",
            AgentRole::ResearchManager => "You are the research manager. Read the full investment debate and analyst reports, then render a balanced investment plan.",
            AgentRole::Trader => "You are the trader. Convert the investment plan into a concrete trader investment plan with position sizing guidance.",
            AgentRole::Risky => "You are the risky risk-debator. Argue for a more aggressive position, rebutting the safe/neutral voices if any.",
            AgentRole::Safe => "You are the safe risk-debator. Argue for a more conservative position, rebutting the risky/neutral voices if any.",
            AgentRole::Neutral => "You are the neutral risk-debator. Weigh both sides and argue for a balanced position.",
            AgentRole::RiskManager => "You are the risk manager. Read the full risk debate and the trader's plan, then render the final trade decision. State the final proposal as exactly one of BUY, HOLD, or SELL, and include a confidence percentage on its own line.",
        }
    }
}

/// Immutable view of session state an agent reasons over. The orchestrator
/// owns the real state; this is a snapshot passed by value per step.
#[derive(Debug, Clone)]
pub struct SessionView {
    pub ticker: String,
    pub analysis_date: String,
    pub sections: HashMap<SectionType, String>,
    pub debate_transcript: String,
    pub recalled_memories: Vec<String>,
}

impl SessionView {
    fn render(&self) -> String {
        let mut out = format!("Ticker: {}\nAnalysis date: {}\n", self.ticker, self.analysis_date);

        for section in SectionType::ALL {
            if let Some(content) = self.sections.get(section) {
                out.push_str(&format!("\n## {}\n{}\n", section.as_str(), content));
            }
        }

        if !self.debate_transcript.is_empty() {
            out.push_str(&format!("\n## debate_so_far\n{}\n", self.debate_transcript));
        }

        if !self.recalled_memories.is_empty() {
            out.push_str("\n## recalled_memories\n");
            for memory in &self.recalled_memories {
                out.push_str(&format!("- {memory}\n"));
            }
        }

        out
    }
}

#[derive(Debug, Clone, Default)]
pub struct AgentOutput {
    pub updated_fields: HashMap<SectionType, String>,
    pub new_messages: Vec<String>,
}

pub struct AgentRuntime {
    gateway: std::sync::Arc<Gateway>,
    max_tool_rounds: u32,
    step_budget: Duration,
}

impl AgentRuntime {
    pub fn new(gateway: std::sync::Arc<Gateway>, max_tool_rounds: u32, step_budget_secs: u64) -> Self {
        Self {
            gateway,
            max_tool_rounds,
            step_budget: Duration::from_secs(step_budget_secs),
        }
    }

    /// Runs one bounded agent step, wrapped in the per-step wall-clock
    /// budget from spec.md §5 (default 120s). Returns `Internal` when the
    /// tool-round bound is exceeded (spec.md §4.4's `ToolLoop` outcome), or
    /// `Timeout` when `step_budget` elapses first.
    pub async fn run_step(
        &self,
        role: AgentRole,
        view: &SessionView,
        tools: &HashSet<GatewayOp>,
    ) -> Result<AgentOutput, AppError> {
        match tokio::time::timeout(self.step_budget, self.run_step_inner(role, view, tools)).await {
            Ok(result) => result,
            Err(_) => Err(annotate(role, AppError::Timeout)),
        }
    }

    async fn run_step_inner(
        &self,
        role: AgentRole,
        view: &SessionView,
        tools: &HashSet<GatewayOp>,
    ) -> Result<AgentOutput, AppError> {
        let system_prompt = role.system_prompt();
        let mut transcript = view.render();

        for round in 0..self.max_tool_rounds {
            let content = self
                .gateway
                .llm_complete(system_prompt, &transcript)
                .await
                .map_err(|e| annotate(role, e.into()))?;

            match parse_tool_call(&content) {
                Some((op_name, arg)) => {
                    let Some(op) = GatewayOp::from_str(op_name) else {
                        // Unknown tool directive: treat the rest of the
                        // content as the final answer rather than looping.
                        return Ok(finalize(role, &content));
                    };

                    if !tools.contains(&op) {
                        transcript.push_str(&format!(
                            "\n\nTOOL_RESULT[{op_name}]: denied, {op_name} is not bound for this role\n"
                        ));
                        continue;
                    }

                    let result = dispatch_tool(&self.gateway, op, arg).await;
                    let rendered = match result {
                        Ok(text) => text,
                        Err(e) => format!("error: {e}"),
                    };
                    transcript.push_str(&format!("\n\nTOOL_RESULT[{op_name}]: {rendered}\n"));

                    if round + 1 == self.max_tool_rounds {
                        return Err(AppError::Internal(format!(
                            "agent {} exceeded tool round budget ({})",
                            role.as_str(),
                            self.max_tool_rounds
                        )));
                    }
                }
                None => return Ok(finalize(role, &content)),
            }
        }

        Err(AppError::Internal(format!(
            "agent {} exceeded tool round budget ({})",
            role.as_str(),
            self.max_tool_rounds
        )))
    }
}

fn annotate(role: AgentRole, err: AppError) -> AppError {
    match err {
        AppError::Internal(m) => AppError::Internal(format!("agent {}: {}", role.as_str(), m)),
        AppError::Upstream(m) => AppError::Upstream(format!("agent {}: {}", role.as_str(), m)),
        other => other,
    }
}

fn finalize(role: AgentRole, content: &str) -> AgentOutput {
    let mut updated_fields = HashMap::new();
    if let Some(section) = role.section_type() {
        updated_fields.insert(section, content.trim().to_string());
    }
    AgentOutput {
        updated_fields,
        new_messages: vec![content.trim().to_string()],
    }
}

/// Tool-call convention: a response whose first non-empty line reads
/// `TOOL: <op> <arg>` is a tool request; anything else is the final answer.
fn parse_tool_call(content: &str) -> Option<(&str, &str)> {
    let first_line = content.lines().find(|l| !l.trim().is_empty())?.trim();
    let rest = first_line.strip_prefix("TOOL:")?.trim();
    match rest.split_once(' ') {
        Some((op, arg)) => Some((op.trim(), arg.trim())),
        None => Some((rest, "")),
    }
}

async fn dispatch_tool(gateway: &Gateway, op: GatewayOp, arg: &str) -> Result<String, crate::gateway::error::GatewayError> {
    match op {
        GatewayOp::Quote => gateway.quote(arg).await.map(|q| format!("{q:?}")),
        GatewayOp::News => gateway.news(arg, 5).await.map(|items| format!("{items:?}")),
        GatewayOp::Sentiment => gateway.sentiment(arg).await.map(|s| format!("{s:?}")),
        GatewayOp::FearGreedHistory => {
            let days: u32 = arg.parse().unwrap_or(90);
            gateway.fear_greed_history(days, "monthly").await.map(|points| format!("{points:?}"))
        }
        GatewayOp::Quotes => {
            let tickers: Vec<String> = arg.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
            let results = gateway.quotes(&tickers).await;
            Ok(format!("{results:?}"))
        }
        GatewayOp::LlmComplete => Err(crate::gateway::error::GatewayError::Upstream(
            "llm_complete is not a tool-callable op".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_tool_call() {
        let (op, arg) = parse_tool_call("TOOL: quote AAPL").unwrap();
        assert_eq!(op, "quote");
        assert_eq!(arg, "AAPL");
    }

    #[test]
    fn parses_tool_call_with_no_arg() {
        let (op, arg) = parse_tool_call("TOOL: sentiment").unwrap();
        assert_eq!(op, "sentiment");
        assert_eq!(arg, "");
    }

    #[test]
    fn non_tool_content_is_not_a_tool_call() {
        assert!(parse_tool_call("Here is my final report on AAPL.").is_none());
    }

    #[test]
    fn finalize_assigns_section_for_reporting_roles_only() {
        let out = finalize(AgentRole::Market, "report text");
        assert_eq!(out.updated_fields.get(&SectionType::MarketReport).unwrap(), "report text");

        let out = finalize(AgentRole::Bull, "argument text");
        assert!(out.updated_fields.is_empty());
    }

    #[test]
    fn every_role_as_str_round_trips_through_tools_module() {
        for role in [
            AgentRole::Market,
            AgentRole::Social,
            AgentRole::News,
            AgentRole::Fundamentals,
            AgentRole::BenGraham,
            AgentRole::WarrenBuffett,
            AgentRole::Bull,
            AgentRole::Bear,
            AgentRole::ResearchManager,
            AgentRole::Trader,
            AgentRole::Risky,
            AgentRole::Safe,
            AgentRole::Neutral,
            AgentRole::RiskManager,
        ] {
            assert!(!role.as_str().is_empty());
            let _ = tools::tools_for_role(role, true);
        }
    }
}
