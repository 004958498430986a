//! Per-role tool-capability sets. A role's `OnlineTools` enumerate the
//! Gateway ops it may invoke while producing its section; roles that only
//! reason over already-produced state (debates, managers, trader) get the
//! empty `OfflineTools` set regardless of the `online_tools` flag.
//!
//! Mirrors `toolkit.config["online_tools"]` in
//! `original_source/tradingagents/agents/analysts/{market,fundamentals,
//! news,social_media}_analyst.py`: each of those four analysts branches
//! between a live-vendor tool set and a local/cached one. This crate has no
//! offline data source to stand in for the original's bundled CSV/SimFin
//! fixtures, so the `online_tools = false` branch for those four roles is
//! the empty set — the analyst reasons over the session state and recalled
//! memories already gathered instead of issuing a live fetch.

use crate::agent::AgentRole;
use crate::gateway::GatewayOp;
use std::collections::HashSet;

pub fn tools_for_role(role: AgentRole, online_tools: bool) -> HashSet<GatewayOp> {
    match role {
        AgentRole::Market => {
            if online_tools {
                [GatewayOp::Quote].into_iter().collect()
            } else {
                HashSet::new()
            }
        }
        AgentRole::Social => {
            if online_tools {
                [GatewayOp::Sentiment].into_iter().collect()
            } else {
                HashSet::new()
            }
        }
        AgentRole::News => {
            if online_tools {
                [GatewayOp::News].into_iter().collect()
            } else {
                HashSet::new()
            }
        }
        AgentRole::Fundamentals => {
            if online_tools {
                [GatewayOp::Quote, GatewayOp::FearGreedHistory].into_iter().collect()
            } else {
                HashSet::new()
            }
        }
        // Ben Graham / Warren Buffett are not among the original's
        // online_tools-gated analysts; their tool set is fixed.
        AgentRole::BenGraham | AgentRole::WarrenBuffett => {
            [GatewayOp::Quote, GatewayOp::News].into_iter().collect()
        }
        // Debate, manager, and trader roles are OfflineTools: pure reasoning
        // over the session state already assembled by the analyst fan-out.
        AgentRole::Bull
        | AgentRole::Bear
        | AgentRole::ResearchManager
        | AgentRole::Trader
        | AgentRole::Risky
        | AgentRole::Safe
        | AgentRole::Neutral
        | AgentRole::RiskManager => HashSet::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analyst_roles_get_nonempty_tool_sets_when_online() {
        assert!(!tools_for_role(AgentRole::Market, true).is_empty());
        assert!(!tools_for_role(AgentRole::News, true).is_empty());
    }

    #[test]
    fn gated_analyst_roles_go_offline_empty_when_online_tools_disabled() {
        assert!(tools_for_role(AgentRole::Market, false).is_empty());
        assert!(tools_for_role(AgentRole::Social, false).is_empty());
        assert!(tools_for_role(AgentRole::News, false).is_empty());
        assert!(tools_for_role(AgentRole::Fundamentals, false).is_empty());
    }

    #[test]
    fn legendary_investor_roles_are_unaffected_by_online_tools_flag() {
        assert_eq!(tools_for_role(AgentRole::BenGraham, true), tools_for_role(AgentRole::BenGraham, false));
        assert!(!tools_for_role(AgentRole::WarrenBuffett, false).is_empty());
    }

    #[test]
    fn debate_and_manager_roles_are_offline() {
        assert!(tools_for_role(AgentRole::Bull, true).is_empty());
        assert!(tools_for_role(AgentRole::RiskManager, true).is_empty());
        assert!(tools_for_role(AgentRole::Trader, true).is_empty());
    }
}
