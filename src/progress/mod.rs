//! Progress Bus (C6)
//! Mission: per-session, multi-subscriber event stream — one broadcast
//! channel per session plus a registry, with a linger window so a
//! subscriber that connects right after completion still sees the
//! terminal event.

use crate::models::{AgentExecution, AnalysisSession, ReportSection, SessionStatus};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "PascalCase")]
pub enum ProgressEventKind {
    AgentStarted { agent: String },
    AgentFinished { agent: String },
    SectionAppended { section_type: String },
    PhaseChanged { phase: String },
    Terminal { status: String },
    /// Synthetic marker emitted to a subscriber that fell behind the
    /// bounded buffer; never persisted.
    Lagged,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub session_id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: ProgressEventKind,
}

struct SessionChannel {
    tx: broadcast::Sender<ProgressEvent>,
    terminal_at: Option<DateTime<Utc>>,
}

/// Process-wide registry of per-session broadcast channels.
pub struct ProgressBus {
    buffer_size: usize,
    linger: Duration,
    channels: Arc<Mutex<HashMap<Uuid, SessionChannel>>>,
}

impl ProgressBus {
    pub fn new(buffer_size: usize, linger_secs: u64) -> Self {
        Self {
            buffer_size,
            linger: Duration::from_secs(linger_secs),
            channels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn channel_for(&self, session_id: Uuid) -> broadcast::Sender<ProgressEvent> {
        let mut channels = self.channels.lock();
        channels
            .entry(session_id)
            .or_insert_with(|| SessionChannel {
                tx: broadcast::channel(self.buffer_size.max(1)).0,
                terminal_at: None,
            })
            .tx
            .clone()
    }

    pub fn publish(&self, session_id: Uuid, kind: ProgressEventKind) {
        let is_terminal = matches!(kind, ProgressEventKind::Terminal { .. });
        let event = ProgressEvent {
            session_id,
            timestamp: Utc::now(),
            kind,
        };

        let tx = self.channel_for(session_id);
        let _ = tx.send(event);

        if is_terminal {
            let mut channels = self.channels.lock();
            if let Some(chan) = channels.get_mut(&session_id) {
                chan.terminal_at = Some(Utc::now());
            }
        }
    }

    pub fn publish_terminal(&self, session_id: Uuid, status: SessionStatus) {
        self.publish(
            session_id,
            ProgressEventKind::Terminal { status: status.as_str().to_string() },
        );
    }

    /// Subscribes a late/live listener. Returns `None` once the session's
    /// linger window has elapsed (the HTTP layer should fall back to
    /// replaying the final report from the store instead).
    pub fn subscribe(&self, session_id: Uuid) -> Option<broadcast::Receiver<ProgressEvent>> {
        let channels = self.channels.lock();
        match channels.get(&session_id) {
            Some(chan) => match chan.terminal_at {
                Some(at) if Utc::now().signed_duration_since(at).to_std().unwrap_or_default() > self.linger => None,
                _ => Some(chan.tx.subscribe()),
            },
            None => None,
        }
    }

    /// Drops channels whose linger window has elapsed. Intended to be
    /// called periodically by a background sweep; harmless if never called
    /// since `broadcast::Sender`s are cheap and bounded per subscriber.
    pub fn sweep_expired(&self) {
        let mut channels = self.channels.lock();
        channels.retain(|_, chan| match chan.terminal_at {
            Some(at) => Utc::now().signed_duration_since(at).to_std().unwrap_or_default() <= self.linger,
            None => true,
        });
    }
}

/// Reconstructs the events a subscriber would have seen had it connected at
/// session start, from what's already durable in the store (spec.md §4.6:
/// "late subscribers receive a synthetic replay ... followed by live events
/// if any"). Ordered by the timestamp each underlying row carries so a
/// client sees agent-started/finished pairs interleaved with the sections
/// they produced in the order they actually happened.
pub fn synthesize_replay(
    session: &AnalysisSession,
    sections: &[ReportSection],
    executions: &[AgentExecution],
) -> Vec<ProgressEvent> {
    let mut events: Vec<ProgressEvent> = Vec::new();

    for execution in executions {
        if let Some(started_at) = execution.started_at {
            events.push(ProgressEvent {
                session_id: session.session_id,
                timestamp: started_at,
                kind: ProgressEventKind::AgentStarted { agent: execution.agent_name.clone() },
            });
        }
        if let Some(completed_at) = execution.completed_at {
            events.push(ProgressEvent {
                session_id: session.session_id,
                timestamp: completed_at,
                kind: ProgressEventKind::AgentFinished { agent: execution.agent_name.clone() },
            });
        }
    }

    for section in sections {
        events.push(ProgressEvent {
            session_id: session.session_id,
            timestamp: section.created_at,
            kind: ProgressEventKind::SectionAppended { section_type: section.section_type.as_str().to_string() },
        });
    }

    events.sort_by_key(|e| e.timestamp);

    if session.status.is_terminal() {
        events.push(ProgressEvent {
            session_id: session.session_id,
            timestamp: session.completed_at.unwrap_or_else(Utc::now),
            kind: ProgressEventKind::Terminal { status: session.status.as_str().to_string() },
        });
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = ProgressBus::new(8, 30);
        let session_id = Uuid::new_v4();
        let mut rx = bus.subscribe_for_test(session_id);

        bus.publish(session_id, ProgressEventKind::AgentStarted { agent: "market".to_string() });
        let event = rx.recv().await.unwrap();
        assert!(matches!(event.kind, ProgressEventKind::AgentStarted { .. }));
    }

    #[tokio::test]
    async fn terminal_event_marks_session_for_linger() {
        let bus = ProgressBus::new(8, 30);
        let session_id = Uuid::new_v4();
        let _rx = bus.subscribe_for_test(session_id);

        bus.publish_terminal(session_id, SessionStatus::Completed);
        assert!(bus.subscribe(session_id).is_some());
    }

    #[test]
    fn subscribe_to_unknown_session_returns_none() {
        let bus = ProgressBus::new(8, 30);
        assert!(bus.subscribe(Uuid::new_v4()).is_none());
    }

    #[test]
    fn replay_orders_events_by_timestamp_and_appends_terminal() {
        use crate::models::{AgentExecutionStatus, Decision, SectionType};

        let session_id = Uuid::new_v4();
        let t0 = Utc::now();
        let session = AnalysisSession {
            session_id,
            user_id: Uuid::new_v4(),
            owner_username: "alice".to_string(),
            ticker: "AAPL".to_string(),
            analysis_date: t0.date_naive(),
            status: SessionStatus::Completed,
            created_at: t0,
            completed_at: Some(t0 + chrono::Duration::seconds(20)),
            final_decision: Some(Decision::Buy),
            confidence: Some(0.8),
            execution_seconds: Some(20.0),
            config_snapshot: serde_json::json!({}),
        };

        let executions = vec![AgentExecution {
            id: 1,
            session_id,
            agent_name: "market".to_string(),
            status: AgentExecutionStatus::Completed,
            started_at: Some(t0),
            completed_at: Some(t0 + chrono::Duration::seconds(5)),
            execution_seconds: Some(5.0),
            error_message: None,
        }];

        let sections = vec![ReportSection {
            id: 1,
            session_id,
            section_type: SectionType::MarketReport,
            agent_name: "market".to_string(),
            content: "report".to_string(),
            created_at: t0 + chrono::Duration::seconds(5),
        }];

        let replay = synthesize_replay(&session, &sections, &executions);
        assert_eq!(replay.len(), 4);
        assert!(matches!(replay[0].kind, ProgressEventKind::AgentStarted { .. }));
        assert!(matches!(replay[1].kind, ProgressEventKind::AgentFinished { .. }));
        assert!(matches!(replay[2].kind, ProgressEventKind::SectionAppended { .. }));
        assert!(matches!(replay[3].kind, ProgressEventKind::Terminal { .. }));
    }

    impl ProgressBus {
        fn subscribe_for_test(&self, session_id: Uuid) -> broadcast::Receiver<ProgressEvent> {
            self.channel_for(session_id).subscribe()
        }
    }
}
