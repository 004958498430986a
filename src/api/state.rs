//! Shared application state threaded through every handler via `State`.

use crate::config::Config;
use crate::gateway::Gateway;
use crate::memory::MemoryStore;
use crate::orchestrator::{CancelToken, Orchestrator};
use crate::progress::ProgressBus;
use crate::store::SessionStore;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Registry of cancel tokens for sessions currently executing, keyed by
/// `session_id`. The orchestrator itself is stateless between runs; this is
/// the one piece of process-wide mutable state the HTTP layer needs to wire
/// a `POST /analysis/{id}/cancel` request to the task actually running it.
#[derive(Clone, Default)]
pub struct CancelRegistry {
    tokens: Arc<Mutex<HashMap<Uuid, CancelToken>>>,
}

impl CancelRegistry {
    pub fn register(&self, session_id: Uuid, token: CancelToken) {
        self.tokens.lock().insert(session_id, token);
    }

    pub fn cancel(&self, session_id: Uuid) -> bool {
        match self.tokens.lock().get(&session_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn forget(&self, session_id: Uuid) {
        self.tokens.lock().remove(&session_id);
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SessionStore>,
    pub memory: Arc<MemoryStore>,
    pub gateway: Arc<Gateway>,
    pub orchestrator: Arc<Orchestrator>,
    pub progress: Arc<ProgressBus>,
    pub cancel_registry: CancelRegistry,
    pub config: Arc<Config>,
}
