//! Per-session conversation window fed back into generation context.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use seance_core::SessionId;
use seance_spirit::Exchange;

/// Bounded question/answer history per session.
pub struct ConversationHistory {
    window: usize,
    sessions: Mutex<HashMap<SessionId, VecDeque<Exchange>>>,
}

impl ConversationHistory {
    /// Keep at most `window` exchanges per session.
    pub fn new(window: usize) -> Self {
        Self {
            window,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Append an exchange, evicting the oldest beyond the window.
    pub fn record(&self, session_id: &SessionId, exchange: Exchange) {
        if self.window == 0 {
            return;
        }
        let mut sessions = self.sessions.lock();
        let entries = sessions.entry(session_id.clone()).or_default();
        entries.push_back(exchange);
        while entries.len() > self.window {
            let _ = entries.pop_front();
        }
    }

    /// Exchanges for `session_id`, oldest first.
    pub fn recent(&self, session_id: &SessionId) -> Vec<Exchange> {
        self.sessions
            .lock()
            .get(session_id)
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop a closed session's history.
    pub fn forget(&self, session_id: &SessionId) {
        let _ = self.sessions.lock().remove(session_id);
    }

    /// Sessions with recorded history.
    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }
}
