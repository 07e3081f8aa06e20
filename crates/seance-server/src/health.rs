//! `/health` endpoint: liveness plus a per-session participant summary.

use serde::Serialize;
use std::time::Instant;

use seance_core::SessionId;

use crate::websocket::registry::SessionInfo;

/// One live session as reported by `/health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionHealth {
    /// Session id.
    pub session_id: SessionId,
    /// Open connections in the session.
    pub participants: usize,
    /// Advisory participant cap.
    pub max_users: usize,
}

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: &'static str,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Generation backend answering questions.
    pub spirit: String,
    /// Open WebSocket connections across all sessions.
    pub connections: usize,
    /// Sessions with at least one participant.
    pub active_sessions: usize,
    /// Live sessions, ordered by id.
    pub sessions: Vec<SessionHealth>,
}

/// Build a health response from registry snapshots.
pub fn health_check(start_time: Instant, spirit: &str, sessions: &[SessionInfo]) -> HealthResponse {
    let sessions: Vec<SessionHealth> = sessions
        .iter()
        .filter(|info| info.participants > 0)
        .map(|info| SessionHealth {
            session_id: info.id.clone(),
            participants: info.participants,
            max_users: info.max_users,
        })
        .collect();
    HealthResponse {
        status: "ok",
        uptime_secs: start_time.elapsed().as_secs(),
        spirit: spirit.to_owned(),
        connections: sessions.iter().map(|s| s.participants).sum(),
        active_sessions: sessions.len(),
        sessions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn info(id: &str, participants: usize) -> SessionInfo {
        SessionInfo {
            id: SessionId::from(id),
            created_at: Utc::now(),
            max_users: 6,
            participants,
            active: true,
        }
    }

    #[test]
    fn idle_server() {
        let resp = health_check(Instant::now(), "offline", &[]);
        assert_eq!(resp.status, "ok");
        assert_eq!(resp.spirit, "offline");
        assert_eq!(resp.connections, 0);
        assert!(resp.sessions.is_empty());
    }

    #[test]
    fn counts_come_from_sessions() {
        let resp = health_check(
            Instant::now(),
            "gemini",
            &[info("attic", 1), info("parlour", 3)],
        );
        assert_eq!(resp.connections, 4);
        assert_eq!(resp.active_sessions, 2);
        assert_eq!(resp.sessions[1].session_id, SessionId::from("parlour"));
        assert_eq!(resp.sessions[1].participants, 3);
    }

    #[test]
    fn empty_buckets_are_not_reported() {
        let resp = health_check(Instant::now(), "gemini", &[info("attic", 0), info("parlour", 2)]);
        assert_eq!(resp.active_sessions, 1);
        assert_eq!(resp.sessions.len(), 1);
    }

    #[test]
    fn wire_shape() {
        let start = Instant::now()
            .checked_sub(std::time::Duration::from_secs(60))
            .unwrap();
        let resp = health_check(start, "gemini", &[info("parlour", 2)]);
        let parsed = serde_json::to_value(&resp).unwrap();
        assert!(parsed["uptime_secs"].as_u64().unwrap() >= 59);
        assert_eq!(parsed["sessions"][0]["session_id"], "parlour");
        assert_eq!(parsed["sessions"][0]["participants"], 2);
        assert_eq!(parsed["connections"], 2);
    }
}
