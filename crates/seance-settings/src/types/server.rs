use serde::{Deserialize, Serialize};

use seance_core::constants::DEFAULT_MAX_SESSION_USERS;

/// Smallest accepted `maxSessionUsers`.
pub const MIN_SESSION_USERS: usize = 2;
/// Largest accepted `maxSessionUsers`.
pub const MAX_SESSION_USERS: usize = 12;

/// Server network and session settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// HTTP / WebSocket port.
    pub port: u16,
    /// Advisory participant cap recorded on each new session.
    pub max_session_users: usize,
    /// Capacity of each connection's outbound queue. A full queue marks the
    /// connection dead.
    pub outbound_queue_capacity: usize,
    /// Allowed CORS origins. Empty allows any origin.
    pub cors_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_session_users: DEFAULT_MAX_SESSION_USERS,
            outbound_queue_capacity: 256,
            cors_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}
