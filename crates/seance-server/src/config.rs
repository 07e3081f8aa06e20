//! Server configuration.

use serde::{Deserialize, Serialize};

use seance_core::constants::{DEFAULT_MAX_SESSION_USERS, HISTORY_WINDOW};
use seance_settings::SeanceSettings;

/// Configuration for the Séance server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Advisory participant cap recorded on each new session.
    pub max_session_users: usize,
    /// Capacity of each connection's outbound queue.
    pub outbound_queue_capacity: usize,
    /// Allowed CORS origins. Empty allows any origin.
    pub cors_origins: Vec<String>,
    /// Exchanges kept per session for generation context.
    pub history_window: usize,
    /// Seconds a peer has to send its handshake frame.
    pub handshake_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_session_users: DEFAULT_MAX_SESSION_USERS,
            outbound_queue_capacity: 256,
            cors_origins: Vec::new(),
            history_window: HISTORY_WINDOW,
            handshake_timeout_secs: 10,
        }
    }
}

impl ServerConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &SeanceSettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            max_session_users: settings.server.max_session_users,
            outbound_queue_capacity: settings.server.outbound_queue_capacity,
            cors_origins: settings.server.cors_origins.clone(),
            history_window: settings.spirit.history_window,
            ..Self::default()
        }
    }

    /// `host:port` bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_binds_loopback_on_any_port() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 0);
        assert_eq!(cfg.bind_addr(), "127.0.0.1:0");
    }

    #[test]
    fn default_limits() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.max_session_users, 6);
        assert_eq!(cfg.history_window, 10);
        assert!(cfg.outbound_queue_capacity > 0);
    }

    #[test]
    fn from_settings_copies_server_section() {
        let mut settings = SeanceSettings::default();
        settings.server.port = 9100;
        settings.server.max_session_users = 8;
        settings.spirit.history_window = 4;
        let cfg = ServerConfig::from_settings(&settings);
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 9100);
        assert_eq!(cfg.max_session_users, 8);
        assert_eq!(cfg.history_window, 4);
        assert_eq!(cfg.cors_origins, vec!["http://localhost:3000".to_string()]);
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = ServerConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }
}
