use serde::{Deserialize, Serialize};

/// Terminal client settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// Automatic reconnection attempts before giving up.
    pub max_reconnect_attempts: u32,
    /// First reconnection delay; doubles per attempt.
    pub reconnect_base_delay_ms: u64,
    /// Server URL used when `join` is given no `--url`.
    pub server_url: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 5,
            reconnect_base_delay_ms: 1000,
            server_url: "ws://127.0.0.1:8000".to_string(),
        }
    }
}
