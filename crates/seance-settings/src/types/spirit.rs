use serde::{Deserialize, Serialize};

use seance_core::constants::HISTORY_WINDOW;
use seance_core::retry::RetryConfig;

/// Response generation settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpiritSettings {
    /// Google Generative Language API key. `None` runs the offline generator.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Gemini model id.
    pub model: String,
    /// API base URL.
    pub base_url: String,
    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Prior exchanges included in each prompt.
    pub history_window: usize,
    /// Retry policy for the generation call.
    pub retry: RetryConfig,
}

impl Default for SpiritSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-1.5-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            request_timeout_ms: 30_000,
            history_window: HISTORY_WINDOW,
            retry: RetryConfig::default(),
        }
    }
}
