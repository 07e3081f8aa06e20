//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and `#[serde(default)]`
//! so a settings file may be partial: missing fields keep their compiled
//! default.

mod client;
mod server;
mod spirit;

pub use client::*;
pub use server::*;
pub use spirit::*;

use serde::{Deserialize, Serialize};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 9000, "maxSessionUsers": 8 },
///   "spirit": { "model": "gemini-1.5-pro" },
///   "logging": { "level": "debug" }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SeanceSettings {
    /// Network and session limits.
    pub server: ServerSettings,
    /// Response generation.
    pub spirit: SpiritSettings,
    /// Terminal client behaviour.
    pub client: ClientSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// `tracing` filter directive (`info`, `seance_server=debug`, ...).
    pub level: String,
    /// Emit one JSON object per line instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
