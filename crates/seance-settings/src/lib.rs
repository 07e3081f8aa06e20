//! # seance-settings
//!
//! Layered configuration for the Séance server and terminal client.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`SeanceSettings::default()`]
//! 2. **User file**: `~/.seance/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `SEANCE_*`, `GOOGLE_API_KEY`, `GEMINI_MODEL`

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
