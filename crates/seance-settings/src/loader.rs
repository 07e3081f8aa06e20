//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`SeanceSettings::default()`]
//! 2. If `~/.seance/settings.json` exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//! 4. Validate ranges
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::{MAX_SESSION_USERS, MIN_SESSION_USERS, SeanceSettings};

/// Resolve the path to the settings file (`~/.seance/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".seance").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<SeanceSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or out-of-range values are
/// errors.
pub fn load_settings_from_path(path: &Path) -> Result<SeanceSettings> {
    let mut settings = read_file_layer(path)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

fn read_file_layer(path: &Path) -> Result<SeanceSettings> {
    let defaults = serde_json::to_value(SeanceSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Reject values that would make the server misbehave.
pub fn validate(settings: &SeanceSettings) -> Result<()> {
    let users = settings.server.max_session_users;
    if !(MIN_SESSION_USERS..=MAX_SESSION_USERS).contains(&users) {
        return Err(SettingsError::InvalidValue(format!(
            "server.maxSessionUsers must be within {MIN_SESSION_USERS}..={MAX_SESSION_USERS}, got {users}"
        )));
    }
    if settings.server.port == 0 {
        return Err(SettingsError::InvalidValue(
            "server.port must be non-zero".into(),
        ));
    }
    if settings.server.outbound_queue_capacity == 0 {
        return Err(SettingsError::InvalidValue(
            "server.outboundQueueCapacity must be non-zero".into(),
        ));
    }
    if !(0.0..=1.0).contains(&settings.spirit.retry.jitter_factor) {
        return Err(SettingsError::InvalidValue(
            "spirit.retry.jitterFactor must be within 0.0..=1.0".into(),
        ));
    }
    Ok(())
}

/// Apply environment variable overrides from the process environment.
pub fn apply_env_overrides(settings: &mut SeanceSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary lookup.
///
/// Invalid values are ignored with a warning (fall back to file/default).
pub fn apply_overrides_from<F>(settings: &mut SeanceSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = Env { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("SEANCE_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.parsed("SEANCE_PORT", |s| parse_u16_range(s, 1, 65535)) {
        settings.server.port = v;
    }
    if let Some(v) = env.parsed("SEANCE_MAX_SESSION_USERS", |s| {
        parse_usize_range(s, MIN_SESSION_USERS, MAX_SESSION_USERS)
    }) {
        settings.server.max_session_users = v;
    }
    if let Some(v) = env.parsed("SEANCE_OUTBOUND_QUEUE", |s| parse_usize_range(s, 1, 65_536)) {
        settings.server.outbound_queue_capacity = v;
    }
    if let Some(v) = env.parsed("SEANCE_CORS_ORIGINS", parse_origin_list) {
        settings.server.cors_origins = v;
    }

    // ── Spirit ──────────────────────────────────────────────────────
    if let Some(v) = env.string("GOOGLE_API_KEY") {
        settings.spirit.api_key = Some(v);
    }
    if let Some(v) = env.string("GEMINI_MODEL") {
        settings.spirit.model = v;
    }
    if let Some(v) = env.parsed("SEANCE_GENERATION_RETRIES", |s| parse_u32_range(s, 0, 10)) {
        settings.spirit.retry.max_retries = v;
    }

    // ── Client ──────────────────────────────────────────────────────
    if let Some(v) = env.string("SEANCE_SERVER_URL") {
        settings.client.server_url = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.parsed("SEANCE_LOG_LEVEL", parse_log_level) {
        settings.logging.level = v;
    }
    if let Some(v) = env.parsed("SEANCE_LOG_JSON", parse_bool) {
        settings.logging.json = v;
    }
}

struct Env<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let val = (self.lookup)(name)?;
        let result = parse(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid env var, ignoring");
        }
        result
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u32` within a range.
pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Normalize a log level name to a `tracing` level.
///
/// Accepts the usual names case-insensitively, plus `warning` and `critical`.
pub fn parse_log_level(val: &str) -> Option<String> {
    let level = match val.trim().to_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "info" => "info",
        "warn" | "warning" => "warn",
        "error" | "critical" => "error",
        _ => return None,
    };
    Some(level.to_string())
}

/// Parse an origin list given either as a JSON array or comma-separated.
pub fn parse_origin_list(val: &str) -> Option<Vec<String>> {
    if let Ok(list) = serde_json::from_str::<Vec<String>>(val) {
        return Some(list);
    }
    let list: Vec<String> = val
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect();
    (!list.is_empty()).then_some(list)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
