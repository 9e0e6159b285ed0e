//! `AppSettings` resolution for the orchestration core.
//!
//! A settings file only needs the keys it changes: its JSON is layered over
//! the serialized defaults, nested objects key by key, and a `null` leaves
//! the default alone. `FABLE_*` variables and provider key variables are
//! applied last, then the result is validated.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use fable_core::config::{ProviderKind, ReasoningEffort};

use crate::errors::{Result, SettingsError};
use crate::types::AppSettings;

const SETTINGS_FILE: &str = "settings.json";

/// `$FABLE_HOME/settings.json`, else `~/.fable/settings.json`.
pub fn settings_path() -> PathBuf {
    resolve_settings_path(|name| std::env::var(name).ok())
}

fn resolve_settings_path(lookup: impl Fn(&str) -> Option<String>) -> PathBuf {
    let dir = match lookup("FABLE_HOME").filter(|v| !v.trim().is_empty()) {
        Some(dir) => PathBuf::from(dir),
        None => PathBuf::from(lookup("HOME").unwrap_or_else(|| "/tmp".to_string())).join(".fable"),
    };
    dir.join(SETTINGS_FILE)
}

pub fn load_settings() -> Result<AppSettings> {
    load_settings_from_path(&settings_path())
}

/// Defaults when `path` does not exist; malformed JSON or an invalid value
/// is an error.
pub fn load_settings_from_path(path: &Path) -> Result<AppSettings> {
    let mut merged = serde_json::to_value(AppSettings::default())?;

    match std::fs::read_to_string(path) {
        Ok(content) => {
            debug!(?path, "applying settings file");
            deep_merge(&mut merged, serde_json::from_str(&content)?);
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(?path, "no settings file");
        }
        Err(err) => return Err(err.into()),
    }

    let mut settings: AppSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

/// Layer `overlay` onto `base` in place. Objects merge per key, `null`
/// entries are ignored, anything else replaces the base value.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                if value.is_null() {
                    continue;
                }
                match base_map.get_mut(&key) {
                    Some(slot) => deep_merge(slot, value),
                    None => {
                        let _ = base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Apply `FABLE_*` and `<PROVIDER>_API_KEY` overrides from the process environment.
pub fn apply_env_overrides(settings: &mut AppSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary variable lookup.
///
/// Invalid values are silently ignored (fall back to file/default).
pub fn apply_overrides_from(settings: &mut AppSettings, lookup: impl Fn(&str) -> Option<String>) {
    let read_string = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    // ── Model selection ─────────────────────────────────────────────
    if let Some(v) = read_string("FABLE_PROVIDER") {
        if let Ok(kind) = serde_json::from_value::<ProviderKind>(Value::String(v)) {
            settings.ai.provider = kind;
        }
    }
    if let Some(v) = read_string("FABLE_MODEL") {
        settings.ai.model = v;
    }
    if let Some(v) = read_string("FABLE_BASE_URL") {
        settings.ai.base_url = Some(v);
    }
    if let Some(v) = read_string("FABLE_TEMPERATURE").and_then(|v| v.parse::<f32>().ok()) {
        if (0.0..=2.0).contains(&v) {
            settings.ai.temperature = v;
        }
    }
    if let Some(v) = read_string("FABLE_REASONING_EFFORT") {
        if let Ok(effort) = serde_json::from_value::<ReasoningEffort>(Value::String(v)) {
            settings.ai.reasoning_effort = Some(effort);
        }
    }

    // ── Memory budgets ──────────────────────────────────────────────
    if let Some(v) = read_string("FABLE_MEMORY_TOKEN_LIMIT").and_then(|v| v.parse::<usize>().ok()) {
        if (1..=10_000_000).contains(&v) {
            settings.memory.token_limit = v;
        }
    }
    if let Some(v) = read_string("FABLE_MEMORY_CAPACITY").and_then(|v| v.parse::<u32>().ok()) {
        if (1..=10_000).contains(&v) {
            settings.memory.actor_capacity = v;
        }
    }
    if let Some(v) = read_string("FABLE_WORLD_ROUNDS").and_then(|v| v.parse::<u32>().ok()) {
        settings.memory.world_rounds = v;
    }

    // ── Retry ───────────────────────────────────────────────────────
    if let Some(v) = read_string("FABLE_MAX_RETRIES").and_then(|v| v.parse::<u32>().ok()) {
        if (1..=20).contains(&v) {
            settings.retry.max_retries = v;
        }
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read_string("FABLE_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_string("FABLE_LOG_JSON") {
        match v.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => settings.logging.json = true,
            "false" | "0" | "no" | "off" => settings.logging.json = false,
            _ => {}
        }
    }

    // ── API keys ────────────────────────────────────────────────────
    for kind in ProviderKind::ALL {
        if kind == ProviderKind::Unknown {
            continue;
        }
        if let Some(key) = read_string(&kind.env_key_name()) {
            let _ = settings.api_keys.insert(kind, key);
        }
    }
}

fn validate(settings: &AppSettings) -> Result<()> {
    if settings.memory.token_limit == 0 {
        return Err(SettingsError::InvalidValue(
            "memory.tokenLimit must be positive".into(),
        ));
    }
    if settings.memory.actor_capacity == 0 {
        return Err(SettingsError::InvalidValue(
            "memory.actorCapacity must be positive".into(),
        ));
    }
    if settings.retry.max_retries == 0 {
        return Err(SettingsError::InvalidValue(
            "retry.maxRetries must be at least 1".into(),
        ));
    }
    Ok(())
}
