//! Settings types. Every field has a compiled default so a partial
//! `settings.json` only needs to mention what it changes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use fable_core::config::{AiConfig, ApiKeyMap};
use fable_core::messages::Message;

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    /// Model used when a feature does not pick its own.
    pub ai: AiConfig,
    /// Per-provider API keys.
    pub api_keys: ApiKeyMap,
    pub memory: MemorySettings,
    pub retry: RetrySettings,
    /// `{{name}}` substitutions applied to every outbound text part.
    pub global_variables: BTreeMap<String, String>,
    /// Messages placed at the very start of every request.
    pub global_context: Vec<Message>,
    pub logging: LoggingSettings,
}

/// Budgets for the memory compaction engine.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct MemorySettings {
    /// Estimated-token ceiling for one memory block (headroom is subtracted).
    pub token_limit: usize,
    /// Rounds an actor remembers in full before decay sampling starts.
    pub actor_capacity: u32,
    /// How far back world memory looks.
    pub world_rounds: u32,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            token_limit: 64_000,
            actor_capacity: 10,
            world_rounds: 20,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrySettings {
    pub max_retries: u32,
    /// Pause between supervised attempts.
    pub retry_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level (`trace`..`error`); `RUST_LOG` still wins.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fable_core::config::ProviderKind;

    #[test]
    fn defaults() {
        let settings = AppSettings::default();
        assert_eq!(settings.ai.provider, ProviderKind::Gemini);
        assert_eq!(settings.memory.token_limit, 64_000);
        assert_eq!(settings.memory.actor_capacity, 10);
        assert_eq!(settings.memory.world_rounds, 20);
        assert_eq!(settings.retry.max_retries, 3);
        assert_eq!(settings.logging.level, "info");
        assert!(settings.api_keys.is_empty());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: AppSettings = serde_json::from_str(
            r#"{"apiKeys": {"deepseek": "sk-1"}, "memory": {"tokenLimit": 9000}}"#,
        )
        .unwrap();
        assert_eq!(settings.api_keys.get(&ProviderKind::DeepSeek).unwrap(), "sk-1");
        assert_eq!(settings.memory.token_limit, 9000);
        assert_eq!(settings.memory.actor_capacity, 10);
    }
}
