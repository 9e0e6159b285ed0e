use std::collections::HashMap;
use std::fmt;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::messages::Message;

/// Supported model vendors. Anything unrecognized deserializes to `Unknown`
/// and is treated as a generic OpenAI-compatible endpoint.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Gemini,
    OpenAi,
    DeepSeek,
    OpenRouter,
    XAi,
    Claude,
    Moonshot,
    Qwen,
    SiliconFlow,
    Volcengine,
    Zhipu,
    Ollama,
    LmStudio,
    #[serde(other)]
    Unknown,
}

/// Wire protocol family a provider speaks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderFamily {
    /// `{role, parts}` multimodal protocol.
    Native,
    /// OpenAI-compatible `/chat/completions`.
    Rest,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 14] = [
        Self::Gemini,
        Self::OpenAi,
        Self::DeepSeek,
        Self::OpenRouter,
        Self::XAi,
        Self::Claude,
        Self::Moonshot,
        Self::Qwen,
        Self::SiliconFlow,
        Self::Volcengine,
        Self::Zhipu,
        Self::Ollama,
        Self::LmStudio,
        Self::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::OpenAi => "openai",
            Self::DeepSeek => "deepseek",
            Self::OpenRouter => "openrouter",
            Self::XAi => "xai",
            Self::Claude => "claude",
            Self::Moonshot => "moonshot",
            Self::Qwen => "qwen",
            Self::SiliconFlow => "siliconflow",
            Self::Volcengine => "volcengine",
            Self::Zhipu => "zhipu",
            Self::Ollama => "ollama",
            Self::LmStudio => "lmstudio",
            Self::Unknown => "unknown",
        }
    }

    pub fn family(&self) -> ProviderFamily {
        match self {
            Self::Gemini => ProviderFamily::Native,
            _ => ProviderFamily::Rest,
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::Gemini => "https://generativelanguage.googleapis.com/v1beta",
            Self::DeepSeek => "https://api.deepseek.com/v1",
            Self::OpenRouter => "https://openrouter.ai/api/v1",
            Self::XAi => "https://api.x.ai/v1",
            Self::Claude => "https://api.anthropic.com/v1",
            Self::Moonshot => "https://api.moonshot.cn/v1",
            Self::Qwen => "https://dashscope.aliyuncs.com/compatible-mode/v1",
            Self::SiliconFlow => "https://api.siliconflow.cn/v1",
            Self::Volcengine => "https://ark.cn-beijing.volces.com/api/v3",
            Self::Zhipu => "https://open.bigmodel.cn/api/paas/v4",
            Self::Ollama => "http://localhost:11434/v1",
            Self::LmStudio => "http://localhost:1234/v1",
            Self::OpenAi | Self::Unknown => "https://api.openai.com/v1",
        }
    }

    /// Whether `response_format: json_object` may be sent.
    pub fn supports_json_mode(&self) -> bool {
        !matches!(self, Self::Claude | Self::Zhipu | Self::LmStudio)
    }

    /// Local servers accept unauthenticated requests.
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, Self::Ollama | Self::LmStudio)
    }

    /// Environment variable conventionally holding this provider's key.
    pub fn env_key_name(&self) -> String {
        format!("{}_API_KEY", self.as_str().to_ascii_uppercase())
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Minimal,
    Low,
    Medium,
    High,
}

impl ReasoningEffort {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Wraps an API key with secrecy protection (zeroized on drop, redacted in Debug).
#[derive(Clone)]
pub struct ApiKey(pub SecretString);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(SecretString::from(key.into()))
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}

/// Per-provider API keys supplied by the host application.
pub type ApiKeyMap = HashMap<ProviderKind, String>;

/// Model selection and sampling settings for one feature call.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AiConfig {
    pub provider: ProviderKind,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<ReasoningEffort>,
    /// Provider/model-specific context messages placed after the global context.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context_config: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

fn default_temperature() -> f32 {
    1.0
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Gemini,
            model: "gemini-2.5-flash".into(),
            api_key: None,
            temperature: default_temperature(),
            reasoning_effort: None,
            context_config: Vec::new(),
            base_url: None,
        }
    }
}

impl fmt::Debug for AiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AiConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("temperature", &self.temperature)
            .field("reasoning_effort", &self.reasoning_effort)
            .field("context_config", &self.context_config.len())
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl AiConfig {
    /// Copy of this config targeting a different model.
    pub fn with_model(&self, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..self.clone()
        }
    }

    /// Explicit key on the config wins over the host-supplied map.
    pub fn resolve_api_key(&self, keys: &ApiKeyMap) -> Option<ApiKey> {
        self.api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| {
                keys.get(&self.provider)
                    .map(String::as_str)
                    .filter(|k| !k.trim().is_empty())
            })
            .map(ApiKey::new)
    }

    pub fn base_url(&self) -> String {
        self.base_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| self.provider.default_base_url())
            .trim_end_matches('/')
            .to_string()
    }

    /// `reasoning_effort` as sent on the wire; `minimal` is never sent.
    pub fn wire_reasoning_effort(&self) -> Option<&'static str> {
        match self.reasoning_effort {
            None | Some(ReasoningEffort::Minimal) => None,
            Some(effort) => Some(effort.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn unknown_provider_falls_back_to_openai_endpoint() {
        let kind: ProviderKind = serde_json::from_str(r#""mystery-cloud""#).unwrap();
        assert_eq!(kind, ProviderKind::Unknown);
        assert_eq!(kind.default_base_url(), ProviderKind::OpenAi.default_base_url());
        assert_eq!(kind.family(), ProviderFamily::Rest);
    }

    #[test]
    fn only_gemini_is_native() {
        for kind in ProviderKind::ALL {
            let expected = if kind == ProviderKind::Gemini {
                ProviderFamily::Native
            } else {
                ProviderFamily::Rest
            };
            assert_eq!(kind.family(), expected, "{kind}");
        }
    }

    #[test]
    fn provider_serde_names() {
        assert_eq!(serde_json::to_string(&ProviderKind::OpenAi).unwrap(), r#""openai""#);
        assert_eq!(serde_json::to_string(&ProviderKind::SiliconFlow).unwrap(), r#""siliconflow""#);
        let parsed: ProviderKind = serde_json::from_str(r#""deepseek""#).unwrap();
        assert_eq!(parsed, ProviderKind::DeepSeek);
    }

    #[test]
    fn explicit_key_wins_over_map() {
        let mut keys = ApiKeyMap::new();
        keys.insert(ProviderKind::DeepSeek, "from-map".into());
        let mut config = AiConfig {
            provider: ProviderKind::DeepSeek,
            ..AiConfig::default()
        };
        assert_eq!(config.resolve_api_key(&keys).unwrap().0.expose_secret(), "from-map");

        config.api_key = Some("explicit".into());
        assert_eq!(config.resolve_api_key(&keys).unwrap().0.expose_secret(), "explicit");

        config.api_key = Some("   ".into());
        assert_eq!(config.resolve_api_key(&keys).unwrap().0.expose_secret(), "from-map");
    }

    #[test]
    fn minimal_reasoning_effort_is_not_sent() {
        let mut config = AiConfig::default();
        assert_eq!(config.wire_reasoning_effort(), None);
        config.reasoning_effort = Some(ReasoningEffort::Minimal);
        assert_eq!(config.wire_reasoning_effort(), None);
        config.reasoning_effort = Some(ReasoningEffort::High);
        assert_eq!(config.wire_reasoning_effort(), Some("high"));
    }

    #[test]
    fn base_url_override_is_trimmed() {
        let config = AiConfig {
            provider: ProviderKind::OpenAi,
            base_url: Some("http://127.0.0.1:9000/v1/".into()),
            ..AiConfig::default()
        };
        assert_eq!(config.base_url(), "http://127.0.0.1:9000/v1");
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = AiConfig {
            api_key: Some("sk-secret".into()),
            ..AiConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
        assert_eq!(format!("{:?}", ApiKey::new("sk-secret")), "ApiKey([REDACTED])");
    }

    #[test]
    fn with_model_copies_everything_else() {
        let config = AiConfig {
            provider: ProviderKind::Qwen,
            temperature: 0.3,
            ..AiConfig::default()
        };
        let copy = config.with_model("qwen-max");
        assert_eq!(copy.model, "qwen-max");
        assert_eq!(copy.provider, ProviderKind::Qwen);
        assert_eq!(copy.temperature, 0.3);
    }
}
