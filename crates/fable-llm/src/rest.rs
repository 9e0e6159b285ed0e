use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use fable_core::config::{AiConfig, ApiKey, ProviderKind};
use fable_core::errors::GatewayError;
use fable_core::messages::Message;

use crate::converter;
use crate::provider::{
    cancellable, ensure_body, ensure_success, network_error, ChatClient, DeltaStream, GenerateOptions,
    Generation, StreamDelta,
};
use crate::sse::{sse_data_lines, SSE_IDLE_TIMEOUT};

pub(crate) const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Any OpenAI-compatible `/chat/completions` backend.
pub struct OpenAiCompatClient {
    http: Client,
    config: AiConfig,
    endpoint: String,
    api_key: Option<ApiKey>,
}

impl OpenAiCompatClient {
    pub fn new(config: AiConfig, api_key: Option<ApiKey>) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(network_error)?;
        Ok(Self::with_client(http, config, api_key))
    }

    /// Share an existing HTTP connection pool.
    pub fn with_client(http: Client, config: AiConfig, api_key: Option<ApiKey>) -> Self {
        let endpoint = format!("{}/chat/completions", config.base_url());
        Self {
            http,
            config,
            endpoint,
            api_key,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response, GatewayError> {
        let mut req = self.http.post(&self.endpoint).json(body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key.0.expose_secret());
        }
        let resp = req.send().await.map_err(network_error)?;
        ensure_success(resp).await
    }
}

#[async_trait]
impl ChatClient for OpenAiCompatClient {
    fn provider(&self) -> ProviderKind {
        self.config.provider
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    #[instrument(skip_all, fields(provider = %self.config.provider, model = %self.config.model))]
    async fn generate(
        &self,
        messages: &[Message],
        options: &GenerateOptions,
    ) -> Result<Generation, GatewayError> {
        let body = converter::build_chat_body(&self.config, messages, options, false);
        let resp = self.post(&body).await?;
        let payload: Value = resp
            .json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))?;
        let text = converter::chat_completion_text(&payload)?;
        debug!(chars = text.len(), "completion received");
        Ok(Generation { text })
    }

    #[instrument(skip_all, fields(provider = %self.config.provider, model = %self.config.model))]
    async fn generate_stream(
        &self,
        messages: &[Message],
        options: &GenerateOptions,
        cancel: CancellationToken,
    ) -> Result<DeltaStream, GatewayError> {
        let body = converter::build_chat_body(&self.config, messages, options, true);
        let resp = self.post(&body).await?;
        ensure_body(&resp)?;

        let deltas = sse_data_lines(Box::pin(resp.bytes_stream()), SSE_IDLE_TIMEOUT).filter_map(|line| async move {
            match line {
                Err(err) => Some(Err(err)),
                Ok(data) => match converter::chat_delta_text(&data) {
                    Ok(text) => text.map(|t| Ok(StreamDelta::text(t))),
                    Err(err) => {
                        debug!(%err, "skipping malformed stream line");
                        None
                    }
                },
            }
        });
        Ok(cancellable(deltas, cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_uses_provider_table_and_override() {
        let config = AiConfig {
            provider: ProviderKind::DeepSeek,
            model: "deepseek-chat".into(),
            ..AiConfig::default()
        };
        let client = OpenAiCompatClient::new(config.clone(), None).unwrap();
        assert_eq!(client.endpoint(), "https://api.deepseek.com/v1/chat/completions");
        assert_eq!(client.model(), "deepseek-chat");
        assert_eq!(client.provider(), ProviderKind::DeepSeek);

        let config = AiConfig {
            base_url: Some("http://localhost:9000/v1/".into()),
            ..config
        };
        let client = OpenAiCompatClient::new(config, None).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:9000/v1/chat/completions");
    }

    #[test]
    fn unknown_provider_defaults_to_openai() {
        let config = AiConfig {
            provider: ProviderKind::Unknown,
            ..AiConfig::default()
        };
        let client = OpenAiCompatClient::new(config, None).unwrap();
        assert_eq!(client.endpoint(), "https://api.openai.com/v1/chat/completions");
    }
}
