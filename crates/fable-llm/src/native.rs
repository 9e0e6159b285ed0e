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
use crate::rest::CONNECT_TIMEOUT;
use crate::sse::{sse_data_lines, SSE_IDLE_TIMEOUT};

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini `generateContent` protocol: `{role, parts}` messages on the wire.
pub struct GeminiClient {
    http: Client,
    config: AiConfig,
    api_key: Option<ApiKey>,
}

impl GeminiClient {
    pub fn new(config: AiConfig, api_key: Option<ApiKey>) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(network_error)?;
        Ok(Self::with_client(http, config, api_key))
    }

    pub fn with_client(http: Client, config: AiConfig, api_key: Option<ApiKey>) -> Self {
        Self {
            http,
            config,
            api_key,
        }
    }

    fn url(&self, streaming: bool) -> String {
        let base = self.config.base_url();
        let model = &self.config.model;
        if streaming {
            format!("{base}/models/{model}:streamGenerateContent?alt=sse")
        } else {
            format!("{base}/models/{model}:generateContent")
        }
    }

    async fn post(&self, streaming: bool, body: &Value) -> Result<reqwest::Response, GatewayError> {
        let mut req = self.http.post(self.url(streaming)).json(body);
        if let Some(key) = &self.api_key {
            req = req.header(API_KEY_HEADER, key.0.expose_secret());
        }
        let resp = req.send().await.map_err(network_error)?;
        ensure_success(resp).await
    }
}

#[async_trait]
impl ChatClient for GeminiClient {
    fn provider(&self) -> ProviderKind {
        self.config.provider
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    #[instrument(skip_all, fields(model = %self.config.model))]
    async fn generate(
        &self,
        messages: &[Message],
        options: &GenerateOptions,
    ) -> Result<Generation, GatewayError> {
        let body = converter::build_native_body(&self.config, messages, options);
        let resp = self.post(false, &body).await?;
        let payload: Value = resp
            .json()
            .await
            .map_err(|e| GatewayError::Decode(e.to_string()))?;
        let text = converter::native_response_text(&payload)?;
        debug!(chars = text.len(), "completion received");
        Ok(Generation { text })
    }

    #[instrument(skip_all, fields(model = %self.config.model))]
    async fn generate_stream(
        &self,
        messages: &[Message],
        options: &GenerateOptions,
        cancel: CancellationToken,
    ) -> Result<DeltaStream, GatewayError> {
        let body = converter::build_native_body(&self.config, messages, options);
        let resp = self.post(true, &body).await?;
        ensure_body(&resp)?;

        let deltas = sse_data_lines(Box::pin(resp.bytes_stream()), SSE_IDLE_TIMEOUT).filter_map(|line| async move {
            match line {
                Err(err) => Some(Err(err)),
                Ok(data) => match converter::native_delta_text(&data) {
                    Ok(text) => Some(Ok(StreamDelta { text })),
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
