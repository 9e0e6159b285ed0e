use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use fable_core::config::{AiConfig, ApiKeyMap, ProviderFamily, ProviderKind};
use fable_core::errors::GatewayError;
use fable_core::messages::Message;

use crate::native::GeminiClient;
use crate::provider::{ChatClient, DeltaStream, GenerateOptions, Generation};
use crate::rest::OpenAiCompatClient;

/// Protocol strategy, chosen once per config.
pub enum LlmClient {
    Native(GeminiClient),
    Rest(OpenAiCompatClient),
}

/// Build the client for `config`. The config's own key wins over `keys`;
/// providers that need a key fail with [`GatewayError::MissingApiKey`].
pub fn build_client(config: &AiConfig, keys: &ApiKeyMap) -> Result<LlmClient, GatewayError> {
    let api_key = config.resolve_api_key(keys);
    if api_key.is_none() && config.provider.requires_api_key() {
        return Err(GatewayError::MissingApiKey(config.provider));
    }

    info!(
        provider = %config.provider,
        model = %config.model,
        base_url = %config.base_url(),
        "LLM client initialized"
    );

    match config.provider.family() {
        ProviderFamily::Native => GeminiClient::new(config.clone(), api_key).map(LlmClient::Native),
        ProviderFamily::Rest => OpenAiCompatClient::new(config.clone(), api_key).map(LlmClient::Rest),
    }
}

impl LlmClient {
    fn inner(&self) -> &dyn ChatClient {
        match self {
            Self::Native(client) => client,
            Self::Rest(client) => client,
        }
    }
}

#[async_trait]
impl ChatClient for LlmClient {
    fn provider(&self) -> ProviderKind {
        self.inner().provider()
    }

    fn model(&self) -> &str {
        self.inner().model()
    }

    async fn generate(
        &self,
        messages: &[Message],
        options: &GenerateOptions,
    ) -> Result<Generation, GatewayError> {
        self.inner().generate(messages, options).await
    }

    async fn generate_stream(
        &self,
        messages: &[Message],
        options: &GenerateOptions,
        cancel: CancellationToken,
    ) -> Result<DeltaStream, GatewayError> {
        self.inner().generate_stream(messages, options, cancel).await
    }
}
