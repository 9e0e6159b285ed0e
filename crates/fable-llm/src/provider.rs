use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Response;
use tokio_util::sync::CancellationToken;

use fable_core::config::ProviderKind;
use fable_core::errors::GatewayError;
use fable_core::messages::Message;

/// Incremental output of a streaming call.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<StreamDelta, GatewayError>> + Send>>;

/// Per-call request switches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GenerateOptions {
    /// Ask the provider to return a JSON object, where it supports that.
    pub json_mode: bool,
}

impl GenerateOptions {
    pub fn json() -> Self {
        Self { json_mode: true }
    }
}

/// Buffered response.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Generation {
    pub text: String,
}

/// One streamed chunk. `text` is absent for chunks that carry only metadata.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamDelta {
    pub text: Option<String>,
}

impl StreamDelta {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
        }
    }
}

/// One provider protocol behind a uniform request/response shape.
#[async_trait]
pub trait ChatClient: Send + Sync {
    fn provider(&self) -> ProviderKind;
    fn model(&self) -> &str;

    async fn generate(
        &self,
        messages: &[Message],
        options: &GenerateOptions,
    ) -> Result<Generation, GatewayError>;

    /// Stream the response. Cancelling `cancel` drops the transport and ends
    /// the stream without an error item.
    async fn generate_stream(
        &self,
        messages: &[Message],
        options: &GenerateOptions,
        cancel: CancellationToken,
    ) -> Result<DeltaStream, GatewayError>;
}

/// End `stream` as soon as `cancel` fires.
pub fn cancellable<S>(stream: S, cancel: CancellationToken) -> DeltaStream
where
    S: Stream<Item = Result<StreamDelta, GatewayError>> + Send + 'static,
{
    Box::pin(stream.take_until(cancel.cancelled_owned()))
}

/// Turn a non-2xx response into [`GatewayError::Http`] carrying its body.
pub(crate) async fn ensure_success(resp: Response) -> Result<Response, GatewayError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let status_text = status.canonical_reason().unwrap_or_default().to_string();
    let body = resp.text().await.unwrap_or_default();
    Err(GatewayError::from_status(status.as_u16(), status_text, body))
}

/// A streaming response must carry a body.
pub(crate) fn ensure_body(resp: &Response) -> Result<(), GatewayError> {
    if resp.content_length() == Some(0) {
        return Err(GatewayError::MissingBody);
    }
    Ok(())
}

pub(crate) fn network_error(err: reqwest::Error) -> GatewayError {
    GatewayError::Network(err.to_string())
}
