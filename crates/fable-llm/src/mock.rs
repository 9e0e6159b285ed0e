use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use fable_core::config::ProviderKind;
use fable_core::errors::GatewayError;
use fable_core::messages::Message;

use crate::provider::{cancellable, ChatClient, DeltaStream, GenerateOptions, Generation, StreamDelta};

/// Pre-programmed responses for deterministic tests without network access.
#[derive(Clone, Debug)]
pub enum MockResponse {
    /// Whole response text. Streams as a single delta.
    Text(String),
    /// Response split into chunks. Buffered calls get them concatenated.
    Chunks(Vec<String>),
    /// Fail the call itself.
    Error(GatewayError),
    /// Wait, then resolve the inner response.
    Delay(Duration, Box<MockResponse>),
}

impl MockResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn chunks<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Chunks(chunks.into_iter().map(Into::into).collect())
    }

    pub fn delayed(delay: Duration, inner: MockResponse) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// Chat client that replays [`MockResponse`]s in order and records every
/// request it receives.
pub struct MockClient {
    responses: Mutex<VecDeque<MockResponse>>,
    requests: Mutex<Vec<(Vec<Message>, GenerateOptions)>>,
    call_count: AtomicUsize,
}

impl MockClient {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Messages and options of every call so far.
    pub fn requests(&self) -> Vec<(Vec<Message>, GenerateOptions)> {
        self.requests.lock().clone()
    }

    async fn next_response(
        &self,
        messages: &[Message],
        options: &GenerateOptions,
    ) -> Result<Vec<String>, GatewayError> {
        let idx = self.call_count.fetch_add(1, Ordering::Relaxed);
        self.requests.lock().push((messages.to_vec(), *options));

        let Some(mut current) = self.responses.lock().pop_front() else {
            return Err(GatewayError::Decode(format!(
                "MockClient: no response configured for call {idx}"
            )));
        };

        loop {
            match current {
                MockResponse::Text(text) => return Ok(vec![text]),
                MockResponse::Chunks(chunks) => return Ok(chunks),
                MockResponse::Error(err) => return Err(err),
                MockResponse::Delay(duration, inner) => {
                    tokio::time::sleep(duration).await;
                    current = *inner;
                }
            }
        }
    }
}

#[async_trait]
impl ChatClient for MockClient {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Unknown
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn generate(
        &self,
        messages: &[Message],
        options: &GenerateOptions,
    ) -> Result<Generation, GatewayError> {
        let chunks = self.next_response(messages, options).await?;
        Ok(Generation {
            text: chunks.concat(),
        })
    }

    async fn generate_stream(
        &self,
        messages: &[Message],
        options: &GenerateOptions,
        cancel: CancellationToken,
    ) -> Result<DeltaStream, GatewayError> {
        let chunks = self.next_response(messages, options).await?;
        let deltas = stream::iter(chunks.into_iter().map(|c| Ok(StreamDelta::text(c))));
        Ok(cancellable(deltas, cancel))
    }
}
