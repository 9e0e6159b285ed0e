//! Retry loop around a generation call that must produce valid JSON.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{info, warn};

use fable_core::errors::GatewayError;
use fable_core::status::{NullStatusSink, RequestStatus, StatusSink, StatusTracker};

/// Default number of attempts.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Why one supervised attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("response is not valid JSON: {0}")]
    Parse(String),
    #[error("response failed validation: {0}")]
    Validation(String),
}

impl GenerateError {
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Gateway(err) => err.error_kind(),
            Self::Parse(_) => "parse_error",
            Self::Validation(_) => "validation_error",
        }
    }
}

/// Called once, after the final attempt fails, with the error and the last
/// raw response text (empty if no response arrived).
pub type FailureHandler<'a> = &'a (dyn Fn(&GenerateError, &str) + Send + Sync);

/// Remove Markdown code-fence markers around a JSON payload.
pub fn strip_code_fences(raw: &str) -> String {
    raw.replace("```json", "").replace("```JSON", "").replace("```", "").trim().to_string()
}

/// Runs generation attempts sequentially and reports progress through a
/// [`StatusSink`].
#[derive(Clone)]
pub struct Supervisor {
    sink: Arc<dyn StatusSink>,
    retry_delay: Duration,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new(Arc::new(NullStatusSink))
    }
}

impl Supervisor {
    pub fn new(sink: Arc<dyn StatusSink>) -> Self {
        Self {
            sink,
            retry_delay: Duration::ZERO,
        }
    }

    /// Pause between attempts.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Call `call_api` up to `max_retries` times until its output parses as
    /// JSON, passes `validator` and deserializes into `T`.
    ///
    /// Every failure kind is retried the same way. Emits Processing, Warn,
    /// Danger per attempt and Success or Abandoned at the end, all under one
    /// request id. Returns `None` once attempts are exhausted.
    pub async fn robust_generate<T, F, Fut, V>(
        &self,
        mut call_api: F,
        validator: V,
        max_retries: u32,
        on_failure: Option<FailureHandler<'_>>,
    ) -> Option<T>
    where
        T: DeserializeOwned,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<String, GatewayError>>,
        V: Fn(&Value) -> bool,
    {
        let max_retries = max_retries.max(1);
        let mut tracker = StatusTracker::new(self.sink.clone());
        let request_id = tracker.id().to_string();
        let mut last_raw = String::new();

        for attempt in 0..max_retries {
            tracker.transition(RequestStatus::for_attempt(attempt));

            let outcome = match call_api().await {
                Ok(raw) => {
                    last_raw = raw;
                    parse_and_validate::<T, _>(&last_raw, &validator)
                }
                Err(err) => Err(GenerateError::Gateway(err)),
            };

            match outcome {
                Ok(value) => {
                    tracker.transition(RequestStatus::Success);
                    if attempt > 0 {
                        info!(%request_id, attempt, "generation recovered after retry");
                    }
                    return Some(value);
                }
                Err(err) => {
                    warn!(
                        %request_id,
                        attempt,
                        max_retries,
                        error_kind = err.error_kind(),
                        error = %err,
                        "generation attempt failed"
                    );
                    if attempt + 1 == max_retries {
                        if let Some(handler) = on_failure {
                            handler(&err, &last_raw);
                        }
                    } else if !self.retry_delay.is_zero() {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        tracker.transition(RequestStatus::Abandoned);
        warn!(%request_id, max_retries, "generation abandoned");
        None
    }
}

fn parse_and_validate<T, V>(raw: &str, validator: &V) -> Result<T, GenerateError>
where
    T: DeserializeOwned,
    V: Fn(&Value) -> bool,
{
    let cleaned = strip_code_fences(raw);
    let parsed: Value = serde_json::from_str(&cleaned).map_err(|e| GenerateError::Parse(e.to_string()))?;
    if !validator(&parsed) {
        return Err(GenerateError::Validation("validator rejected the response".into()));
    }
    serde_json::from_value(parsed).map_err(|e| GenerateError::Validation(e.to_string()))
}
