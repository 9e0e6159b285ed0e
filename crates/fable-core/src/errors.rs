use crate::config::ProviderKind;

/// Transport-level failures talking to a model provider.
/// Classified as fatal (retrying cannot help) or retryable, although the
/// generation supervisor currently retries both.
#[derive(Clone, Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("HTTP {status} {status_text}: {body}")]
    Http {
        status: u16,
        status_text: String,
        body: String,
    },
    #[error("response has no body to stream")]
    MissingBody,
    #[error("network error: {0}")]
    Network(String),
    #[error("no API key configured for provider {0}")]
    MissingApiKey(ProviderKind),
    #[error("failed to decode provider response: {0}")]
    Decode(String),
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            Self::MissingBody | Self::Network(_) | Self::Decode(_) => true,
            Self::MissingApiKey(_) => false,
        }
    }

    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Http { status, .. } => matches!(status, 400 | 401 | 403 | 404),
            Self::MissingApiKey(_) => true,
            _ => false,
        }
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Http { status: 401 | 403, .. } => "authentication_failed",
            Self::Http { status: 429, .. } => "rate_limited",
            Self::Http { status: 500..=599, .. } => "server_error",
            Self::Http { .. } => "http_error",
            Self::MissingBody => "missing_body",
            Self::Network(_) => "network_error",
            Self::MissingApiKey(_) => "missing_api_key",
            Self::Decode(_) => "decode_error",
        }
    }

    pub fn from_status(status: u16, status_text: impl Into<String>, body: String) -> Self {
        Self::Http {
            status,
            status_text: status_text.into(),
            body,
        }
    }
}
