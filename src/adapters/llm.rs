use async_trait::async_trait;
use thiserror::Error;

/// Endpoint failure taxonomy. Anything that is *not* an `LlmError` coming
/// out of a review call is treated as an internal fault and is never
/// retried or sent through the fallback chain.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("endpoint returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("request to endpoint timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed endpoint response: {0}")]
    Protocol(String),
}

impl LlmError {
    /// Retry policy: timeouts, transport failures, 5xx, and the transient
    /// client statuses 408/429 are retryable; every other 4xx is permanent
    /// and goes straight to the fallback chain.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Status { status, .. } => {
                matches!(status, 408 | 429) || (500..600).contains(status)
            }
            LlmError::Timeout | LlmError::Transport(_) => true,
            LlmError::Protocol(_) => false,
        }
    }
}

/// A single-completion inference endpoint. The model is passed per call so
/// the fallback-model swap stays request-scoped instead of mutating shared
/// configuration.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, model: &str, prompt: &str) -> anyhow::Result<String>;
}
