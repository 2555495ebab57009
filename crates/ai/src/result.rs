use thiserror::Error;

/// Failure of a provider call.
///
/// Every variant is terminal for the job attempt that made the call; whether the
/// job is retried is decided by the engine's retry policy, never here.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AiError {
    #[error("invalid provider request: {0}")]
    InvalidInput(String),

    #[error("provider request failed: {0}")]
    RequestFailed(String),

    #[error("provider rate limited the request (retry after {retry_after_ms:?}ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("provider returned malformed output: {0}")]
    MalformedResponse(String),

    #[error("network error talking to provider: {0}")]
    Network(String),
}

impl AiError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedResponse(msg.into())
    }
}
