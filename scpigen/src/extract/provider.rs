//! Model provider trait and transport-level error taxonomy.

use async_trait::async_trait;
use thiserror::Error;

/// Errors from the language-model backend.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("rate limited, retry after {retry_after} seconds")]
    RateLimited { retry_after: u64 },
    #[error("missing API key")]
    MissingApiKey,
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Completion backend for the extraction client.
///
/// Transport retry (identical request, backoff) belongs to the
/// implementation; retrying with a *revised* prompt after malformed output is
/// the extraction client's job. Tests substitute a scripted implementation.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &str;

    /// One prompt round trip, returning the raw response text.
    async fn complete(&self, prompt: &str) -> Result<String, ModelError>;
}
