//! Outbound embedding client.
//!
//! Rulebook chunks and user questions are embedded through an
//! OpenAI-compatible HTTP provider. Callers distinguish transient failures
//! (worth retrying in background jobs) from permanent ones.

pub mod http;
#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(test)]
mod tests;

pub use http::HttpEmbeddingClient;
#[cfg(any(test, feature = "mock"))]
pub use mock::MockEmbeddingClient;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during embedding calls.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Network-level failure (connect, timeout, TLS). Retryable.
    #[error("embedding request failed: {0}")]
    Transport(String),

    /// Provider returned a non-success HTTP status.
    #[error("embedding provider returned status {status}: {message}")]
    Api { status: u16, message: String },

    /// Response body did not match the expected shape.
    #[error("embedding response malformed: {0}")]
    InvalidResponse(String),

    /// Provider returned a different number of vectors than texts sent.
    #[error("embedding count mismatch: expected {expected}, got {actual}")]
    CountMismatch { expected: usize, actual: usize },

    /// Provider not configured (missing API key).
    #[error("embedding provider not configured: {0}")]
    NotConfigured(String),
}

impl EmbeddingError {
    /// Whether a retry may succeed. Only network failures, 429 and 5xx
    /// qualify; malformed requests and responses never do.
    pub fn is_transient(&self) -> bool {
        match self {
            EmbeddingError::Transport(_) => true,
            EmbeddingError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Client producing fixed-dimension embedding vectors.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Embeds a single text.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embeds a batch, preserving input order and length. Empty input
    /// yields empty output without a provider call.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Model identifier recorded on indexed documents.
    fn model_name(&self) -> &str;

    /// Vector width produced by this model.
    fn dimension(&self) -> usize;
}
