//! Outbound chat-completion client.
//!
//! Two operations: a bounded-deadline completion and a token stream. The
//! stream has no overall deadline; instead a per-token idle timeout tears
//! it down if the provider stalls mid-answer.

pub mod http;
#[cfg(any(test, feature = "mock"))]
pub mod mock;


pub use http::HttpLlmClient;
#[cfg(any(test, feature = "mock"))]
pub use mock::MockLlmClient;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors that can occur during chat-completion calls.
#[derive(Debug, Error, Clone)]
pub enum LlmError {
    /// Network-level failure (connect, timeout, TLS). Retryable.
    #[error("llm request failed: {0}")]
    Transport(String),

    /// Provider returned a non-success HTTP status.
    #[error("llm provider returned status {status}: {message}")]
    Api { status: u16, message: String },

    /// Response body did not match the expected shape.
    #[error("llm response malformed: {0}")]
    InvalidResponse(String),

    /// The token stream went silent for longer than the idle timeout.
    #[error("llm stream idle for more than {secs}s")]
    IdleTimeout { secs: u64 },

    /// Provider not configured (missing API key).
    #[error("llm provider not configured: {0}")]
    NotConfigured(String),
}

impl LlmError {
    /// Whether a retry may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::Transport(_) | LlmError::IdleTimeout { .. } => true,
            LlmError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// A finished completion with provider-reported token usage.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
}

/// Receiving side of a token stream. The channel closes when the provider
/// finishes; an `Err` item terminates the stream.
pub type TokenReceiver = mpsc::Receiver<Result<String, LlmError>>;

/// Client for the chat-completion provider.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// One-shot completion with a bounded deadline.
    async fn complete(&self, system: &str, user: &str) -> Result<Completion, LlmError>;

    /// Streams answer tokens as the provider emits them.
    async fn stream(&self, system: &str, user: &str) -> Result<TokenReceiver, LlmError>;
}
