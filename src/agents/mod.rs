//! AI agents over the indexed rulebooks.
//!
//! Three read surfaces share one retrieval pipeline: synchronous Q&A,
//! event-streamed Q&A, and outline generation (explain / setup guide).
//! All of them are cache-first and write AI request logs; the feedback
//! sink records user verdicts on their answers.

pub mod events;
pub mod explain;
pub mod feedback;
pub mod qa;
pub mod stream;

#[cfg(test)]
mod tests;

pub use events::QaStreamEvent;
pub use explain::{ExplainEngine, OutlineResponse, OutlineSection};
pub use feedback::FeedbackService;
pub use qa::{QaEngine, QaResponse};
pub use stream::StreamingQaEngine;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::store::{AiRequestLogEntry, TelemetryStore};

/// Fallback system prompts, used when the registry has no active version
/// for the expected template name.
pub const DEFAULT_QA_PROMPT: &str = "You are a board-game rules assistant. Answer questions \
using only the provided rulebook context. Cite the rules faithfully and say so when the \
context does not cover the question.";

pub const DEFAULT_EXPLAIN_PROMPT: &str = "You are a board-game rules teacher. Produce a \
structured explanation of the requested topic as a short outline with sections and bullet \
points, grounded in the provided rulebook context.";

pub const DEFAULT_SETUP_PROMPT: &str = "You are a board-game setup assistant. Produce a \
deterministic, numbered setup checklist for the game, grounded in the provided rulebook \
context.";

/// How many chunks retrieval feeds into the prompt.
pub const SEARCH_LIMIT: u64 = 5;

/// Agent failure taxonomy shared by the QA, streaming, and outline
/// engines. Stream error payloads carry [`AgentError::code`].
#[derive(Debug, Error)]
pub enum AgentError {
    /// Query was empty after trimming.
    #[error("query must not be empty")]
    EmptyQuery,

    /// Game id was empty after trimming.
    #[error("game id must not be empty")]
    EmptyGameId,

    /// Embedding the query failed.
    #[error("embedding failed: {0}")]
    EmbeddingFailed(String),

    /// Retrieval returned nothing for this game.
    #[error("no indexed rules matched the question")]
    NoResults,

    /// The LLM call failed.
    #[error("llm failed: {0}")]
    LlmFailed(String),

    /// The caller went away mid-operation.
    #[error("request cancelled")]
    Cancelled,
}

impl AgentError {
    /// Stable machine-readable code, also used in SSE `error` payloads.
    pub fn code(&self) -> &'static str {
        match self {
            AgentError::EmptyQuery => "EMPTY_QUERY",
            AgentError::EmptyGameId => "EMPTY_GAME_ID",
            AgentError::EmbeddingFailed(_) => "EMBEDDING_FAILED",
            AgentError::NoResults => "NO_RESULTS",
            AgentError::LlmFailed(_) => "LLM_FAILED",
            AgentError::Cancelled => "CANCELLED",
        }
    }

    /// Whether a retry against healthy dependencies may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AgentError::EmbeddingFailed(_) | AgentError::LlmFailed(_)
        )
    }
}

/// A retrieved chunk attached to a response as evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snippet {
    pub text: String,
    /// `PDF:<document_id>`
    pub source: String,
    pub page: i64,
    pub line: i64,
}

impl Snippet {
    pub fn from_hit(hit: &crate::vectordb::SearchHit) -> Self {
        Self {
            text: hit.text.clone(),
            source: format!("PDF:{}", hit.document_id),
            page: hit.page,
            line: 0,
        }
    }
}

/// Builds the user prompt: numbered context snippets plus the question.
pub fn build_user_prompt(snippets: &[Snippet], question: &str) -> String {
    let mut prompt = String::from("Context:\n");
    for (i, snippet) in snippets.iter().enumerate() {
        prompt.push_str(&format!(
            "{}. [{} p.{}] {}\n",
            i + 1,
            snippet.source,
            snippet.page,
            snippet.text
        ));
    }
    prompt.push_str("\nQuestion: ");
    prompt.push_str(question);
    prompt
}

/// Best-effort AI request logging; failures are traced, never surfaced.
pub(crate) async fn log_request(telemetry: &dyn TelemetryStore, entry: AiRequestLogEntry) {
    if let Err(e) = telemetry.log_ai_request(entry).await {
        warn!("failed to write AI request log: {e}");
    }
}

/// Highest retrieval score, used as the response confidence.
pub(crate) fn max_score(hits: &[crate::vectordb::SearchHit]) -> f64 {
    hits.iter()
        .map(|h| h.score as f64)
        .fold(0.0_f64, f64::max)
}
