//! Typed events for the streaming Q&A SSE surface.

use serde::Serialize;

use super::Snippet;

/// Event names on the wire (`event:` line of each SSE frame).
pub const EVENT_STATE_UPDATE: &str = "state_update";
pub const EVENT_CITATIONS: &str = "citations";
pub const EVENT_TOKEN: &str = "token";
pub const EVENT_COMPLETE: &str = "complete";
pub const EVENT_ERROR: &str = "error";

/// One event in the streaming Q&A sequence.
///
/// Legal orderings are enforced by the producer in
/// [`super::stream::StreamingQaEngine`]; consumers can rely on
/// `state_update* citations? token* (complete | error)` with `complete`
/// and `error` mutually exclusive and terminal.
#[derive(Debug, Clone, PartialEq)]
pub enum QaStreamEvent {
    StateUpdate { state: String },
    Citations { citations: Vec<Snippet> },
    Token { token: String },
    Complete(CompletePayload),
    Error { code: &'static str, message: String },
}

/// Final usage numbers reported by a successful stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletePayload {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
    pub confidence: f64,
}

#[derive(Serialize)]
struct StatePayload<'a> {
    state: &'a str,
}

#[derive(Serialize)]
struct CitationsPayload<'a> {
    citations: &'a [Snippet],
}

#[derive(Serialize)]
struct TokenPayload<'a> {
    token: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorPayload<'a> {
    error_code: &'a str,
    message: &'a str,
}

impl QaStreamEvent {
    /// The SSE `event:` discriminator.
    pub fn event_name(&self) -> &'static str {
        match self {
            QaStreamEvent::StateUpdate { .. } => EVENT_STATE_UPDATE,
            QaStreamEvent::Citations { .. } => EVENT_CITATIONS,
            QaStreamEvent::Token { .. } => EVENT_TOKEN,
            QaStreamEvent::Complete(_) => EVENT_COMPLETE,
            QaStreamEvent::Error { .. } => EVENT_ERROR,
        }
    }

    /// The SSE `data:` payload as JSON.
    pub fn json_payload(&self) -> String {
        let result = match self {
            QaStreamEvent::StateUpdate { state } => {
                serde_json::to_string(&StatePayload { state })
            }
            QaStreamEvent::Citations { citations } => {
                serde_json::to_string(&CitationsPayload { citations })
            }
            QaStreamEvent::Token { token } => serde_json::to_string(&TokenPayload { token }),
            QaStreamEvent::Complete(payload) => serde_json::to_string(payload),
            QaStreamEvent::Error { code, message } => serde_json::to_string(&ErrorPayload {
                error_code: code,
                message,
            }),
        };
        result.unwrap_or_else(|_| "{}".to_string())
    }

    /// Whether this event terminates the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QaStreamEvent::Complete(_) | QaStreamEvent::Error { .. }
        )
    }
}
