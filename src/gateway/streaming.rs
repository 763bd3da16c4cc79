//! SSE bridge for the streaming Q&A engine.
//!
//! The engine produces typed events into a bounded channel; this module
//! adapts that channel to `text/event-stream` frames. Dropping the HTTP
//! connection drops the receiver, which stops the producer at its next
//! send — cancellation needs no extra plumbing.

use axum::{
    Json,
    extract::State,
    http::HeaderMap,
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::stream::Stream;
use std::convert::Infallible;
use tokio_stream::{StreamExt, wrappers::ReceiverStream};
use tracing::instrument;

use super::handlers::{QaRequest, request_context};
use super::state::AppState;
use crate::agents::QaStreamEvent;

fn to_sse_event(event: QaStreamEvent) -> Event {
    Event::default()
        .event(event.event_name())
        .data(event.json_payload())
}

/// `POST /api/v1/agents/qa/stream`
#[instrument(skip(state, headers, request), fields(chat_id = request.chat_id.as_deref().unwrap_or("")))]
pub async fn agents_qa_stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<QaRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let ctx = request_context(&headers);

    let rx = state
        .stream
        .stream(ctx, request.game_id, request.query);

    let event_stream = ReceiverStream::new(rx).map(|event| Ok(to_sse_event(event)));

    Sse::new(event_stream).keep_alive(KeepAlive::default())
}
