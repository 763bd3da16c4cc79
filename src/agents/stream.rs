//! Streaming Q&A engine.
//!
//! Produces the ordered SSE event sequence into a bounded channel the
//! gateway drains. Backpressure from a slow consumer throttles the
//! producer at the channel; a dropped consumer or a cancelled context
//! stops it at the next send. The cache is only written after the
//! `complete` event was actually delivered.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, info, instrument};

use super::events::{CompletePayload, QaStreamEvent};
use super::qa::QaResponse;
use super::{
    AgentError, DEFAULT_QA_PROMPT, SEARCH_LIMIT, Snippet, build_user_prompt, log_request,
    max_score,
};
use crate::cache::{ResponseCache, game_tag, qa_key};
use crate::context::RequestContext;
use crate::embedding::EmbeddingClient;
use crate::llm::LlmClient;
use crate::prompts::{PromptRegistry, QA_SYSTEM_PROMPT};
use crate::store::{AiEndpoint, AiRequestLogEntry, TelemetryStore};
use crate::vectordb::VectorStore;

/// Events buffered between the engine and the SSE writer.
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Event-streamed question answering.
#[derive(Clone)]
pub struct StreamingQaEngine {
    prompts: Arc<PromptRegistry>,
    embeddings: Arc<dyn EmbeddingClient>,
    vectors: Arc<dyn VectorStore>,
    llm: Arc<dyn LlmClient>,
    cache: Arc<ResponseCache>,
    telemetry: Arc<dyn TelemetryStore>,
}

impl StreamingQaEngine {
    pub fn new(
        prompts: Arc<PromptRegistry>,
        embeddings: Arc<dyn EmbeddingClient>,
        vectors: Arc<dyn VectorStore>,
        llm: Arc<dyn LlmClient>,
        cache: Arc<ResponseCache>,
        telemetry: Arc<dyn TelemetryStore>,
    ) -> Self {
        Self {
            prompts,
            embeddings,
            vectors,
            llm,
            cache,
            telemetry,
        }
    }

    /// Starts a stream; the returned receiver yields the event sequence.
    ///
    /// The producer runs in a background task and stops at its next send
    /// once the receiver is dropped or the context is cancelled.
    #[instrument(skip(self, ctx), fields(correlation_id = %ctx.correlation_id, game_id))]
    pub fn stream(
        &self,
        ctx: RequestContext,
        game_id: String,
        query: String,
    ) -> mpsc::Receiver<QaStreamEvent> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let engine = self.clone();

        tokio::spawn(async move {
            engine.run(ctx, game_id, query, tx).await;
        });

        rx
    }

    async fn run(
        self,
        ctx: RequestContext,
        game_id: String,
        query: String,
        tx: mpsc::Sender<QaStreamEvent>,
    ) {
        let game_id = game_id.trim().to_string();
        let query = query.trim().to_string();
        let started = Instant::now();

        // Validation failures yield a single error event and nothing else.
        if query.is_empty() {
            Self::send(&ctx, &tx, Self::error_event(&AgentError::EmptyQuery)).await;
            return;
        }
        if game_id.is_empty() {
            Self::send(&ctx, &tx, Self::error_event(&AgentError::EmptyGameId)).await;
            return;
        }

        if !Self::send(&ctx, &tx, Self::state("checking cache")).await {
            return;
        }

        let key = qa_key(&game_id, &query);
        if let Some(cached) = self.cache.get::<QaResponse>(&key).await {
            info!("stream cache hit");
            self.replay_cached(&ctx, &tx, &game_id, &query, started, cached)
                .await;
            return;
        }

        match self
            .generate(&ctx, &tx, &game_id, &query, started, &key)
            .await
        {
            Ok(()) => {}
            Err(err) => {
                self.log(&ctx, &game_id, &query, started, 0, 0, None, false, Some(&err))
                    .await;
                Self::send(&ctx, &tx, Self::error_event(&err)).await;
            }
        }
    }

    /// Cache-hit path: replay the cached answer word by word.
    async fn replay_cached(
        &self,
        ctx: &RequestContext,
        tx: &mpsc::Sender<QaStreamEvent>,
        game_id: &str,
        query: &str,
        started: Instant,
        cached: QaResponse,
    ) {
        if !Self::send(ctx, tx, Self::state("cache hit")).await {
            return;
        }
        if !Self::send(
            ctx,
            tx,
            QaStreamEvent::Citations {
                citations: cached.snippets.clone(),
            },
        )
        .await
        {
            return;
        }

        let words: Vec<&str> = cached.answer.split_whitespace().collect();
        let count = words.len();
        for (i, word) in words.iter().enumerate() {
            let token = if i + 1 < count {
                format!("{word} ")
            } else {
                (*word).to_string()
            };
            if !Self::send(ctx, tx, QaStreamEvent::Token { token }).await {
                return;
            }
        }

        let delivered = Self::send(
            ctx,
            tx,
            QaStreamEvent::Complete(CompletePayload {
                prompt_tokens: cached.prompt_tokens,
                completion_tokens: cached.completion_tokens,
                total_tokens: cached.total_tokens,
                confidence: cached.confidence,
            }),
        )
        .await;

        if delivered {
            self.log(
                ctx,
                game_id,
                query,
                started,
                cached.prompt_tokens,
                cached.completion_tokens,
                Some(cached.confidence),
                true,
                None,
            )
            .await;
        }
    }

    /// Cache-miss path: retrieve, stream tokens, then write back.
    async fn generate(
        &self,
        ctx: &RequestContext,
        tx: &mpsc::Sender<QaStreamEvent>,
        game_id: &str,
        query: &str,
        started: Instant,
        key: &str,
    ) -> Result<(), AgentError> {
        if !Self::send(ctx, tx, Self::state("generating embeddings")).await {
            return Ok(());
        }

        let system_prompt = self
            .prompts
            .get_active(QA_SYSTEM_PROMPT)
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| DEFAULT_QA_PROMPT.to_string());

        let query_vector = self
            .embeddings
            .embed_one(query)
            .await
            .map_err(|e| AgentError::EmbeddingFailed(e.to_string()))?;

        if !Self::send(ctx, tx, Self::state("searching vector database")).await {
            return Ok(());
        }

        let hits = self
            .vectors
            .search(game_id, query_vector, SEARCH_LIMIT)
            .await
            .map_err(|_| AgentError::NoResults)?;
        if hits.is_empty() {
            return Err(AgentError::NoResults);
        }

        let snippets: Vec<Snippet> = hits.iter().map(Snippet::from_hit).collect();
        let confidence = max_score(&hits);

        if !Self::send(
            ctx,
            tx,
            QaStreamEvent::Citations {
                citations: snippets.clone(),
            },
        )
        .await
        {
            return Ok(());
        }
        if !Self::send(ctx, tx, Self::state("generating answer")).await {
            return Ok(());
        }

        let user_prompt = build_user_prompt(&snippets, query);
        let mut token_rx = self
            .llm
            .stream(&system_prompt, &user_prompt)
            .await
            .map_err(|e| AgentError::LlmFailed(e.to_string()))?;

        let mut answer = String::new();
        let mut emitted: i64 = 0;

        loop {
            let item = tokio::select! {
                biased;
                _ = ctx.cancel_token().cancelled() => {
                    debug!("stream cancelled mid-generation, tearing down");
                    return Ok(());
                }
                item = token_rx.recv() => item,
            };

            match item {
                Some(Ok(token)) => {
                    answer.push_str(&token);
                    emitted += 1;
                    if !Self::send(ctx, tx, QaStreamEvent::Token { token }).await {
                        return Ok(());
                    }
                }
                Some(Err(e)) => return Err(AgentError::LlmFailed(e.to_string())),
                None => break,
            }
        }

        if emitted == 0 {
            return Err(AgentError::LlmFailed(
                "provider produced no tokens".to_string(),
            ));
        }

        let payload = CompletePayload {
            prompt_tokens: 0,
            completion_tokens: emitted,
            total_tokens: emitted,
            confidence,
        };

        if !Self::send(ctx, tx, QaStreamEvent::Complete(payload)).await {
            // Consumer left before `complete`: treat as cancelled, skip
            // the cache write.
            return Ok(());
        }

        let response = QaResponse {
            answer,
            snippets,
            prompt_tokens: 0,
            completion_tokens: emitted,
            total_tokens: emitted,
            confidence,
        };
        self.cache
            .set(key, &response, None, &[game_tag(game_id)])
            .await;

        self.log(
            ctx,
            game_id,
            query,
            started,
            0,
            emitted,
            Some(confidence),
            false,
            None,
        )
        .await;

        Ok(())
    }

    fn state(state: &str) -> QaStreamEvent {
        QaStreamEvent::StateUpdate {
            state: state.to_string(),
        }
    }

    fn error_event(err: &AgentError) -> QaStreamEvent {
        QaStreamEvent::Error {
            code: err.code(),
            message: err.to_string(),
        }
    }

    /// Sends one event; returns `false` when emission must stop (consumer
    /// gone or context cancelled).
    async fn send(
        ctx: &RequestContext,
        tx: &mpsc::Sender<QaStreamEvent>,
        event: QaStreamEvent,
    ) -> bool {
        if ctx.is_cancelled() {
            return false;
        }
        tx.send(event).await.is_ok()
    }

    #[allow(clippy::too_many_arguments)]
    async fn log(
        &self,
        ctx: &RequestContext,
        game_id: &str,
        query: &str,
        started: Instant,
        prompt_tokens: i64,
        completion_tokens: i64,
        confidence: Option<f64>,
        from_cache: bool,
        error: Option<&AgentError>,
    ) {
        log_request(
            self.telemetry.as_ref(),
            AiRequestLogEntry {
                endpoint: AiEndpoint::QaStream,
                game_id: game_id.to_string(),
                user_id: ctx.caller.user_id.clone(),
                query: query.to_string(),
                latency_ms: started.elapsed().as_millis() as i64,
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
                confidence,
                success: error.is_none(),
                from_cache,
                error: error.map(|e| e.to_string()),
            },
        )
        .await;
    }
}
