//! Synchronous Q&A engine.
//!
//! Cache-first: a hit answers without touching the embedding or LLM
//! providers. A miss runs embed → scoped search → complete, then caches
//! the response under the game tag for 24 h.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

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

/// Answer payload, served directly and stored in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QaResponse {
    pub answer: String,
    pub snippets: Vec<Snippet>,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
    pub confidence: f64,
}

/// Cache-first synchronous question answering.
pub struct QaEngine {
    prompts: Arc<PromptRegistry>,
    embeddings: Arc<dyn EmbeddingClient>,
    vectors: Arc<dyn VectorStore>,
    llm: Arc<dyn LlmClient>,
    cache: Arc<ResponseCache>,
    telemetry: Arc<dyn TelemetryStore>,
}

impl QaEngine {
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

    /// Answers a rules question for one game.
    #[instrument(skip(self, ctx), fields(correlation_id = %ctx.correlation_id, game_id))]
    pub async fn ask(
        &self,
        ctx: &RequestContext,
        game_id: &str,
        query: &str,
    ) -> Result<QaResponse, AgentError> {
        let game_id = game_id.trim();
        let query = query.trim();
        if game_id.is_empty() {
            return Err(AgentError::EmptyGameId);
        }
        if query.is_empty() {
            return Err(AgentError::EmptyQuery);
        }

        let started = Instant::now();
        let key = qa_key(game_id, query);

        if let Some(cached) = self.cache.get::<QaResponse>(&key).await {
            info!("qa cache hit");
            self.log(ctx, game_id, query, started, Some(&cached), true, None)
                .await;
            return Ok(cached);
        }

        let result = self.answer_uncached(ctx, game_id, query).await;

        match &result {
            Ok(response) => {
                self.cache
                    .set(&key, response, None, &[game_tag(game_id)])
                    .await;
                self.log(ctx, game_id, query, started, Some(response), false, None)
                    .await;
            }
            Err(err) => {
                self.log(
                    ctx,
                    game_id,
                    query,
                    started,
                    None,
                    false,
                    Some(err.to_string()),
                )
                .await;
            }
        }

        result
    }

    async fn answer_uncached(
        &self,
        ctx: &RequestContext,
        game_id: &str,
        query: &str,
    ) -> Result<QaResponse, AgentError> {
        let system_prompt = self
            .prompts
            .get_active(QA_SYSTEM_PROMPT)
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| DEFAULT_QA_PROMPT.to_string());

        if ctx.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let query_vector = self
            .embeddings
            .embed_one(query)
            .await
            .map_err(|e| AgentError::EmbeddingFailed(e.to_string()))?;
        if query_vector.is_empty() {
            return Err(AgentError::EmbeddingFailed(
                "provider returned an empty vector".to_string(),
            ));
        }

        if ctx.is_cancelled() {
            return Err(AgentError::Cancelled);
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
        let user_prompt = build_user_prompt(&snippets, query);

        debug!(snippets = snippets.len(), "running completion");

        if ctx.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let completion = self
            .llm
            .complete(&system_prompt, &user_prompt)
            .await
            .map_err(|e| AgentError::LlmFailed(e.to_string()))?;

        Ok(QaResponse {
            answer: completion.text,
            snippets,
            prompt_tokens: completion.prompt_tokens,
            completion_tokens: completion.completion_tokens,
            total_tokens: completion.prompt_tokens + completion.completion_tokens,
            confidence,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn log(
        &self,
        ctx: &RequestContext,
        game_id: &str,
        query: &str,
        started: Instant,
        response: Option<&QaResponse>,
        from_cache: bool,
        error: Option<String>,
    ) {
        log_request(
            self.telemetry.as_ref(),
            AiRequestLogEntry {
                endpoint: AiEndpoint::Qa,
                game_id: game_id.to_string(),
                user_id: ctx.caller.user_id.clone(),
                query: query.to_string(),
                latency_ms: started.elapsed().as_millis() as i64,
                prompt_tokens: response.map(|r| r.prompt_tokens).unwrap_or(0),
                completion_tokens: response.map(|r| r.completion_tokens).unwrap_or(0),
                total_tokens: response.map(|r| r.total_tokens).unwrap_or(0),
                confidence: response.map(|r| r.confidence),
                success: error.is_none(),
                from_cache,
                error,
            },
        )
        .await;
    }
}
