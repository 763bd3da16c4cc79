//! Explain / setup-guide engine.
//!
//! Generates structured outlines over the indexed rules: a free-topic
//! explanation, or a setup checklist derived from the game itself. Both
//! are cached like Q&A answers and logged per request.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::{
    AgentError, DEFAULT_EXPLAIN_PROMPT, DEFAULT_SETUP_PROMPT, SEARCH_LIMIT, Snippet,
    build_user_prompt, log_request, max_score,
};
use crate::cache::{ResponseCache, explain_key, game_tag, setup_key};
use crate::context::RequestContext;
use crate::embedding::EmbeddingClient;
use crate::llm::LlmClient;
use crate::prompts::{EXPLAIN_SYSTEM_PROMPT, PromptRegistry, SETUP_SYSTEM_PROMPT};
use crate::store::{AiEndpoint, AiRequestLogEntry, DocumentStore, TelemetryStore};
use crate::vectordb::VectorStore;

/// Fixed instruction appended to the setup-guide user prompt so the
/// checklist comes out deterministic and ordered.
const SETUP_INSTRUCTION: &str = "Produce a deterministic, numbered setup checklist for this \
game. Group steps into short sections and keep each step to one sentence.";

/// One outline section: a title and its bullet points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlineSection {
    pub title: String,
    pub bullets: Vec<String>,
}

/// Structured outline served by the explain and setup endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlineResponse {
    pub main_topic: String,
    pub sections: Vec<OutlineSection>,
    pub snippets: Vec<Snippet>,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
    pub confidence: f64,
}

/// RAG-based outline generator.
pub struct ExplainEngine {
    prompts: Arc<PromptRegistry>,
    documents: Arc<dyn DocumentStore>,
    embeddings: Arc<dyn EmbeddingClient>,
    vectors: Arc<dyn VectorStore>,
    llm: Arc<dyn LlmClient>,
    cache: Arc<ResponseCache>,
    telemetry: Arc<dyn TelemetryStore>,
}

impl ExplainEngine {
    pub fn new(
        prompts: Arc<PromptRegistry>,
        documents: Arc<dyn DocumentStore>,
        embeddings: Arc<dyn EmbeddingClient>,
        vectors: Arc<dyn VectorStore>,
        llm: Arc<dyn LlmClient>,
        cache: Arc<ResponseCache>,
        telemetry: Arc<dyn TelemetryStore>,
    ) -> Self {
        Self {
            prompts,
            documents,
            embeddings,
            vectors,
            llm,
            cache,
            telemetry,
        }
    }

    /// Progressive explanation of one rules topic.
    #[instrument(skip(self, ctx), fields(correlation_id = %ctx.correlation_id, game_id))]
    pub async fn explain(
        &self,
        ctx: &RequestContext,
        game_id: &str,
        topic: &str,
    ) -> Result<OutlineResponse, AgentError> {
        let game_id = game_id.trim();
        let topic = topic.trim();
        if game_id.is_empty() {
            return Err(AgentError::EmptyGameId);
        }
        if topic.is_empty() {
            return Err(AgentError::EmptyQuery);
        }

        let key = explain_key(game_id, topic);
        self.generate(
            ctx,
            AiEndpoint::Explain,
            EXPLAIN_SYSTEM_PROMPT,
            DEFAULT_EXPLAIN_PROMPT,
            game_id,
            topic.to_string(),
            topic.to_string(),
            key,
        )
        .await
    }

    /// Setup checklist for a whole game; no free-form topic exists here,
    /// so retrieval is seeded from the game's display name.
    #[instrument(skip(self, ctx), fields(correlation_id = %ctx.correlation_id, game_id))]
    pub async fn setup_guide(
        &self,
        ctx: &RequestContext,
        game_id: &str,
    ) -> Result<OutlineResponse, AgentError> {
        let game_id = game_id.trim();
        if game_id.is_empty() {
            return Err(AgentError::EmptyGameId);
        }

        let game_name = self
            .documents
            .get_game(game_id)
            .await
            .ok()
            .flatten()
            .map(|g| g.name)
            .unwrap_or_else(|| game_id.to_string());

        let key = setup_key(game_id);
        self.generate(
            ctx,
            AiEndpoint::Setup,
            SETUP_SYSTEM_PROMPT,
            DEFAULT_SETUP_PROMPT,
            game_id,
            format!("{game_name} setup"),
            format!("{game_name} setup. {SETUP_INSTRUCTION}"),
            key,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn generate(
        &self,
        ctx: &RequestContext,
        endpoint: AiEndpoint,
        prompt_name: &str,
        default_prompt: &str,
        game_id: &str,
        retrieval_query: String,
        question: String,
        key: String,
    ) -> Result<OutlineResponse, AgentError> {
        let started = Instant::now();

        if let Some(cached) = self.cache.get::<OutlineResponse>(&key).await {
            info!(endpoint = endpoint.as_str(), "outline cache hit");
            self.log(ctx, endpoint, game_id, &question, started, Some(&cached), true, None)
                .await;
            return Ok(cached);
        }

        let result = self
            .generate_uncached(
                ctx,
                prompt_name,
                default_prompt,
                game_id,
                &retrieval_query,
                &question,
            )
            .await;

        match &result {
            Ok(response) => {
                self.cache
                    .set(&key, response, None, &[game_tag(game_id)])
                    .await;
                self.log(ctx, endpoint, game_id, &question, started, Some(response), false, None)
                    .await;
            }
            Err(err) => {
                self.log(
                    ctx,
                    endpoint,
                    game_id,
                    &question,
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

    async fn generate_uncached(
        &self,
        ctx: &RequestContext,
        prompt_name: &str,
        default_prompt: &str,
        game_id: &str,
        retrieval_query: &str,
        question: &str,
    ) -> Result<OutlineResponse, AgentError> {
        let system_prompt = self
            .prompts
            .get_active(prompt_name)
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| default_prompt.to_string());

        if ctx.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let query_vector = self
            .embeddings
            .embed_one(retrieval_query)
            .await
            .map_err(|e| AgentError::EmbeddingFailed(e.to_string()))?;

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
        let user_prompt = build_user_prompt(&snippets, question);

        if ctx.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let completion = self
            .llm
            .complete(&system_prompt, &user_prompt)
            .await
            .map_err(|e| AgentError::LlmFailed(e.to_string()))?;

        let sections = parse_outline(&completion.text);

        Ok(OutlineResponse {
            main_topic: retrieval_query.to_string(),
            sections,
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
        endpoint: AiEndpoint,
        game_id: &str,
        query: &str,
        started: Instant,
        response: Option<&OutlineResponse>,
        from_cache: bool,
        error: Option<String>,
    ) {
        log_request(
            self.telemetry.as_ref(),
            AiRequestLogEntry {
                endpoint,
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

/// Parses LLM prose into ordered sections with bullet points.
///
/// Recognizes numbered headings (`1.`, `2)`), markdown headings, and
/// short trailing-colon lines as section titles; dash/asterisk lines as
/// bullets. Anything unstructured lands as a bullet in the current
/// section. A completely unparseable answer becomes a single section
/// holding the raw text.
pub fn parse_outline(text: &str) -> Vec<OutlineSection> {
    let mut sections: Vec<OutlineSection> = Vec::new();

    let push_bullet = |sections: &mut Vec<OutlineSection>, bullet: &str| {
        if sections.is_empty() {
            sections.push(OutlineSection {
                title: "Overview".to_string(),
                bullets: Vec::new(),
            });
        }
        sections
            .last_mut()
            .expect("just pushed")
            .bullets
            .push(bullet.to_string());
    };

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(bullet) = line
            .strip_prefix("- ")
            .or_else(|| line.strip_prefix("* "))
            .or_else(|| line.strip_prefix("• "))
        {
            push_bullet(&mut sections, bullet.trim());
            continue;
        }

        if let Some(heading) = strip_heading(line) {
            sections.push(OutlineSection {
                title: heading,
                bullets: Vec::new(),
            });
            continue;
        }

        push_bullet(&mut sections, line);
    }

    sections.retain(|s| !s.bullets.is_empty());

    if sections.is_empty() && !text.trim().is_empty() {
        sections.push(OutlineSection {
            title: "Overview".to_string(),
            bullets: vec![text.trim().to_string()],
        });
    }

    sections
}

/// Extracts a section title from a heading-shaped line.
fn strip_heading(line: &str) -> Option<String> {
    if let Some(rest) = line.strip_prefix('#') {
        return Some(rest.trim_start_matches('#').trim().to_string());
    }

    // "3. Title" / "3) Title"
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 && digits <= 2 {
        let rest = &line[digits..];
        if let Some(title) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return Some(title.trim().to_string());
        }
    }

    // "Setup:" style short headers
    if line.len() < 80
        && let Some(title) = line.strip_suffix(':')
    {
        return Some(title.trim().to_string());
    }

    None
}
