//! Request handlers for the `/api/v1` surface.

use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::HeaderMap,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use super::CORRELATION_ID_HEADER;
use super::error::ApiError;
use super::state::AppState;
use crate::agents::{OutlineResponse, QaResponse};
use crate::context::{Caller, RequestContext, Role};
use crate::extract::TextExtractor as _;
use crate::store::{
    AiEndpoint, DocumentStatus, DocumentStore, FeedbackOutcome, Game, NewDocument, PromptAudit,
    PromptTemplate, PromptVersion,
};

/// Builds the request context from the auth collaborator's identity
/// headers and the correlation id installed by the middleware.
pub(super) fn request_context(headers: &HeaderMap) -> RequestContext {
    let user_id = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or("anonymous")
        .to_string();
    let role = headers
        .get("x-user-role")
        .and_then(|v| v.to_str().ok())
        .map(Role::parse)
        .unwrap_or(Role::User);

    let caller = Caller::new(user_id, role);

    match headers
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
    {
        Some(id) => RequestContext::with_correlation_id(caller, id),
        None => RequestContext::new(caller),
    }
}

fn require_role(ctx: &RequestContext, min: Role) -> Result<(), ApiError> {
    if ctx.caller.role < min {
        return Err(ApiError::forbidden(format!(
            "requires {} role",
            min.as_str()
        ))
        .with_context(ctx));
    }
    Ok(())
}

// --- Ingest ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub document_id: String,
}

#[instrument(skip_all)]
pub async fn ingest_pdf(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<IngestResponse>, ApiError> {
    let ctx = request_context(&headers);
    require_role(&ctx, Role::Editor)?;

    let mut game_id: Option<String> = None;
    let mut game_name: Option<String> = None;
    let mut file: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("invalid multipart body: {e}")).with_context(&ctx))?
    {
        let field_name = field.name().map(|s| s.to_string());
        match field_name.as_deref() {
            Some("file") => {
                let file_name = field
                    .file_name()
                    .unwrap_or("rulebook.pdf")
                    .to_string();
                let bytes = field.bytes().await.map_err(|e| {
                    ApiError::bad_request(format!("failed to read upload: {e}")).with_context(&ctx)
                })?;
                file = Some((file_name, bytes.to_vec()));
            }
            Some("gameId") => {
                game_id = Some(field.text().await.map_err(|e| {
                    ApiError::bad_request(format!("invalid gameId field: {e}")).with_context(&ctx)
                })?);
            }
            Some("gameName") => {
                game_name = Some(field.text().await.map_err(|e| {
                    ApiError::bad_request(format!("invalid gameName field: {e}")).with_context(&ctx)
                })?);
            }
            _ => {}
        }
    }

    let game_id = game_id
        .map(|g| g.trim().to_string())
        .filter(|g| !g.is_empty())
        .ok_or_else(|| ApiError::bad_request("gameId is required").with_context(&ctx))?;
    let (file_name, bytes) =
        file.ok_or_else(|| ApiError::bad_request("file is required").with_context(&ctx))?;

    let extracted = state
        .extractor
        .extract(&file_name, &bytes)
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()).with_context(&ctx))?;

    state
        .documents
        .ensure_game(&Game {
            id: game_id.clone(),
            name: game_name.unwrap_or_else(|| game_id.clone()),
        })
        .await
        .map_err(|e| ApiError::from_store(e, &ctx))?;

    let document = state
        .documents
        .create_document(NewDocument {
            game_id,
            file_name,
            file_size: bytes.len() as i64,
            uploaded_by: ctx.caller.user_id.clone(),
            status: DocumentStatus::Completed,
            page_count: extracted.page_count,
            char_count: extracted.char_count,
            extracted_text: Some(extracted.text),
            extraction_error: None,
        })
        .await
        .map_err(|e| ApiError::from_store(e, &ctx))?;

    // Indexing runs in the background; the upload path retries transient
    // failures on its own.
    let indexer = state.indexer.clone();
    let document_id = document.id.clone();
    tokio::spawn(async move {
        let bg_ctx = RequestContext::background("ingest");
        match indexer.index_with_retry(&bg_ctx, &document_id).await {
            Ok(outcome) => info!(
                document_id,
                chunks = outcome.chunk_count,
                "background indexing complete"
            ),
            Err(e) => error!(document_id, "background indexing failed: {e}"),
        }
    });

    Ok(Json(IngestResponse {
        document_id: document.id,
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDocumentResponse {
    pub success: bool,
    pub vector_document_id: String,
    pub chunk_count: usize,
    pub indexed_at: DateTime<Utc>,
}

#[instrument(skip(state, headers))]
pub async fn reindex_pdf(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(pdf_id): Path<String>,
) -> Result<Json<IndexDocumentResponse>, ApiError> {
    let ctx = request_context(&headers);
    require_role(&ctx, Role::Editor)?;

    let outcome = state
        .indexer
        .index_document(&ctx, &pdf_id)
        .await
        .map_err(|e| ApiError::from_indexer(e, &ctx))?;

    Ok(Json(IndexDocumentResponse {
        success: true,
        vector_document_id: outcome.vector_document_id,
        chunk_count: outcome.chunk_count,
        indexed_at: outcome.indexed_at,
    }))
}

// --- Agents ---

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QaRequest {
    pub game_id: String,
    pub query: String,
    /// Chat thread this question belongs to; carried on traces only.
    #[serde(default)]
    pub chat_id: Option<String>,
}

#[instrument(skip(state, headers, request))]
pub async fn agents_qa(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<QaRequest>,
) -> Result<Json<QaResponse>, ApiError> {
    let ctx = request_context(&headers);

    let response = state
        .qa
        .ask(&ctx, &request.game_id, &request.query)
        .await
        .map_err(|e| ApiError::from_agent(e, &ctx))?;

    Ok(Json(response))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplainRequest {
    pub game_id: String,
    pub topic: String,
}

#[instrument(skip(state, headers, request))]
pub async fn agents_explain(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ExplainRequest>,
) -> Result<Json<OutlineResponse>, ApiError> {
    let ctx = request_context(&headers);

    let response = state
        .explain
        .explain(&ctx, &request.game_id, &request.topic)
        .await
        .map_err(|e| ApiError::from_agent(e, &ctx))?;

    Ok(Json(response))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupRequest {
    pub game_id: String,
}

#[instrument(skip(state, headers, request))]
pub async fn setup_generate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SetupRequest>,
) -> Result<Json<OutlineResponse>, ApiError> {
    let ctx = request_context(&headers);

    let response = state
        .explain
        .setup_guide(&ctx, &request.game_id)
        .await
        .map_err(|e| ApiError::from_agent(e, &ctx))?;

    Ok(Json(response))
}

// --- Feedback ---

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    pub message_id: String,
    pub endpoint: String,
    pub game_id: String,
    /// "helpful", "not-helpful", or null/"unset" to clear.
    pub outcome: Option<String>,
}

#[derive(Serialize)]
pub struct AcceptedResponse {
    pub success: bool,
}

#[instrument(skip(state, headers, request))]
pub async fn agents_feedback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<FeedbackRequest>,
) -> Result<Json<AcceptedResponse>, ApiError> {
    let ctx = request_context(&headers);

    if request.message_id.trim().is_empty() {
        return Err(ApiError::bad_request("messageId is required").with_context(&ctx));
    }

    let outcome = match request.outcome.as_deref() {
        None | Some("unset") | Some("") => None,
        Some(raw) => Some(raw.parse::<FeedbackOutcome>().map_err(|e| {
            ApiError::bad_request(e).with_code("INVALID_OUTCOME").with_context(&ctx)
        })?),
    };

    state
        .feedback
        .record(
            &ctx,
            &request.message_id,
            &request.endpoint,
            &request.game_id,
            outcome,
        )
        .await
        .map_err(|e| ApiError::from_store(e, &ctx))?;

    Ok(Json(AcceptedResponse { success: true }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameFilter {
    pub game_id: Option<String>,
}

pub async fn feedback_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(filter): Query<GameFilter>,
) -> Result<Json<crate::store::FeedbackStats>, ApiError> {
    let ctx = request_context(&headers);
    require_role(&ctx, Role::Admin)?;

    let stats = state
        .feedback
        .stats(filter.game_id.as_deref())
        .await
        .map_err(|e| ApiError::from_store(e, &ctx))?;
    Ok(Json(stats))
}

// --- Cache administration ---

pub async fn cache_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(filter): Query<GameFilter>,
) -> Result<Json<crate::cache::CacheReport>, ApiError> {
    let ctx = request_context(&headers);
    require_role(&ctx, Role::Admin)?;

    Ok(Json(state.cache.report(filter.game_id.as_deref()).await))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidateRequest {
    pub game_id: String,
    /// Restrict to one endpoint ("qa" | "explain" | "setup").
    pub endpoint: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidateResponse {
    pub removed_keys: u64,
}

pub async fn cache_invalidate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<InvalidateRequest>,
) -> Result<Json<InvalidateResponse>, ApiError> {
    let ctx = request_context(&headers);
    require_role(&ctx, Role::Admin)?;

    if request.game_id.trim().is_empty() {
        return Err(ApiError::bad_request("gameId is required").with_context(&ctx));
    }

    let removed = match request.endpoint.as_deref() {
        None => state.cache.invalidate_game(&request.game_id).await,
        Some(raw) => {
            let endpoint = raw.parse::<AiEndpoint>().map_err(|e| {
                ApiError::bad_request(e).with_code("INVALID_ENDPOINT").with_context(&ctx)
            })?;
            state
                .cache
                .invalidate_endpoint(&request.game_id, endpoint)
                .await
        }
    };

    Ok(Json(InvalidateResponse {
        removed_keys: removed,
    }))
}

// --- Prompt registry ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateDto {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub version_count: i32,
    pub active_version: Option<i32>,
}

impl From<PromptTemplate> for TemplateDto {
    fn from(t: PromptTemplate) -> Self {
        Self {
            id: t.id,
            name: t.name,
            description: t.description,
            category: t.category,
            created_by: t.created_by,
            created_at: t.created_at,
            version_count: t.version_count,
            active_version: t.active_version,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionDto {
    pub id: String,
    pub template_id: String,
    pub version: i32,
    pub content: String,
    pub metadata: Option<serde_json::Value>,
    pub is_active: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl From<PromptVersion> for VersionDto {
    fn from(v: PromptVersion) -> Self {
        Self {
            id: v.id,
            template_id: v.template_id,
            version: v.version,
            content: v.content,
            metadata: v.metadata,
            is_active: v.is_active,
            created_by: v.created_by,
            created_at: v.created_at,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditDto {
    pub id: String,
    pub template_id: String,
    pub version_id: Option<String>,
    pub action: String,
    pub actor: String,
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<PromptAudit> for AuditDto {
    fn from(a: PromptAudit) -> Self {
        Self {
            id: a.id,
            template_id: a.template_id,
            version_id: a.version_id,
            action: a.action.as_str().to_string(),
            actor: a.actor,
            details: a.details,
            created_at: a.created_at,
        }
    }
}

#[derive(Deserialize)]
pub struct ListPromptsQuery {
    pub category: Option<String>,
}

pub async fn list_prompts(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListPromptsQuery>,
) -> Result<Json<Vec<TemplateDto>>, ApiError> {
    let ctx = request_context(&headers);
    require_role(&ctx, Role::Admin)?;

    let templates = state
        .prompts
        .list(query.category.as_deref())
        .await
        .map_err(|e| ApiError::from_prompt(e, &ctx))?;
    Ok(Json(templates.into_iter().map(TemplateDto::from).collect()))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePromptRequest {
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub content: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePromptResponse {
    pub template: TemplateDto,
    pub version: VersionDto,
}

#[instrument(skip(state, headers, request))]
pub async fn create_prompt(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreatePromptRequest>,
) -> Result<Json<CreatePromptResponse>, ApiError> {
    let ctx = request_context(&headers);
    require_role(&ctx, Role::Admin)?;

    let (template, version) = state
        .prompts
        .create_template(
            &request.name,
            request.description,
            request.category,
            request.content,
            &ctx.caller.user_id,
        )
        .await
        .map_err(|e| ApiError::from_prompt(e, &ctx))?;

    Ok(Json(CreatePromptResponse {
        template: template.into(),
        version: version.into(),
    }))
}

pub async fn get_prompt(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<TemplateDto>, ApiError> {
    let ctx = request_context(&headers);
    require_role(&ctx, Role::Admin)?;

    let template = state
        .prompts
        .get_template(&id)
        .await
        .map_err(|e| ApiError::from_prompt(e, &ctx))?
        .ok_or_else(|| {
            ApiError::not_found(format!("prompt template not found: {id}"))
                .with_code("TEMPLATE_NOT_FOUND")
                .with_context(&ctx)
        })?;
    Ok(Json(template.into()))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePromptRequest {
    pub description: Option<String>,
    pub category: Option<String>,
}

pub async fn update_prompt(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<UpdatePromptRequest>,
) -> Result<Json<TemplateDto>, ApiError> {
    let ctx = request_context(&headers);
    require_role(&ctx, Role::Admin)?;

    let template = state
        .prompts
        .update_template(
            &id,
            request.description.as_deref(),
            request.category.as_deref(),
            &ctx.caller.user_id,
        )
        .await
        .map_err(|e| ApiError::from_prompt(e, &ctx))?;
    Ok(Json(template.into()))
}

pub async fn list_versions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Vec<VersionDto>>, ApiError> {
    let ctx = request_context(&headers);
    require_role(&ctx, Role::Admin)?;

    let versions = state
        .prompts
        .history(&id)
        .await
        .map_err(|e| ApiError::from_prompt(e, &ctx))?;
    Ok(Json(versions.into_iter().map(VersionDto::from).collect()))
}

/// Responses generated under a previously active prompt are stale once a
/// different version takes over; drop the affected endpoint's keys across
/// all games.
async fn invalidate_responses_for_template(state: &AppState, template_id: &str) {
    let category = state
        .prompts
        .get_template(template_id)
        .await
        .ok()
        .flatten()
        .and_then(|t| t.category);

    let pattern = match category.as_deref() {
        Some("qa") => "ai:qa:*",
        Some("explain") => "ai:explain:*",
        Some("setup") => "ai:setup:*",
        _ => "ai:*",
    };
    state.cache.invalidate_pattern(pattern).await;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVersionRequest {
    pub content: String,
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub activate_immediately: bool,
}

#[instrument(skip(state, headers, request))]
pub async fn create_version(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<CreateVersionRequest>,
) -> Result<Json<VersionDto>, ApiError> {
    let ctx = request_context(&headers);
    require_role(&ctx, Role::Admin)?;

    let version = state
        .prompts
        .create_version(
            &id,
            request.content,
            request.metadata,
            request.activate_immediately,
            &ctx.caller.user_id,
        )
        .await
        .map_err(|e| ApiError::from_prompt(e, &ctx))?;

    if request.activate_immediately {
        invalidate_responses_for_template(&state, &id).await;
    }

    Ok(Json(version.into()))
}

#[derive(Deserialize)]
pub struct ActivateVersionRequest {
    pub reason: Option<String>,
}

#[instrument(skip(state, headers, request))]
pub async fn activate_version(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, version_id)): Path<(String, String)>,
    Json(request): Json<ActivateVersionRequest>,
) -> Result<Json<AcceptedResponse>, ApiError> {
    let ctx = request_context(&headers);
    require_role(&ctx, Role::Admin)?;

    state
        .prompts
        .activate_version(
            &id,
            &version_id,
            request.reason.as_deref(),
            &ctx.caller.user_id,
        )
        .await
        .map_err(|e| ApiError::from_prompt(e, &ctx))?;

    invalidate_responses_for_template(&state, &id).await;

    Ok(Json(AcceptedResponse { success: true }))
}

pub async fn prompt_audit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Vec<AuditDto>>, ApiError> {
    let ctx = request_context(&headers);
    require_role(&ctx, Role::Admin)?;

    let audits = state
        .prompts
        .audit_history(&id)
        .await
        .map_err(|e| ApiError::from_prompt(e, &ctx))?;
    Ok(Json(audits.into_iter().map(AuditDto::from).collect()))
}
