//! HTTP gateway (Axum) for ingestion, agents, prompts, and cache admin.
//!
//! Auth and rate limiting live upstream; this layer receives the verified
//! caller identity via `X-User-Id` / `X-User-Role` headers and enforces
//! only the per-route role floor. Every response carries a correlation id
//! header, generated when the client did not supply one.

pub mod error;
pub mod handlers;
pub mod state;
pub mod streaming;


pub use error::{ApiError, ErrorBody};
pub use state::AppState;

use axum::{
    Json, Router,
    extract::Request,
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::store::DocumentStore as _;

/// Header correlating logs and responses across services.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Installs a correlation id on the request (when absent) and echoes it
/// on the response.
async fn correlation_id_middleware(mut request: Request, next: Next) -> Response {
    let id = request
        .headers()
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    if let Ok(value) = HeaderValue::from_str(&id) {
        request.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }

    let mut response = next.run(request).await;

    if !response.headers().contains_key(CORRELATION_ID_HEADER)
        && let Ok(value) = HeaderValue::from_str(&id)
    {
        response.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }

    response
}

pub fn create_router_with_state(state: AppState) -> Router {
    let api = Router::new()
        .route("/ingest/pdf", post(handlers::ingest_pdf))
        .route("/ingest/pdf/{pdfId}/index", post(handlers::reindex_pdf))
        .route("/agents/qa", post(handlers::agents_qa))
        .route("/agents/qa/stream", post(streaming::agents_qa_stream))
        .route("/agents/explain", post(handlers::agents_explain))
        .route("/setup/generate", post(handlers::setup_generate))
        .route("/agents/feedback", post(handlers::agents_feedback))
        .route("/agents/feedback/stats", get(handlers::feedback_stats))
        .route("/admin/cache/stats", get(handlers::cache_stats))
        .route("/admin/cache/invalidate", post(handlers::cache_invalidate))
        .route(
            "/prompts",
            get(handlers::list_prompts).post(handlers::create_prompt),
        )
        .route(
            "/prompts/{id}",
            get(handlers::get_prompt).put(handlers::update_prompt),
        )
        .route(
            "/prompts/{id}/versions",
            get(handlers::list_versions).post(handlers::create_version),
        )
        .route(
            "/prompts/{id}/versions/{versionId}/activate",
            post(handlers::activate_version),
        )
        .route("/prompts/{id}/audit", get(handlers::prompt_audit));

    Router::new()
        .route("/healthz", get(health_handler))
        .route("/readyz", get(ready_handler))
        .nest("/api/v1", api)
        .layer(middleware::from_fn(correlation_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(serde::Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[tracing::instrument]
pub async fn health_handler() -> Response {
    (StatusCode::OK, Json(HealthResponse { status: "ok" })).into_response()
}

#[tracing::instrument(skip(state))]
pub async fn ready_handler(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Response {
    // The KV layer and engines are in-process; readiness hinges on the
    // stores answering. A cheap read against each suffices.
    let documents_ready = state.documents.get_game("__readyz__").await.is_ok();
    let prompts_ready = state.prompts.get_active("__readyz__").await.is_ok();

    if documents_ready && prompts_ready {
        (StatusCode::OK, Json(HealthResponse { status: "ready" })).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse { status: "pending" }),
        )
            .into_response()
    }
}
