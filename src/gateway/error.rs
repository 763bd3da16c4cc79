//! HTTP error mapping.
//!
//! Module errors map onto status codes per the error taxonomy: validation
//! 400, not-found 404, no-results 404, transient upstream 503, anything
//! unexpected 500. Every error body carries the correlation id.

use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use super::CORRELATION_ID_HEADER;
use crate::agents::AgentError;
use crate::context::RequestContext;
use crate::indexer::IndexerError;
use crate::prompts::PromptError;
use crate::store::StoreError;

/// JSON error envelope.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

/// An HTTP-mappable error with its correlation id attached.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: Option<String>,
    pub message: String,
    pub correlation_id: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            code: None,
            message: message.into(),
            correlation_id: None,
        }
    }

    pub fn with_code(mut self, code: &str) -> Self {
        self.code = Some(code.to_string());
        self
    }

    pub fn with_context(mut self, ctx: &RequestContext) -> Self {
        self.correlation_id = Some(ctx.correlation_id.clone());
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn from_agent(err: AgentError, ctx: &RequestContext) -> Self {
        let status = match &err {
            AgentError::EmptyQuery | AgentError::EmptyGameId => StatusCode::BAD_REQUEST,
            AgentError::NoResults => StatusCode::NOT_FOUND,
            AgentError::EmbeddingFailed(_) | AgentError::LlmFailed(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AgentError::Cancelled => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
            .with_code(err.code())
            .with_context(ctx)
    }

    pub fn from_indexer(err: IndexerError, ctx: &RequestContext) -> Self {
        let (status, code) = match &err {
            IndexerError::PdfNotFound { .. } => (StatusCode::NOT_FOUND, "PDF_NOT_FOUND"),
            IndexerError::TextExtractionRequired { .. } => {
                (StatusCode::BAD_REQUEST, "TEXT_EXTRACTION_REQUIRED")
            }
            IndexerError::ChunkingFailed { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "CHUNKING_FAILED")
            }
            IndexerError::EmbeddingFailed { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "EMBEDDING_FAILED")
            }
            IndexerError::QdrantIndexingFailed { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "QDRANT_INDEXING_FAILED")
            }
            IndexerError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
            IndexerError::Cancelled => (StatusCode::INTERNAL_SERVER_ERROR, "CANCELLED"),
        };
        Self::new(status, err.to_string())
            .with_code(code)
            .with_context(ctx)
    }

    pub fn from_prompt(err: PromptError, ctx: &RequestContext) -> Self {
        let (status, code) = match &err {
            PromptError::InvalidName { .. } => (StatusCode::BAD_REQUEST, "INVALID_NAME"),
            PromptError::TooLarge { .. } => (StatusCode::BAD_REQUEST, "PROMPT_TOO_LARGE"),
            PromptError::EmptyContent => (StatusCode::BAD_REQUEST, "EMPTY_CONTENT"),
            PromptError::Store(StoreError::DuplicateName { .. }) => {
                (StatusCode::BAD_REQUEST, "DUPLICATE_NAME")
            }
            PromptError::Store(StoreError::TemplateNotFound { .. }) => {
                (StatusCode::NOT_FOUND, "TEMPLATE_NOT_FOUND")
            }
            PromptError::Store(StoreError::VersionNotFound { .. }) => {
                (StatusCode::NOT_FOUND, "VERSION_NOT_FOUND")
            }
            PromptError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
        };
        Self::new(status, err.to_string())
            .with_code(code)
            .with_context(ctx)
    }

    pub fn from_store(err: StoreError, ctx: &RequestContext) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            .with_code("STORAGE_ERROR")
            .with_context(ctx)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        if let Some(correlation_id) = &self.correlation_id
            && let Ok(value) = HeaderValue::from_str(correlation_id)
        {
            headers.insert(CORRELATION_ID_HEADER, value);
        }

        let body = Json(ErrorBody {
            error: self.message,
            code: self.code,
            correlation_id: self.correlation_id,
        });

        (self.status, headers, body).into_response()
    }
}
