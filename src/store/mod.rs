//! Relational store.
//!
//! The relational database exclusively owns documents, vector-document
//! tracking records, prompt templates/versions/audit, cache statistics,
//! AI request logs, and feedback. Access goes through three per-concern
//! traits so the engines can be tested against in-memory fakes.

pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod memory;
pub mod models;
pub mod postgres;

pub use error::StoreError;
#[cfg(any(test, feature = "mock"))]
pub use memory::MemoryStore;
pub use models::*;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// New document produced by the upload path after text extraction.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub game_id: String,
    pub file_name: String,
    pub file_size: i64,
    pub uploaded_by: String,
    pub status: DocumentStatus,
    pub extracted_text: Option<String>,
    pub page_count: i32,
    pub char_count: i64,
    pub extraction_error: Option<String>,
}

/// Input for [`PromptStore::create_template`].
#[derive(Debug, Clone)]
pub struct NewTemplate {
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub content: String,
    pub metadata: Option<serde_json::Value>,
    pub actor: String,
}

/// Input for [`PromptStore::append_version`].
#[derive(Debug, Clone)]
pub struct NewVersion {
    pub template_id: String,
    pub content: String,
    pub metadata: Option<serde_json::Value>,
    pub activate: bool,
    pub actor: String,
}

/// Feedback upsert; a `None` outcome removes the row.
#[derive(Debug, Clone)]
pub struct FeedbackUpsert {
    pub message_id: String,
    pub endpoint: String,
    pub user_id: String,
    pub game_id: String,
    pub outcome: Option<FeedbackOutcome>,
}

/// Documents and their vector-document tracking records.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Creates the game row if it does not exist yet.
    async fn ensure_game(&self, game: &Game) -> Result<(), StoreError>;

    async fn get_game(&self, game_id: &str) -> Result<Option<Game>, StoreError>;

    async fn create_document(&self, new: NewDocument) -> Result<Document, StoreError>;

    async fn get_document(&self, id: &str) -> Result<Option<Document>, StoreError>;

    async fn set_document_status(
        &self,
        id: &str,
        status: DocumentStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError>;

    /// The vector-document record backing a document, if any.
    async fn get_vector_document(
        &self,
        document_id: &str,
    ) -> Result<Option<VectorDocument>, StoreError>;

    async fn create_vector_document(&self, record: &VectorDocument) -> Result<(), StoreError>;

    /// Flips an existing record back to `processing` for a re-index,
    /// preserving its id.
    async fn set_vector_document_processing(&self, id: &str) -> Result<(), StoreError>;

    async fn complete_vector_document(
        &self,
        id: &str,
        chunk_count: i32,
        total_characters: i64,
        indexed_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn fail_vector_document(&self, id: &str, error: &str) -> Result<(), StoreError>;
}

/// Prompt templates, versions, and their audit trail.
///
/// Multi-row mutations are transactional inside each implementation; the
/// exactly-one-active invariant is maintained here, never by callers.
#[async_trait]
pub trait PromptStore: Send + Sync {
    /// Creates a template with version 1 active, emitting
    /// `template_created` and `version_created` audit rows.
    async fn create_template(
        &self,
        new: NewTemplate,
    ) -> Result<(PromptTemplate, PromptVersion), StoreError>;

    /// Appends version N+1; when `activate` is set the previous active
    /// version is deactivated in the same transaction, with paired audit
    /// rows.
    async fn append_version(&self, new: NewVersion) -> Result<PromptVersion, StoreError>;

    /// Atomically moves the active flag to `version_id`. `reason` is
    /// folded into the activation audit details.
    async fn activate_version(
        &self,
        template_id: &str,
        version_id: &str,
        reason: Option<&str>,
        actor: &str,
    ) -> Result<(), StoreError>;

    /// Content of the active version for a template name
    /// (case-insensitive).
    async fn get_active_content(&self, name: &str) -> Result<Option<String>, StoreError>;

    async fn get_template(&self, id: &str) -> Result<Option<PromptTemplate>, StoreError>;

    async fn list_templates(
        &self,
        category: Option<&str>,
    ) -> Result<Vec<PromptTemplate>, StoreError>;

    /// All versions of a template, newest first.
    async fn versions(&self, template_id: &str) -> Result<Vec<PromptVersion>, StoreError>;

    /// Audit rows for a template, newest first.
    async fn audits(&self, template_id: &str) -> Result<Vec<PromptAudit>, StoreError>;

    /// Updates mutable template fields, emitting `template_updated`.
    async fn update_template(
        &self,
        template_id: &str,
        description: Option<&str>,
        category: Option<&str>,
        actor: &str,
    ) -> Result<PromptTemplate, StoreError>;
}

/// Cache statistics, AI request logs, and feedback.
///
/// All writes here are best-effort from the engines' point of view;
/// callers catch and trace failures.
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    async fn record_cache_hit(&self, game_id: &str, question_hash: &str)
    -> Result<(), StoreError>;

    async fn record_cache_miss(
        &self,
        game_id: &str,
        question_hash: &str,
    ) -> Result<(), StoreError>;

    async fn cache_stats(&self, game_id: Option<&str>) -> Result<CacheStatsAggregate, StoreError>;

    async fn log_ai_request(&self, entry: AiRequestLogEntry) -> Result<(), StoreError>;

    async fn upsert_feedback(&self, feedback: FeedbackUpsert) -> Result<(), StoreError>;

    async fn feedback_stats(&self, game_id: Option<&str>) -> Result<FeedbackStats, StoreError>;
}
