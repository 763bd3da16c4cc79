//! Relational entities.
//!
//! Rows hold ids, never object references; related records are looked up
//! by id through the store traits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A board game known to the assistant.
#[derive(Debug, Clone, PartialEq)]
pub struct Game {
    pub id: String,
    pub name: String,
}

/// Extraction status of an uploaded rulebook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Failed => "failed",
        })
    }
}

impl FromStr for DocumentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DocumentStatus::Pending),
            "processing" => Ok(DocumentStatus::Processing),
            "completed" => Ok(DocumentStatus::Completed),
            "failed" => Ok(DocumentStatus::Failed),
            other => Err(format!("unknown document status: {other}")),
        }
    }
}

/// An uploaded rulebook PDF with its extracted text.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub game_id: String,
    pub file_name: String,
    pub file_size: i64,
    pub uploaded_by: String,
    pub uploaded_at: DateTime<Utc>,
    pub status: DocumentStatus,
    pub extracted_text: Option<String>,
    pub page_count: i32,
    pub char_count: i64,
    pub extraction_error: Option<String>,
}

/// Indexing status of a document's vector set.
pub type IndexingStatus = DocumentStatus;

/// Tracking record for a document's presence in the vector store.
#[derive(Debug, Clone)]
pub struct VectorDocument {
    pub id: String,
    pub game_id: String,
    pub document_id: String,
    pub chunk_count: i32,
    pub total_characters: i64,
    pub embedding_model: String,
    pub embedding_dimensions: i32,
    pub status: IndexingStatus,
    pub indexing_error: Option<String>,
    pub indexed_at: Option<DateTime<Utc>>,
}

/// A named prompt template with cached version summary fields.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub version_count: i32,
    pub active_version: Option<i32>,
}

/// An immutable template version; at most one per template is active.
#[derive(Debug, Clone)]
pub struct PromptVersion {
    pub id: String,
    pub template_id: String,
    pub version: i32,
    pub content: String,
    pub metadata: Option<serde_json::Value>,
    pub is_active: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// Audit actions recorded on prompt mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    TemplateCreated,
    VersionCreated,
    VersionActivated,
    VersionDeactivated,
    Rollback,
    TemplateUpdated,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::TemplateCreated => "template_created",
            AuditAction::VersionCreated => "version_created",
            AuditAction::VersionActivated => "version_activated",
            AuditAction::VersionDeactivated => "version_deactivated",
            AuditAction::Rollback => "rollback",
            AuditAction::TemplateUpdated => "template_updated",
        }
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "template_created" => Ok(AuditAction::TemplateCreated),
            "version_created" => Ok(AuditAction::VersionCreated),
            "version_activated" => Ok(AuditAction::VersionActivated),
            "version_deactivated" => Ok(AuditAction::VersionDeactivated),
            "rollback" => Ok(AuditAction::Rollback),
            "template_updated" => Ok(AuditAction::TemplateUpdated),
            other => Err(format!("unknown audit action: {other}")),
        }
    }
}

/// Append-only audit row for prompt mutations.
#[derive(Debug, Clone)]
pub struct PromptAudit {
    pub id: String,
    pub template_id: String,
    pub version_id: Option<String>,
    pub action: AuditAction,
    pub actor: String,
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Per-(game, question) cache counters. Monotonically non-decreasing.
#[derive(Debug, Clone)]
pub struct CacheStatsRow {
    pub game_id: String,
    pub question_hash: String,
    pub hit_count: i64,
    pub miss_count: i64,
    pub created_at: DateTime<Utc>,
    pub last_hit_at: Option<DateTime<Utc>>,
}

/// Aggregated cache statistics for the admin surface.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStatsAggregate {
    pub total_hits: i64,
    pub total_misses: i64,
    pub hit_rate: f64,
    /// Top question hashes by hit count, at most ten.
    pub top_questions: Vec<TopQuestion>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopQuestion {
    pub game_id: String,
    pub question_hash: String,
    pub hit_count: i64,
}

/// AI endpoints that write request logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiEndpoint {
    Qa,
    Explain,
    Setup,
    QaStream,
}

impl AiEndpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            AiEndpoint::Qa => "qa",
            AiEndpoint::Explain => "explain",
            AiEndpoint::Setup => "setup",
            AiEndpoint::QaStream => "qa_stream",
        }
    }
}

impl FromStr for AiEndpoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "qa" => Ok(AiEndpoint::Qa),
            "explain" => Ok(AiEndpoint::Explain),
            "setup" => Ok(AiEndpoint::Setup),
            "qa_stream" => Ok(AiEndpoint::QaStream),
            other => Err(format!("unknown endpoint: {other}")),
        }
    }
}

/// One row per AI operation, cached or not. Id and timestamp are filled
/// by the store on insert.
#[derive(Debug, Clone)]
pub struct AiRequestLogEntry {
    pub endpoint: AiEndpoint,
    pub game_id: String,
    pub user_id: String,
    pub query: String,
    pub latency_ms: i64,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
    pub confidence: Option<f64>,
    pub success: bool,
    pub from_cache: bool,
    pub error: Option<String>,
}

/// User verdict on an agent message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FeedbackOutcome {
    Helpful,
    NotHelpful,
}

impl FeedbackOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackOutcome::Helpful => "helpful",
            FeedbackOutcome::NotHelpful => "not-helpful",
        }
    }
}

impl FromStr for FeedbackOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "helpful" => Ok(FeedbackOutcome::Helpful),
            "not-helpful" => Ok(FeedbackOutcome::NotHelpful),
            other => Err(format!("unknown feedback outcome: {other}")),
        }
    }
}

/// Stored feedback row, unique per (message, endpoint, user).
#[derive(Debug, Clone)]
pub struct AgentFeedback {
    pub message_id: String,
    pub endpoint: String,
    pub user_id: String,
    pub game_id: String,
    pub outcome: FeedbackOutcome,
    pub updated_at: DateTime<Utc>,
}

/// Aggregated feedback counts.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FeedbackStats {
    pub total: i64,
    /// endpoint -> outcome -> count
    pub by_endpoint: std::collections::BTreeMap<String, std::collections::BTreeMap<String, i64>>,
}
