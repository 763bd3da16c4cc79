use thiserror::Error;

/// Errors surfaced by the relational store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying database failure.
    #[error("database error: {0}")]
    Database(String),

    /// A prompt template name is already taken (case-insensitive).
    #[error("prompt template name already exists: {name}")]
    DuplicateName { name: String },

    /// Template lookup failed.
    #[error("prompt template not found: {id}")]
    TemplateNotFound { id: String },

    /// Version lookup failed, or the version belongs to another template.
    #[error("prompt version not found: {id}")]
    VersionNotFound { id: String },

    /// Document lookup failed.
    #[error("document not found: {id}")]
    DocumentNotFound { id: String },
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}
