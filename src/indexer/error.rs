use thiserror::Error;

use crate::store::StoreError;

/// Indexing failure taxonomy. Every variant except `Store` and
/// `Cancelled` is also persisted onto the vector-document record as
/// `status = failed` with the rendered message.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// No document row for the given id.
    #[error("PDF not found: {id}")]
    PdfNotFound { id: String },

    /// The document exists but has no extracted text yet.
    #[error("text extraction required for document {id}")]
    TextExtractionRequired { id: String },

    /// Chunking produced no searchable windows.
    #[error("chunking produced no chunks for document {id}")]
    ChunkingFailed { id: String },

    /// The embedding provider failed or returned a mismatched batch.
    #[error("embedding failed: {message}")]
    EmbeddingFailed { message: String, retryable: bool },

    /// The vector store rejected the upsert or delete.
    #[error("qdrant indexing failed: {message}")]
    QdrantIndexingFailed { message: String },

    /// Relational store failure while tracking status.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The caller's context was cancelled mid-pipeline.
    #[error("indexing cancelled")]
    Cancelled,
}

impl IndexerError {
    /// Whether the background worker may retry this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            IndexerError::EmbeddingFailed {
                retryable: true,
                ..
            } | IndexerError::QdrantIndexingFailed { .. }
        )
    }
}
