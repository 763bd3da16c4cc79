//! Background ingestion pipeline: extract → chunk → embed → index.
//!
//! Turns a document with extracted text into a completed vector-document
//! record. Re-indexing is idempotent: prior points are deleted before the
//! rebuild and the tracking record id is preserved.
//!
//! Invocations are serialized per document id so a vector set can never
//! tear; across documents, a semaphore bounds parallel pipelines.

pub mod error;

#[cfg(test)]
mod tests;

pub use error::IndexerError;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::cache::ResponseCache;
use crate::chunker::TextChunker;
use crate::context::RequestContext;
use crate::embedding::EmbeddingClient;
use crate::store::{DocumentStore, DocumentStatus, VectorDocument};
use crate::vectordb::{EmbeddedChunk, VectorStore};

/// Texts per embedding call.
const EMBED_BATCH_SIZE: usize = 64;

/// Background upload-path retries for transient failures.
const INGEST_RETRIES: u32 = 3;
const INGEST_BACKOFF_BASE_MS: u64 = 500;

/// Result of a successful indexing run.
#[derive(Debug, Clone)]
pub struct IndexOutcome {
    pub vector_document_id: String,
    pub chunk_count: usize,
    pub total_characters: i64,
    pub indexed_at: DateTime<Utc>,
}

/// Orchestrates chunking, embedding, and vector upserts for documents.
pub struct Indexer {
    documents: Arc<dyn DocumentStore>,
    embeddings: Arc<dyn EmbeddingClient>,
    vectors: Arc<dyn VectorStore>,
    cache: Arc<ResponseCache>,
    chunker: TextChunker,
    document_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    workers: Arc<Semaphore>,
}

impl Indexer {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        embeddings: Arc<dyn EmbeddingClient>,
        vectors: Arc<dyn VectorStore>,
        cache: Arc<ResponseCache>,
        chunker: TextChunker,
        max_workers: usize,
    ) -> Self {
        Self {
            documents,
            embeddings,
            vectors,
            cache,
            chunker,
            document_locks: Mutex::new(HashMap::new()),
            workers: Arc::new(Semaphore::new(max_workers.max(1))),
        }
    }

    fn lock_for(&self, document_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.document_locks
            .lock()
            .entry(document_id.to_string())
            .or_default()
            .clone()
    }

    /// Indexes one document end to end.
    ///
    /// Idempotent: an existing vector set is deleted and rebuilt under the
    /// same tracking record.
    #[instrument(skip(self, ctx), fields(correlation_id = %ctx.correlation_id))]
    pub async fn index_document(
        &self,
        ctx: &RequestContext,
        document_id: &str,
    ) -> Result<IndexOutcome, IndexerError> {
        let doc_lock = self.lock_for(document_id);
        let _serialized = doc_lock.lock().await;
        let _permit = self
            .workers
            .acquire()
            .await
            .expect("indexer semaphore is never closed");

        let document = self
            .documents
            .get_document(document_id)
            .await?
            .ok_or_else(|| IndexerError::PdfNotFound {
                id: document_id.to_string(),
            })?;

        let text = match document.extracted_text.as_deref() {
            Some(text) if !text.trim().is_empty() => text.to_string(),
            _ => {
                return Err(IndexerError::TextExtractionRequired {
                    id: document_id.to_string(),
                });
            }
        };

        // Reuse the existing tracking record on re-index; its prior points
        // are removed before the rebuild.
        let record_id = match self.documents.get_vector_document(document_id).await? {
            Some(existing) => {
                if let Err(e) = self.vectors.delete_document(document_id).await {
                    let err = IndexerError::QdrantIndexingFailed {
                        message: e.to_string(),
                    };
                    self.persist_failure(&existing.id, &err).await;
                    return Err(err);
                }
                self.documents
                    .set_vector_document_processing(&existing.id)
                    .await?;
                existing.id
            }
            None => {
                let record = VectorDocument {
                    id: Uuid::new_v4().to_string(),
                    game_id: document.game_id.clone(),
                    document_id: document_id.to_string(),
                    chunk_count: 0,
                    total_characters: 0,
                    embedding_model: self.embeddings.model_name().to_string(),
                    embedding_dimensions: self.embeddings.dimension() as i32,
                    status: DocumentStatus::Processing,
                    indexing_error: None,
                    indexed_at: None,
                };
                self.documents.create_vector_document(&record).await?;
                record.id
            }
        };

        match self.run_pipeline(ctx, &document.game_id, document_id, &text).await {
            Ok((chunk_count, total_characters)) => {
                let indexed_at = Utc::now();
                self.documents
                    .complete_vector_document(
                        &record_id,
                        chunk_count as i32,
                        total_characters,
                        indexed_at,
                    )
                    .await?;

                // Cached answers may cite stale rules now.
                self.cache.invalidate_game(&document.game_id).await;

                info!(
                    document_id,
                    chunk_count, "document indexed into vector store"
                );

                Ok(IndexOutcome {
                    vector_document_id: record_id,
                    chunk_count,
                    total_characters,
                    indexed_at,
                })
            }
            Err(err) => {
                self.persist_failure(&record_id, &err).await;
                Err(err)
            }
        }
    }

    /// Upload-path entry: retries transient failures with bounded
    /// exponential backoff. Explicit re-index requests call
    /// [`Indexer::index_document`] directly and never retry.
    pub async fn index_with_retry(
        &self,
        ctx: &RequestContext,
        document_id: &str,
    ) -> Result<IndexOutcome, IndexerError> {
        let mut attempt = 0;
        loop {
            match self.index_document(ctx, document_id).await {
                Ok(outcome) => return Ok(outcome),
                Err(err) if err.is_retryable() && attempt + 1 < INGEST_RETRIES => {
                    let delay =
                        Duration::from_millis(INGEST_BACKOFF_BASE_MS << attempt);
                    warn!(
                        document_id,
                        attempt, "transient indexing failure, retrying in {delay:?}: {err}"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn run_pipeline(
        &self,
        ctx: &RequestContext,
        game_id: &str,
        document_id: &str,
        text: &str,
    ) -> Result<(usize, i64), IndexerError> {
        let chunks: Vec<crate::chunker::Chunk> = self.chunker.prepare(text).collect();
        if chunks.is_empty() {
            return Err(IndexerError::ChunkingFailed {
                id: document_id.to_string(),
            });
        }

        if ctx.is_cancelled() {
            return Err(IndexerError::Cancelled);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(texts.len());

        for batch in texts.chunks(EMBED_BATCH_SIZE) {
            if ctx.is_cancelled() {
                return Err(IndexerError::Cancelled);
            }
            let batch_vectors =
                self.embeddings
                    .embed_batch(batch)
                    .await
                    .map_err(|e| IndexerError::EmbeddingFailed {
                        retryable: e.is_transient(),
                        message: e.to_string(),
                    })?;
            vectors.extend(batch_vectors);
        }

        if vectors.len() != chunks.len() {
            return Err(IndexerError::EmbeddingFailed {
                message: format!(
                    "embedding count mismatch: {} chunks, {} vectors",
                    chunks.len(),
                    vectors.len()
                ),
                retryable: false,
            });
        }

        let total_characters: i64 = chunks
            .iter()
            .map(|c| (c.char_end - c.char_start) as i64)
            .sum();
        let chunk_count = chunks.len();

        let embedded: Vec<EmbeddedChunk> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| EmbeddedChunk::new(chunk, vector))
            .collect();

        if ctx.is_cancelled() {
            return Err(IndexerError::Cancelled);
        }

        self.vectors
            .upsert(game_id, document_id, embedded)
            .await
            .map_err(|e| IndexerError::QdrantIndexingFailed {
                message: e.to_string(),
            })?;

        Ok((chunk_count, total_characters))
    }

    async fn persist_failure(&self, record_id: &str, err: &IndexerError) {
        if matches!(err, IndexerError::Cancelled) {
            return;
        }
        if let Err(store_err) = self
            .documents
            .fail_vector_document(record_id, &err.to_string())
            .await
        {
            warn!("failed to persist indexing failure: {store_err}");
        }
    }
}
