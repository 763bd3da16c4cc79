use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::client::VectorStore;
use super::error::VectorStoreError;
use super::model::{EmbeddedChunk, SearchHit, point_id, sort_hits};

#[derive(Clone)]
struct MockStoredPoint {
    vector: Vec<f32>,
    game_id: String,
    document_id: String,
    chunk_index: i64,
    text: String,
    page: i64,
    char_start: i64,
    char_end: i64,
}

/// In-memory [`VectorStore`] for tests.
#[derive(Default)]
pub struct MockVectorStore {
    points: RwLock<HashMap<u64, MockStoredPoint>>,
    search_calls: AtomicUsize,
    fail_upserts: AtomicBool,
    fail_searches: AtomicBool,
}

impl MockVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total points across all documents.
    pub fn point_count(&self) -> usize {
        self.points.read().len()
    }

    /// Points belonging to one document.
    pub fn document_point_count(&self, document_id: &str) -> usize {
        self.points
            .read()
            .values()
            .filter(|p| p.document_id == document_id)
            .count()
    }

    /// Number of search calls observed.
    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn fail_upserts(&self, fail: bool) {
        self.fail_upserts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_searches(&self, fail: bool) {
        self.fail_searches.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl VectorStore for MockVectorStore {
    async fn ensure_collection(&self) -> Result<(), VectorStoreError> {
        Ok(())
    }

    async fn upsert(
        &self,
        game_id: &str,
        document_id: &str,
        chunks: Vec<EmbeddedChunk>,
    ) -> Result<usize, VectorStoreError> {
        if self.fail_upserts.load(Ordering::SeqCst) {
            return Err(VectorStoreError::UpsertFailed {
                collection: "mock".to_string(),
                message: "mock upsert failure".to_string(),
            });
        }

        let mut points = self.points.write();
        let written = chunks.len();

        for embedded in chunks {
            let chunk = embedded.chunk;
            points.insert(
                point_id(document_id, chunk.index),
                MockStoredPoint {
                    vector: embedded.vector,
                    game_id: game_id.to_string(),
                    document_id: document_id.to_string(),
                    chunk_index: chunk.index as i64,
                    text: chunk.text,
                    page: chunk.page as i64,
                    char_start: chunk.char_start as i64,
                    char_end: chunk.char_end as i64,
                },
            );
        }

        Ok(written)
    }

    async fn search(
        &self,
        game_id: &str,
        query: Vec<f32>,
        limit: u64,
    ) -> Result<Vec<SearchHit>, VectorStoreError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_searches.load(Ordering::SeqCst) {
            return Err(VectorStoreError::SearchFailed {
                collection: "mock".to_string(),
                message: "mock search failure".to_string(),
            });
        }

        let points = self.points.read();
        let mut hits: Vec<SearchHit> = points
            .values()
            .filter(|p| p.game_id == game_id)
            .map(|p| SearchHit {
                score: cosine_similarity(&query, &p.vector),
                game_id: p.game_id.clone(),
                document_id: p.document_id.clone(),
                chunk_index: p.chunk_index,
                text: p.text.clone(),
                page: p.page,
                char_start: p.char_start,
                char_end: p.char_end,
            })
            .collect();

        sort_hits(&mut hits);
        hits.truncate(limit as usize);
        Ok(hits)
    }

    async fn delete_document(&self, document_id: &str) -> Result<(), VectorStoreError> {
        self.points
            .write()
            .retain(|_, p| p.document_id != document_id);
        Ok(())
    }
}

/// Cosine similarity used for mock scoring.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}
