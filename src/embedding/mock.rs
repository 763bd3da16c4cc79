use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{EmbeddingClient, EmbeddingError};

/// Deterministic in-memory [`EmbeddingClient`] for tests.
///
/// Vectors are derived from a SHA-256 of the text so equal texts embed
/// equally and different texts diverge.
pub struct MockEmbeddingClient {
    dimension: usize,
    calls: AtomicUsize,
    fail_transient: AtomicBool,
}

impl MockEmbeddingClient {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            calls: AtomicUsize::new(0),
            fail_transient: AtomicBool::new(false),
        }
    }

    /// Number of provider calls observed (batches count once).
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Makes subsequent calls fail with a transient error.
    pub fn fail_transient(&self, fail: bool) {
        self.fail_transient.store(fail, Ordering::SeqCst);
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let digest = Sha256::digest(text.trim().to_lowercase().as_bytes());
        (0..self.dimension)
            .map(|i| {
                let byte = digest[i % digest.len()];
                (byte as f32 / 255.0) * 2.0 - 1.0
            })
            .collect()
    }
}

impl Default for MockEmbeddingClient {
    fn default() -> Self {
        Self::new(8)
    }
}

#[async_trait]
impl EmbeddingClient for MockEmbeddingClient {
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        Ok(vectors.pop().expect("one input yields one vector"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_transient.load(Ordering::SeqCst) {
            return Err(EmbeddingError::Transport(
                "mock transient failure".to_string(),
            ));
        }

        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn model_name(&self) -> &str {
        "mock-embedding"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
