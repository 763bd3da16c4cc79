use qdrant_client::qdrant::ScoredPoint;
use qdrant_client::qdrant::point_id::PointIdOptions;
use sha2::{Digest, Sha256};

use crate::chunker::Chunk;

/// A chunk paired with its embedding, ready for upsert.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

impl EmbeddedChunk {
    pub fn new(chunk: Chunk, vector: Vec<f32>) -> Self {
        Self { chunk, vector }
    }
}

/// A scored point returned from a scoped search.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub score: f32,
    pub game_id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub page: i64,
    pub char_start: i64,
    pub char_end: i64,
}

impl SearchHit {
    /// Extracts a hit from a Qdrant scored point; payloads written by this
    /// adapter always carry the full chunk metadata.
    pub fn from_scored_point(point: ScoredPoint) -> Option<Self> {
        match point.id.and_then(|pid| pid.point_id_options) {
            Some(PointIdOptions::Num(_)) => {}
            _ => return None,
        }

        let payload = point.payload;

        let as_str = |key: &str| -> String {
            payload
                .get(key)
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
                .unwrap_or_default()
        };
        let as_int =
            |key: &str| -> i64 { payload.get(key).and_then(|v| v.as_integer()).unwrap_or(0) };

        Some(SearchHit {
            score: point.score,
            game_id: as_str("game_id"),
            document_id: as_str("document_id"),
            chunk_index: as_int("chunk_index"),
            text: as_str("text"),
            page: as_int("page"),
            char_start: as_int("char_start"),
            char_end: as_int("char_end"),
        })
    }
}

/// Stable point id for a (document, chunk) pair.
///
/// Re-indexing the same document maps each chunk to the same id, so an
/// upsert after delete can never leave stale duplicates behind.
pub fn point_id(document_id: &str, chunk_index: usize) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update(b":");
    hasher.update(chunk_index.to_le_bytes());
    let digest = hasher.finalize();
    let bytes: [u8; 8] = digest[0..8]
        .try_into()
        .expect("SHA-256 always produces at least 8 bytes");
    u64::from_le_bytes(bytes)
}

/// Orders hits by score descending, breaking ties by document id then
/// chunk index ascending.
pub fn sort_hits(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.document_id.cmp(&b.document_id))
            .then_with(|| a.chunk_index.cmp(&b.chunk_index))
    });
}
