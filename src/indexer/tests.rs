use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::cache::{MemoryKv, ResponseCache, qa_key};
use crate::config::ChunkerConfig;
use crate::context::{Caller, RequestContext, Role};
use crate::embedding::MockEmbeddingClient;
use crate::store::{DocumentStore, DocumentStatus, Game, MemoryStore, NewDocument};
use crate::vectordb::{MockVectorStore, VectorStore};

struct Harness {
    indexer: Indexer,
    store: Arc<MemoryStore>,
    vectors: Arc<MockVectorStore>,
    embeddings: Arc<MockEmbeddingClient>,
    cache: Arc<ResponseCache>,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let vectors = Arc::new(MockVectorStore::new());
    let embeddings = Arc::new(MockEmbeddingClient::new(8));
    let kv = Arc::new(MemoryKv::new());
    let cache = Arc::new(ResponseCache::new(
        kv,
        store.clone(),
        Duration::from_secs(86_400),
    ));

    let indexer = Indexer::new(
        store.clone(),
        embeddings.clone(),
        vectors.clone(),
        cache.clone(),
        TextChunker::new(&ChunkerConfig::default()),
        4,
    );

    Harness {
        indexer,
        store,
        vectors,
        embeddings,
        cache,
    }
}

fn ctx() -> RequestContext {
    RequestContext::new(Caller::new("editor-1", Role::Editor))
}

async fn seed_document(store: &MemoryStore, game_id: &str, text: Option<&str>) -> String {
    store
        .ensure_game(&Game {
            id: game_id.to_string(),
            name: game_id.to_string(),
        })
        .await
        .unwrap();

    let doc = store
        .create_document(NewDocument {
            game_id: game_id.to_string(),
            file_name: "rules.pdf".to_string(),
            file_size: 1024,
            uploaded_by: "editor-1".to_string(),
            status: if text.is_some() {
                DocumentStatus::Completed
            } else {
                DocumentStatus::Pending
            },
            extracted_text: text.map(|t| t.to_string()),
            page_count: 1,
            char_count: text.map(|t| t.len() as i64).unwrap_or(0),
            extraction_error: None,
        })
        .await
        .unwrap();
    doc.id
}

fn rules_text(len: usize) -> String {
    let sentence = "Players take turns placing a mark on the board. ";
    sentence.repeat(len / sentence.len() + 1)[..len].to_string()
}

#[tokio::test]
async fn test_index_document_happy_path() {
    let h = harness();
    let doc_id = seed_document(&h.store, "tic-tac-toe", Some(&rules_text(10_000))).await;

    let outcome = h.indexer.index_document(&ctx(), &doc_id).await.unwrap();

    assert!((19..=24).contains(&outcome.chunk_count), "{}", outcome.chunk_count);
    assert_eq!(h.vectors.document_point_count(&doc_id), outcome.chunk_count);

    let record = h.store.get_vector_document(&doc_id).await.unwrap().unwrap();
    assert_eq!(record.status, DocumentStatus::Completed);
    assert_eq!(record.chunk_count as usize, outcome.chunk_count);
    assert!(record.indexed_at.is_some());
    assert!(record.indexing_error.is_none());
}

#[tokio::test]
async fn test_reindex_is_idempotent() {
    let h = harness();
    let doc_id = seed_document(&h.store, "tic-tac-toe", Some(&rules_text(10_000))).await;

    let first = h.indexer.index_document(&ctx(), &doc_id).await.unwrap();
    let first_record = h.store.get_vector_document(&doc_id).await.unwrap().unwrap();

    let second = h.indexer.index_document(&ctx(), &doc_id).await.unwrap();
    let second_record = h.store.get_vector_document(&doc_id).await.unwrap().unwrap();

    assert_eq!(first.chunk_count, second.chunk_count);
    assert_eq!(first_record.id, second_record.id);
    assert_eq!(h.vectors.document_point_count(&doc_id), second.chunk_count);
    assert!(second.indexed_at >= first.indexed_at);
}

#[tokio::test]
async fn test_missing_document_is_pdf_not_found() {
    let h = harness();
    let err = h
        .indexer
        .index_document(&ctx(), "nope")
        .await
        .unwrap_err();
    assert!(matches!(err, IndexerError::PdfNotFound { .. }));
}

#[tokio::test]
async fn test_document_without_text_requires_extraction() {
    let h = harness();
    let doc_id = seed_document(&h.store, "chess", None).await;

    let err = h.indexer.index_document(&ctx(), &doc_id).await.unwrap_err();
    assert!(matches!(err, IndexerError::TextExtractionRequired { .. }));
}

#[tokio::test]
async fn test_embedding_failure_marks_record_failed() {
    let h = harness();
    let doc_id = seed_document(&h.store, "chess", Some(&rules_text(2_000))).await;

    h.embeddings.fail_transient(true);
    let err = h.indexer.index_document(&ctx(), &doc_id).await.unwrap_err();
    assert!(matches!(err, IndexerError::EmbeddingFailed { .. }));

    let record = h.store.get_vector_document(&doc_id).await.unwrap().unwrap();
    assert_eq!(record.status, DocumentStatus::Failed);
    assert!(record.indexing_error.is_some());
}

#[tokio::test]
async fn test_upsert_failure_marks_record_failed() {
    let h = harness();
    let doc_id = seed_document(&h.store, "chess", Some(&rules_text(2_000))).await;

    h.vectors.fail_upserts(true);
    let err = h.indexer.index_document(&ctx(), &doc_id).await.unwrap_err();
    assert!(matches!(err, IndexerError::QdrantIndexingFailed { .. }));

    let record = h.store.get_vector_document(&doc_id).await.unwrap().unwrap();
    assert_eq!(record.status, DocumentStatus::Failed);

    // Recovery: the backend comes back and a re-index succeeds in place.
    h.vectors.fail_upserts(false);
    h.indexer.index_document(&ctx(), &doc_id).await.unwrap();
    let record = h.store.get_vector_document(&doc_id).await.unwrap().unwrap();
    assert_eq!(record.status, DocumentStatus::Completed);
}

#[tokio::test]
async fn test_indexing_invalidates_game_cache() {
    let h = harness();
    let doc_id = seed_document(&h.store, "chess", Some(&rules_text(2_000))).await;

    let key = qa_key("chess", "how do pawns move?");
    h.cache
        .set(
            &key,
            &serde_json::json!({"answer": "stale"}),
            None,
            &[crate::cache::game_tag("chess")],
        )
        .await;

    h.indexer.index_document(&ctx(), &doc_id).await.unwrap();

    let cached: Option<serde_json::Value> = h.cache.get(&key).await;
    assert!(cached.is_none());
}

#[tokio::test]
async fn test_cancelled_context_stops_before_upsert() {
    let h = harness();
    let doc_id = seed_document(&h.store, "chess", Some(&rules_text(2_000))).await;

    let ctx = ctx();
    ctx.cancel();
    let err = h.indexer.index_document(&ctx, &doc_id).await.unwrap_err();
    assert!(matches!(err, IndexerError::Cancelled));
    assert_eq!(h.vectors.document_point_count(&doc_id), 0);
}

#[tokio::test]
async fn test_scoped_delete_leaves_other_games_untouched() {
    let h = harness();
    let d1 = seed_document(&h.store, "g1", Some(&rules_text(2_000))).await;
    let d2 = seed_document(&h.store, "g2", Some(&rules_text(2_000))).await;

    h.indexer.index_document(&ctx(), &d1).await.unwrap();
    h.indexer.index_document(&ctx(), &d2).await.unwrap();

    h.vectors.delete_document(&d1).await.unwrap();

    let query = vec![0.5f32; 8];
    assert!(h.vectors.search("g1", query.clone(), 5).await.unwrap().is_empty());
    assert!(!h.vectors.search("g2", query, 5).await.unwrap().is_empty());
}
