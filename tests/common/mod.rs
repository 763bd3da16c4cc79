//! Shared wiring for integration tests: the full engine stack over
//! in-memory fakes, plus the axum router on top.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, header};
use http_body_util::BodyExt;
use serde_json::Value;

use meepleai::agents::{
    ExplainEngine, FeedbackService, QaEngine, StreamingQaEngine,
};
use meepleai::cache::{MemoryKv, ResponseCache};
use meepleai::chunker::TextChunker;
use meepleai::config::ChunkerConfig;
use meepleai::extract::PlainTextExtractor;
use meepleai::gateway::{AppState, create_router_with_state};
use meepleai::indexer::Indexer;
use meepleai::prompts::PromptRegistry;
use meepleai::{MemoryStore, MockEmbeddingClient, MockLlmClient, MockVectorStore};

pub struct TestStack {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub kv: Arc<MemoryKv>,
    pub vectors: Arc<MockVectorStore>,
    pub embeddings: Arc<MockEmbeddingClient>,
    pub llm: Arc<MockLlmClient>,
    pub cache: Arc<ResponseCache>,
    pub indexer: Arc<Indexer>,
    pub prompts: Arc<PromptRegistry>,
}

pub fn stack() -> TestStack {
    let store = Arc::new(MemoryStore::new());
    let kv = Arc::new(MemoryKv::new());
    let vectors = Arc::new(MockVectorStore::new());
    let embeddings = Arc::new(MockEmbeddingClient::new(8));
    let llm = Arc::new(MockLlmClient::new("Two players take turns."));
    let cache = Arc::new(ResponseCache::new(
        kv.clone(),
        store.clone(),
        Duration::from_secs(86_400),
    ));
    let prompts = Arc::new(PromptRegistry::new(
        store.clone(),
        kv.clone(),
        Duration::from_secs(3_600),
        16_384,
    ));
    let indexer = Arc::new(Indexer::new(
        store.clone(),
        embeddings.clone(),
        vectors.clone(),
        cache.clone(),
        TextChunker::new(&ChunkerConfig::default()),
        4,
    ));

    let state = AppState {
        qa: Arc::new(QaEngine::new(
            prompts.clone(),
            embeddings.clone(),
            vectors.clone(),
            llm.clone(),
            cache.clone(),
            store.clone(),
        )),
        stream: Arc::new(StreamingQaEngine::new(
            prompts.clone(),
            embeddings.clone(),
            vectors.clone(),
            llm.clone(),
            cache.clone(),
            store.clone(),
        )),
        explain: Arc::new(ExplainEngine::new(
            prompts.clone(),
            store.clone(),
            embeddings.clone(),
            vectors.clone(),
            llm.clone(),
            cache.clone(),
            store.clone(),
        )),
        feedback: Arc::new(FeedbackService::new(store.clone())),
        indexer: indexer.clone(),
        prompts: prompts.clone(),
        cache: cache.clone(),
        documents: store.clone(),
        extractor: Arc::new(PlainTextExtractor),
    };

    TestStack {
        router: create_router_with_state(state),
        store,
        kv,
        vectors,
        embeddings,
        llm,
        cache,
        indexer,
        prompts,
    }
}

pub fn json_request(uri: &str, role: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-user-id", "test-user")
        .header("x-user-role", role)
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

pub async fn body_text(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// A rulebook-like text of roughly `len` characters.
pub fn rules_text(len: usize) -> String {
    let sentence = "Players take turns placing one mark in an empty cell of the grid. ";
    sentence.repeat(len / sentence.len() + 1)[..len].to_string()
}
