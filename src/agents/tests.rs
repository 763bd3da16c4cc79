use std::sync::Arc;
use std::time::Duration;

use super::events::QaStreamEvent;
use super::*;
use crate::cache::{MemoryKv, ResponseCache, qa_key};
use crate::chunker::Chunk;
use crate::context::{Caller, RequestContext, Role};
use crate::embedding::MockEmbeddingClient;
use crate::llm::MockLlmClient;
use crate::prompts::PromptRegistry;
use crate::store::{AiEndpoint, DocumentStore, FeedbackOutcome, Game, MemoryStore, PromptStore};
use crate::vectordb::{EmbeddedChunk, MockVectorStore, VectorStore};

struct Harness {
    qa: QaEngine,
    stream: StreamingQaEngine,
    explain: ExplainEngine,
    cache: Arc<ResponseCache>,
    store: Arc<MemoryStore>,
    vectors: Arc<MockVectorStore>,
    embeddings: Arc<MockEmbeddingClient>,
    llm: Arc<MockLlmClient>,
}

fn harness() -> Harness {
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
        kv,
        Duration::from_secs(3_600),
        16_384,
    ));

    let qa = QaEngine::new(
        prompts.clone(),
        embeddings.clone(),
        vectors.clone(),
        llm.clone(),
        cache.clone(),
        store.clone(),
    );
    let stream = StreamingQaEngine::new(
        prompts.clone(),
        embeddings.clone(),
        vectors.clone(),
        llm.clone(),
        cache.clone(),
        store.clone(),
    );
    let explain = ExplainEngine::new(
        prompts,
        store.clone(),
        embeddings.clone(),
        vectors.clone(),
        llm.clone(),
        cache.clone(),
        store.clone(),
    );

    Harness {
        qa,
        stream,
        explain,
        cache,
        store,
        vectors,
        embeddings,
        llm,
    }
}

fn ctx() -> RequestContext {
    RequestContext::new(Caller::new("user-1", Role::User))
}

async fn seed_points(vectors: &MockVectorStore, game_id: &str, document_id: &str) {
    let chunks = vec![
        EmbeddedChunk::new(
            Chunk {
                text: "The game is played by two players.".to_string(),
                char_start: 0,
                char_end: 34,
                page: 1,
                index: 0,
            },
            vec![0.9, 0.1, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        ),
        EmbeddedChunk::new(
            Chunk {
                text: "Players alternate placing marks on a 3x3 grid.".to_string(),
                char_start: 30,
                char_end: 76,
                page: 1,
                index: 1,
            },
            vec![0.1, 0.9, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        ),
    ];
    vectors.upsert(game_id, document_id, chunks).await.unwrap();
}

async fn collect(mut rx: tokio::sync::mpsc::Receiver<QaStreamEvent>) -> Vec<QaStreamEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

fn event_names(events: &[QaStreamEvent]) -> Vec<&'static str> {
    events.iter().map(|e| e.event_name()).collect()
}

// --- Synchronous QA ---

#[tokio::test]
async fn test_qa_cache_hit_skips_providers() {
    let h = harness();
    // Matches the documented key shape: the cached payload is returned
    // verbatim and neither provider is called.
    let key = qa_key("tic-tac-toe", "How many players?");
    let cached = QaResponse {
        answer: "Two players.".to_string(),
        snippets: vec![Snippet {
            text: "Two players.".to_string(),
            source: "PDF:p1".to_string(),
            page: 1,
            line: 0,
        }],
        prompt_tokens: 0,
        completion_tokens: 2,
        total_tokens: 2,
        confidence: 0.95,
    };
    h.cache.set(&key, &cached, None, &[]).await;

    let response = h
        .qa
        .ask(&ctx(), "tic-tac-toe", "How many players?")
        .await
        .unwrap();

    assert_eq!(response, cached);
    assert_eq!(h.embeddings.calls(), 0);
    assert_eq!(h.llm.complete_calls(), 0);

    let log = h.store.last_ai_log().unwrap();
    assert_eq!(log.endpoint, AiEndpoint::Qa);
    assert!(log.from_cache);
    assert!(log.success);
}

#[tokio::test]
async fn test_qa_miss_runs_pipeline_and_caches() {
    let h = harness();
    seed_points(&h.vectors, "tic-tac-toe", "doc-1").await;

    let response = h
        .qa
        .ask(&ctx(), "tic-tac-toe", "How many players?")
        .await
        .unwrap();

    assert_eq!(response.answer, "Two players take turns.");
    assert!(!response.snippets.is_empty());
    assert!(response.snippets[0].source.starts_with("PDF:doc-1"));
    assert!(response.confidence >= 0.0);
    assert_eq!(
        response.total_tokens,
        response.prompt_tokens + response.completion_tokens
    );
    assert_eq!(h.llm.complete_calls(), 1);

    // Second ask is served from cache.
    let again = h
        .qa
        .ask(&ctx(), "tic-tac-toe", "How many players?")
        .await
        .unwrap();
    assert_eq!(again, response);
    assert_eq!(h.llm.complete_calls(), 1);
}

#[tokio::test]
async fn test_qa_rejects_empty_inputs() {
    let h = harness();
    assert!(matches!(
        h.qa.ask(&ctx(), "chess", "   ").await,
        Err(AgentError::EmptyQuery)
    ));
    assert!(matches!(
        h.qa.ask(&ctx(), "", "query").await,
        Err(AgentError::EmptyGameId)
    ));
}

#[tokio::test]
async fn test_qa_no_results_for_unindexed_game() {
    let h = harness();
    let err = h.qa.ask(&ctx(), "unknown-game", "how to win?").await.unwrap_err();
    assert!(matches!(err, AgentError::NoResults));

    let log = h.store.last_ai_log().unwrap();
    assert!(!log.success);
}

#[tokio::test]
async fn test_qa_llm_failure_is_reported_not_cached() {
    let h = harness();
    seed_points(&h.vectors, "chess", "doc-1").await;
    h.llm.fail(true);

    let err = h.qa.ask(&ctx(), "chess", "how do pawns move?").await.unwrap_err();
    assert!(matches!(err, AgentError::LlmFailed(_)));

    h.llm.fail(false);
    let response = h.qa.ask(&ctx(), "chess", "how do pawns move?").await.unwrap();
    assert_eq!(h.llm.complete_calls(), 2);
    assert!(!response.answer.is_empty());
}

#[tokio::test]
async fn test_qa_survives_telemetry_outage() {
    let h = harness();
    seed_points(&h.vectors, "chess", "doc-1").await;
    h.store.fail_telemetry(true);

    let response = h.qa.ask(&ctx(), "chess", "how do pawns move?").await;
    assert!(response.is_ok());
}

#[tokio::test]
async fn test_qa_uses_active_prompt_from_registry() {
    let h = harness();
    seed_points(&h.vectors, "chess", "doc-1").await;

    let store: Arc<dyn crate::store::PromptStore> = h.store.clone();
    store
        .create_template(crate::store::NewTemplate {
            name: "qa-system-prompt".to_string(),
            description: None,
            category: Some("qa".to_string()),
            content: "Custom rules lawyer prompt.".to_string(),
            metadata: None,
            actor: "admin".to_string(),
        })
        .await
        .unwrap();

    h.qa.ask(&ctx(), "chess", "how do pawns move?").await.unwrap();
    assert_eq!(h.llm.last_system(), "Custom rules lawyer prompt.");
    assert!(h.llm.last_user().contains("Context:"));
    assert!(h.llm.last_user().contains("Question: how do pawns move?"));
}

// --- Streaming QA ---

#[tokio::test]
async fn test_stream_cache_hit_tokenizes_by_word() {
    let h = harness();
    let key = qa_key("tic-tac-toe", "How many players?");
    let cached = QaResponse {
        answer: "Two players.".to_string(),
        snippets: vec![Snippet {
            text: "Two players.".to_string(),
            source: "PDF:p1".to_string(),
            page: 1,
            line: 0,
        }],
        prompt_tokens: 0,
        completion_tokens: 2,
        total_tokens: 2,
        confidence: 0.95,
    };
    h.cache.set(&key, &cached, None, &[]).await;

    let rx = h.stream.stream(
        ctx(),
        "tic-tac-toe".to_string(),
        "How many players?".to_string(),
    );
    let events = collect(rx).await;

    assert_eq!(
        event_names(&events),
        vec![
            "state_update",
            "state_update",
            "citations",
            "token",
            "token",
            "complete"
        ]
    );
    assert_eq!(
        events[0],
        QaStreamEvent::StateUpdate {
            state: "checking cache".to_string()
        }
    );
    assert_eq!(
        events[1],
        QaStreamEvent::StateUpdate {
            state: "cache hit".to_string()
        }
    );
    assert!(matches!(
        &events[2],
        QaStreamEvent::Citations { citations } if citations.len() == 1
    ));
    assert_eq!(
        events[3],
        QaStreamEvent::Token {
            token: "Two ".to_string()
        }
    );
    assert_eq!(
        events[4],
        QaStreamEvent::Token {
            token: "players.".to_string()
        }
    );
    match &events[5] {
        QaStreamEvent::Complete(payload) => {
            assert_eq!(payload.prompt_tokens, 0);
            assert_eq!(payload.completion_tokens, 2);
            assert_eq!(payload.total_tokens, 2);
            assert!((payload.confidence - 0.95).abs() < f64::EPSILON);
        }
        other => panic!("expected complete, got {other:?}"),
    }

    assert_eq!(h.embeddings.calls(), 0);
    assert_eq!(h.llm.stream_calls(), 0);
}

#[tokio::test]
async fn test_stream_empty_query_is_single_error_event() {
    let h = harness();
    let rx = h
        .stream
        .stream(ctx(), "x".to_string(), "   ".to_string());
    let events = collect(rx).await;

    assert_eq!(events.len(), 1);
    match &events[0] {
        QaStreamEvent::Error { code, .. } => assert_eq!(*code, "EMPTY_QUERY"),
        other => panic!("expected error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_stream_miss_event_ordering_and_token_count() {
    let h = harness();
    seed_points(&h.vectors, "chess", "doc-1").await;
    h.llm.set_answer("Pawns move forward one square.");

    let rx = h.stream.stream(
        ctx(),
        "chess".to_string(),
        "how do pawns move?".to_string(),
    );
    let events = collect(rx).await;

    assert_eq!(
        event_names(&events),
        vec![
            "state_update", // checking cache
            "state_update", // generating embeddings
            "state_update", // searching vector database
            "citations",
            "state_update", // generating answer
            "token",
            "token",
            "token",
            "token",
            "token",
            "complete"
        ]
    );

    let token_count = events
        .iter()
        .filter(|e| matches!(e, QaStreamEvent::Token { .. }))
        .count() as i64;
    match events.last().unwrap() {
        QaStreamEvent::Complete(payload) => {
            assert_eq!(payload.completion_tokens, token_count);
            assert_eq!(payload.prompt_tokens, 0);
            assert_eq!(payload.total_tokens, token_count);
        }
        other => panic!("expected complete, got {other:?}"),
    }

    // The reassembled answer was written back to cache.
    let cached: Option<QaResponse> = h
        .cache
        .get(&qa_key("chess", "how do pawns move?"))
        .await;
    let cached = cached.expect("stream result cached");
    assert_eq!(cached.answer, "Pawns move forward one square.");

    let log = h.store.last_ai_log().unwrap();
    assert_eq!(log.endpoint, AiEndpoint::QaStream);
    assert!(!log.from_cache);
}

#[tokio::test]
async fn test_stream_no_results_emits_error_and_skips_cache() {
    let h = harness();
    let rx = h.stream.stream(
        ctx(),
        "unindexed".to_string(),
        "anything?".to_string(),
    );
    let events = collect(rx).await;

    match events.last().unwrap() {
        QaStreamEvent::Error { code, .. } => assert_eq!(*code, "NO_RESULTS"),
        other => panic!("expected error, got {other:?}"),
    }
    assert!(!events.iter().any(|e| matches!(e, QaStreamEvent::Complete(_))));

    let cached: Option<QaResponse> = h.cache.get(&qa_key("unindexed", "anything?")).await;
    assert!(cached.is_none());
}

#[tokio::test]
async fn test_stream_llm_failure_emits_error_without_complete() {
    let h = harness();
    seed_points(&h.vectors, "chess", "doc-1").await;
    h.llm.fail(true);

    let rx = h
        .stream
        .stream(ctx(), "chess".to_string(), "query".to_string());
    let events = collect(rx).await;

    match events.last().unwrap() {
        QaStreamEvent::Error { code, .. } => assert_eq!(*code, "LLM_FAILED"),
        other => panic!("expected error, got {other:?}"),
    }
    assert!(!events.iter().any(|e| matches!(e, QaStreamEvent::Complete(_))));
}

#[tokio::test]
async fn test_stream_cancellation_stops_emission_and_cache_write() {
    let h = harness();
    seed_points(&h.vectors, "chess", "doc-1").await;

    let request_ctx = ctx();
    request_ctx.cancel();

    let rx = h.stream.stream(
        request_ctx,
        "chess".to_string(),
        "how do pawns move?".to_string(),
    );
    let events = collect(rx).await;

    // Cancelled before the first yield point: nothing is emitted and
    // nothing is cached.
    assert!(events.is_empty());
    let cached: Option<QaResponse> = h
        .cache
        .get(&qa_key("chess", "how do pawns move?"))
        .await;
    assert!(cached.is_none());
}

#[tokio::test]
async fn test_stream_dropped_receiver_skips_cache_write() {
    let h = harness();
    seed_points(&h.vectors, "chess", "doc-1").await;

    // On the current-thread test runtime the producer task has not run
    // yet when the receiver is dropped, so its very first send fails.
    let rx = h.stream.stream(
        ctx(),
        "chess".to_string(),
        "how do pawns move?".to_string(),
    );
    drop(rx);

    tokio::time::sleep(Duration::from_millis(50)).await;

    let cached: Option<QaResponse> = h
        .cache
        .get(&qa_key("chess", "how do pawns move?"))
        .await;
    assert!(cached.is_none());
}

#[tokio::test]
async fn test_stream_mid_generation_cancel_skips_cache_write() {
    let h = harness();
    seed_points(&h.vectors, "chess", "doc-1").await;
    h.llm.set_token_delay(Duration::from_millis(100));

    let request_ctx = ctx();
    let cancel_handle = request_ctx.clone();
    let mut rx = h.stream.stream(
        request_ctx,
        "chess".to_string(),
        "how do pawns move?".to_string(),
    );

    // Read up to the citations event, then cancel mid-token-stream.
    while let Some(event) = rx.recv().await {
        if matches!(event, QaStreamEvent::Citations { .. }) {
            break;
        }
    }
    cancel_handle.cancel();

    let rest = collect(rx).await;
    assert!(!rest.iter().any(|e| matches!(e, QaStreamEvent::Complete(_))));

    let cached: Option<QaResponse> = h
        .cache
        .get(&qa_key("chess", "how do pawns move?"))
        .await;
    assert!(cached.is_none());
}

// --- Explain / setup ---

#[tokio::test]
async fn test_explain_produces_outline_and_caches() {
    let h = harness();
    seed_points(&h.vectors, "chess", "doc-1").await;
    h.llm.set_answer(
        "1. What castling is\n- Move king two squares\n- Rook jumps over\n2. Requirements\n- Neither piece has moved\n- No pieces between them\n",
    );

    let outline = h.explain.explain(&ctx(), "chess", "castling").await.unwrap();

    assert_eq!(outline.main_topic, "castling");
    assert_eq!(outline.sections.len(), 2);
    assert_eq!(outline.sections[0].title, "What castling is");
    assert_eq!(outline.sections[0].bullets.len(), 2);
    assert!(!outline.snippets.is_empty());

    // Cached on the explain key: a second call skips the LLM.
    h.explain.explain(&ctx(), "chess", "castling").await.unwrap();
    assert_eq!(h.llm.complete_calls(), 1);
}

#[tokio::test]
async fn test_explain_rejects_empty_topic() {
    let h = harness();
    assert!(matches!(
        h.explain.explain(&ctx(), "chess", "  ").await,
        Err(AgentError::EmptyQuery)
    ));
}

#[tokio::test]
async fn test_setup_guide_uses_game_name() {
    let h = harness();
    h.store
        .ensure_game(&Game {
            id: "tic-tac-toe".to_string(),
            name: "Tic-Tac-Toe".to_string(),
        })
        .await
        .unwrap();
    seed_points(&h.vectors, "tic-tac-toe", "doc-1").await;
    h.llm
        .set_answer("Setup:\n- Draw a 3x3 grid\n- Decide who plays X\n");

    let outline = h.explain.setup_guide(&ctx(), "tic-tac-toe").await.unwrap();

    assert_eq!(outline.main_topic, "Tic-Tac-Toe setup");
    assert_eq!(outline.sections.len(), 1);
    assert_eq!(outline.sections[0].bullets.len(), 2);

    let log = h.store.last_ai_log().unwrap();
    assert_eq!(log.endpoint, AiEndpoint::Setup);
}

#[test]
fn test_parse_outline_fallback_for_prose() {
    let sections = explain::parse_outline("Just a plain paragraph with no structure");
    assert_eq!(sections.len(), 1);
    assert_eq!(sections[0].title, "Overview");
    assert_eq!(sections[0].bullets.len(), 1);
}

#[test]
fn test_parse_outline_markdown_headings() {
    let sections = explain::parse_outline("## Opening\n- e4 e5\n## Endgame\n- King activity\n");
    assert_eq!(sections.len(), 2);
    assert_eq!(sections[0].title, "Opening");
    assert_eq!(sections[1].title, "Endgame");
}

// --- Feedback ---

#[tokio::test]
async fn test_feedback_upsert_and_clear() {
    let h = harness();
    let service = FeedbackService::new(h.store.clone());
    let request_ctx = ctx();

    service
        .record(
            &request_ctx,
            "msg-1",
            "qa",
            "chess",
            Some(FeedbackOutcome::Helpful),
        )
        .await
        .unwrap();
    assert_eq!(
        h.store.feedback_row("msg-1", "qa", "user-1"),
        Some(FeedbackOutcome::Helpful)
    );

    // Same triple overwrites instead of duplicating.
    service
        .record(
            &request_ctx,
            "msg-1",
            "qa",
            "chess",
            Some(FeedbackOutcome::NotHelpful),
        )
        .await
        .unwrap();
    let stats = service.stats(Some("chess")).await.unwrap();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.by_endpoint["qa"]["not-helpful"], 1);

    // A null outcome removes the row.
    service
        .record(&request_ctx, "msg-1", "qa", "chess", None)
        .await
        .unwrap();
    assert_eq!(h.store.feedback_row("msg-1", "qa", "user-1"), None);
}

// --- Shared helpers ---

#[test]
fn test_build_user_prompt_numbers_snippets() {
    let snippets = vec![
        Snippet {
            text: "First rule.".to_string(),
            source: "PDF:doc-1".to_string(),
            page: 1,
            line: 0,
        },
        Snippet {
            text: "Second rule.".to_string(),
            source: "PDF:doc-1".to_string(),
            page: 2,
            line: 0,
        },
    ];
    let prompt = build_user_prompt(&snippets, "how to win?");

    assert!(prompt.starts_with("Context:\n"));
    assert!(prompt.contains("1. [PDF:doc-1 p.1] First rule."));
    assert!(prompt.contains("2. [PDF:doc-1 p.2] Second rule."));
    assert!(prompt.ends_with("Question: how to win?"));
}

#[test]
fn test_error_codes_are_stable() {
    assert_eq!(AgentError::EmptyQuery.code(), "EMPTY_QUERY");
    assert_eq!(
        AgentError::EmbeddingFailed("x".to_string()).code(),
        "EMBEDDING_FAILED"
    );
    assert_eq!(AgentError::NoResults.code(), "NO_RESULTS");
    assert_eq!(AgentError::LlmFailed("x".to_string()).code(), "LLM_FAILED");
}

#[test]
fn test_event_payload_shapes() {
    let citations = QaStreamEvent::Citations {
        citations: vec![Snippet {
            text: "Two players.".to_string(),
            source: "PDF:p1".to_string(),
            page: 1,
            line: 0,
        }],
    };
    assert_eq!(citations.event_name(), "citations");
    assert_eq!(
        citations.json_payload(),
        r#"{"citations":[{"text":"Two players.","source":"PDF:p1","page":1,"line":0}]}"#
    );

    let error = QaStreamEvent::Error {
        code: "EMPTY_QUERY",
        message: "query must not be empty".to_string(),
    };
    let payload: serde_json::Value = serde_json::from_str(&error.json_payload()).unwrap();
    assert_eq!(payload["errorCode"], "EMPTY_QUERY");
}
