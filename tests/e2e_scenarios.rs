//! End-to-end scenarios over the full router with in-memory fakes: the
//! cached Q&A path, streaming tokenization, indexing idempotence, prompt
//! rollback, and scoped deletes.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::json;
use tower::util::ServiceExt;

use common::{body_json, body_text, json_request, rules_text, stack};
use meepleai::agents::{QaResponse, Snippet};
use meepleai::cache::qa_key;
use meepleai::context::{Caller, RequestContext, Role};
use meepleai::hashing::question_hash;
use meepleai::store::{DocumentStore, DocumentStatus, Game, NewDocument};
use meepleai::vectordb::VectorStore;

fn ctx() -> RequestContext {
    RequestContext::new(Caller::new("test-user", Role::Editor))
}

async fn seed_document(
    stack: &common::TestStack,
    game_id: &str,
    text: &str,
) -> String {
    stack
        .store
        .ensure_game(&Game {
            id: game_id.to_string(),
            name: game_id.to_string(),
        })
        .await
        .unwrap();
    stack
        .store
        .create_document(NewDocument {
            game_id: game_id.to_string(),
            file_name: "rules.pdf".to_string(),
            file_size: text.len() as i64,
            uploaded_by: "editor".to_string(),
            status: DocumentStatus::Completed,
            extracted_text: Some(text.to_string()),
            page_count: 1,
            char_count: text.len() as i64,
            extraction_error: None,
        })
        .await
        .unwrap()
        .id
}

fn cached_answer() -> QaResponse {
    QaResponse {
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
    }
}

// S1: a pre-populated cache entry is served verbatim with no provider
// calls.
#[tokio::test]
async fn scenario_cache_hit_serves_exact_payload() {
    let stack = stack();

    let key = format!(
        "ai:qa:tic-tac-toe:{}",
        question_hash("How many players?")
    );
    assert_eq!(key, qa_key("tic-tac-toe", "How many players?"));
    stack.cache.set(&key, &cached_answer(), None, &[]).await;

    let response = stack
        .router
        .clone()
        .oneshot(json_request(
            "/api/v1/agents/qa",
            "user",
            json!({"gameId": "tic-tac-toe", "query": "How many players?"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["answer"], "Two players.");
    assert_eq!(body["promptTokens"], 0);
    assert_eq!(body["completionTokens"], 2);
    assert_eq!(body["totalTokens"], 2);
    assert_eq!(body["confidence"], 0.95);
    assert_eq!(body["snippets"][0]["text"], "Two players.");
    assert_eq!(body["snippets"][0]["source"], "PDF:p1");
    assert_eq!(body["snippets"][0]["page"], 1);
    assert_eq!(body["snippets"][0]["line"], 0);

    assert_eq!(stack.embeddings.calls(), 0);
    assert_eq!(stack.llm.complete_calls(), 0);
}

// S2: the same cache entry, streamed: word tokens with trailing spaces
// and cached usage in `complete`.
#[tokio::test]
async fn scenario_streaming_cache_hit_tokenization() {
    let stack = stack();
    stack
        .cache
        .set(
            &qa_key("tic-tac-toe", "How many players?"),
            &cached_answer(),
            None,
            &[],
        )
        .await;

    let response = stack
        .router
        .clone()
        .oneshot(json_request(
            "/api/v1/agents/qa/stream",
            "user",
            json!({"gameId": "tic-tac-toe", "query": "How many players?"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let text = body_text(response).await;

    let expected_order = [
        "data: {\"state\":\"checking cache\"}",
        "data: {\"state\":\"cache hit\"}",
        "event: citations",
        "data: {\"token\":\"Two \"}",
        "data: {\"token\":\"players.\"}",
        "event: complete",
    ];
    let mut last = 0;
    for needle in expected_order {
        let pos = text[last..]
            .find(needle)
            .unwrap_or_else(|| panic!("missing '{needle}' after byte {last} in:\n{text}"));
        last += pos;
    }

    assert!(text.contains("\"completionTokens\":2"));
    assert!(text.contains("\"promptTokens\":0"));
    assert!(text.contains("\"confidence\":0.95"));
    assert_eq!(stack.llm.stream_calls(), 0);
}

// S3: a whitespace query produces exactly one error event.
#[tokio::test]
async fn scenario_stream_empty_query_single_error() {
    let stack = stack();

    let response = stack
        .router
        .clone()
        .oneshot(json_request(
            "/api/v1/agents/qa/stream",
            "user",
            json!({"gameId": "x", "query": "   "}),
        ))
        .await
        .unwrap();

    let text = body_text(response).await;
    assert_eq!(text.matches("event: ").count(), 1);
    assert!(text.contains("event: error"));
    assert!(text.contains("\"errorCode\":\"EMPTY_QUERY\""));
}

// S4: indexing twice rebuilds the same number of points under the same
// tracking record, moving only the indexed_at timestamp.
#[tokio::test]
async fn scenario_indexer_idempotence() {
    let stack = stack();
    let doc_id = seed_document(&stack, "tic-tac-toe", &rules_text(10_000)).await;

    let first = stack.indexer.index_document(&ctx(), &doc_id).await.unwrap();
    assert!(
        (19..=24).contains(&first.chunk_count),
        "expected ~21 chunks, got {}",
        first.chunk_count
    );
    let record_one = stack
        .store
        .get_vector_document(&doc_id)
        .await
        .unwrap()
        .unwrap();

    let second = stack.indexer.index_document(&ctx(), &doc_id).await.unwrap();
    let record_two = stack
        .store
        .get_vector_document(&doc_id)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(second.chunk_count, first.chunk_count);
    assert_eq!(record_two.id, record_one.id);
    assert_eq!(
        stack.vectors.document_point_count(&doc_id),
        second.chunk_count
    );
    assert!(record_two.indexed_at.unwrap() >= record_one.indexed_at.unwrap());
}

// S4 (HTTP surface): re-index endpoint reports the rebuilt state.
#[tokio::test]
async fn scenario_reindex_endpoint_reports_counts() {
    let stack = stack();
    let doc_id = seed_document(&stack, "chess", &rules_text(5_000)).await;

    let response = stack
        .router
        .clone()
        .oneshot(json_request(
            &format!("/api/v1/ingest/pdf/{doc_id}/index"),
            "editor",
            json!({}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert!(body["chunkCount"].as_u64().unwrap() > 0);
    assert!(body["vectorDocumentId"].is_string());
    assert!(body["indexedAt"].is_string());
}

// A document that never went through extraction is rejected with the
// precondition code.
#[tokio::test]
async fn scenario_reindex_without_text_is_rejected() {
    let stack = stack();
    stack
        .store
        .ensure_game(&Game {
            id: "chess".to_string(),
            name: "chess".to_string(),
        })
        .await
        .unwrap();
    let doc = stack
        .store
        .create_document(NewDocument {
            game_id: "chess".to_string(),
            file_name: "scan.pdf".to_string(),
            file_size: 10,
            uploaded_by: "editor".to_string(),
            status: DocumentStatus::Pending,
            extracted_text: None,
            page_count: 0,
            char_count: 0,
            extraction_error: None,
        })
        .await
        .unwrap();

    let response = stack
        .router
        .clone()
        .oneshot(json_request(
            &format!("/api/v1/ingest/pdf/{}/index", doc.id),
            "editor",
            json!({}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], "TEXT_EXTRACTION_REQUIRED");
}

// S5: version 2 activation, then rollback to version 1, with the audit
// trail recording both moves.
#[tokio::test]
async fn scenario_prompt_activation_rollback() {
    let stack = stack();

    let response = stack
        .router
        .clone()
        .oneshot(json_request(
            "/api/v1/prompts",
            "admin",
            json!({"name": "qa-system-prompt", "category": "qa", "content": "v1"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let created = body_json(response).await;
    let template_id = created["template"]["id"].as_str().unwrap().to_string();
    let v1_id = created["version"]["id"].as_str().unwrap().to_string();

    let response = stack
        .router
        .clone()
        .oneshot(json_request(
            &format!("/api/v1/prompts/{template_id}/versions"),
            "admin",
            json!({"content": "v2", "activateImmediately": true}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let v2 = body_json(response).await;
    assert_eq!(v2["isActive"], true);

    // Two more audit rows beyond the creation pair.
    let response = stack
        .router
        .clone()
        .oneshot(
            Request::get(format!("/api/v1/prompts/{template_id}/audit"))
                .header("x-user-role", "admin")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let audits = body_json(response).await;
    let audit_count_after_v2 = audits.as_array().unwrap().len();
    assert_eq!(audit_count_after_v2, 5); // created, v1, v2 created+activated+deactivated

    assert_eq!(
        stack.prompts.get_active("qa-system-prompt").await.unwrap(),
        Some("v2".to_string())
    );

    // Rollback to v1.
    let response = stack
        .router
        .clone()
        .oneshot(json_request(
            &format!("/api/v1/prompts/{template_id}/versions/{v1_id}/activate"),
            "admin",
            json!({"reason": "Rollback"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = stack
        .router
        .clone()
        .oneshot(
            Request::get(format!("/api/v1/prompts/{template_id}/audit"))
                .header("x-user-role", "admin")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let audits = body_json(response).await;
    let rollback_audit = audits
        .as_array()
        .unwrap()
        .iter()
        .find(|a| {
            a["action"] == "version_activated"
                && a["details"].as_str().is_some_and(|d| d.contains("Rollback"))
        })
        .expect("rollback audit row");
    assert_eq!(rollback_audit["versionId"], v1_id.as_str());

    assert_eq!(
        stack.prompts.get_active("qa-system-prompt").await.unwrap(),
        Some("v1".to_string())
    );

    // Exactly one active version remains.
    let response = stack
        .router
        .clone()
        .oneshot(
            Request::get(format!("/api/v1/prompts/{template_id}/versions"))
                .header("x-user-role", "admin")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let versions = body_json(response).await;
    assert_eq!(
        versions
            .as_array()
            .unwrap()
            .iter()
            .filter(|v| v["isActive"] == true)
            .count(),
        1
    );
}

// S6: deleting one document's points leaves the other game searchable.
#[tokio::test]
async fn scenario_scoped_delete() {
    let stack = stack();
    let d1 = seed_document(&stack, "g1", &rules_text(3_000)).await;
    let d2 = seed_document(&stack, "g2", &rules_text(3_000)).await;

    stack.indexer.index_document(&ctx(), &d1).await.unwrap();
    stack.indexer.index_document(&ctx(), &d2).await.unwrap();

    stack.vectors.delete_document(&d1).await.unwrap();

    let probe = vec![0.3f32; 8];
    assert!(
        stack
            .vectors
            .search("g1", probe.clone(), 5)
            .await
            .unwrap()
            .is_empty()
    );
    let g2_hits = stack.vectors.search("g2", probe, 5).await.unwrap();
    assert!(!g2_hits.is_empty());
    assert!(g2_hits.iter().all(|h| h.game_id == "g2"));
}

// Fresh streaming answers write back to cache, so the next sync ask is a
// hit.
#[tokio::test]
async fn scenario_stream_then_sync_shares_cache() {
    let stack = stack();
    let doc_id = seed_document(&stack, "chess", &rules_text(3_000)).await;
    stack.indexer.index_document(&ctx(), &doc_id).await.unwrap();
    stack.llm.set_answer("Pawns capture diagonally.");

    let response = stack
        .router
        .clone()
        .oneshot(json_request(
            "/api/v1/agents/qa/stream",
            "user",
            json!({"gameId": "chess", "query": "How do pawns capture?"}),
        ))
        .await
        .unwrap();
    let text = body_text(response).await;
    assert!(text.contains("event: complete"));

    let response = stack
        .router
        .clone()
        .oneshot(json_request(
            "/api/v1/agents/qa",
            "user",
            json!({"gameId": "chess", "query": "How do pawns capture?"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["answer"], "Pawns capture diagonally.");

    // The sync engine never called the LLM's complete operation.
    assert_eq!(stack.llm.complete_calls(), 0);
    assert_eq!(stack.llm.stream_calls(), 1);
}
