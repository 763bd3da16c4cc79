use super::*;

#[test]
fn test_transient_classification() {
    assert!(EmbeddingError::Transport("timeout".to_string()).is_transient());
    assert!(
        EmbeddingError::Api {
            status: 503,
            message: "unavailable".to_string()
        }
        .is_transient()
    );
    assert!(
        EmbeddingError::Api {
            status: 429,
            message: "rate limited".to_string()
        }
        .is_transient()
    );
    assert!(
        !EmbeddingError::Api {
            status: 400,
            message: "bad request".to_string()
        }
        .is_transient()
    );
    assert!(
        !EmbeddingError::CountMismatch {
            expected: 2,
            actual: 1
        }
        .is_transient()
    );
}

#[tokio::test]
async fn test_mock_empty_batch_skips_provider() {
    let client = MockEmbeddingClient::new(4);
    let vectors = client.embed_batch(&[]).await.unwrap();
    assert!(vectors.is_empty());
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn test_mock_preserves_order_and_dimension() {
    let client = MockEmbeddingClient::new(16);
    let texts = vec![
        "pawns move forward".to_string(),
        "rooks move straight".to_string(),
        "pawns move forward".to_string(),
    ];

    let vectors = client.embed_batch(&texts).await.unwrap();
    assert_eq!(vectors.len(), 3);
    assert!(vectors.iter().all(|v| v.len() == 16));
    assert_eq!(vectors[0], vectors[2]);
    assert_ne!(vectors[0], vectors[1]);
}

#[tokio::test]
async fn test_mock_transient_failure() {
    let client = MockEmbeddingClient::new(4);
    client.fail_transient(true);
    let err = client.embed_one("text").await.unwrap_err();
    assert!(err.is_transient());
}

#[test]
fn test_http_client_requires_api_key() {
    let config = crate::config::EmbeddingConfig::default();
    let result = HttpEmbeddingClient::new(&config, "   ");
    assert!(matches!(result, Err(EmbeddingError::NotConfigured(_))));
}
