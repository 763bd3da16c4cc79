use super::*;
use serial_test::serial;
use std::env;
use std::net::IpAddr;

fn with_env_vars<F, R>(vars: &[(&str, &str)], f: F) -> R
where
    F: FnOnce() -> R,
{
    // SAFETY: Test code only, we accept the thread-safety risk in tests.
    for (key, value) in vars {
        unsafe { env::set_var(key, value) };
    }

    let result = f();

    // SAFETY: Test code only, we accept the thread-safety risk in tests.
    for (key, _) in vars {
        unsafe { env::remove_var(key) };
    }

    result
}

fn clear_meeple_env() {
    // SAFETY: Test code only, we accept the thread-safety risk in tests.
    unsafe {
        for var in [
            "MEEPLE_PORT",
            "MEEPLE_BIND_ADDR",
            "MEEPLE_DATABASE_URL",
            "MEEPLE_QDRANT_URL",
            "MEEPLE_COLLECTION_NAME",
            "MEEPLE_API_KEY",
            "MEEPLE_EMBEDDING_BASE_URL",
            "MEEPLE_EMBEDDING_MODEL",
            "MEEPLE_EMBEDDING_DIMENSIONS",
            "MEEPLE_EMBEDDING_TIMEOUT_SECS",
            "MEEPLE_LLM_BASE_URL",
            "MEEPLE_LLM_MODEL",
            "MEEPLE_LLM_TIMEOUT_SECS",
            "MEEPLE_LLM_IDLE_TIMEOUT_SECS",
            "MEEPLE_CHUNK_SIZE",
            "MEEPLE_CHUNK_OVERLAP",
            "MEEPLE_CHARS_PER_PAGE",
            "MEEPLE_INDEXER_MAX_WORKERS",
            "MEEPLE_CACHE_TTL_SECS",
            "MEEPLE_PROMPT_CACHE_TTL_SECS",
            "MEEPLE_MAX_PROMPT_SIZE_BYTES",
            "MEEPLE_WARM_PROMPTS",
            "MEEPLE_VECTOR_TIMEOUT_SECS",
        ] {
            env::remove_var(var);
        }
    }
}

#[test]
fn test_default_config() {
    let config = Config::default();

    assert_eq!(config.port, 8080);
    assert_eq!(
        config.bind_addr,
        IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1))
    );
    assert_eq!(config.qdrant_url, "http://localhost:6334");
    assert_eq!(config.collection_name, "meepleai_documents");
    assert_eq!(config.embedding.model, "openai/text-embedding-3-small");
    assert_eq!(config.embedding.dimensions, 1536);
    assert_eq!(config.chunker.chunk_size, 512);
    assert_eq!(config.chunker.overlap, 50);
    assert_eq!(config.chunker.chars_per_page, 3_000);
    assert_eq!(config.indexer_max_workers, 4);
    assert_eq!(config.cache.default_ttl_secs, 86_400);
    assert_eq!(config.cache.prompt_ttl_secs, 3_600);
    assert_eq!(config.prompts.max_size_bytes, 16_384);
    assert_eq!(config.prompts.warm_on_startup.len(), 3);
    assert_eq!(config.vector_timeout_secs, 5);
}

#[test]
fn test_socket_addr() {
    let config = Config::default();
    assert_eq!(config.socket_addr(), "127.0.0.1:8080");

    let config = Config {
        port: 3000,
        bind_addr: IpAddr::V4(std::net::Ipv4Addr::new(0, 0, 0, 0)),
        ..Default::default()
    };
    assert_eq!(config.socket_addr(), "0.0.0.0:3000");
}

#[test]
#[serial]
fn test_from_env_with_defaults() {
    clear_meeple_env();

    let config = Config::from_env().expect("should parse with defaults");

    assert_eq!(config.port, 8080);
    assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
    assert_eq!(config.collection_name, DEFAULT_COLLECTION_NAME);
}

#[test]
#[serial]
fn test_from_env_overrides() {
    clear_meeple_env();

    let config = with_env_vars(
        &[
            ("MEEPLE_PORT", "9999"),
            ("MEEPLE_COLLECTION_NAME", "rules_test"),
            ("MEEPLE_CHUNK_SIZE", "256"),
            ("MEEPLE_CHUNK_OVERLAP", "32"),
            ("MEEPLE_WARM_PROMPTS", "qa-system-prompt, custom-prompt"),
        ],
        || Config::from_env().expect("should parse overrides"),
    );

    assert_eq!(config.port, 9999);
    assert_eq!(config.collection_name, "rules_test");
    assert_eq!(config.chunker.chunk_size, 256);
    assert_eq!(config.chunker.overlap, 32);
    assert_eq!(
        config.prompts.warm_on_startup,
        vec!["qa-system-prompt".to_string(), "custom-prompt".to_string()]
    );
}

#[test]
#[serial]
fn test_from_env_rejects_zero_port() {
    clear_meeple_env();

    let result = with_env_vars(&[("MEEPLE_PORT", "0")], Config::from_env);
    assert!(matches!(result, Err(ConfigError::InvalidPort { .. })));
}

#[test]
#[serial]
fn test_from_env_rejects_bad_number() {
    clear_meeple_env();

    let result = with_env_vars(&[("MEEPLE_CHUNK_SIZE", "not-a-number")], Config::from_env);
    assert!(matches!(result, Err(ConfigError::InvalidNumber { .. })));
}

#[test]
#[serial]
fn test_from_env_rejects_overlap_not_smaller_than_chunk() {
    clear_meeple_env();

    let result = with_env_vars(
        &[("MEEPLE_CHUNK_SIZE", "100"), ("MEEPLE_CHUNK_OVERLAP", "100")],
        Config::from_env,
    );
    assert!(matches!(result, Err(ConfigError::InvalidChunking { .. })));
}

#[test]
fn test_validate_rejects_zero_dimensions() {
    let config = Config {
        embedding: EmbeddingConfig {
            dimensions: 0,
            ..Default::default()
        },
        ..Default::default()
    };
    assert!(matches!(
        config.validate(),
        Err(ConfigError::MustBePositive { .. })
    ));
}
