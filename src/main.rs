//! MeepleAI HTTP server entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mimalloc::MiMalloc;
use tokio::net::TcpListener;
use tokio::signal;

use meepleai::agents::{ExplainEngine, FeedbackService, QaEngine, StreamingQaEngine};
use meepleai::cache::{MemoryKv, ResponseCache};
use meepleai::chunker::TextChunker;
use meepleai::config::Config;
use meepleai::extract::PlainTextExtractor;
use meepleai::gateway::{AppState, create_router_with_state};
use meepleai::indexer::Indexer;
use meepleai::llm::HttpLlmClient;
use meepleai::prompts::PromptRegistry;
use meepleai::store::PgStore;
use meepleai::vectordb::{QdrantVectorStore, VectorStore};
use meepleai::{HttpEmbeddingClient, embedding, llm, store};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    let addr: SocketAddr = config.socket_addr().parse()?;

    tracing::info!(
        bind_addr = %config.bind_addr,
        port = config.port,
        collection = %config.collection_name,
        "MeepleAI RAG server starting"
    );

    let pg = Arc::new(PgStore::connect(&config.database_url, true).await?);
    let documents: Arc<dyn store::DocumentStore> = pg.clone();
    let prompts_store: Arc<dyn store::PromptStore> = pg.clone();
    let telemetry: Arc<dyn store::TelemetryStore> = pg.clone();

    let kv = Arc::new(MemoryKv::new());

    let vectors: Arc<dyn VectorStore> = Arc::new(
        QdrantVectorStore::new(
            &config.qdrant_url,
            &config.collection_name,
            config.embedding.dimensions as u64,
            config.vector_timeout_secs,
        )
        .await?,
    );
    vectors.ensure_collection().await?;
    tracing::info!("vector collection ready");

    let embeddings: Arc<dyn embedding::EmbeddingClient> = Arc::new(HttpEmbeddingClient::new(
        &config.embedding,
        &config.api_key,
    )?);
    let llm_client: Arc<dyn llm::LlmClient> =
        Arc::new(HttpLlmClient::new(&config.llm, &config.api_key)?);

    let cache = Arc::new(ResponseCache::new(
        kv.clone(),
        telemetry.clone(),
        Duration::from_secs(config.cache.default_ttl_secs),
    ));

    let prompts = Arc::new(PromptRegistry::new(
        prompts_store,
        kv,
        Duration::from_secs(config.cache.prompt_ttl_secs),
        config.prompts.max_size_bytes,
    ));

    tracing::info!("warming critical prompts");
    prompts.warm(&config.prompts.warm_on_startup).await;

    let chunker = TextChunker::new(&config.chunker);

    let indexer = Arc::new(Indexer::new(
        documents.clone(),
        embeddings.clone(),
        vectors.clone(),
        cache.clone(),
        chunker,
        config.indexer_max_workers,
    ));

    let state = AppState {
        qa: Arc::new(QaEngine::new(
            prompts.clone(),
            embeddings.clone(),
            vectors.clone(),
            llm_client.clone(),
            cache.clone(),
            telemetry.clone(),
        )),
        stream: Arc::new(StreamingQaEngine::new(
            prompts.clone(),
            embeddings.clone(),
            vectors.clone(),
            llm_client.clone(),
            cache.clone(),
            telemetry.clone(),
        )),
        explain: Arc::new(ExplainEngine::new(
            prompts.clone(),
            documents.clone(),
            embeddings,
            vectors,
            llm_client,
            cache.clone(),
            telemetry.clone(),
        )),
        feedback: Arc::new(FeedbackService::new(telemetry)),
        indexer,
        prompts,
        cache,
        documents,
        extractor: Arc::new(PlainTextExtractor),
    };

    let app = create_router_with_state(state);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("MeepleAI shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
