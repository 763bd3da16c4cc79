//! # MeepleAI RAG Server
//!
//! Retrieval-augmented answers over board-game rulebooks.
//!
//! The server sits between uploaded rulebook PDFs and the players asking
//! about them:
//!
//! ```text
//! PDF text → Chunker → Embeddings → Qdrant
//! Question → Cache → Embeddings → Qdrant → LLM → Answer (+ citations)
//! ```
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use meepleai::config::Config;
//!
//! # fn run() -> anyhow::Result<()> {
//! let config = Config::from_env()?;
//! println!("Listening on {}", config.socket_addr());
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature flags
//!
//! | Feature | Purpose |
//! |---------|---------|
//! | `mock` | In-memory fakes for tests/examples |
//!
//! ## Modules
//!
//! - [`chunker`] - Deterministic text windowing
//! - [`embedding`] / [`llm`] - Outbound provider clients
//! - [`vectordb`] - Qdrant adapter with game/document scoping
//! - [`store`] - Relational persistence (documents, prompts, telemetry)
//! - [`cache`] - Response cache with tag/pattern invalidation
//! - [`prompts`] - Versioned prompt registry
//! - [`indexer`] - Ingestion pipeline with status tracking
//! - [`agents`] - QA (sync + streaming), explain/setup, feedback
//! - [`gateway`] - Axum HTTP surface under `/api/v1`

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod agents;
pub mod cache;
pub mod chunker;
pub mod config;
pub mod context;
pub mod embedding;
pub mod extract;
pub mod gateway;
pub mod hashing;
pub mod indexer;
pub mod llm;
pub mod prompts;
pub mod store;
pub mod vectordb;

pub use agents::{
    AgentError, ExplainEngine, FeedbackService, OutlineResponse, QaEngine, QaResponse,
    QaStreamEvent, Snippet, StreamingQaEngine,
};
pub use cache::{KvError, KvStore, MemoryKv, ResponseCache};
pub use chunker::{Chunk, TextChunker};
pub use config::{Config, ConfigError};
pub use context::{Caller, RequestContext, Role};
#[cfg(any(test, feature = "mock"))]
pub use embedding::MockEmbeddingClient;
pub use embedding::{EmbeddingClient, EmbeddingError, HttpEmbeddingClient};
pub use extract::{ExtractedText, PlainTextExtractor, TextExtractor};
pub use gateway::{AppState, create_router_with_state};
pub use hashing::{question_hash, sha256_hex};
pub use indexer::{IndexOutcome, Indexer, IndexerError};
#[cfg(any(test, feature = "mock"))]
pub use llm::MockLlmClient;
pub use llm::{Completion, HttpLlmClient, LlmClient, LlmError};
pub use prompts::{PromptError, PromptRegistry};
#[cfg(any(test, feature = "mock"))]
pub use store::MemoryStore;
pub use store::{DocumentStore, PgStore, PromptStore, StoreError, TelemetryStore};
#[cfg(any(test, feature = "mock"))]
pub use vectordb::MockVectorStore;
pub use vectordb::{QdrantVectorStore, VectorStore, VectorStoreError};
