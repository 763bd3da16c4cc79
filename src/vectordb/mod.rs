//! Vector store adapter.
//!
//! One Qdrant collection holds every indexed rulebook chunk. Payload
//! indexes on `game_id` and `document_id` make scoped search and scoped
//! delete cheap, and searches never cross a game boundary.

pub mod client;
pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod model;


pub use client::{QdrantVectorStore, VectorStore};
pub use error::VectorStoreError;
#[cfg(any(test, feature = "mock"))]
pub use mock::{MockVectorStore, cosine_similarity};
pub use model::{EmbeddedChunk, SearchHit, point_id, sort_hits};
