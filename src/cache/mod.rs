//! Response cache.
//!
//! Layers: a KV backend trait with an in-process moka implementation, the
//! bit-exact key builders, and the response cache proper with tag- and
//! pattern-based invalidation plus persisted hit/miss statistics.

pub mod error;
pub mod keys;
pub mod kv;
pub mod memory;
pub mod response;


pub use error::KvError;
pub use keys::{
    SETUP_QUESTION_HASH, endpoint_pattern, explain_key, game_patterns, game_tag, meta_key,
    prompt_key, qa_key, setup_key, stats_coordinates, tag_set_key,
};
pub use kv::{KvStore, key_matches};
pub use memory::MemoryKv;
pub use response::{CacheReport, ResponseCache};
