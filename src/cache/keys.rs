//! Cache key construction.
//!
//! Key shapes are part of the external contract (ops scripts and the
//! invalidation endpoints rely on them):
//!
//! ```text
//! ai:qa:<game_id>:<sha256_hex(lowercase_trim(query))>
//! ai:explain:<game_id>:<sha256_hex(lowercase_trim(topic))>
//! ai:setup:<game_id>
//! ```

use crate::hashing::question_hash;
use crate::store::AiEndpoint;

/// Question-hash slot used for keys that carry no free-form question.
pub const SETUP_QUESTION_HASH: &str = "setup";

pub fn qa_key(game_id: &str, query: &str) -> String {
    format!("ai:qa:{game_id}:{}", question_hash(query))
}

pub fn explain_key(game_id: &str, topic: &str) -> String {
    format!("ai:explain:{game_id}:{}", question_hash(topic))
}

pub fn setup_key(game_id: &str) -> String {
    format!("ai:setup:{game_id}")
}

/// Tag grouping all of a game's cached responses.
pub fn game_tag(game_id: &str) -> String {
    format!("game:{game_id}")
}

/// Backend key of the set listing a tag's members.
pub fn tag_set_key(tag: &str) -> String {
    format!("tag:{tag}")
}

/// Key of the warmed copy of a prompt's active version.
pub fn prompt_key(name: &str) -> String {
    format!("prompt:{name}:active")
}

/// Metadata companion written next to each cached response.
pub fn meta_key(key: &str) -> String {
    format!("{key}:meta")
}

/// Scan pattern covering one endpoint's keys for a game.
pub fn endpoint_pattern(game_id: &str, endpoint: AiEndpoint) -> String {
    match endpoint {
        AiEndpoint::Qa | AiEndpoint::QaStream => format!("ai:qa:{game_id}:*"),
        AiEndpoint::Explain => format!("ai:explain:{game_id}:*"),
        AiEndpoint::Setup => format!("ai:setup:{game_id}"),
    }
}

/// The three per-endpoint patterns for a game, in deletion order.
pub fn game_patterns(game_id: &str) -> [String; 3] {
    [
        format!("ai:qa:{game_id}:*"),
        format!("ai:explain:{game_id}:*"),
        format!("ai:setup:{game_id}"),
    ]
}

/// Splits a response key into its (game_id, question_hash) statistics
/// coordinates. Setup keys map to a fixed hash slot.
pub fn stats_coordinates(key: &str) -> Option<(String, String)> {
    let mut parts = key.splitn(4, ':');
    if parts.next() != Some("ai") {
        return None;
    }
    let endpoint = parts.next()?;
    let game_id = parts.next()?;

    match (endpoint, parts.next()) {
        ("setup", None) => Some((game_id.to_string(), SETUP_QUESTION_HASH.to_string())),
        ("qa" | "explain", Some(hash)) if !hash.is_empty() => {
            Some((game_id.to_string(), hash.to_string()))
        }
        _ => None,
    }
}
