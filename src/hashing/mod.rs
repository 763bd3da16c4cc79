//! Question hashing for cache keys.
//!
//! Cache keys embed a SHA-256 hex digest of the normalized question so that
//! trivially different spellings of the same query share one entry.

use sha2::{Digest, Sha256};

/// Lowercases and trims a query before hashing.
///
/// Normalization happens before hashing so `" How many players? "` and
/// `"how many players?"` map to the same cache entry.
#[inline]
pub fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

/// SHA-256 of `data`, as lowercase hex.
#[inline]
pub fn sha256_hex(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(out, "{:02x}", byte);
    }
    out
}

/// Hash of a user question as it appears inside cache keys and statistics
/// rows: `sha256_hex(lowercase(trim(query)))`.
#[inline]
pub fn question_hash(query: &str) -> String {
    sha256_hex(normalize_query(query).as_bytes())
}
