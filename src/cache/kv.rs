//! KV backend interface.
//!
//! The response cache and the prompt registry sit on this trait rather
//! than a concrete backend. The backend holds only derived data: cached
//! responses, their metadata companions, tag-index sets, and warm prompt
//! copies. Values are JSON strings.

use std::time::Duration;

use async_trait::async_trait;

use super::error::KvError;

/// Minimal key/value surface with TTLs, wildcard scans, and sets.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Fetches a value; expired entries read as absent.
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    /// Writes a value with a per-entry TTL.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), KvError>;

    /// Deletes a key; returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, KvError>;

    /// Lists keys matching a `*`-wildcard pattern. O(keys in backend).
    async fn scan(&self, pattern: &str) -> Result<Vec<String>, KvError>;

    /// Adds a member to a set. Sets do not expire.
    async fn set_add(&self, set_key: &str, member: &str) -> Result<(), KvError>;

    /// Lists a set's members; absent sets read as empty.
    async fn set_members(&self, set_key: &str) -> Result<Vec<String>, KvError>;

    /// Drops a whole set.
    async fn delete_set(&self, set_key: &str) -> Result<(), KvError>;

    /// Best-effort count of live value keys.
    async fn key_count(&self) -> Result<u64, KvError>;

    /// Best-effort total size of live values in bytes.
    async fn total_bytes(&self) -> Result<u64, KvError>;
}

/// Matches a key against a pattern where `*` spans any run of characters.
pub fn key_matches(key: &str, pattern: &str) -> bool {
    fn matches(key: &[u8], pattern: &[u8]) -> bool {
        match pattern.first() {
            None => key.is_empty(),
            Some(b'*') => {
                // Try consuming zero or more key bytes.
                (0..=key.len()).any(|skip| matches(&key[skip..], &pattern[1..]))
            }
            Some(&c) => key.first() == Some(&c) && matches(&key[1..], &pattern[1..]),
        }
    }
    matches(key.as_bytes(), pattern.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::key_matches;

    #[test]
    fn test_key_matches_literal() {
        assert!(key_matches("ai:setup:chess", "ai:setup:chess"));
        assert!(!key_matches("ai:setup:chess", "ai:setup:go"));
    }

    #[test]
    fn test_key_matches_trailing_star() {
        assert!(key_matches("ai:qa:chess:abc123", "ai:qa:chess:*"));
        assert!(key_matches("ai:qa:chess:", "ai:qa:chess:*"));
        assert!(!key_matches("ai:qa:go:abc123", "ai:qa:chess:*"));
    }

    #[test]
    fn test_key_matches_inner_star() {
        assert!(key_matches("tag:game:chess", "tag:*:chess"));
        assert!(!key_matches("tag:game:go", "tag:*:chess"));
    }

    #[test]
    fn test_key_matches_star_spans_empty() {
        assert!(key_matches("ai:setup:chess", "ai:setup:chess*"));
        assert!(key_matches("ai:setup:chess:meta", "ai:setup:chess*"));
    }
}
