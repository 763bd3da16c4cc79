//! Response cache over the KV backend.
//!
//! Memoizes endpoint responses under the bit-exact keys from
//! [`super::keys`], maintains tag-index sets for batch invalidation, and
//! persists per-question hit/miss counters in the relational store.
//!
//! Every operation here is fail-open: a broken backend turns reads into
//! misses and writes into no-ops, never into endpoint failures.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use super::keys::{game_patterns, game_tag, meta_key, stats_coordinates, tag_set_key};
use super::kv::KvStore;
use crate::store::{AiEndpoint, TelemetryStore, TopQuestion};

/// Metadata companion stored next to each cached response.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct CacheEntryMeta {
    cached_at: chrono::DateTime<chrono::Utc>,
    ttl_seconds: u64,
}

/// Cache statistics for the admin surface.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheReport {
    pub total_hits: i64,
    pub total_misses: i64,
    pub hit_rate: f64,
    pub top_questions: Vec<TopQuestion>,
    /// Live keys in the backend, best effort.
    pub key_count: u64,
    /// Approximate bytes held by the backend, best effort.
    pub total_bytes: u64,
}

/// Tag- and pattern-invalidated response cache with persisted statistics.
pub struct ResponseCache {
    kv: Arc<dyn KvStore>,
    telemetry: Arc<dyn TelemetryStore>,
    default_ttl: Duration,
}

impl ResponseCache {
    pub fn new(
        kv: Arc<dyn KvStore>,
        telemetry: Arc<dyn TelemetryStore>,
        default_ttl: Duration,
    ) -> Self {
        Self {
            kv,
            telemetry,
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Looks up a cached response. Backend errors and deserialization
    /// failures read as misses. Hit/miss counters are updated as a side
    /// effect, best-effort.
    #[instrument(skip(self), fields(key = key))]
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let outcome = match self.kv.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str::<T>(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("cached payload failed to deserialize, treating as miss: {e}");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("cache backend error on get, treating as miss: {e}");
                None
            }
        };

        if let Some((game_id, question_hash)) = stats_coordinates(key) {
            let result = if outcome.is_some() {
                self.telemetry
                    .record_cache_hit(&game_id, &question_hash)
                    .await
            } else {
                self.telemetry
                    .record_cache_miss(&game_id, &question_hash)
                    .await
            };
            if let Err(e) = result {
                warn!("failed to record cache statistics: {e}");
            }
        }

        outcome
    }

    /// Stores a response under `key` with the given TTL (default when
    /// `None`), registering it under each supplied tag. Best-effort.
    #[instrument(skip(self, value, tags), fields(key = key))]
    pub async fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
        tags: &[String],
    ) {
        let ttl = ttl.unwrap_or(self.default_ttl);

        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("failed to serialize response for caching: {e}");
                return;
            }
        };

        if let Err(e) = self.kv.set(key, raw, ttl).await {
            warn!("cache backend error on set, skipping: {e}");
            return;
        }

        let meta = CacheEntryMeta {
            cached_at: chrono::Utc::now(),
            ttl_seconds: ttl.as_secs(),
        };
        if let Ok(meta_raw) = serde_json::to_string(&meta)
            && let Err(e) = self.kv.set(&meta_key(key), meta_raw, ttl).await
        {
            debug!("failed to write cache metadata companion: {e}");
        }

        for tag in tags {
            if let Err(e) = self.kv.set_add(&tag_set_key(tag), key).await {
                warn!("failed to register cache key under tag '{tag}': {e}");
            }
        }
    }

    /// Deletes every cached response for a game: the three per-endpoint
    /// patterns first, then the game tag set. Returns the number of
    /// removed response keys, best-effort.
    #[instrument(skip(self))]
    pub async fn invalidate_game(&self, game_id: &str) -> u64 {
        let mut removed: HashSet<String> = HashSet::new();

        for pattern in game_patterns(game_id) {
            self.delete_pattern(&pattern, &mut removed).await;
        }

        self.delete_tag(&game_tag(game_id), &mut removed).await;

        debug!(removed = removed.len(), "invalidated game cache");
        removed.len() as u64
    }

    /// Deletes one endpoint's cached responses for a game.
    #[instrument(skip(self))]
    pub async fn invalidate_endpoint(&self, game_id: &str, endpoint: AiEndpoint) -> u64 {
        let mut removed: HashSet<String> = HashSet::new();
        self.delete_pattern(&super::keys::endpoint_pattern(game_id, endpoint), &mut removed)
            .await;
        removed.len() as u64
    }

    /// Deletes every key registered under a tag, plus the tag set itself.
    #[instrument(skip(self))]
    pub async fn invalidate_by_tag(&self, tag: &str) -> u64 {
        let mut removed: HashSet<String> = HashSet::new();
        self.delete_tag(tag, &mut removed).await;
        removed.len() as u64
    }

    /// Scan-and-delete for an arbitrary key pattern. Used when an active
    /// prompt changes: responses generated under the old prompt are stale
    /// across every game.
    #[instrument(skip(self))]
    pub async fn invalidate_pattern(&self, pattern: &str) -> u64 {
        let mut removed: HashSet<String> = HashSet::new();
        self.delete_pattern(pattern, &mut removed).await;
        removed.len() as u64
    }

    /// Aggregated statistics plus backend usage numbers.
    pub async fn report(&self, game_id: Option<&str>) -> CacheReport {
        let aggregate = match self.telemetry.cache_stats(game_id).await {
            Ok(aggregate) => aggregate,
            Err(e) => {
                warn!("failed to aggregate cache statistics: {e}");
                Default::default()
            }
        };

        let key_count = self.kv.key_count().await.unwrap_or(0);
        let total_bytes = self.kv.total_bytes().await.unwrap_or(0);

        CacheReport {
            total_hits: aggregate.total_hits,
            total_misses: aggregate.total_misses,
            hit_rate: aggregate.hit_rate,
            top_questions: aggregate.top_questions,
            key_count,
            total_bytes,
        }
    }

    /// Scan-and-delete for one pattern. O(matching keys).
    async fn delete_pattern(&self, pattern: &str, removed: &mut HashSet<String>) {
        let keys = match self.kv.scan(pattern).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!("cache backend error on scan '{pattern}': {e}");
                return;
            }
        };

        for key in keys {
            self.delete_with_meta(&key, removed).await;
        }
    }

    async fn delete_tag(&self, tag: &str, removed: &mut HashSet<String>) {
        let set_key = tag_set_key(tag);
        let members = match self.kv.set_members(&set_key).await {
            Ok(members) => members,
            Err(e) => {
                warn!("cache backend error reading tag set '{tag}': {e}");
                return;
            }
        };

        for member in members {
            self.delete_with_meta(&member, removed).await;
        }

        if let Err(e) = self.kv.delete_set(&set_key).await {
            warn!("failed to drop tag set '{tag}': {e}");
        }
    }

    async fn delete_with_meta(&self, key: &str, removed: &mut HashSet<String>) {
        if key.ends_with(":meta") {
            let _ = self.kv.delete(key).await;
            return;
        }

        match self.kv.delete(key).await {
            Ok(true) => {
                removed.insert(key.to_string());
            }
            Ok(false) => {}
            Err(e) => warn!("cache backend error deleting '{key}': {e}"),
        }
        let _ = self.kv.delete(&meta_key(key)).await;
    }
}
