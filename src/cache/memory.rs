//! In-process KV backend.
//!
//! Values live in a moka cache with per-entry TTLs; tag sets live in a
//! plain map because they must not expire underneath their members.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::sync::Cache;
use parking_lot::RwLock;

use super::error::KvError;
use super::kv::{KvStore, key_matches};

const DEFAULT_CAPACITY: u64 = 100_000;

#[derive(Clone)]
struct Entry {
    value: String,
    ttl: Duration,
}

struct PerEntryTtl;

impl moka::Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &Entry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// Moka-backed [`KvStore`].
pub struct MemoryKv {
    entries: Cache<String, Entry>,
    sets: RwLock<HashMap<String, HashSet<String>>>,
    fail: AtomicBool,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a backend with a max entry capacity (LRU eviction).
    pub fn with_capacity(capacity: u64) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(capacity)
                .expire_after(PerEntryTtl)
                .build(),
            sets: RwLock::new(HashMap::new()),
            fail: AtomicBool::new(false),
        }
    }

    /// Makes every subsequent operation fail, for fail-open tests.
    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn guard(&self) -> Result<(), KvError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(KvError::Backend("backend unavailable".to_string()));
        }
        Ok(())
    }
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        self.guard()?;
        Ok(self.entries.get(key).map(|e| e.value))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), KvError> {
        self.guard()?;
        self.entries.insert(key.to_string(), Entry { value, ttl });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, KvError> {
        self.guard()?;
        Ok(self.entries.remove(key).is_some())
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, KvError> {
        self.guard()?;
        Ok(self
            .entries
            .iter()
            .filter(|(k, _)| key_matches(k, pattern))
            .map(|(k, _)| k.as_ref().clone())
            .collect())
    }

    async fn set_add(&self, set_key: &str, member: &str) -> Result<(), KvError> {
        self.guard()?;
        self.sets
            .write()
            .entry(set_key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn set_members(&self, set_key: &str) -> Result<Vec<String>, KvError> {
        self.guard()?;
        Ok(self
            .sets
            .read()
            .get(set_key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn delete_set(&self, set_key: &str) -> Result<(), KvError> {
        self.guard()?;
        self.sets.write().remove(set_key);
        Ok(())
    }

    async fn key_count(&self) -> Result<u64, KvError> {
        self.guard()?;
        self.entries.run_pending_tasks();
        Ok(self.entries.entry_count())
    }

    async fn total_bytes(&self) -> Result<u64, KvError> {
        self.guard()?;
        Ok(self
            .entries
            .iter()
            .map(|(k, e)| (k.len() + e.value.len()) as u64)
            .sum())
    }
}
