//! Memory Store Module
//!
//! Process-local, byte-bounded tier with least-recently-used eviction.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::clock::{system_clock, SharedClock};
use crate::cache::entry::{calculate_size, expiry_from, is_expired_at};
use crate::cache::lock::mutex_lock;
use crate::cache::{CacheItem, EntryMeta, LruTracker, Store, StoreStatistics};

const SOURCE: &str = "cache::memory";

// == Memory State ==
#[derive(Debug, Default)]
struct MemoryState {
    /// Key-value storage
    values: HashMap<String, Value>,
    /// Per-key accounting, parallel to `values`
    meta: HashMap<String, EntryMeta>,
    /// LRU access tracker
    lru: LruTracker,
    /// Sum of `meta[*].size`
    current_size: usize,
    /// Cumulative, survives removal of the entries that earned it
    hits: u64,
    misses: u64,
    evictions: u64,
    expired: u64,
}

impl MemoryState {
    fn remove(&mut self, key: &str) -> bool {
        self.lru.remove(key);
        self.values.remove(key);
        match self.meta.remove(key) {
            Some(meta) => {
                self.current_size -= meta.size;
                true
            }
            None => false,
        }
    }

    fn evict_oldest(&mut self) -> Option<String> {
        let key = self.lru.evict_oldest()?;
        self.values.remove(&key);
        if let Some(meta) = self.meta.remove(&key) {
            self.current_size -= meta.size;
        }
        self.evictions += 1;
        Some(key)
    }
}

// == Memory Store ==
/// In-memory store bounded by `max_size` bytes.
///
/// Sizes are estimated from each value's JSON encoding. After every `set`
/// the accounted size is at most `max_size`; the least recently read or
/// written keys are evicted first to make room.
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    /// Capacity in bytes
    max_size: usize,
    clock: SharedClock,
}

impl MemoryStore {
    // == Constructor ==
    /// Creates a store holding at most `max_size` bytes.
    pub fn new(max_size: usize) -> Self {
        Self::with_clock(max_size, system_clock())
    }

    /// Creates a store reading time from `clock`.
    pub fn with_clock(max_size: usize, clock: SharedClock) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            max_size,
            clock,
        }
    }

    /// Capacity in bytes.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Bytes currently accounted to entries.
    pub fn current_size(&self) -> usize {
        mutex_lock(&self.state, SOURCE, "current_size").current_size
    }

    /// Number of entries, including expired ones not yet discovered.
    pub fn len(&self) -> usize {
        mutex_lock(&self.state, SOURCE, "len").values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Last recorded access time of `key`, if present.
    pub fn last_access(&self, key: &str) -> Option<chrono::DateTime<chrono::Utc>> {
        mutex_lock(&self.state, SOURCE, "last_access")
            .meta
            .get(key)
            .map(|meta| meta.last_access)
    }

    // == Purge Expired ==
    /// Removes all expired entries.
    ///
    /// Returns the number of entries removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut state = mutex_lock(&self.state, SOURCE, "purge_expired");

        let expired_keys: Vec<String> = state
            .meta
            .iter()
            .filter(|(_, meta)| is_expired_at(meta.expires_at, now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired_keys {
            state.remove(key);
        }
        state.expired += expired_keys.len() as u64;
        expired_keys.len()
    }
}

impl Store for MemoryStore {
    fn fetch(&self, key: &str) -> Option<CacheItem> {
        let now = self.clock.now();
        let mut state = mutex_lock(&self.state, SOURCE, "fetch");

        let Some(expires_at) = state.meta.get(key).map(|meta| meta.expires_at) else {
            state.misses += 1;
            return None;
        };

        if is_expired_at(expires_at, now) {
            debug!(key, "Memory entry expired");
            state.remove(key);
            state.expired += 1;
            state.misses += 1;
            return None;
        }

        let value = state.values.get(key).cloned()?;
        if let Some(meta) = state.meta.get_mut(key) {
            meta.hits += 1;
            meta.last_access = now;
        }
        state.hits += 1;
        state.lru.touch(key);

        Some(CacheItem { value, expires_at })
    }

    fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> bool {
        let now = self.clock.now();
        let size = calculate_size(&value);
        let mut state = mutex_lock(&self.state, SOURCE, "set");

        let previous_hits = state.meta.get(key).map(|meta| meta.hits).unwrap_or(0);
        state.remove(key);

        if size > self.max_size {
            warn!(
                key,
                size,
                max_size = self.max_size,
                "Value larger than memory store capacity, not cached"
            );
            return false;
        }

        while state.current_size + size > self.max_size {
            match state.evict_oldest() {
                Some(evicted) => debug!(key = %evicted, "Evicted least recently used entry"),
                None => break,
            }
        }

        state.values.insert(key.to_string(), value);
        state.meta.insert(
            key.to_string(),
            EntryMeta {
                size,
                expires_at: expiry_from(ttl, now),
                hits: previous_hits + 1,
                last_access: now,
            },
        );
        state.current_size += size;
        state.hits += 1;
        state.lru.touch(key);

        true
    }

    fn delete(&self, key: &str) -> bool {
        mutex_lock(&self.state, SOURCE, "delete").remove(key)
    }

    fn has(&self, key: &str) -> bool {
        let now = self.clock.now();
        let mut state = mutex_lock(&self.state, SOURCE, "has");

        let expired = match state.meta.get(key) {
            Some(meta) => is_expired_at(meta.expires_at, now),
            None => return false,
        };

        if expired {
            state.remove(key);
            state.expired += 1;
            return false;
        }
        true
    }

    fn clear(&self) -> bool {
        let mut state = mutex_lock(&self.state, SOURCE, "clear");
        state.values.clear();
        state.meta.clear();
        state.lru.clear();
        state.current_size = 0;
        true
    }

    fn statistics(&self) -> StoreStatistics {
        let state = mutex_lock(&self.state, SOURCE, "statistics");
        StoreStatistics {
            items: state.values.len(),
            current_size: state.current_size,
            max_size: Some(self.max_size),
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
            expired: state.expired,
            ..StoreStatistics::new("memory")
        }
        .with_utilization()
    }

    fn optimize(&self) -> bool {
        let removed = self.purge_expired();
        if removed > 0 {
            debug!(removed, "Memory store purged expired entries");
        }
        true
    }
}
