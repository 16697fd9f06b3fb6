//! Store Contract Module
//!
//! The uniform key-value operation set every backend implements.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::cache::{CacheItem, StoreStatistics};

// == Store Trait ==
/// A cache backend.
///
/// Implementations synchronize internally, so every method takes `&self`
/// and a store can be shared behind an `Arc<dyn Store>`. Failures never
/// surface as errors here: a broken read is a miss and a broken write
/// returns `false`.
pub trait Store: Send + Sync {
    /// Returns the live item for `key`, or None if absent or expired.
    ///
    /// Discovering an expired entry removes it.
    fn fetch(&self, key: &str) -> Option<CacheItem>;

    /// Stores `value`, replacing any previous entry. `ttl = None` never expires.
    fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> bool;

    /// Removes `key`, returning whether it was present.
    fn delete(&self, key: &str) -> bool;

    /// True iff `key` is present and not expired. Expired entries are removed.
    fn has(&self, key: &str) -> bool;

    /// Removes every entry.
    fn clear(&self) -> bool;

    /// Capacity and traffic snapshot.
    fn statistics(&self) -> StoreStatistics;

    /// Best-effort maintenance pass. Must never lose live entries.
    fn optimize(&self) -> bool {
        true
    }

    /// Returns the stored value, or None if absent or expired.
    fn get(&self, key: &str) -> Option<Value> {
        self.fetch(key).map(|item| item.value)
    }

    /// Returns the stored value, or `default` if absent or expired.
    fn get_or(&self, key: &str, default: Value) -> Value {
        self.get(key).unwrap_or(default)
    }

    /// Looks up every key, substituting `default` for misses.
    fn get_multiple(&self, keys: &[String], default: Value) -> HashMap<String, Value> {
        keys.iter()
            .map(|key| (key.clone(), self.get_or(key, default.clone())))
            .collect()
    }

    /// Stores every pair with the same TTL. No atomicity across the batch.
    fn set_multiple(&self, values: HashMap<String, Value>, ttl: Option<Duration>) -> bool {
        values
            .into_iter()
            .fold(true, |ok, (key, value)| self.set(&key, value, ttl) && ok)
    }

    /// Deletes every key. Returns true once all deletions have been attempted.
    fn delete_multiple(&self, keys: &[String]) -> bool {
        for key in keys {
            self.delete(key);
        }
        true
    }
}

// == Store Extension ==
/// Producer-driven helpers available on every store, including `dyn Store`.
pub trait StoreExt: Store {
    /// Returns the cached value, or runs `producer` once and caches its result.
    ///
    /// There is no single-flight protection here: concurrent misses on the
    /// same key each run their own producer.
    fn remember<F>(&self, key: &str, ttl: Option<Duration>, producer: F) -> Value
    where
        F: FnOnce() -> Value,
    {
        if let Some(value) = self.get(key) {
            return value;
        }

        debug!(key, "Cache miss, running producer");
        let value = producer();
        self.set(key, value.clone(), ttl);
        value
    }

    /// Like [`StoreExt::remember`] for fallible producers.
    ///
    /// A failing producer caches nothing and its error is returned unchanged.
    fn try_remember<F, E>(&self, key: &str, ttl: Option<Duration>, producer: F) -> Result<Value, E>
    where
        F: FnOnce() -> Result<Value, E>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        debug!(key, "Cache miss, running fallible producer");
        let value = producer()?;
        self.set(key, value.clone(), ttl);
        Ok(value)
    }
}

impl<S: Store + ?Sized> StoreExt for S {}
