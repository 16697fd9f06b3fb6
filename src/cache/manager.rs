//! Cache Manager Module
//!
//! Owns the store registry and the invalidation, warming and event plumbing
//! built on top of it. Construct one explicitly and share it (typically in
//! an `Arc`); there is no global instance.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::clock::{system_clock, SharedClock};
use crate::cache::keys::{query_key, response_key, ttl_from_headers, view_key};
use crate::cache::lock::mutex_lock;
use crate::cache::{
    CacheEvent, CacheInvalidator, CacheWarmer, EventDispatcher, FileStore, InvalidationTarget,
    MemoryStore, SingleFlight, Store, StoreExt, StoreStatistics, Tier, TieredStore,
    TracingDispatcher,
};
use crate::config::{CacheConfig, StoreConfig};
use crate::error::{CacheError, Result};

const SOURCE: &str = "cache::manager";

// == Cached Response ==
/// An HTTP response as stored by [`CacheManager::cache_response`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

// == Cache Manager ==
/// Facade over the named stores.
pub struct CacheManager {
    config: CacheConfig,
    /// Stores built so far, by name
    stores: Mutex<HashMap<String, Arc<dyn Store>>>,
    invalidator: CacheInvalidator,
    warmer: CacheWarmer,
    dispatcher: Arc<dyn EventDispatcher>,
    single_flight: SingleFlight,
    clock: SharedClock,
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("config", &self.config)
            .field("built_stores", &self.built_store_names())
            .finish()
    }
}

impl CacheManager {
    // == Constructor ==
    /// Creates a manager; stores are built lazily on first use.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            stores: Mutex::new(HashMap::new()),
            invalidator: CacheInvalidator::new(),
            warmer: CacheWarmer::new(),
            dispatcher: Arc::new(TracingDispatcher),
            single_flight: SingleFlight::new(),
            clock: system_clock(),
        }
    }

    /// Sends lifecycle events to `dispatcher` instead of the log.
    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn EventDispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Uses `clock` for every store built from now on and for event stamps.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn invalidator(&self) -> &CacheInvalidator {
        &self.invalidator
    }

    pub fn warmer(&self) -> &CacheWarmer {
        &self.warmer
    }

    // == Store Resolution ==
    /// Returns the named store (the default store for None), building it on
    /// first use and reusing it afterwards.
    pub fn store(&self, name: Option<&str>) -> Result<Arc<dyn Store>> {
        let name = name.unwrap_or(&self.config.default);
        let mut stores = mutex_lock(&self.stores, SOURCE, "store");
        self.resolve(&mut stores, name, &mut Vec::new())
    }

    fn resolve(
        &self,
        stores: &mut HashMap<String, Arc<dyn Store>>,
        name: &str,
        chain: &mut Vec<String>,
    ) -> Result<Arc<dyn Store>> {
        if let Some(store) = stores.get(name) {
            return Ok(Arc::clone(store));
        }

        if chain.iter().any(|seen| seen == name) {
            return Err(CacheError::InvalidConfig(format!(
                "tiered store cycle: {} -> {}",
                chain.join(" -> "),
                name
            )));
        }

        let config = self
            .config
            .stores
            .get(name)
            .ok_or_else(|| CacheError::UnknownStore(name.to_string()))?;

        let store: Arc<dyn Store> = match config {
            StoreConfig::Memory { limit } => {
                Arc::new(MemoryStore::with_clock(*limit, Arc::clone(&self.clock)))
            }
            StoreConfig::File { path, compression } => Arc::new(FileStore::with_clock(
                path,
                *compression,
                Arc::clone(&self.clock),
            )?),
            StoreConfig::Tiered { stores: members } => {
                if members.is_empty() {
                    return Err(CacheError::InvalidConfig(format!(
                        "tiered store [{}] has no member stores",
                        name
                    )));
                }

                chain.push(name.to_string());
                let mut tiers = Vec::with_capacity(members.len());
                for member in members {
                    tiers.push(Tier {
                        name: member.clone(),
                        store: self.resolve(stores, member, chain)?,
                    });
                }
                chain.pop();

                Arc::new(TieredStore::new(tiers, Arc::clone(&self.clock)))
            }
            StoreConfig::Distributed { .. } => {
                return Err(CacheError::UnsupportedDriver(config.driver().to_string()));
            }
        };

        info!(store = name, driver = config.driver(), "Cache store built");
        stores.insert(name.to_string(), Arc::clone(&store));
        Ok(store)
    }

    /// Names of the stores built so far, sorted.
    pub fn built_store_names(&self) -> Vec<String> {
        let mut names: Vec<String> = mutex_lock(&self.stores, SOURCE, "built_store_names")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    // == Keys ==
    /// Applies the configured namespace to `key`.
    pub fn prefixed(&self, key: &str) -> String {
        if self.config.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.config.prefix, key)
        }
    }

    fn effective_ttl(&self, ttl: Option<Duration>) -> Option<Duration> {
        ttl.or_else(|| self.config.default_ttl())
    }

    fn coalesced<T, F>(&self, key: &str, f: F) -> T
    where
        F: FnOnce() -> T,
    {
        if self.config.coalesce {
            self.single_flight.run(key, f)
        } else {
            f()
        }
    }

    // == Remember Helpers ==
    /// Returns the cached value for `key` in the default store, or runs
    /// `producer`, caches its result and returns it.
    ///
    /// `ttl = None` uses the configured default TTL. Only store resolution
    /// can fail; cache I/O problems degrade to running the producer.
    pub fn cache<F>(&self, key: &str, ttl: Option<Duration>, producer: F) -> Result<Value>
    where
        F: FnOnce() -> Value,
    {
        let key = self.prefixed(key);
        let store = self.store(None)?;
        let ttl = self.effective_ttl(ttl);
        Ok(self.coalesced(&key, || store.remember(&key, ttl, producer)))
    }

    /// Like [`CacheManager::cache`] for fallible producers; a failed
    /// producer caches nothing.
    pub fn try_cache<F>(&self, key: &str, ttl: Option<Duration>, producer: F) -> Result<Value>
    where
        F: FnOnce() -> Result<Value>,
    {
        let key = self.prefixed(key);
        let store = self.store(None)?;
        let ttl = self.effective_ttl(ttl);
        self.coalesced(&key, || store.try_remember(&key, ttl, producer))
    }

    /// Typed variant of [`CacheManager::cache`].
    ///
    /// A cached value that no longer deserializes as `T` is recomputed.
    pub fn cache_as<T, F>(&self, key: &str, ttl: Option<Duration>, producer: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        let key = self.prefixed(key);
        let store = self.store(None)?;
        let ttl = self.effective_ttl(ttl);

        self.coalesced(&key, || -> Result<T> {
            if let Some(value) = store.get(&key) {
                match serde_json::from_value(value) {
                    Ok(typed) => return Ok(typed),
                    Err(e) => debug!(key = %key, error = %e, "Cached value has unexpected shape"),
                }
            }

            let typed = producer();
            store.set(&key, serde_json::to_value(&typed)?, ttl);
            Ok(typed)
        })
    }

    /// Caches a query result under a hash of the query text and bindings.
    pub fn cache_query<F>(
        &self,
        query: &str,
        bindings: &[Value],
        ttl: Option<Duration>,
        producer: F,
    ) -> Result<Value>
    where
        F: FnOnce() -> Value,
    {
        self.cache(&query_key(query, bindings), ttl, producer)
    }

    /// Caches a rendered view under a hash of the view name and its data.
    pub fn cache_view<F>(
        &self,
        view: &str,
        data: &Value,
        ttl: Option<Duration>,
        producer: F,
    ) -> Result<Value>
    where
        F: FnOnce() -> Value,
    {
        self.cache(&view_key(view, data), ttl, producer)
    }

    /// Caches an HTTP response under a hash of the URL and request headers.
    ///
    /// Without an explicit `ttl` the lifetime comes from the response's
    /// `Cache-Control: max-age` or `Expires` header, then the default TTL.
    /// Responses that are already stale are returned but not stored.
    pub fn cache_response<F>(
        &self,
        url: &str,
        headers: &BTreeMap<String, String>,
        ttl: Option<Duration>,
        producer: F,
    ) -> Result<CachedResponse>
    where
        F: FnOnce() -> CachedResponse,
    {
        let key = self.prefixed(&response_key(url, headers));
        let store = self.store(None)?;

        self.coalesced(&key, || -> Result<CachedResponse> {
            if let Some(value) = store.get(&key) {
                if let Ok(response) = serde_json::from_value(value) {
                    return Ok(response);
                }
            }

            let response = producer();
            let ttl = ttl
                .or_else(|| ttl_from_headers(&response.headers, self.clock.now()))
                .or_else(|| self.config.default_ttl());

            if ttl == Some(Duration::ZERO) {
                debug!(url, "Response already stale, not cached");
            } else {
                store.set(&key, serde_json::to_value(&response)?, ttl);
            }
            Ok(response)
        })
    }

    // == Invalidation ==
    /// Registers `key` (namespaced like [`CacheManager::cache`]) under `tags`.
    pub fn tag<S: AsRef<str>>(&self, key: &str, tags: &[S]) {
        self.invalidator.tag(&self.prefixed(key), tags);
    }

    /// Deletes every key tagged with any of `tags` from the default store.
    pub fn invalidate_tags<S: AsRef<str>>(&self, tags: &[S]) -> Result<Vec<String>> {
        let store = self.store(None)?;
        let deleted = self.invalidator.invalidate_tags(tags, store.as_ref());

        self.dispatcher.dispatch(&CacheEvent::Invalidated {
            target: InvalidationTarget::Tags(
                tags.iter().map(|tag| tag.as_ref().to_string()).collect(),
            ),
            timestamp: self.clock.now(),
        });
        Ok(deleted)
    }

    /// Deletes every tagged key matching the glob `pattern` (namespaced like
    /// [`CacheManager::cache`]) from the default store.
    pub fn invalidate_pattern(&self, pattern: &str) -> Result<Vec<String>> {
        let store = self.store(None)?;
        let deleted = self
            .invalidator
            .invalidate_pattern(&self.prefixed(pattern), store.as_ref());

        self.dispatcher.dispatch(&CacheEvent::Invalidated {
            target: InvalidationTarget::Pattern(pattern.to_string()),
            timestamp: self.clock.now(),
        });
        Ok(deleted)
    }

    // == Warming ==
    /// Registers a named warmer.
    pub fn register_warmer<F>(&self, name: impl Into<String>, warmer: F)
    where
        F: Fn(&CacheManager) -> Result<()> + Send + Sync + 'static,
    {
        self.warmer.register(name, warmer);
    }

    /// Runs every warmer, or only those named in `keys`.
    pub fn warm(&self, keys: Option<&[String]>) -> Result<Vec<String>> {
        let warmed = self.warmer.warm(self, keys)?;

        self.dispatcher.dispatch(&CacheEvent::Warmed {
            keys: warmed.clone(),
            timestamp: self.clock.now(),
        });
        Ok(warmed)
    }

    // == Maintenance ==
    /// Runs the optimize hook of every store built so far.
    ///
    /// Returns false if any store reported a failure.
    pub fn optimize(&self) -> bool {
        let stores: Vec<(String, Arc<dyn Store>)> = mutex_lock(&self.stores, SOURCE, "optimize")
            .iter()
            .map(|(name, store)| (name.clone(), Arc::clone(store)))
            .collect();

        let mut ok = true;
        for (name, store) in stores {
            if !store.optimize() {
                warn!(store = %name, "Store optimize reported failure");
                ok = false;
            }
        }

        self.dispatcher.dispatch(&CacheEvent::Optimized {
            timestamp: self.clock.now(),
        });
        ok
    }

    /// Statistics of every store built so far, by name.
    pub fn statistics(&self) -> BTreeMap<String, StoreStatistics> {
        mutex_lock(&self.stores, SOURCE, "statistics")
            .iter()
            .map(|(name, store)| (name.clone(), store.statistics()))
            .collect()
    }
}
