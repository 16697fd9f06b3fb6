//! Tiered Store Module
//!
//! Composes named stores, fastest first, with read-through promotion and
//! write-through fan-out.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::clock::SharedClock;
use crate::cache::{CacheItem, Store, StoreStatistics};

// == Tier ==
/// One member of a tiered store.
#[derive(Clone)]
pub struct Tier {
    /// Store name the tier was resolved from
    pub name: String,
    pub store: Arc<dyn Store>,
}

impl std::fmt::Debug for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tier").field("name", &self.name).finish()
    }
}

// == Tiered Store ==
/// A pure composition of member stores; it owns no entries itself.
///
/// Writes go to every tier and report `false` if any tier failed, without
/// rolling back the tiers that succeeded.
#[derive(Debug)]
pub struct TieredStore {
    tiers: Vec<Tier>,
    clock: SharedClock,
}

impl TieredStore {
    // == Constructor ==
    /// Creates a tiered store over `tiers`, ordered fastest first.
    pub fn new(tiers: Vec<Tier>, clock: SharedClock) -> Self {
        Self { tiers, clock }
    }

    /// Names of the member stores, fastest first.
    pub fn tier_names(&self) -> Vec<&str> {
        self.tiers.iter().map(|tier| tier.name.as_str()).collect()
    }

    // == Promotion ==
    /// Copies an item found at tier `found_at` into every faster tier,
    /// keeping its remaining TTL.
    fn promote(&self, key: &str, item: &CacheItem, found_at: usize) {
        if found_at == 0 {
            return;
        }

        let ttl = item.ttl_remaining(self.clock.now());
        if ttl == Some(Duration::ZERO) {
            return;
        }

        for tier in &self.tiers[..found_at] {
            if !tier.store.set(key, item.value.clone(), ttl) {
                warn!(key, tier = %tier.name, "Failed to promote entry");
            }
        }
        debug!(key, from = %self.tiers[found_at].name, "Promoted entry to faster tiers");
    }

    fn all<F>(&self, op: F) -> bool
    where
        F: Fn(&dyn Store) -> bool,
    {
        self.tiers
            .iter()
            .fold(true, |ok, tier| op(tier.store.as_ref()) && ok)
    }
}

impl Store for TieredStore {
    fn fetch(&self, key: &str) -> Option<CacheItem> {
        for (index, tier) in self.tiers.iter().enumerate() {
            if let Some(item) = tier.store.fetch(key) {
                self.promote(key, &item, index);
                return Some(item);
            }
        }
        None
    }

    fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> bool {
        self.all(|store| store.set(key, value.clone(), ttl))
    }

    fn delete(&self, key: &str) -> bool {
        self.all(|store| store.delete(key))
    }

    fn has(&self, key: &str) -> bool {
        self.tiers.iter().any(|tier| tier.store.has(key))
    }

    fn clear(&self) -> bool {
        self.all(|store| store.clear())
    }

    fn statistics(&self) -> StoreStatistics {
        let mut total = StoreStatistics::new("tiered");
        for tier in &self.tiers {
            total.absorb(&tier.store.statistics());
        }
        total
    }

    fn optimize(&self) -> bool {
        self.all(|store| store.optimize())
    }

    /// Each tier is asked only for the keys the faster tiers missed. A key
    /// counts as found when a tier holds a live entry for it, even if the
    /// stored value is JSON `null`; only absent or expired keys fall through
    /// to the next tier and finally to `default`.
    fn get_multiple(&self, keys: &[String], default: Value) -> HashMap<String, Value> {
        let mut found: HashMap<String, Value> = HashMap::new();
        let mut missing: Vec<&String> = keys.iter().collect();

        for (index, tier) in self.tiers.iter().enumerate() {
            if missing.is_empty() {
                break;
            }

            for key in &missing {
                if let Some(item) = tier.store.fetch(key) {
                    self.promote(key, &item, index);
                    found.insert((*key).clone(), item.value);
                }
            }
            missing.retain(|key| !found.contains_key(*key));
        }

        keys.iter()
            .map(|key| {
                let value = found.get(key).cloned().unwrap_or_else(|| default.clone());
                (key.clone(), value)
            })
            .collect()
    }

    fn set_multiple(&self, values: HashMap<String, Value>, ttl: Option<Duration>) -> bool {
        self.all(|store| store.set_multiple(values.clone(), ttl))
    }

    fn delete_multiple(&self, keys: &[String]) -> bool {
        self.all(|store| store.delete_multiple(keys))
    }
}
