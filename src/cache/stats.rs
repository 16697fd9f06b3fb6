//! Cache Statistics Module
//!
//! Per-store performance and capacity figures reported by `statistics()`.

use serde::Serialize;

// == Store Statistics ==
/// Snapshot of a store's capacity and traffic.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStatistics {
    /// Driver that produced the snapshot (`memory`, `file`, `tiered`)
    pub driver: String,
    /// Current number of entries
    pub items: usize,
    /// Bytes accounted to the entries
    pub current_size: usize,
    /// Capacity in bytes, None = unbounded
    pub max_size: Option<usize>,
    /// current_size / max_size * 100
    pub utilization: f64,
    /// Cumulative hit counter across all entries
    pub hits: u64,
    /// Reads that found nothing (or only an expired entry)
    pub misses: u64,
    /// Entries removed by the LRU policy
    pub evictions: u64,
    /// Entries removed because their TTL had elapsed
    pub expired: u64,
}

impl StoreStatistics {
    // == Constructor ==
    /// Creates an empty snapshot for the given driver.
    pub fn new(driver: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            ..Self::default()
        }
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Fills `utilization` from the current and maximum size.
    pub fn with_utilization(mut self) -> Self {
        self.utilization = match self.max_size {
            Some(max) if max > 0 => self.current_size as f64 / max as f64 * 100.0,
            _ => 0.0,
        };
        self
    }

    /// Adds another snapshot's counters into this one.
    pub fn absorb(&mut self, other: &StoreStatistics) {
        self.items += other.items;
        self.current_size += other.current_size;
        self.hits += other.hits;
        self.misses += other.misses;
        self.evictions += other.evictions;
        self.expired += other.expired;
    }
}
