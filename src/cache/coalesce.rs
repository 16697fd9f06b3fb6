//! Per-key request coalescing.
//!
//! Callers racing on the same key queue behind one lock, so a caller that
//! re-checks the cache after acquiring it sees the value the first caller
//! produced. Works within one process only.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;

use crate::cache::lock::mutex_lock;

const SOURCE: &str = "cache::coalesce";

/// Registry of in-flight keys.
#[derive(Debug, Default, Clone)]
pub struct SingleFlight {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` while holding the lock for `key`.
    pub fn run<T, F>(&self, key: &str, f: F) -> T
    where
        F: FnOnce() -> T,
    {
        let lock = Arc::clone(
            self.locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );

        let result = {
            let _guard = mutex_lock(&lock, SOURCE, "run");
            f()
        };

        drop(lock);
        // Only the map still holds the lock: nobody is running or waiting
        self.locks
            .remove_if(key, |_, held| Arc::strong_count(held) == 1);
        result
    }

    /// Number of keys with a producer running or queued.
    pub fn in_flight(&self) -> usize {
        self.locks.len()
    }
}
