//! Cache warming: named producers that populate the cache on demand.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::cache::lock::mutex_lock;
use crate::cache::CacheManager;
use crate::error::Result;

const SOURCE: &str = "cache::warmer";

/// A warmer fills the cache through the manager it is handed.
pub type WarmerFn = dyn Fn(&CacheManager) -> Result<()> + Send + Sync;

/// Registry of named warmers.
#[derive(Default)]
pub struct CacheWarmer {
    warmers: Mutex<BTreeMap<String, Arc<WarmerFn>>>,
}

impl std::fmt::Debug for CacheWarmer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheWarmer")
            .field("warmers", &self.names())
            .finish()
    }
}

impl CacheWarmer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `warmer` under `name`, replacing any previous one.
    pub fn register<F>(&self, name: impl Into<String>, warmer: F)
    where
        F: Fn(&CacheManager) -> Result<()> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(name = %name, "Registered cache warmer");
        mutex_lock(&self.warmers, SOURCE, "register").insert(name, Arc::new(warmer));
    }

    /// Registered warmer names, sorted.
    pub fn names(&self) -> Vec<String> {
        mutex_lock(&self.warmers, SOURCE, "names")
            .keys()
            .cloned()
            .collect()
    }

    /// Runs every warmer, or only those named in `keys`.
    ///
    /// The first failing warmer aborts the run and its error is returned.
    /// Returns the names of the warmers that ran.
    pub fn warm(&self, manager: &CacheManager, keys: Option<&[String]>) -> Result<Vec<String>> {
        // Snapshot so warmers may use the manager (and this registry) freely
        let selected: Vec<(String, Arc<WarmerFn>)> = mutex_lock(&self.warmers, SOURCE, "warm")
            .iter()
            .filter(|(name, _)| keys.map_or(true, |keys| keys.contains(name)))
            .map(|(name, warmer)| (name.clone(), Arc::clone(warmer)))
            .collect();

        let mut warmed = Vec::with_capacity(selected.len());
        for (name, warmer) in selected {
            warmer(manager)?;
            warmed.push(name);
        }

        info!(warmed = warmed.len(), "Cache warmed");
        Ok(warmed)
    }
}
