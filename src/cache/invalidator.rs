//! Cache invalidation by tag and by key pattern.
//!
//! Only keys registered through [`CacheInvalidator::tag`] are reachable:
//! neither tag nor pattern invalidation scans the store's keyspace.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use tracing::debug;

use crate::cache::lock::mutex_lock;
use crate::cache::Store;

const SOURCE: &str = "cache::invalidator";

/// In-memory tag -> keys index. Lost on restart.
#[derive(Debug, Default)]
pub struct CacheInvalidator {
    tags: Mutex<HashMap<String, Vec<String>>>,
}

impl CacheInvalidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `key` under every tag in `tags`. Duplicates are tolerated.
    pub fn tag<S: AsRef<str>>(&self, key: &str, tags: &[S]) {
        let mut index = mutex_lock(&self.tags, SOURCE, "tag");
        for tag in tags {
            index
                .entry(tag.as_ref().to_string())
                .or_default()
                .push(key.to_string());
        }
    }

    /// Deletes every key registered under any of `tags` from `store` and
    /// forgets those tags.
    ///
    /// Returns the deduplicated keys that were deleted, in registration order.
    pub fn invalidate_tags<S: AsRef<str>>(&self, tags: &[S], store: &dyn Store) -> Vec<String> {
        let keys = {
            let mut index = mutex_lock(&self.tags, SOURCE, "invalidate_tags");
            let mut keys = Vec::new();
            for tag in tags {
                if let Some(tagged) = index.remove(tag.as_ref()) {
                    keys.extend(tagged);
                }
            }
            dedup(keys)
        };

        for key in &keys {
            store.delete(key);
        }
        debug!(tags = tags.len(), keys = keys.len(), "Invalidated tags");
        keys
    }

    /// Deletes every registered key matching the glob `pattern` (`*` matches
    /// any run of characters, everything else is literal) and unregisters it
    /// from all tags.
    pub fn invalidate_pattern(&self, pattern: &str, store: &dyn Store) -> Vec<String> {
        let keys = {
            let mut index = mutex_lock(&self.tags, SOURCE, "invalidate_pattern");
            let matched: Vec<String> = dedup(
                index
                    .values()
                    .flatten()
                    .filter(|key| glob_match(pattern, key))
                    .cloned()
                    .collect(),
            );

            let matched_set: HashSet<&String> = matched.iter().collect();
            for keys in index.values_mut() {
                keys.retain(|key| !matched_set.contains(key));
            }
            index.retain(|_, keys| !keys.is_empty());
            matched
        };

        for key in &keys {
            store.delete(key);
        }
        debug!(pattern, keys = keys.len(), "Invalidated pattern");
        keys
    }

    /// Registered tag names, sorted.
    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = mutex_lock(&self.tags, SOURCE, "tags")
            .keys()
            .cloned()
            .collect();
        tags.sort();
        tags
    }

    /// Keys registered under `tag`, deduplicated.
    pub fn keys_for(&self, tag: &str) -> Vec<String> {
        mutex_lock(&self.tags, SOURCE, "keys_for")
            .get(tag)
            .map(|keys| dedup(keys.clone()))
            .unwrap_or_default()
    }
}

fn dedup(keys: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    keys.into_iter()
        .filter(|key| seen.insert(key.clone()))
        .collect()
}

/// Anchored glob match where `*` matches any (possibly empty) run of
/// characters.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    // Position of the last `*` seen and the text position it was tried at
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && pattern[p] == '*' {
            backtrack = Some((p, t));
            p += 1;
        } else if p < pattern.len() && pattern[p] == text[t] {
            p += 1;
            t += 1;
        } else if let Some((star, tried)) = backtrack {
            p = star + 1;
            t = tried + 1;
            backtrack = Some((star, tried + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}
