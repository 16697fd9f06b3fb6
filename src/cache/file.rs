//! File Store Module
//!
//! Durable disk tier. Each entry lives in its own file under a two-level
//! hash-sharded tree, and a single `.index` file maps keys to file metadata.

use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::cache::clock::{system_clock, SharedClock};
use crate::cache::codec::PayloadCodec;
use crate::cache::lock::mutex_lock;
use crate::cache::{CacheItem, Store, StoreStatistics};
use crate::error::Result;

const SOURCE: &str = "cache::file";

/// Name of the index file inside the store root.
pub const INDEX_FILE: &str = ".index";

/// Entries read at least this often count as hot in `optimize` reports.
const HOT_ENTRY_HITS: u64 = 10;

// == Index Entry ==
/// Index record for one cached key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Payload file, relative to the store root
    pub path: PathBuf,
    /// Payload size on disk in bytes
    pub size: u64,
    /// When the payload was written
    pub created_at: DateTime<Utc>,
    /// Successful reads since the payload was written
    pub hits: u64,
}

type Index = BTreeMap<String, IndexEntry>;

#[derive(Debug, Default)]
struct FileState {
    index: Index,
    misses: u64,
    expired: u64,
}

// == File Store ==
/// Disk-backed store with an on-disk index and optional zstd compression.
///
/// The whole index is rewritten on every mutation. Mutations from one
/// process are serialized by an internal lock, but two processes sharing a
/// root can still overwrite each other's index (last writer wins). A lost
/// index record only turns into a cache miss.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    codec: PayloadCodec,
    state: Mutex<FileState>,
    clock: SharedClock,
}

impl FileStore {
    // == Constructor ==
    /// Opens (creating if needed) a store rooted at `root`.
    pub fn new(root: impl AsRef<Path>, compression: bool) -> Result<Self> {
        Self::with_clock(root, compression, system_clock())
    }

    /// Opens a store reading time from `clock`.
    ///
    /// Fails only if the root directory cannot be created. An unreadable
    /// index is logged and replaced by an empty one.
    pub fn with_clock(root: impl AsRef<Path>, compression: bool, clock: SharedClock) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        let index = load_index(&root.join(INDEX_FILE));
        info!(root = %root.display(), entries = index.len(), compression, "File store opened");

        Ok(Self {
            root,
            codec: if compression {
                PayloadCodec::compressed()
            } else {
                PayloadCodec::plain()
            },
            state: Mutex::new(FileState {
                index,
                ..FileState::default()
            }),
            clock,
        })
    }

    /// Get the root directory of this store.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_compressed(&self) -> bool {
        self.codec.is_compressed()
    }

    /// Hex SHA-256 digest of a key.
    #[must_use]
    pub fn key_digest(key: &str) -> String {
        hex::encode(Sha256::digest(key.as_bytes()))
    }

    /// Payload path for `key`, relative to the root: `ab/cd/abcd...`.
    #[must_use]
    pub fn relative_path(key: &str) -> PathBuf {
        let digest = Self::key_digest(key);
        PathBuf::from(&digest[0..2]).join(&digest[2..4]).join(&digest)
    }

    /// Absolute payload path for `key`.
    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(Self::relative_path(key))
    }

    /// Current index record for `key`.
    pub fn index_entry(&self, key: &str) -> Option<IndexEntry> {
        mutex_lock(&self.state, SOURCE, "index_entry")
            .index
            .get(key)
            .cloned()
    }

    /// Number of indexed entries.
    pub fn len(&self) -> usize {
        mutex_lock(&self.state, SOURCE, "len").index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // == Internal Helpers ==
    /// Reads and decodes the payload for `key`, repairing the index when the
    /// file is gone, unreadable, or expired. Does not count hits or misses.
    fn load(&self, state: &mut FileState, key: &str, now: DateTime<Utc>) -> Option<CacheItem> {
        let entry = state.index.get(key)?;
        let path = self.root.join(&entry.path);

        let payload = match fs::read(&path) {
            Ok(payload) => payload,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(key, "Payload file missing, repairing index");
                state.index.remove(key);
                self.persist(&state.index);
                return None;
            }
            Err(e) => {
                warn!(key, error = %e, "Failed to read payload file");
                return None;
            }
        };

        let item = match self.codec.decode(&payload) {
            Ok(item) => item,
            Err(e) => {
                warn!(key, error = %e, "Corrupt payload file, dropping entry");
                self.remove_entry(state, key);
                return None;
            }
        };

        if item.is_expired(now) {
            debug!(key, "File entry expired");
            self.remove_entry(state, key);
            state.expired += 1;
            return None;
        }

        Some(item)
    }

    /// Removes the payload file and index record for `key` and persists.
    fn remove_entry(&self, state: &mut FileState, key: &str) -> bool {
        let Some(entry) = state.index.remove(key) else {
            return false;
        };

        if let Err(e) = fs::remove_file(self.root.join(&entry.path)) {
            if e.kind() != ErrorKind::NotFound {
                warn!(key, error = %e, "Failed to remove payload file");
            }
        }
        self.persist(&state.index);
        true
    }

    /// Writes the whole index to `.index`.
    fn persist(&self, index: &Index) -> bool {
        let bytes = match serde_json::to_vec(index) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Failed to encode cache index");
                return false;
            }
        };

        match write_atomic(&self.root.join(INDEX_FILE), &bytes) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to persist cache index");
                false
            }
        }
    }

    /// Removes the two-character shard directories under the root.
    fn prune_shards(&self) -> std::io::Result<()> {
        for dir_entry in fs::read_dir(&self.root)? {
            let dir_entry = dir_entry?;
            let name = dir_entry.file_name();
            let is_shard = name.len() == 2
                && name
                    .to_str()
                    .map(|n| n.chars().all(|c| c.is_ascii_hexdigit()))
                    .unwrap_or(false);

            if is_shard && dir_entry.file_type()?.is_dir() {
                fs::remove_dir_all(dir_entry.path())?;
            }
        }
        Ok(())
    }
}

impl Store for FileStore {
    fn fetch(&self, key: &str) -> Option<CacheItem> {
        let now = self.clock.now();
        let mut state = mutex_lock(&self.state, SOURCE, "fetch");

        let Some(item) = self.load(&mut state, key, now) else {
            state.misses += 1;
            return None;
        };

        if let Some(entry) = state.index.get_mut(key) {
            entry.hits += 1;
        }
        self.persist(&state.index);

        Some(item)
    }

    fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> bool {
        let now = self.clock.now();
        let item = CacheItem::new(value, ttl, now);

        let payload = match self.codec.encode(&item) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(key, error = %e, "Failed to encode cache payload");
                return false;
            }
        };

        let relative = Self::relative_path(key);
        let mut state = mutex_lock(&self.state, SOURCE, "set");

        if let Err(e) = write_atomic(&self.root.join(&relative), &payload) {
            warn!(key, error = %e, "Failed to write cache payload");
            return false;
        }

        state.index.insert(
            key.to_string(),
            IndexEntry {
                path: relative,
                size: payload.len() as u64,
                created_at: now,
                hits: 0,
            },
        );
        self.persist(&state.index)
    }

    fn delete(&self, key: &str) -> bool {
        let mut state = mutex_lock(&self.state, SOURCE, "delete");
        self.remove_entry(&mut state, key)
    }

    fn has(&self, key: &str) -> bool {
        let now = self.clock.now();
        let mut state = mutex_lock(&self.state, SOURCE, "has");
        self.load(&mut state, key, now).is_some()
    }

    fn clear(&self) -> bool {
        let mut state = mutex_lock(&self.state, SOURCE, "clear");
        state.index.clear();

        let pruned = match self.prune_shards() {
            Ok(()) => true,
            Err(e) => {
                warn!(root = %self.root.display(), error = %e, "Failed to clear file store");
                false
            }
        };
        self.persist(&state.index) && pruned
    }

    fn statistics(&self) -> StoreStatistics {
        let state = mutex_lock(&self.state, SOURCE, "statistics");
        StoreStatistics {
            items: state.index.len(),
            current_size: state.index.values().map(|entry| entry.size as usize).sum(),
            hits: state.index.values().map(|entry| entry.hits).sum(),
            misses: state.misses,
            expired: state.expired,
            ..StoreStatistics::new("file")
        }
    }

    /// Repairs the index: drops records whose payload vanished, was corrupt,
    /// or has expired. Hot entries are only reported; nothing is relocated.
    fn optimize(&self) -> bool {
        let now = self.clock.now();
        let mut state = mutex_lock(&self.state, SOURCE, "optimize");

        let keys: Vec<String> = state.index.keys().cloned().collect();
        let before = keys.len();
        for key in &keys {
            self.load(&mut state, key, now);
        }

        let hot = state
            .index
            .values()
            .filter(|entry| entry.hits >= HOT_ENTRY_HITS)
            .count();
        info!(
            removed = before - state.index.len(),
            remaining = state.index.len(),
            hot,
            "File store optimized"
        );
        true
    }
}

// == Utility Functions ==
fn load_index(path: &Path) -> Index {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Index::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read cache index, starting empty");
            return Index::new();
        }
    };

    serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "Corrupt cache index, starting empty");
        Index::new()
    })
}

/// Write atomically via temp file + rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(format!(".{}.tmp", std::process::id()));
    let temp_path = path.with_file_name(temp_name);

    let mut file = fs::File::create(&temp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_path, path)
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use serde_json::json;
    use tempfile::TempDir;

    fn store(dir: &TempDir, compression: bool) -> (FileStore, ManualClock) {
        let clock = ManualClock::new();
        let store = FileStore::with_clock(dir.path(), compression, clock.shared()).unwrap();
        (store, clock)
    }

    #[test]
    fn test_set_and_get() {
        let dir = TempDir::new().unwrap();
        let (store, _) = store(&dir, false);

        assert!(store.set("user:1", json!({"name": "Ada"}), None));
        assert_eq!(store.get("user:1"), Some(json!({"name": "Ada"})));
        assert_eq!(store.get_or("user:2", json!(null)), json!(null));
    }

    #[test]
    fn test_sharded_layout() {
        let dir = TempDir::new().unwrap();
        let (store, _) = store(&dir, false);
        store.set("key", json!(1), None);

        let digest = FileStore::key_digest("key");
        assert_eq!(digest.len(), 64);

        let expected = dir
            .path()
            .join(&digest[0..2])
            .join(&digest[2..4])
            .join(&digest);
        assert!(expected.is_file());
        assert_eq!(store.path_for("key"), expected);
        assert!(dir.path().join(INDEX_FILE).is_file());
    }

    #[test]
    fn test_index_tracks_hits() {
        let dir = TempDir::new().unwrap();
        let (store, _) = store(&dir, false);

        store.set("k", json!("v"), None);
        store.get("k");
        store.get("k");

        let entry = store.index_entry("k").unwrap();
        assert_eq!(entry.hits, 2);
        assert_eq!(entry.path, FileStore::relative_path("k"));
        assert!(entry.size > 0);
    }

    #[test]
    fn test_missing_file_repairs_index() {
        let dir = TempDir::new().unwrap();
        let (store, _) = store(&dir, false);

        store.set("k", json!("v"), None);
        fs::remove_file(store.path_for("k")).unwrap();

        assert_eq!(store.get("k"), None);
        assert!(store.index_entry("k").is_none());
    }

    #[test]
    fn test_corrupt_payload_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let (store, _) = store(&dir, false);

        store.set("k", json!("v"), None);
        fs::write(store.path_for("k"), b"\x00not json").unwrap();

        assert_eq!(store.get("k"), None);
        assert!(!store.path_for("k").exists());
    }

    #[test]
    fn test_expiry_via_has_and_get() {
        let dir = TempDir::new().unwrap();
        let (store, clock) = store(&dir, true);

        store.set("greeting", json!("hi"), Some(Duration::from_secs(5)));
        assert!(store.has("greeting"));

        clock.advance(Duration::from_secs(5));

        assert!(!store.has("greeting"));
        assert!(!store.path_for("greeting").exists());
        assert_eq!(store.get_or("greeting", json!("bye")), json!("bye"));
    }

    #[test]
    fn test_reopen_reads_compressed_entry() {
        let dir = TempDir::new().unwrap();
        let value = json!({"items": [1, 2, 3], "label": "compressed ".repeat(20)});

        {
            let (store, _) = store(&dir, true);
            assert!(store.set("shared", value.clone(), Some(Duration::from_secs(3600))));
        }

        let reopened = FileStore::new(dir.path(), true).unwrap();
        assert_eq!(reopened.get("shared"), Some(value));
    }

    #[test]
    fn test_corrupt_index_starts_empty() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(INDEX_FILE), b"{broken").unwrap();

        let (store, _) = store(&dir, false);
        assert!(store.is_empty());
        assert!(store.set("k", json!(1), None));
    }

    #[test]
    fn test_delete() {
        let dir = TempDir::new().unwrap();
        let (store, _) = store(&dir, false);

        store.set("k", json!(1), None);
        assert!(store.delete("k"));
        assert!(!store.delete("k"));
        assert!(!store.path_for("k").exists());
    }

    #[test]
    fn test_clear_prunes_shards_keeps_root() {
        let dir = TempDir::new().unwrap();
        let (store, _) = store(&dir, false);

        for i in 0..5 {
            store.set(&format!("key{}", i), json!(i), None);
        }
        assert!(store.clear());

        assert!(store.is_empty());
        assert!(dir.path().is_dir());
        let remaining: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(remaining, vec![std::ffi::OsString::from(INDEX_FILE)]);
    }

    #[test]
    fn test_optimize_repairs_without_losing_live_entries() {
        let dir = TempDir::new().unwrap();
        let (store, clock) = store(&dir, false);

        store.set("live", json!(1), None);
        store.set("short", json!(2), Some(Duration::from_secs(1)));
        store.set("gone", json!(3), None);
        fs::remove_file(store.path_for("gone")).unwrap();
        clock.advance(Duration::from_secs(2));

        assert!(store.optimize());

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("live"), Some(json!(1)));
    }

    #[test]
    fn test_statistics() {
        let dir = TempDir::new().unwrap();
        let (store, _) = store(&dir, false);

        store.set("a", json!("x"), None);
        store.get("a");
        store.get("b");

        let stats = store.statistics();
        assert_eq!(stats.driver, "file");
        assert_eq!(stats.items, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!(stats.current_size > 0);
        assert_eq!(stats.max_size, None);
    }
}
