//! Configuration Module
//!
//! Cache engine configuration (store registry, prefix, default TTL) and the
//! admin server's environment-driven settings.

use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default memory tier capacity: 64 MiB.
pub const DEFAULT_MEMORY_LIMIT: usize = 64 * 1024 * 1024;

fn default_memory_limit() -> usize {
    DEFAULT_MEMORY_LIMIT
}

// == Store Config ==
/// Construction parameters of one named store, tagged by `driver`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "driver", rename_all = "snake_case")]
pub enum StoreConfig {
    /// Process-local LRU store bounded by `limit` bytes
    Memory {
        #[serde(default = "default_memory_limit")]
        limit: usize,
    },
    /// Disk store rooted at `path`
    File {
        path: PathBuf,
        #[serde(default)]
        compression: bool,
    },
    /// Composition of other named stores, fastest first
    Tiered { stores: Vec<String> },
    /// Networked store; recognized but not buildable by this engine
    Distributed {
        #[serde(default)]
        servers: Vec<String>,
    },
}

impl StoreConfig {
    /// Driver name as written in configuration.
    pub fn driver(&self) -> &'static str {
        match self {
            StoreConfig::Memory { .. } => "memory",
            StoreConfig::File { .. } => "file",
            StoreConfig::Tiered { .. } => "tiered",
            StoreConfig::Distributed { .. } => "distributed",
        }
    }
}

// == Cache Config ==
/// Fully resolved cache engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Store used when no name is given
    pub default: String,
    /// Namespace prepended to keys by the manager, empty = none
    pub prefix: String,
    /// Default TTL in seconds, None = no expiry
    pub ttl: Option<u64>,
    /// Run at most one producer per key at a time in `cache()`
    pub coalesce: bool,
    /// Named store definitions
    pub stores: BTreeMap<String, StoreConfig>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let mut stores = BTreeMap::new();
        stores.insert(
            "memory".to_string(),
            StoreConfig::Memory {
                limit: DEFAULT_MEMORY_LIMIT,
            },
        );
        stores.insert(
            "file".to_string(),
            StoreConfig::File {
                path: PathBuf::from("storage/cache"),
                compression: false,
            },
        );
        stores.insert(
            "tiered".to_string(),
            StoreConfig::Tiered {
                stores: vec!["memory".to_string(), "file".to_string()],
            },
        );

        Self {
            default: "memory".to_string(),
            prefix: String::new(),
            ttl: Some(3600),
            coalesce: false,
            stores,
        }
    }
}

impl CacheConfig {
    /// Merges caller options over the defaults. Stores are merged by name.
    pub fn from_options(options: CacheOptions) -> Self {
        Self::default().merge(options)
    }

    /// Applies `options` over this configuration.
    pub fn merge(mut self, options: CacheOptions) -> Self {
        if let Some(default) = options.default {
            self.default = default;
        }
        if let Some(prefix) = options.prefix {
            self.prefix = prefix;
        }
        if let Some(ttl) = options.ttl {
            self.ttl = ttl;
        }
        if let Some(coalesce) = options.coalesce {
            self.coalesce = coalesce;
        }
        if let Some(stores) = options.stores {
            self.stores.extend(stores);
        }
        self
    }

    /// Default TTL as a duration.
    pub fn default_ttl(&self) -> Option<Duration> {
        self.ttl.map(Duration::from_secs)
    }
}

// == Cache Options ==
/// Caller-supplied overrides; every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    pub default: Option<String>,
    pub prefix: Option<String>,
    /// `Some(None)` (JSON `null`) disables the default TTL
    #[serde(deserialize_with = "deserialize_explicit_null")]
    pub ttl: Option<Option<u64>>,
    pub coalesce: Option<bool>,
    pub stores: Option<BTreeMap<String, StoreConfig>>,
}

fn deserialize_explicit_null<'de, D>(deserializer: D) -> std::result::Result<Option<Option<u64>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<u64>::deserialize(deserializer).map(Some)
}

// == Server Config ==
/// Admin server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP server port
    pub server_port: u16,
    /// Background optimize task interval in seconds
    pub optimize_interval: u64,
    /// Cache engine configuration
    pub cache: CacheConfig,
}

impl ServerConfig {
    /// Creates a new ServerConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `OPTIMIZE_INTERVAL` - Optimize frequency in seconds (default: 300)
    /// - `CACHE_CONFIG` - Path to a JSON file of cache options (optional)
    /// - `CACHE_DEFAULT_STORE` - Default store name (default: memory)
    /// - `CACHE_PREFIX` - Key namespace (default: none)
    /// - `CACHE_TTL` - Default TTL in seconds (default: 3600)
    /// - `CACHE_MEMORY_LIMIT` - Memory store capacity in bytes (default: 64 MiB)
    /// - `CACHE_FILE_PATH` - File store root (default: storage/cache)
    /// - `CACHE_COMPRESSION` - Compress file store payloads (default: false)
    pub fn from_env() -> Result<Self> {
        let mut options = match env::var("CACHE_CONFIG") {
            Ok(path) => serde_json::from_slice(&std::fs::read(path)?)?,
            Err(_) => CacheOptions::default(),
        };

        if let Ok(default) = env::var("CACHE_DEFAULT_STORE") {
            options.default = Some(default);
        }
        if let Ok(prefix) = env::var("CACHE_PREFIX") {
            options.prefix = Some(prefix);
        }
        if let Some(ttl) = parse_env::<u64>("CACHE_TTL") {
            options.ttl = Some(Some(ttl));
        }

        let mut cache = CacheConfig::from_options(options);

        if let Some(limit) = parse_env::<usize>("CACHE_MEMORY_LIMIT") {
            cache
                .stores
                .insert("memory".to_string(), StoreConfig::Memory { limit });
        }
        let file_path = env::var("CACHE_FILE_PATH").ok().map(PathBuf::from);
        let compression = parse_env::<bool>("CACHE_COMPRESSION");
        if file_path.is_some() || compression.is_some() {
            let (current_path, current_compression) = match cache.stores.get("file") {
                Some(StoreConfig::File { path, compression }) => (path.clone(), *compression),
                _ => (PathBuf::from("storage/cache"), false),
            };
            cache.stores.insert(
                "file".to_string(),
                StoreConfig::File {
                    path: file_path.unwrap_or(current_path),
                    compression: compression.unwrap_or(current_compression),
                },
            );
        }

        Ok(Self {
            server_port: parse_env("SERVER_PORT").unwrap_or(3000),
            optimize_interval: parse_env("OPTIMIZE_INTERVAL").unwrap_or(300),
            cache,
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_port: 3000,
            optimize_interval: 300,
            cache: CacheConfig::default(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_config_default() {
        let config = CacheConfig::default();
        assert_eq!(config.default, "memory");
        assert_eq!(config.prefix, "");
        assert_eq!(config.default_ttl(), Some(Duration::from_secs(3600)));
        assert_eq!(config.stores.len(), 3);
        assert_eq!(config.stores["tiered"].driver(), "tiered");
    }

    #[test]
    fn test_options_merge_over_defaults() {
        let options: CacheOptions = serde_json::from_str(
            r#"{
                "default": "fast",
                "prefix": "shop",
                "stores": {
                    "fast": {"driver": "memory", "limit": 1024},
                    "file": {"driver": "file", "path": "/tmp/shop-cache", "compression": true}
                }
            }"#,
        )
        .unwrap();

        let config = CacheConfig::from_options(options);

        assert_eq!(config.default, "fast");
        assert_eq!(config.prefix, "shop");
        assert_eq!(config.ttl, Some(3600));
        assert_eq!(config.stores["fast"], StoreConfig::Memory { limit: 1024 });
        assert_eq!(
            config.stores["file"],
            StoreConfig::File {
                path: PathBuf::from("/tmp/shop-cache"),
                compression: true
            }
        );
        assert!(config.stores.contains_key("memory"));
    }

    #[test]
    fn test_explicit_null_ttl_disables_expiry() {
        let options: CacheOptions = serde_json::from_str(r#"{"ttl": null}"#).unwrap();
        assert_eq!(options.ttl, Some(None));
        assert_eq!(CacheConfig::from_options(options).default_ttl(), None);

        let absent: CacheOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.ttl, None);
    }

    #[test]
    fn test_store_config_parsing() {
        let memory: StoreConfig = serde_json::from_str(r#"{"driver": "memory"}"#).unwrap();
        assert_eq!(
            memory,
            StoreConfig::Memory {
                limit: DEFAULT_MEMORY_LIMIT
            }
        );

        let distributed: StoreConfig =
            serde_json::from_str(r#"{"driver": "distributed", "servers": ["a:6379"]}"#).unwrap();
        assert_eq!(distributed.driver(), "distributed");

        let unknown = serde_json::from_str::<StoreConfig>(r#"{"driver": "carrier-pigeon"}"#);
        assert!(unknown.is_err());
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.optimize_interval, 300);
    }
}
