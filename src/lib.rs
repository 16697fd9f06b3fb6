//! Tiered Cache - A multi-tier caching engine
//!
//! Memory and file stores behind one contract, composed into tiers with
//! promotion, plus tag/pattern invalidation, warming and an admin server.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod tasks;

pub use api::AppState;
pub use cache::{CacheManager, Store, StoreExt};
pub use config::{CacheConfig, CacheOptions, ServerConfig, StoreConfig};
pub use error::{CacheError, Result};
pub use tasks::spawn_optimize_task;
