//! Cache Module
//!
//! Multi-tier caching engine: memory and file backends behind one store
//! contract, a tiered composite with promotion, and the manager facade with
//! tag/pattern invalidation, warming and lifecycle events.

mod clock;
mod codec;
mod coalesce;
mod entry;
mod events;
mod file;
mod invalidator;
pub mod keys;
mod lock;
mod lru;
mod manager;
mod memory;
mod stats;
mod store;
mod tiered;
mod warmer;


// Re-export public types
pub use clock::{system_clock, Clock, ManualClock, SharedClock, SystemClock};
pub use codec::{Compressor, PayloadCodec, ZstdCompressor};
pub use coalesce::SingleFlight;
pub use entry::{CacheItem, EntryMeta};
pub use events::{
    CacheEvent, EventDispatcher, InvalidationTarget, RecordingDispatcher, TracingDispatcher,
};
pub use file::{FileStore, IndexEntry, INDEX_FILE};
pub use invalidator::{glob_match, CacheInvalidator};
pub use lru::LruTracker;
pub use manager::{CacheManager, CachedResponse};
pub use memory::MemoryStore;
pub use stats::StoreStatistics;
pub use store::{Store, StoreExt};
pub use tiered::{Tier, TieredStore};
pub use warmer::{CacheWarmer, WarmerFn};
