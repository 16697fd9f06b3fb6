//! Cache lifecycle events.
//!
//! Events are handed to an [`EventDispatcher`] fire-and-forget; the engine
//! never waits on or inspects the outcome.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::cache::lock::mutex_lock;

/// What an invalidation targeted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationTarget {
    Tags(Vec<String>),
    Pattern(String),
}

/// Lifecycle event emitted by the cache manager.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event")]
pub enum CacheEvent {
    #[serde(rename = "cache.invalidated")]
    Invalidated {
        #[serde(flatten)]
        target: InvalidationTarget,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "cache.warmed")]
    Warmed {
        keys: Vec<String>,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "cache.optimized")]
    Optimized { timestamp: DateTime<Utc> },
}

impl CacheEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            CacheEvent::Invalidated { .. } => "cache.invalidated",
            CacheEvent::Warmed { .. } => "cache.warmed",
            CacheEvent::Optimized { .. } => "cache.optimized",
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            CacheEvent::Invalidated { timestamp, .. }
            | CacheEvent::Warmed { timestamp, .. }
            | CacheEvent::Optimized { timestamp } => *timestamp,
        }
    }
}

/// Receiver of cache lifecycle events.
pub trait EventDispatcher: Send + Sync {
    fn dispatch(&self, event: &CacheEvent);
}

/// Default dispatcher: logs each event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDispatcher;

impl EventDispatcher for TracingDispatcher {
    fn dispatch(&self, event: &CacheEvent) {
        info!(event = event.name(), timestamp = %event.timestamp(), "Cache event");
    }
}

/// Dispatcher that keeps every event, for inspection.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    events: Mutex<Vec<CacheEvent>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events received so far, oldest first.
    pub fn events(&self) -> Vec<CacheEvent> {
        mutex_lock(&self.events, "cache::events", "events").clone()
    }
}

impl EventDispatcher for RecordingDispatcher {
    fn dispatch(&self, event: &CacheEvent) {
        mutex_lock(&self.events, "cache::events", "dispatch").push(event.clone());
    }
}
