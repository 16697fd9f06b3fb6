//! Optimize Task
//!
//! Background task that periodically runs every store's maintenance pass:
//! expired entries are purged from memory and the file index is repaired.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::CacheManager;

/// Spawns a background task that calls [`CacheManager::optimize`] every
/// `interval_secs` seconds.
///
/// Only stores the manager has already built are touched. The pass runs on
/// the blocking pool since the file tier does synchronous I/O.
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
///
/// # Example
/// ```ignore
/// let manager = Arc::new(CacheManager::new(CacheConfig::default()));
/// let optimize_handle = spawn_optimize_task(manager.clone(), 300);
/// // Later, during shutdown:
/// optimize_handle.abort();
/// ```
pub fn spawn_optimize_task(manager: Arc<CacheManager>, interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(interval_secs);

    tokio::spawn(async move {
        info!(
            "Starting optimize task with interval of {} seconds",
            interval_secs
        );

        loop {
            tokio::time::sleep(interval).await;

            let manager = Arc::clone(&manager);
            match tokio::task::spawn_blocking(move || manager.optimize()).await {
                Ok(true) => debug!("Optimize pass complete"),
                Ok(false) => warn!("Optimize pass reported a store failure"),
                Err(e) => warn!(error = %e, "Optimize pass panicked"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{ManualClock, RecordingDispatcher, Store};
    use crate::config::CacheConfig;
    use serde_json::json;

    #[tokio::test]
    async fn test_optimize_task_purges_expired_entries() {
        let clock = ManualClock::new();
        let manager = Arc::new(CacheManager::new(CacheConfig::default()).with_clock(clock.shared()));
        let memory = manager.store(None).unwrap();
        memory.set("expire_soon", json!("value"), Some(Duration::from_secs(1)));
        memory.set("long_lived", json!("value"), Some(Duration::from_secs(3600)));
        clock.advance(Duration::from_secs(2));

        let handle = spawn_optimize_task(manager.clone(), 1);
        tokio::time::sleep(Duration::from_millis(1500)).await;

        let stats = memory.statistics();
        assert_eq!(stats.items, 1, "Expired entry should have been purged");
        assert_eq!(stats.expired, 1);
        assert_eq!(memory.get("long_lived"), Some(json!("value")));

        handle.abort();
    }

    #[tokio::test]
    async fn test_optimize_task_emits_events() {
        let events = Arc::new(RecordingDispatcher::new());
        let manager = Arc::new(
            CacheManager::new(CacheConfig::default()).with_dispatcher(events.clone()),
        );

        let handle = spawn_optimize_task(manager, 1);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        handle.abort();

        let recorded = events.events();
        assert!(!recorded.is_empty());
        assert!(recorded.iter().all(|e| e.name() == "cache.optimized"));
    }

    #[tokio::test]
    async fn test_optimize_task_can_be_aborted() {
        let manager = Arc::new(CacheManager::new(CacheConfig::default()));

        let handle = spawn_optimize_task(manager, 1);

        // Abort immediately
        handle.abort();

        // Wait a bit and verify task is finished
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "Task should be finished after abort");
    }
}
