//! Cache Entry Module
//!
//! Defines the value-plus-expiry unit moved between stores and the
//! per-entry bookkeeping kept by the memory tier.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// == Cache Item ==
/// A stored value together with its absolute expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheItem {
    /// The stored value
    pub value: Value,
    /// Expiration instant, None = no expiration
    pub expires_at: Option<DateTime<Utc>>,
}

impl CacheItem {
    // == Constructor ==
    /// Creates an item that expires `ttl` after `now`.
    ///
    /// # Arguments
    /// * `value` - The value to store
    /// * `ttl` - Optional time-to-live, None = never expires
    /// * `now` - The instant the item is written
    pub fn new(value: Value, ttl: Option<Duration>, now: DateTime<Utc>) -> Self {
        Self {
            value,
            expires_at: expiry_from(ttl, now),
        }
    }

    // == Is Expired ==
    /// Checks if the item has expired at `now`.
    ///
    /// An item is expired once `now >= expires_at`, so an entry written with
    /// `ttl = t` is visible strictly before `written + t` and gone from then on.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        is_expired_at(self.expires_at, now)
    }

    // == Time To Live ==
    /// Returns the remaining TTL at `now`.
    ///
    /// # Returns
    /// - `Some(Duration::ZERO)` if the item has expired
    /// - `Some(remaining)` if the item has a TTL and hasn't expired
    /// - `None` if the item never expires
    pub fn ttl_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.expires_at
            .map(|expires| (expires - now).to_std().unwrap_or(Duration::ZERO))
    }
}

// == Entry Metadata ==
/// Accounting record kept by the memory tier for each key.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryMeta {
    /// Estimated size in bytes (length of the value's JSON encoding)
    pub size: usize,
    /// Expiration instant, None = no expiration
    pub expires_at: Option<DateTime<Utc>>,
    /// Number of reads and writes that touched this key
    pub hits: u64,
    /// Last time the key was read or written
    pub last_access: DateTime<Utc>,
}

// == Utility Functions ==
/// Converts an optional TTL into an absolute expiry.
pub fn expiry_from(ttl: Option<Duration>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    ttl.map(|ttl| {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC)
    })
}

/// Shared expiry predicate: expired iff an expiry exists and `now >= expiry`.
pub fn is_expired_at(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match expires_at {
        Some(expires) => now >= expires,
        None => false,
    }
}

/// Deterministic byte-size estimate of a value: the length of its JSON encoding.
pub fn calculate_size(value: &Value) -> usize {
    serde_json::to_vec(value).map(|bytes| bytes.len()).unwrap_or(0)
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_item_creation_no_ttl() {
        let now = Utc::now();
        let item = CacheItem::new(json!("test_value"), None, now);

        assert_eq!(item.value, json!("test_value"));
        assert!(item.expires_at.is_none());
        assert!(!item.is_expired(now));
        assert!(item.ttl_remaining(now).is_none());
    }

    #[test]
    fn test_item_expiration_boundary() {
        let now = Utc::now();
        let item = CacheItem::new(json!(1), Some(Duration::from_secs(5)), now);

        assert!(!item.is_expired(now + chrono::Duration::milliseconds(4_999)));
        assert!(item.is_expired(now + chrono::Duration::seconds(5)));
        assert!(item.is_expired(now + chrono::Duration::seconds(6)));
    }

    #[test]
    fn test_ttl_remaining() {
        let now = Utc::now();
        let item = CacheItem::new(json!(1), Some(Duration::from_secs(10)), now);

        let later = now + chrono::Duration::seconds(4);
        assert_eq!(item.ttl_remaining(later), Some(Duration::from_secs(6)));

        let after = now + chrono::Duration::seconds(11);
        assert_eq!(item.ttl_remaining(after), Some(Duration::ZERO));
    }

    #[test]
    fn test_zero_ttl_is_immediately_expired() {
        let now = Utc::now();
        let item = CacheItem::new(json!("x"), Some(Duration::ZERO), now);
        assert!(item.is_expired(now));
    }

    #[test]
    fn test_huge_ttl_saturates() {
        let now = Utc::now();
        let expiry = expiry_from(Some(Duration::from_secs(u64::MAX)), now);
        assert!(expiry.is_some());
        assert!(!is_expired_at(expiry, now));
    }

    #[test]
    fn test_calculate_size_is_json_length() {
        assert_eq!(calculate_size(&json!("hi")), 4);
        assert_eq!(calculate_size(&json!(null)), 4);
        assert_eq!(calculate_size(&json!({"a": 1})), 7);
    }
}
