//! Request DTOs for the cache admin API
//!
//! Defines the structure of incoming HTTP request bodies and query strings.

use serde::Deserialize;
use serde_json::Value;

/// Maximum accepted key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;

/// Request body for the SET operation (PUT /set)
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    /// The cache key
    pub key: String,
    /// Any JSON value
    pub value: Value,
    /// Optional TTL in seconds (uses the configured default if not specified)
    #[serde(default)]
    pub ttl: Option<u64>,
    /// Target store name (default store if not specified)
    #[serde(default)]
    pub store: Option<String>,
    /// Tags to register the key under
    #[serde(default)]
    pub tags: Vec<String>,
}

impl SetRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        validate_key(&self.key)
    }
}

/// Checks a key received over HTTP.
pub fn validate_key(key: &str) -> Option<String> {
    if key.is_empty() {
        return Some("Key cannot be empty".to_string());
    }
    if key.len() > MAX_KEY_LENGTH {
        return Some(format!(
            "Key exceeds maximum length of {} characters",
            MAX_KEY_LENGTH
        ));
    }
    None
}

/// Query string selecting a store (`?store=name`)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreQuery {
    pub store: Option<String>,
}

/// Request body for POST /invalidate
///
/// Exactly one of `tags` or `pattern` must be given.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvalidateRequest {
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub pattern: Option<String>,
}

impl InvalidateRequest {
    pub fn validate(&self) -> Option<String> {
        match (&self.tags, &self.pattern) {
            (Some(_), Some(_)) => Some("Give either tags or pattern, not both".to_string()),
            (None, None) => Some("One of tags or pattern is required".to_string()),
            (Some(tags), None) if tags.is_empty() => Some("Tags cannot be empty".to_string()),
            (None, Some(pattern)) if pattern.is_empty() => {
                Some("Pattern cannot be empty".to_string())
            }
            _ => None,
        }
    }
}

/// Request body for POST /warm; runs every warmer when `keys` is absent
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WarmRequest {
    #[serde(default)]
    pub keys: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_request_deserialize() {
        let json = r#"{"key": "test", "value": {"qty": 2}}"#;
        let req: SetRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.key, "test");
        assert_eq!(req.value, json!({"qty": 2}));
        assert!(req.ttl.is_none());
        assert!(req.store.is_none());
        assert!(req.tags.is_empty());
    }

    #[test]
    fn test_set_request_with_options() {
        let json = r#"{"key": "test", "value": "hello", "ttl": 60, "store": "file", "tags": ["a"]}"#;
        let req: SetRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.ttl, Some(60));
        assert_eq!(req.store.as_deref(), Some("file"));
        assert_eq!(req.tags, vec!["a".to_string()]);
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("").is_some());
        assert!(validate_key(&"k".repeat(MAX_KEY_LENGTH + 1)).is_some());
        assert!(validate_key("valid_key").is_none());
    }

    #[test]
    fn test_invalidate_request_needs_exactly_one_target() {
        let none: InvalidateRequest = serde_json::from_str("{}").unwrap();
        assert!(none.validate().is_some());

        let both: InvalidateRequest =
            serde_json::from_str(r#"{"tags": ["a"], "pattern": "user:*"}"#).unwrap();
        assert!(both.validate().is_some());

        let tags: InvalidateRequest = serde_json::from_str(r#"{"tags": ["a"]}"#).unwrap();
        assert!(tags.validate().is_none());

        let pattern: InvalidateRequest = serde_json::from_str(r#"{"pattern": "user:*"}"#).unwrap();
        assert!(pattern.validate().is_none());
    }

    #[test]
    fn test_warm_request_defaults_to_all() {
        let req: WarmRequest = serde_json::from_str("{}").unwrap();
        assert!(req.keys.is_none());
    }
}
