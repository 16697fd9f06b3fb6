//! API Handlers
//!
//! HTTP request handlers for each cache admin endpoint.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    Json,
};
use tracing::info;

use crate::cache::CacheManager;
use crate::config::ServerConfig;
use crate::error::{CacheError, Result};
use crate::models::{
    validate_key, DeleteResponse, GetResponse, HealthResponse, InvalidateRequest,
    InvalidateResponse, OptimizeResponse, SetRequest, SetResponse, StatsResponse, StoreQuery,
    WarmRequest, WarmResponse,
};

/// Application state shared across all handlers.
///
/// The manager synchronizes internally, so it is shared behind a plain Arc.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<CacheManager>,
}

impl AppState {
    /// Creates a new AppState around the given manager.
    pub fn new(manager: CacheManager) -> Self {
        Self {
            manager: Arc::new(manager),
        }
    }

    /// Creates a new AppState from configuration.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(CacheManager::new(config.cache.clone()))
    }
}

/// Runs store work on the blocking thread pool.
///
/// Stores do synchronous I/O (the file tier reads, writes and fsyncs on
/// every call), which must stay off the async worker threads.
async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| CacheError::Internal(format!("Cache task failed: {}", err)))?
}

/// Handler for PUT /set
///
/// Stores a JSON value with optional TTL, target store and tags. Keys are
/// namespaced with the configured prefix. Tags are only accepted for the
/// default store, since invalidation deletes from the default store.
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let manager = Arc::clone(&state.manager);
    let default_store = manager.config().default.as_str();
    if let Some(name) = req.store.as_deref() {
        if !req.tags.is_empty() && name != default_store {
            return Err(CacheError::InvalidRequest(format!(
                "Tags are only supported on the default store '{}', not '{}'",
                default_store, name
            )));
        }
    }

    run_blocking(move || {
        let store = manager.store(req.store.as_deref())?;
        let ttl = req
            .ttl
            .map(Duration::from_secs)
            .or_else(|| manager.config().default_ttl());

        if !store.set(&manager.prefixed(&req.key), req.value, ttl) {
            return Err(CacheError::Internal(format!(
                "Store rejected key '{}'",
                req.key
            )));
        }
        if !req.tags.is_empty() {
            manager.tag(&req.key, &req.tags);
        }

        Ok(Json(SetResponse::new(req.key)))
    })
    .await
}

/// Handler for GET /get/:key
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<StoreQuery>,
) -> Result<Json<GetResponse>> {
    if let Some(error_msg) = validate_key(&key) {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let manager = Arc::clone(&state.manager);
    run_blocking(move || {
        let store = manager.store(query.store.as_deref())?;
        let value = store
            .get(&manager.prefixed(&key))
            .ok_or_else(|| CacheError::NotFound(key.clone()))?;

        Ok(Json(GetResponse::new(key, value)))
    })
    .await
}

/// Handler for DELETE /del/:key
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<StoreQuery>,
) -> Result<Json<DeleteResponse>> {
    let manager = Arc::clone(&state.manager);
    run_blocking(move || {
        let store = manager.store(query.store.as_deref())?;
        if !store.delete(&manager.prefixed(&key)) {
            return Err(CacheError::NotFound(key));
        }

        Ok(Json(DeleteResponse::new(key)))
    })
    .await
}

/// Handler for GET /stats
///
/// Reports every store built so far.
pub async fn stats_handler(State(state): State<AppState>) -> Result<Json<StatsResponse>> {
    let manager = Arc::clone(&state.manager);
    run_blocking(move || Ok(Json(StatsResponse::new(manager.statistics())))).await
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

/// Handler for POST /invalidate
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Json(req): Json<InvalidateRequest>,
) -> Result<Json<InvalidateResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let manager = Arc::clone(&state.manager);
    let invalidated = run_blocking(move || match (req.tags, req.pattern) {
        (Some(tags), _) => manager.invalidate_tags(&tags),
        (None, Some(pattern)) => manager.invalidate_pattern(&pattern),
        (None, None) => Ok(Vec::new()),
    })
    .await?;
    info!(keys = invalidated.len(), "Invalidation requested over HTTP");

    Ok(Json(InvalidateResponse { invalidated }))
}

/// Parses the optional POST /warm body.
///
/// An empty body selects every warmer; anything else must be a valid
/// `WarmRequest`.
fn parse_warm_request(body: &[u8]) -> Result<WarmRequest> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(WarmRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|err| CacheError::InvalidRequest(format!("Invalid warm request: {}", err)))
}

/// Handler for POST /warm
pub async fn warm_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<WarmResponse>> {
    let req = parse_warm_request(&body)?;

    let manager = Arc::clone(&state.manager);
    let warmed = run_blocking(move || manager.warm(req.keys.as_deref())).await?;

    Ok(Json(WarmResponse { warmed }))
}

/// Handler for POST /optimize
pub async fn optimize_handler(State(state): State<AppState>) -> Result<Json<OptimizeResponse>> {
    let manager = Arc::clone(&state.manager);
    run_blocking(move || {
        Ok(Json(OptimizeResponse {
            optimized: manager.optimize(),
        }))
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, CacheOptions};
    use serde_json::json;

    fn test_state() -> AppState {
        AppState::new(CacheManager::new(CacheConfig::default()))
    }

    fn set_request(key: &str, value: serde_json::Value) -> SetRequest {
        SetRequest {
            key: key.to_string(),
            value,
            ttl: None,
            store: None,
            tags: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_set_and_get_handler() {
        let state = test_state();

        let result = set_handler(
            State(state.clone()),
            Json(set_request("test_key", json!({"qty": 1}))),
        )
        .await;
        assert!(result.is_ok());

        let response = get_handler(
            State(state.clone()),
            Path("test_key".to_string()),
            Query(StoreQuery::default()),
        )
        .await
        .unwrap();
        assert_eq!(response.value, json!({"qty": 1}));
    }

    #[tokio::test]
    async fn test_set_applies_prefix() {
        let state = AppState::new(CacheManager::new(CacheConfig::from_options(CacheOptions {
            prefix: Some("shop".to_string()),
            ..CacheOptions::default()
        })));

        set_handler(State(state.clone()), Json(set_request("k", json!(1))))
            .await
            .unwrap();

        assert!(state.manager.store(None).unwrap().has("shop:k"));
    }

    #[tokio::test]
    async fn test_get_nonexistent_key() {
        let state = test_state();

        let result = get_handler(
            State(state),
            Path("nonexistent".to_string()),
            Query(StoreQuery::default()),
        )
        .await;
        assert!(matches!(result, Err(CacheError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_get_unknown_store() {
        let state = test_state();

        let result = get_handler(
            State(state),
            Path("k".to_string()),
            Query(StoreQuery {
                store: Some("nope".to_string()),
            }),
        )
        .await;
        assert!(matches!(result, Err(CacheError::UnknownStore(_))));
    }

    #[tokio::test]
    async fn test_delete_handler() {
        let state = test_state();

        set_handler(State(state.clone()), Json(set_request("to_delete", json!("v"))))
            .await
            .unwrap();

        let result = delete_handler(
            State(state.clone()),
            Path("to_delete".to_string()),
            Query(StoreQuery::default()),
        )
        .await;
        assert!(result.is_ok());

        let result = delete_handler(
            State(state),
            Path("to_delete".to_string()),
            Query(StoreQuery::default()),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_invalidate_handler_by_tag() {
        let state = test_state();
        let mut req = set_request("user:1", json!("ada"));
        req.tags = vec!["users".to_string()];
        set_handler(State(state.clone()), Json(req)).await.unwrap();

        let response = invalidate_handler(
            State(state.clone()),
            Json(InvalidateRequest {
                tags: Some(vec!["users".to_string()]),
                pattern: None,
            }),
        )
        .await
        .unwrap();

        assert_eq!(response.invalidated, vec!["user:1".to_string()]);
        assert!(!state.manager.store(None).unwrap().has("user:1"));
    }

    #[tokio::test]
    async fn test_warm_handler_without_body() {
        let state = test_state();
        state.manager.register_warmer("home", |m: &CacheManager| {
            m.cache("home", None, || json!("<html/>"))?;
            Ok(())
        });

        let response = warm_handler(State(state.clone()), Bytes::new())
            .await
            .unwrap();

        assert_eq!(response.warmed, vec!["home".to_string()]);
    }

    #[tokio::test]
    async fn test_warm_handler_rejects_malformed_body() {
        let state = test_state();
        state
            .manager
            .register_warmer("home", |_: &CacheManager| panic!("warmer must not run"));

        let result = warm_handler(State(state), Bytes::from_static(br#"{"keys": "home"}"#)).await;

        assert!(matches!(result, Err(CacheError::InvalidRequest(_))));
    }

    #[test]
    fn test_parse_warm_request() {
        assert!(parse_warm_request(b"").unwrap().keys.is_none());
        assert!(parse_warm_request(b"  \n").unwrap().keys.is_none());
        assert_eq!(
            parse_warm_request(br#"{"keys": ["a"]}"#).unwrap().keys,
            Some(vec!["a".to_string()])
        );
        assert!(parse_warm_request(b"not json").is_err());
    }

    #[tokio::test]
    async fn test_run_blocking_maps_panic_to_internal() {
        let result: Result<()> = run_blocking(|| panic!("store blew up")).await;

        assert!(matches!(result, Err(CacheError::Internal(_))));
    }

    #[tokio::test]
    async fn test_set_rejects_tags_on_non_default_store() {
        let state = test_state();
        let mut req = set_request("k", json!(1));
        req.store = Some("file".to_string());
        req.tags = vec!["t".to_string()];

        let result = set_handler(State(state.clone()), Json(req)).await;

        assert!(matches!(result, Err(CacheError::InvalidRequest(_))));
        assert!(state.manager.built_store_names().is_empty());
    }

    #[tokio::test]
    async fn test_stats_handler() {
        let state = test_state();

        let response = stats_handler(State(state)).await.unwrap();
        assert_eq!(response.hits, 0);
        assert_eq!(response.misses, 0);
        assert!(response.stores.is_empty());
    }

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler().await;
        assert_eq!(response.status, "healthy");
    }

    #[tokio::test]
    async fn test_set_invalid_request() {
        let state = test_state();

        let result = set_handler(State(state), Json(set_request("", json!("value")))).await;
        assert!(matches!(result, Err(CacheError::InvalidRequest(_))));
    }
}
