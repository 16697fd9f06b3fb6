//! Error types for the cache engine
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Cache Error Enum ==
/// Unified error type for the cache engine and its admin server.
#[derive(Error, Debug)]
pub enum CacheError {
    /// No store with this name is configured
    #[error("Cache store [{0}] is not defined")]
    UnknownStore(String),

    /// The store's driver cannot be built by this engine
    #[error("Unsupported cache driver: {0}")]
    UnsupportedDriver(String),

    /// Configuration is present but inconsistent
    #[error("Invalid cache configuration: {0}")]
    InvalidConfig(String),

    /// Filesystem failure in the disk tier
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Payload or index could not be encoded/decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Payload could not be compressed/decompressed
    #[error("Compression error: {0}")]
    Compression(String),

    /// Key not found in cache
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A producer or warmer callback failed
    #[error("Producer failed: {0}")]
    Producer(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CacheError::UnknownStore(_) => StatusCode::NOT_FOUND,
            CacheError::UnsupportedDriver(_) | CacheError::InvalidConfig(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            CacheError::Io(_)
            | CacheError::Serialization(_)
            | CacheError::Compression(_)
            | CacheError::Producer(_)
            | CacheError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache engine.
pub type Result<T> = std::result::Result<T, CacheError>;
