//! API Module
//!
//! HTTP handlers and routing for the cache admin REST API.
//!
//! # Endpoints
//! - `PUT /set` - Store a key-value pair
//! - `GET /get/:key` - Retrieve a value by key
//! - `DELETE /del/:key` - Delete a key
//! - `GET /stats` - Get per-store statistics
//! - `GET /health` - Health check endpoint
//! - `POST /invalidate` - Invalidate by tags or pattern
//! - `POST /warm` - Run cache warmers
//! - `POST /optimize` - Run store maintenance

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
