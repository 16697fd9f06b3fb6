//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - Optimize: Runs store maintenance (expiry purge, index repair) at configured intervals

mod optimize;

pub use optimize::spawn_optimize_task;
