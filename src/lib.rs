//! Circle-of-fifths playlist server library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod background_jobs;
pub mod catalog;
pub mod config;
pub mod keys;
pub mod oauth;
pub mod playlist;
pub mod rate_limit;
pub mod recommendations;
pub mod server;
pub mod sqlite_persistence;
pub mod track_cache;

// Re-export commonly used types for convenience
pub use server::{run_server, RequestsLoggingLevel};
