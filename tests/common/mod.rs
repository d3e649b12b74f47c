//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{TestServer, TestClient, SEED_TRACK_ID};
//! use reqwest::StatusCode;
//!
//! #[tokio::test]
//! async fn test_get_tracks() {
//!     let server = TestServer::spawn().await;
//!     let client = TestClient::new(server.base_url.clone());
//!
//!     let response = client.get_tracks(&[SEED_TRACK_ID]).await;
//!     assert_eq!(response.status(), StatusCode::OK);
//! }
//! ```

mod client;
mod constants;
mod provider;
mod server;

// Public API - this is what tests import
#[allow(unused_imports)]
pub use client::{epoch_in, TestClient};
#[allow(unused_imports)]
pub use constants::*;
#[allow(unused_imports)]
pub use provider::FakeProvider;
pub use server::TestServer;
