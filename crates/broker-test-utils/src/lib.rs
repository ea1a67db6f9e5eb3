//! # Broker Test Utilities
//!
//! Shared test utilities for the meeting broker.
//!
//! This crate provides:
//! - Server test harness (`TestBrokerServer` for E2E tests)
//! - Provider fixtures (`fixtures`) for wiremock-backed provider APIs
//!
//! ## Usage
//!
//! ```rust,ignore
//! use broker_test_utils::*;
//! use wiremock::MockServer;
//!
//! #[tokio::test]
//! async fn test_example() -> Result<(), anyhow::Error> {
//!     let provider = MockServer::start().await;
//!     fixtures::mount_token(&provider).await;
//!
//!     let server = TestBrokerServer::spawn(&provider.uri(), &["host-a"]).await?;
//!     let response = reqwest::get(format!("{}/health", server.url())).await?;
//!
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod fixtures;
pub mod server_harness;

// Re-export commonly used items
pub use server_harness::*;
