//! # VC Test Utilities
//!
//! Shared test utilities for the voice chat proxy.
//!
//! This crate provides:
//! - Server test harness (`TestProxyServer` for E2E tests)
//! - Credential and scene fixtures
//! - Signature re-computation for requests captured by a mock upstream
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vc_test_utils::*;
//! use wiremock::MockServer;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let upstream = MockServer::start().await;
//!     let server = TestProxyServer::spawn(&upstream.uri(), test_credentials(), demo_registry()).await?;
//!
//!     let response = reqwest::get(format!("{}/health", server.url())).await?;
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod fixtures;
pub mod server_harness;
pub mod signature;

// Re-export commonly used items
pub use fixtures::*;
pub use server_harness::*;
pub use signature::*;
