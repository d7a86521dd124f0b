//! Observability for the voice chat proxy.
//!
//! # Privacy by Default
//!
//! Service functions use `#[instrument(skip_all)]` and add fields explicitly.
//! Fields fall into three groups:
//! - **SAFE**: logged in plaintext (scene ids, actions, room ids)
//! - **HASHED**: SHA-256 prefix for correlation (client user ids)
//! - **NEVER**: keys, signatures, access tokens

pub mod metrics;

use sha2::{Digest, Sha256};

/// Hash a field value for correlation in logs (SHA-256, first 8 hex chars)
///
/// One-way and truncated; enough to follow a user across log lines without
/// recording the id itself.
pub fn hash_for_correlation(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    hex::encode(digest.get(..4).unwrap_or_default())
}
