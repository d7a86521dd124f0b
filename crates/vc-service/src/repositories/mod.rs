//! State holders for the voice chat proxy.
//!
//! - `scenes` - read-only scene registry loaded at startup
//! - `sessions` - mutable per-scene session identities

pub mod scenes;
pub mod sessions;

pub use scenes::SceneRegistry;
pub use sessions::{InMemorySessionStore, SessionStore};
