//! Runtime session store.
//!
//! Holds the single active room/user identity per scene. Entries live for
//! the life of the process and are only ever replaced, never removed.
//!
//! The map itself sits behind a `std::sync::Mutex` that is never held across
//! an await point. Callers that must keep a scene's identity stable across
//! an upstream call take the per-scene async lock from [`SessionStore::scene_lock`].

use crate::models::SessionIdentity;
use crate::observability::metrics::record_session_allocation;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Mutex as AsyncMutex;

/// Storage for per-scene session identities.
pub trait SessionStore: Send + Sync {
    /// Identity currently bound to the scene, if any.
    fn get(&self, scene_id: &str) -> Option<SessionIdentity>;

    /// Bind an identity to the scene, replacing any previous one.
    fn set(&self, scene_id: &str, identity: SessionIdentity);

    /// Return the scene's identity, allocating and storing one first if the
    /// scene has none. The check and the insert are atomic.
    fn get_or_allocate(
        &self,
        scene_id: &str,
        allocate: &dyn Fn() -> SessionIdentity,
    ) -> SessionIdentity;

    /// Async lock serializing identity-dependent work for one scene.
    fn scene_lock(&self, scene_id: &str) -> Arc<AsyncMutex<()>>;
}

/// Process-local session store.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, SessionIdentity>>,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, scene_id: &str) -> Option<SessionIdentity> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(scene_id)
            .cloned()
    }

    fn set(&self, scene_id: &str, identity: SessionIdentity) {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(scene_id.to_string(), identity);
    }

    fn get_or_allocate(
        &self,
        scene_id: &str,
        allocate: &dyn Fn() -> SessionIdentity,
    ) -> SessionIdentity {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = sessions.get(scene_id) {
            return existing.clone();
        }

        let identity = allocate();
        sessions.insert(scene_id.to_string(), identity.clone());
        drop(sessions);

        record_session_allocation(scene_id);
        tracing::debug!(target: "vc.sessions", scene_id = %scene_id, "Allocated session identity");
        identity
    }

    fn scene_lock(&self, scene_id: &str) -> Arc<AsyncMutex<()>> {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(scene_id.to_string())
            .or_default()
            .clone()
    }
}
