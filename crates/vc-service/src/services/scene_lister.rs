//! Scene listing with per-scene RTC join parameters.
//!
//! Identities are allocated once per scene and reused across listings;
//! tokens are issued fresh on every call and never cached.

use crate::config::Credentials;
use crate::crypto::access_token::{self, PrivilegeSet};
use crate::errors::VcError;
use crate::models::{RtcJoinInfo, SceneEntry, SceneInfo, ScenesResponse, SessionIdentity};
use crate::observability::metrics::record_token_issuance;
use crate::repositories::{SceneRegistry, SessionStore};
use chrono::Utc;
use secrecy::ExposeSecret;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument};

pub struct SceneLister {
    credentials: Arc<Credentials>,
    scenes: Arc<SceneRegistry>,
    sessions: Arc<dyn SessionStore>,
}

impl SceneLister {
    pub fn new(
        credentials: Arc<Credentials>,
        scenes: Arc<SceneRegistry>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            credentials,
            scenes,
            sessions,
        }
    }

    /// List every scene with join parameters valid from now.
    pub fn list(&self) -> Result<ScenesResponse, VcError> {
        self.list_at(Utc::now().timestamp())
    }

    /// List every scene, issuing tokens as of `now_unix_seconds`.
    ///
    /// # Errors
    ///
    /// Returns `VcError::Validation` when the RTC AppId or AppKey is missing.
    #[instrument(skip_all, fields(scene_count = self.scenes.len()))]
    pub fn list_at(&self, now_unix_seconds: i64) -> Result<ScenesResponse, VcError> {
        let rtc = &self.credentials.rtc;
        if rtc.app_id.is_empty() {
            return Err(VcError::Validation("AppId must not be empty".to_string()));
        }
        let app_key = rtc
            .app_key
            .as_ref()
            .filter(|key| !key.expose_secret().is_empty())
            .ok_or_else(|| VcError::Validation("AppKey must not be empty".to_string()))?;

        let privileges = PrivilegeSet::join_room();
        let mut scenes = Vec::with_capacity(self.scenes.len());

        for scene in self.scenes.iter() {
            let identity = self
                .sessions
                .get_or_allocate(&scene.id, &SessionIdentity::random);

            let start = Instant::now();
            let issued = access_token::issue(
                &rtc.app_id,
                app_key,
                &identity.room_id,
                &identity.user_id,
                &privileges,
                now_unix_seconds,
            );
            let status = if issued.is_ok() { "success" } else { "error" };
            record_token_issuance(status, start.elapsed());
            let token = issued?;

            debug!(target: "vc.scenes", scene_id = %scene.id, "Issued join token");

            scenes.push(SceneEntry {
                scene: SceneInfo::from(scene),
                rtc: RtcJoinInfo {
                    app_id: rtc.app_id.clone(),
                    room_id: identity.room_id,
                    user_id: identity.user_id,
                    token,
                },
            });
        }

        Ok(ScenesResponse { scenes })
    }
}
