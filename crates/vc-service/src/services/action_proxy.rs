//! Voice chat action proxy.
//!
//! Turns a client `{SceneID, RoomId?, UserId?}` request into a signed
//! upstream call. Per scene the proxy moves between two states:
//!
//! - `StartVoiceChat` (Idle/Active -> Active): resolve the session identity,
//!   store it, and start the agent task
//! - `StopVoiceChat` (Active -> Idle): stop the task for the stored room, or
//!   acknowledge locally when no room was ever bound
//!
//! Any other action is signed and forwarded with an empty body.
//!
//! All identity-dependent work for one scene runs under that scene's lock,
//! so a Start and a concurrent Start/Stop for the same scene cannot
//! interleave around the upstream call.

use crate::config::Credentials;
use crate::crypto::signer::SigningCredentials;
use crate::errors::VcError;
use crate::models::{ProxyBody, ProxyQuery, SceneConfig, SessionIdentity, StopAck, VoiceChatAction};
use crate::observability::hash_for_correlation;
use crate::observability::metrics::{record_stop_short_circuit, record_upstream_call};
use crate::repositories::{SceneRegistry, SessionStore};
use crate::services::upstream::{
    build_signed_request, UpstreamResponse, UpstreamSettings, UpstreamTransport,
};
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};

/// Result of a proxied action.
#[derive(Debug, Clone, PartialEq)]
pub enum ProxyOutcome {
    /// The upstream answered; forward its status and body unchanged.
    Forwarded(UpstreamResponse),
    /// Stop with no bound room; answered locally.
    NoActiveTask(StopAck),
}

pub struct ActionProxy {
    credentials: Arc<Credentials>,
    scenes: Arc<SceneRegistry>,
    sessions: Arc<dyn SessionStore>,
    upstream: Arc<dyn UpstreamTransport>,
    settings: UpstreamSettings,
    default_version: String,
}

/// Validated inputs shared by every action.
struct ActionContext<'a> {
    action: VoiceChatAction,
    version: &'a str,
    scene: &'a SceneConfig,
    signing: SigningCredentials,
    app_id: &'a str,
}

impl ActionProxy {
    pub fn new(
        credentials: Arc<Credentials>,
        scenes: Arc<SceneRegistry>,
        sessions: Arc<dyn SessionStore>,
        upstream: Arc<dyn UpstreamTransport>,
        settings: UpstreamSettings,
        default_version: impl Into<String>,
    ) -> Self {
        Self {
            credentials,
            scenes,
            sessions,
            upstream,
            settings,
            default_version: default_version.into(),
        }
    }

    /// Validate, dispatch on the action and forward.
    ///
    /// # Errors
    ///
    /// - `VcError::Validation` for a missing action, scene, credential or
    ///   identity
    /// - `VcError::Upstream` if the upstream cannot be reached or answers
    ///   with something other than JSON
    #[instrument(skip_all, fields(action = tracing::field::Empty, scene_id = tracing::field::Empty))]
    pub async fn handle(
        &self,
        query: &ProxyQuery,
        body: &ProxyBody,
    ) -> Result<ProxyOutcome, VcError> {
        let ctx = self.validate(query, body)?;
        let span = tracing::Span::current();
        span.record("action", ctx.action.as_str());
        span.record("scene_id", ctx.scene.id.as_str());

        let lock = self.sessions.scene_lock(&ctx.scene.id);
        let _guard = lock.lock().await;

        let upstream_body = match &ctx.action {
            VoiceChatAction::Start => {
                let identity = self.resolve_identity(&ctx.scene.id, body)?;
                self.sessions.set(&ctx.scene.id, identity.clone());
                info!(
                    target: "vc.proxy",
                    scene_id = %ctx.scene.id,
                    room_id = %identity.room_id,
                    user = %hash_for_correlation(&identity.user_id),
                    "Starting voice chat"
                );
                start_body(ctx.scene, ctx.app_id, &identity)
            }
            VoiceChatAction::Stop => match self.sessions.get(&ctx.scene.id) {
                Some(identity) => {
                    info!(
                        target: "vc.proxy",
                        scene_id = %ctx.scene.id,
                        room_id = %identity.room_id,
                        "Stopping voice chat"
                    );
                    stop_body(ctx.scene, ctx.app_id, &identity)
                }
                None => {
                    info!(
                        target: "vc.proxy",
                        scene_id = %ctx.scene.id,
                        "No active task to stop"
                    );
                    record_stop_short_circuit();
                    return Ok(ProxyOutcome::NoActiveTask(StopAck::no_active_task()));
                }
            },
            VoiceChatAction::Other(_) => json!({}),
        };

        let response = self.forward(&ctx, &upstream_body).await?;
        Ok(ProxyOutcome::Forwarded(response))
    }

    fn validate<'a>(
        &'a self,
        query: &'a ProxyQuery,
        body: &ProxyBody,
    ) -> Result<ActionContext<'a>, VcError> {
        let action = required(query.action.as_deref(), "Action")?;
        let version = query
            .version
            .as_deref()
            .filter(|v| !v.is_empty())
            .unwrap_or(&self.default_version);

        let scene_id = required(body.scene_id.as_deref(), "SceneID")?;
        let scene = self
            .scenes
            .get(scene_id)
            .ok_or_else(|| VcError::Validation(format!("Scene not found: {scene_id}")))?;

        let account = &self.credentials.account;
        let access_key_id = required(Some(account.access_key_id.as_str()), "accessKeyId")?;
        let secret_key = account
            .secret_key
            .as_ref()
            .filter(|key| !key.expose_secret().is_empty())
            .ok_or_else(|| VcError::Validation("secretKey must not be empty".to_string()))?;
        let app_id = required(Some(self.credentials.rtc.app_id.as_str()), "AppId")?;

        Ok(ActionContext {
            action: VoiceChatAction::parse(action),
            version,
            scene,
            signing: SigningCredentials {
                access_key_id: access_key_id.to_string(),
                secret_key: SecretString::from(secret_key.expose_secret().to_string()),
            },
            app_id,
        })
    }

    /// Caller-supplied values win; the stored identity fills the gaps.
    fn resolve_identity(
        &self,
        scene_id: &str,
        body: &ProxyBody,
    ) -> Result<SessionIdentity, VcError> {
        let stored = self.sessions.get(scene_id);

        let room_id = pick(
            body.room_id.as_deref(),
            stored.as_ref().map(|s| s.room_id.as_str()),
            "RoomId",
        )?;
        let user_id = pick(
            body.user_id.as_deref(),
            stored.as_ref().map(|s| s.user_id.as_str()),
            "UserId",
        )?;

        Ok(SessionIdentity { room_id, user_id })
    }

    async fn forward(
        &self,
        ctx: &ActionContext<'_>,
        body: &Value,
    ) -> Result<UpstreamResponse, VcError> {
        let action = ctx.action.as_str();
        let request = build_signed_request(
            &self.settings,
            &ctx.signing,
            action,
            ctx.version,
            body,
            Utc::now(),
        )?;

        let start = Instant::now();
        let result = self.upstream.send(&request).await;
        let status = match &result {
            Ok(response) if response.is_success() => "success",
            _ => "error",
        };
        record_upstream_call(action, status, start.elapsed());

        if let Ok(response) = &result {
            info!(
                target: "vc.proxy",
                action = %action,
                status = response.status,
                "Upstream call completed"
            );
        }
        result
    }
}

fn pick(supplied: Option<&str>, fallback: Option<&str>, field: &str) -> Result<String, VcError> {
    match supplied.filter(|v| !v.is_empty()) {
        Some(value) => Ok(value.to_string()),
        None => fallback
            .map(str::to_string)
            .ok_or_else(|| VcError::Validation(format!("{field} must not be empty"))),
    }
}

fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str, VcError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| VcError::Validation(format!("{field} must not be empty")))
}

/// Scene template plus the runtime identity and agent overrides.
fn start_body(scene: &SceneConfig, app_id: &str, identity: &SessionIdentity) -> Value {
    let mut agent_config = scene.agent_config.clone();
    agent_config.insert("TargetUserId".to_string(), json!([identity.user_id]));
    agent_config.insert("UserId".to_string(), json!(scene.bot_user_id()));
    agent_config.insert("EnableConversationStateCallback".to_string(), json!(true));

    let mut body = Map::new();
    body.insert("AppId".to_string(), json!(app_id));
    body.insert("RoomId".to_string(), json!(identity.room_id));
    body.insert("TaskId".to_string(), json!(scene.task_id()));
    body.insert("AgentConfig".to_string(), Value::Object(agent_config));
    // Scenes without a Config block send none
    if !scene.config.is_null() {
        body.insert("Config".to_string(), scene.config.clone());
    }
    Value::Object(body)
}

fn stop_body(scene: &SceneConfig, app_id: &str, identity: &SessionIdentity) -> Value {
    json!({
        "AppId": app_id,
        "RoomId": identity.room_id,
        "TaskId": scene.task_id(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AccountConfig, RtcConfig};
    use crate::models::{SceneFile, SceneMeta};
    use crate::repositories::InMemorySessionStore;
    use crate::services::upstream::mock::MockUpstream;
    use reqwest::Url;
    use std::collections::HashMap;

    fn credentials() -> Credentials {
        Credentials {
            account: AccountConfig {
                access_key_id: "AKTEST".to_string(),
                secret_key: Some(SecretString::from("secret")),
            },
            rtc: RtcConfig {
                app_id: "app-123".to_string(),
                app_key: Some(SecretString::from("app-key")),
            },
            scenes: HashMap::new(),
        }
    }

    fn demo_scene() -> SceneConfig {
        let file: SceneFile = serde_json::from_value(json!({
            "AgentConfig": { "WelcomeMessage": "hello", "TargetUserId": ["template-user"] },
            "Config": { "InterruptMode": 0, "LLMConfig": { "Mode": "ArkV3" } }
        }))
        .unwrap();
        SceneConfig::new("demo", file, SceneMeta::default())
    }

    fn bare_scene() -> SceneConfig {
        let file: SceneFile =
            serde_json::from_value(json!({ "AgentConfig": { "WelcomeMessage": "hi" } })).unwrap();
        SceneConfig::new("bare", file, SceneMeta::default())
    }

    struct Harness {
        proxy: ActionProxy,
        sessions: Arc<InMemorySessionStore>,
        upstream: Arc<MockUpstream>,
    }

    fn harness_with(credentials: Credentials, upstream: MockUpstream) -> Harness {
        let sessions = Arc::new(InMemorySessionStore::new());
        let upstream = Arc::new(upstream);
        let proxy = ActionProxy::new(
            Arc::new(credentials),
            Arc::new(SceneRegistry::from_scenes([demo_scene(), bare_scene()])),
            sessions.clone(),
            upstream.clone(),
            UpstreamSettings {
                endpoint: Url::parse("https://rtc.volcengineapi.com").unwrap(),
                region: "cn-north-1".to_string(),
                service: "rtc".to_string(),
            },
            "2025-06-01",
        );
        Harness {
            proxy,
            sessions,
            upstream,
        }
    }

    fn harness() -> Harness {
        harness_with(credentials(), MockUpstream::responding(json!({ "Result": "ok" })))
    }

    fn query(action: &str) -> ProxyQuery {
        ProxyQuery {
            action: Some(action.to_string()),
            version: None,
        }
    }

    fn body(room: Option<&str>, user: Option<&str>) -> ProxyBody {
        ProxyBody {
            scene_id: Some("demo".to_string()),
            room_id: room.map(str::to_string),
            user_id: user.map(str::to_string),
        }
    }

    fn validation_message(result: Result<ProxyOutcome, VcError>) -> String {
        match result {
            Err(VcError::Validation(message)) => message,
            other => format!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stop_without_start_answers_locally() {
        let h = harness();
        let outcome = h
            .proxy
            .handle(&query("StopVoiceChat"), &body(None, None))
            .await
            .unwrap();

        assert_eq!(outcome, ProxyOutcome::NoActiveTask(StopAck::no_active_task()));
        assert_eq!(h.upstream.call_count(), 0);
    }

    #[tokio::test]
    async fn test_start_without_identity_fails_before_upstream() {
        let h = harness();
        let message = validation_message(
            h.proxy
                .handle(&query("StartVoiceChat"), &body(None, Some("u1")))
                .await,
        );

        assert_eq!(message, "RoomId must not be empty");
        assert_eq!(h.upstream.call_count(), 0);
        assert_eq!(h.sessions.get("demo"), None);
    }

    #[tokio::test]
    async fn test_start_then_stop_reuses_stored_room() {
        let h = harness();
        h.proxy
            .handle(&query("StartVoiceChat"), &body(Some("r1"), Some("u1")))
            .await
            .unwrap();
        assert_eq!(h.sessions.get("demo"), Some(SessionIdentity::new("r1", "u1")));

        h.proxy
            .handle(&query("StopVoiceChat"), &body(None, None))
            .await
            .unwrap();

        let stop = h.upstream.last_request().unwrap();
        assert_eq!(stop.action, "StopVoiceChat");
        assert_eq!(
            stop.body_json().unwrap(),
            json!({ "AppId": "app-123", "RoomId": "r1", "TaskId": "task_demo_001" })
        );
        // Stop leaves the identity in place for the next Start
        assert_eq!(h.sessions.get("demo"), Some(SessionIdentity::new("r1", "u1")));
    }

    #[tokio::test]
    async fn test_start_body_merges_template_and_identity() {
        let h = harness();
        h.proxy
            .handle(&query("StartVoiceChat"), &body(Some("r1"), Some("u1")))
            .await
            .unwrap();

        let start = h.upstream.last_request().unwrap();
        assert!(start.url.contains("Action=StartVoiceChat"));
        assert!(start.url.contains("Version=2025-06-01"));

        let sent = start.body_json().unwrap();
        assert_eq!(sent["AppId"], "app-123");
        assert_eq!(sent["RoomId"], "r1");
        assert_eq!(sent["TaskId"], "task_demo_001");
        assert_eq!(sent["AgentConfig"]["WelcomeMessage"], "hello");
        assert_eq!(sent["AgentConfig"]["TargetUserId"], json!(["u1"]));
        assert_eq!(sent["AgentConfig"]["UserId"], "ai_bot_demo");
        assert_eq!(sent["AgentConfig"]["EnableConversationStateCallback"], true);
        assert_eq!(sent["Config"]["LLMConfig"]["Mode"], "ArkV3");
    }

    #[tokio::test]
    async fn test_start_body_omits_config_when_scene_has_none() {
        let h = harness();
        let request = ProxyBody {
            scene_id: Some("bare".to_string()),
            room_id: Some("r1".to_string()),
            user_id: Some("u1".to_string()),
        };
        h.proxy
            .handle(&query("StartVoiceChat"), &request)
            .await
            .unwrap();

        let sent = h.upstream.last_request().unwrap().body_json().unwrap();
        let fields = sent.as_object().unwrap();
        assert!(!fields.contains_key("Config"));
        assert_eq!(sent["TaskId"], "task_bare_001");
        assert_eq!(sent["AgentConfig"]["WelcomeMessage"], "hi");
    }

    #[tokio::test]
    async fn test_start_caller_values_override_stored_identity() {
        let h = harness();
        h.sessions.set("demo", SessionIdentity::new("r1", "u1"));

        h.proxy
            .handle(&query("StartVoiceChat"), &body(Some("r2"), None))
            .await
            .unwrap();

        assert_eq!(h.sessions.get("demo"), Some(SessionIdentity::new("r2", "u1")));
        let sent = h.upstream.last_request().unwrap().body_json().unwrap();
        assert_eq!(sent["RoomId"], "r2");
        assert_eq!(sent["AgentConfig"]["TargetUserId"], json!(["u1"]));
    }

    #[tokio::test]
    async fn test_other_action_forwards_empty_body() {
        let h = harness();
        let outcome = h
            .proxy
            .handle(
                &ProxyQuery {
                    action: Some("UpdateVoiceChat".to_string()),
                    version: Some("2024-12-01".to_string()),
                },
                &body(None, None),
            )
            .await
            .unwrap();

        assert!(matches!(outcome, ProxyOutcome::Forwarded(ref r) if r.status == 200));
        let sent = h.upstream.last_request().unwrap();
        assert!(sent.url.contains("Action=UpdateVoiceChat"));
        assert!(sent.url.contains("Version=2024-12-01"));
        assert_eq!(sent.body_json().unwrap(), json!({}));
    }

    #[tokio::test]
    async fn test_upstream_error_payload_is_forwarded() {
        let payload = json!({ "ResponseMetadata": { "Error": { "Code": "Bad", "Message": "nope" } } });
        let h = harness_with(credentials(), MockUpstream::with_status(400, payload.clone()));

        let outcome = h
            .proxy
            .handle(&query("StartVoiceChat"), &body(Some("r1"), Some("u1")))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ProxyOutcome::Forwarded(UpstreamResponse {
                status: 400,
                body: payload
            })
        );
    }

    #[tokio::test]
    async fn test_transport_failure_is_upstream_error() {
        let h = harness_with(credentials(), MockUpstream::failing());
        let result = h
            .proxy
            .handle(&query("StartVoiceChat"), &body(Some("r1"), Some("u1")))
            .await;
        assert!(matches!(result, Err(VcError::Upstream(_))));
    }

    #[tokio::test]
    async fn test_validation_order() {
        let h = harness();

        let message = validation_message(
            h.proxy
                .handle(&ProxyQuery::default(), &ProxyBody::default())
                .await,
        );
        assert_eq!(message, "Action must not be empty");

        let message = validation_message(
            h.proxy
                .handle(&query("StartVoiceChat"), &ProxyBody::default())
                .await,
        );
        assert_eq!(message, "SceneID must not be empty");

        let unknown = ProxyBody {
            scene_id: Some("missing".to_string()),
            ..ProxyBody::default()
        };
        let message =
            validation_message(h.proxy.handle(&query("StartVoiceChat"), &unknown).await);
        assert_eq!(message, "Scene not found: missing");
    }

    #[tokio::test]
    async fn test_missing_credentials_are_validation_errors() {
        let mut no_key_id = credentials();
        no_key_id.account.access_key_id = String::new();
        let h = harness_with(no_key_id, MockUpstream::responding(json!({})));
        let message = validation_message(
            h.proxy
                .handle(&query("StartVoiceChat"), &body(Some("r1"), Some("u1")))
                .await,
        );
        assert_eq!(message, "accessKeyId must not be empty");

        let mut no_secret = credentials();
        no_secret.account.secret_key = None;
        let h = harness_with(no_secret, MockUpstream::responding(json!({})));
        let message = validation_message(
            h.proxy
                .handle(&query("StartVoiceChat"), &body(Some("r1"), Some("u1")))
                .await,
        );
        assert_eq!(message, "secretKey must not be empty");

        let mut no_app = credentials();
        no_app.rtc.app_id = String::new();
        let h = harness_with(no_app, MockUpstream::responding(json!({})));
        let message = validation_message(
            h.proxy
                .handle(&query("StartVoiceChat"), &body(Some("r1"), Some("u1")))
                .await,
        );
        assert_eq!(message, "AppId must not be empty");
        assert_eq!(h.upstream.call_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_starts_for_one_scene_are_serialized() {
        let h = harness();
        let proxy = Arc::new(h.proxy);

        let mut handles = Vec::new();
        for i in 0..8 {
            let proxy = proxy.clone();
            handles.push(tokio::spawn(async move {
                let room = format!("room-{i}");
                proxy
                    .handle(&query("StartVoiceChat"), &body(Some(room.as_str()), Some("u1")))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        // Each request observed its own identity from store write to send
        let sent_rooms: Vec<Value> = h
            .upstream
            .requests()
            .iter()
            .map(|r| r.body_json().unwrap()["RoomId"].clone())
            .collect();
        assert_eq!(sent_rooms.len(), 8);
        let stored = h.sessions.get("demo").unwrap();
        assert_eq!(sent_rooms.last().unwrap(), &json!(stored.room_id));
    }
}
