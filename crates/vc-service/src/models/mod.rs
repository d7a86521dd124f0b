//! Voice chat proxy models.
//!
//! Contains the scene, session and wire types shared across the service.

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

// ============================================================================
// Scenes
// ============================================================================

/// Display metadata for one scene, taken from the `Scenes` section of the
/// credentials file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    /// User id the AI agent joins the room with.
    #[serde(rename = "botUserId", default, skip_serializing_if = "Option::is_none")]
    pub bot_user_id: Option<String>,

    /// Upstream task id for the agent; one task per scene.
    #[serde(rename = "taskId", default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

/// Immutable configuration for one scene.
///
/// `agent_config` and `config` are the `AgentConfig` and `Config` blocks of
/// the exported scene JSON. They are forwarded to the upstream untouched
/// except for the runtime fields merged in by the action proxy.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneConfig {
    pub id: String,
    pub agent_config: Map<String, Value>,
    pub config: Value,
    pub meta: SceneMeta,
}

/// On-disk shape of a scene file.
#[derive(Debug, Deserialize)]
pub struct SceneFile {
    #[serde(rename = "AgentConfig", default)]
    pub agent_config: Map<String, Value>,

    #[serde(rename = "Config", default)]
    pub config: Value,
}

impl SceneConfig {
    pub fn new(id: impl Into<String>, file: SceneFile, meta: SceneMeta) -> Self {
        Self {
            id: id.into(),
            agent_config: file.agent_config,
            config: file.config,
            meta,
        }
    }

    pub fn display_name(&self) -> String {
        self.meta.name.clone().unwrap_or_else(|| self.id.clone())
    }

    pub fn icon(&self) -> String {
        self.meta.icon.clone().unwrap_or_default()
    }

    pub fn bot_user_id(&self) -> String {
        self.meta
            .bot_user_id
            .clone()
            .unwrap_or_else(|| format!("ai_bot_{}", self.id))
    }

    pub fn task_id(&self) -> String {
        self.meta
            .task_id
            .clone()
            .unwrap_or_else(|| format!("task_{}_001", self.id))
    }

    /// Interrupt mode 0 means the user may barge in while the agent speaks.
    pub fn interrupt_mode(&self) -> bool {
        self.config.pointer("/InterruptMode").and_then(Value::as_i64) == Some(0)
    }

    pub fn vision_enabled(&self) -> bool {
        self.flag("/LLMConfig/VisionConfig/Enable")
    }

    /// Stream type 1 captures the screen share instead of the camera.
    pub fn screen_mode(&self) -> bool {
        self.config
            .pointer("/LLMConfig/VisionConfig/SnapshotConfig/StreamType")
            .and_then(Value::as_i64)
            == Some(1)
    }

    pub fn avatar_enabled(&self) -> bool {
        self.flag("/AvatarConfig/Enabled")
    }

    pub fn avatar_background_url(&self) -> Option<String> {
        self.config
            .pointer("/AvatarConfig/BackgroundUrl")
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    fn flag(&self, pointer: &str) -> bool {
        self.config
            .pointer(pointer)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

// ============================================================================
// Sessions
// ============================================================================

/// The room/user pair currently bound to a scene.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIdentity {
    #[serde(rename = "RoomId")]
    pub room_id: String,

    #[serde(rename = "UserId")]
    pub user_id: String,
}

impl SessionIdentity {
    pub fn new(room_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            user_id: user_id.into(),
        }
    }

    /// Fresh random identity. Session ids need uniqueness, not secrecy.
    pub fn random() -> Self {
        Self {
            room_id: Uuid::new_v4().to_string(),
            user_id: Uuid::new_v4().to_string(),
        }
    }
}

// ============================================================================
// Proxy API
// ============================================================================

/// Query string of a proxy request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProxyQuery {
    #[serde(rename = "Action")]
    pub action: Option<String>,

    #[serde(rename = "Version")]
    pub version: Option<String>,
}

/// JSON body of a proxy request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProxyBody {
    #[serde(rename = "SceneID", default)]
    pub scene_id: Option<String>,

    #[serde(rename = "RoomId", default, deserialize_with = "scalar_string")]
    pub room_id: Option<String>,

    #[serde(rename = "UserId", default, deserialize_with = "scalar_string")]
    pub user_id: Option<String>,
}

/// Accept ids sent as JSON strings or numbers. `null` reads as absent.
fn scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(de::Error::invalid_type(
            de::Unexpected::Other(json_kind(&other)),
            &"a string or number",
        )),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Bool(_) => "boolean",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
        _ => "scalar",
    }
}

/// Upstream actions the proxy interprets. Anything else is forwarded as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceChatAction {
    Start,
    Stop,
    Other(String),
}

impl VoiceChatAction {
    pub fn parse(action: &str) -> Self {
        match action {
            "StartVoiceChat" => VoiceChatAction::Start,
            "StopVoiceChat" => VoiceChatAction::Stop,
            other => VoiceChatAction::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            VoiceChatAction::Start => "StartVoiceChat",
            VoiceChatAction::Stop => "StopVoiceChat",
            VoiceChatAction::Other(name) => name.as_str(),
        }
    }
}

/// Local acknowledgment returned when there is nothing to stop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopAck {
    #[serde(rename = "Result")]
    pub result: String,
    pub message: String,
}

impl StopAck {
    pub fn no_active_task() -> Self {
        Self {
            result: "ok".to_string(),
            message: "No active task to stop".to_string(),
        }
    }
}

// ============================================================================
// Scene listing API
// ============================================================================

/// Client-facing scene description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneInfo {
    pub id: String,
    pub name: String,
    pub icon: String,
    pub bot_name: String,
    pub is_interrupt_mode: bool,
    pub is_vision: bool,
    pub is_screen_mode: bool,
    pub is_avatar_scene: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_bg_url: Option<String>,
}

impl From<&SceneConfig> for SceneInfo {
    fn from(scene: &SceneConfig) -> Self {
        Self {
            id: scene.id.clone(),
            name: scene.display_name(),
            icon: scene.icon(),
            bot_name: scene.bot_user_id(),
            is_interrupt_mode: scene.interrupt_mode(),
            is_vision: scene.vision_enabled(),
            is_screen_mode: scene.screen_mode(),
            is_avatar_scene: scene.avatar_enabled(),
            avatar_bg_url: scene.avatar_background_url(),
        }
    }
}

/// RTC join parameters handed to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtcJoinInfo {
    #[serde(rename = "AppId")]
    pub app_id: String,

    #[serde(rename = "RoomId")]
    pub room_id: String,

    #[serde(rename = "UserId")]
    pub user_id: String,

    #[serde(rename = "Token")]
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneEntry {
    pub scene: SceneInfo,
    pub rtc: RtcJoinInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenesResponse {
    pub scenes: Vec<SceneEntry>,
}
