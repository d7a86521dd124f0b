//! Credential and scene fixtures.

use secrecy::SecretString;
use serde_json::{json, Value};
use std::collections::HashMap;
use vc_service::config::{AccountConfig, Credentials, RtcConfig};
use vc_service::models::{SceneConfig, SceneFile, SceneMeta};
use vc_service::repositories::SceneRegistry;

pub const TEST_ACCESS_KEY_ID: &str = "AKLTtestaccesskey";
pub const TEST_SECRET_KEY: &str = "test-secret-key";
pub const TEST_APP_ID: &str = "test-app-id";
pub const TEST_APP_KEY: &str = "test-app-key";

/// Fully populated credentials.
pub fn test_credentials() -> Credentials {
    Credentials {
        account: AccountConfig {
            access_key_id: TEST_ACCESS_KEY_ID.to_string(),
            secret_key: Some(SecretString::from(TEST_SECRET_KEY)),
        },
        rtc: RtcConfig {
            app_id: TEST_APP_ID.to_string(),
            app_key: Some(SecretString::from(TEST_APP_KEY)),
        },
        scenes: HashMap::new(),
    }
}

/// Build a scene from raw `AgentConfig` and `Config` blocks.
pub fn scene(id: &str, agent_config: Value, config: Value, meta: SceneMeta) -> SceneConfig {
    let file: SceneFile = serde_json::from_value(json!({
        "AgentConfig": agent_config,
        "Config": config,
    }))
    .expect("scene fixture should deserialize");
    SceneConfig::new(id, file, meta)
}

/// A voice agent scene with an ASR/LLM/TTS template.
pub fn demo_scene() -> SceneConfig {
    scene(
        "demo",
        json!({ "WelcomeMessage": "Hello, how can I help?" }),
        json!({
            "InterruptMode": 0,
            "ASRConfig": { "Provider": "volcano" },
            "LLMConfig": { "Mode": "ArkV3", "EndPointId": "ep-test" },
            "TTSConfig": { "Provider": "volcano" }
        }),
        SceneMeta::default(),
    )
}

/// A vision scene with display metadata and fixed ids.
pub fn vision_scene() -> SceneConfig {
    scene(
        "vision",
        json!({}),
        json!({
            "InterruptMode": 1,
            "LLMConfig": {
                "VisionConfig": { "Enable": true, "SnapshotConfig": { "StreamType": 1 } }
            }
        }),
        SceneMeta {
            name: Some("Screen Assistant".to_string()),
            icon: Some("https://cdn.example/vision.png".to_string()),
            bot_user_id: Some("vision_bot".to_string()),
            task_id: Some("vision_task".to_string()),
        },
    )
}

/// Registry holding [`demo_scene`] and [`vision_scene`].
pub fn demo_registry() -> SceneRegistry {
    SceneRegistry::from_scenes([demo_scene(), vision_scene()])
}
