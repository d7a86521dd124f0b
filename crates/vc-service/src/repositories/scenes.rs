//! Scene registry.
//!
//! Read-only map from scene id to scene configuration, loaded once at
//! startup from a directory of exported scene JSON files. A file that cannot
//! be read or parsed is skipped with a warning; the remaining scenes are
//! still served.

use crate::models::{SceneConfig, SceneFile, SceneMeta};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Default)]
pub struct SceneRegistry {
    scenes: BTreeMap<String, SceneConfig>,
}

impl SceneRegistry {
    pub fn from_scenes(scenes: impl IntoIterator<Item = SceneConfig>) -> Self {
        Self {
            scenes: scenes
                .into_iter()
                .map(|scene| (scene.id.clone(), scene))
                .collect(),
        }
    }

    /// Load every `*.json` file in `dir`, keyed by file stem, attaching the
    /// matching metadata entry when one exists.
    pub fn load(dir: &Path, meta: &HashMap<String, SceneMeta>) -> Self {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    target: "vc.scenes",
                    dir = %dir.display(),
                    error = %e,
                    "Scene directory unavailable; no scenes loaded"
                );
                return Self::default();
            }
        };

        let mut scenes = BTreeMap::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Some(scene_id) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };

            let file = match std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|raw| serde_json::from_str::<SceneFile>(&raw).map_err(|e| e.to_string()))
            {
                Ok(file) => file,
                Err(reason) => {
                    warn!(
                        target: "vc.scenes",
                        path = %path.display(),
                        reason = %reason,
                        "Skipping unreadable scene file"
                    );
                    continue;
                }
            };

            let scene_meta = meta.get(scene_id).cloned().unwrap_or_default();
            scenes.insert(
                scene_id.to_string(),
                SceneConfig::new(scene_id, file, scene_meta),
            );
        }

        info!(target: "vc.scenes", count = scenes.len(), "Scenes loaded");
        Self { scenes }
    }

    pub fn get(&self, scene_id: &str) -> Option<&SceneConfig> {
        self.scenes.get(scene_id)
    }

    /// Scenes in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &SceneConfig> {
        self.scenes.values()
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use uuid::Uuid;

    struct TempDir(PathBuf);

    impl TempDir {
        fn new() -> Self {
            let path = std::env::temp_dir().join(format!("vc-scenes-{}", Uuid::new_v4()));
            std::fs::create_dir_all(&path).unwrap();
            Self(path)
        }

        fn write(&self, name: &str, contents: &str) {
            std::fs::write(self.0.join(name), contents).unwrap();
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    #[test]
    fn test_load_reads_json_files_by_stem() {
        let dir = TempDir::new();
        dir.write(
            "Custom.json",
            r#"{ "AgentConfig": { "WelcomeMessage": "hi" }, "Config": { "InterruptMode": 0 } }"#,
        );
        dir.write("Tutor.json", r#"{ "AgentConfig": {}, "Config": {} }"#);
        dir.write("README.md", "not a scene");

        let meta = HashMap::from([(
            "Custom".to_string(),
            SceneMeta {
                name: Some("Custom Agent".to_string()),
                ..SceneMeta::default()
            },
        )]);
        let registry = SceneRegistry::load(&dir.0, &meta);

        assert_eq!(registry.len(), 2);
        let custom = registry.get("Custom").expect("Custom scene loaded");
        assert_eq!(custom.display_name(), "Custom Agent");
        assert!(custom.interrupt_mode());
        assert_eq!(custom.agent_config.get("WelcomeMessage").and_then(|v| v.as_str()), Some("hi"));

        let tutor = registry.get("Tutor").expect("Tutor scene loaded");
        assert_eq!(tutor.meta, SceneMeta::default());
    }

    #[test]
    fn test_load_skips_malformed_files() {
        let dir = TempDir::new();
        dir.write("good.json", r#"{ "AgentConfig": {}, "Config": {} }"#);
        dir.write("bad.json", "{ this is not json");

        let registry = SceneRegistry::load(&dir.0, &HashMap::new());
        assert_eq!(registry.len(), 1);
        assert!(registry.get("good").is_some());
        assert!(registry.get("bad").is_none());
    }

    #[test]
    fn test_load_missing_directory_is_empty() {
        let registry = SceneRegistry::load(Path::new("/nonexistent/vc/scenes"), &HashMap::new());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_iter_is_sorted_by_id() {
        let registry = SceneRegistry::from_scenes(["zeta", "alpha", "mid"].map(|id| {
            SceneConfig::new(
                id,
                SceneFile {
                    agent_config: Default::default(),
                    config: serde_json::json!({}),
                },
                SceneMeta::default(),
            )
        }));

        let ids: Vec<&str> = registry.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "mid", "zeta"]);
    }
}
