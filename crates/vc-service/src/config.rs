//! Voice chat proxy configuration.
//!
//! Service settings come from environment variables. Account and RTC
//! application secrets come from a credentials file whose absence degrades
//! the service instead of failing startup: requests that need a missing
//! value fail their own validation.

use crate::models::SceneMeta;
use reqwest::Url;
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default server bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3001";

/// Default upstream OpenAPI endpoint.
pub const DEFAULT_UPSTREAM_URL: &str = "https://rtc.volcengineapi.com";

/// Default signing region for upstream calls.
pub const DEFAULT_UPSTREAM_REGION: &str = "cn-north-1";

/// Default signing service name for upstream calls.
pub const DEFAULT_UPSTREAM_SERVICE: &str = "rtc";

/// API version used when the client omits `Version`.
pub const DEFAULT_API_VERSION: &str = "2025-06-01";

/// Default upstream request timeout in seconds.
pub const DEFAULT_UPSTREAM_TIMEOUT_SECONDS: u64 = 10;

/// Upper bound for the upstream request timeout.
pub const MAX_UPSTREAM_TIMEOUT_SECONDS: u64 = 120;

/// Voice chat proxy configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:3001").
    pub bind_address: String,

    /// Path to the credentials file (default: "./credentials.json").
    pub credentials_path: PathBuf,

    /// Directory holding one `<sceneId>.json` file per scene (default: "./scenes").
    pub scenes_dir: PathBuf,

    /// Base URL of the upstream OpenAPI gateway.
    pub upstream_url: String,

    /// Region used in the signing credential scope.
    pub upstream_region: String,

    /// Service name used in the signing credential scope.
    pub upstream_service: String,

    /// API version applied when a proxy request omits `Version`.
    pub default_version: String,

    /// Timeout for a single upstream call.
    pub upstream_timeout_seconds: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid upstream URL: {0}")]
    InvalidUpstreamUrl(String),

    #[error("Invalid upstream timeout configuration: {0}")]
    InvalidUpstreamTimeout(String),

    #[error("Failed to read credentials file {path}: {reason}")]
    CredentialsUnreadable { path: String, reason: String },

    #[error("Malformed credentials file {path}: {reason}")]
    CredentialsMalformed { path: String, reason: String },
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let credentials_path = vars
            .get("VC_CREDENTIALS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./credentials.json"));

        let scenes_dir = vars
            .get("VC_SCENES_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./scenes"));

        let upstream_url = vars
            .get("VC_UPSTREAM_URL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_UPSTREAM_URL.to_string());

        let parsed = Url::parse(&upstream_url).map_err(|e| {
            ConfigError::InvalidUpstreamUrl(format!("'{}': {}", upstream_url, e))
        })?;
        if parsed.host_str().is_none() {
            return Err(ConfigError::InvalidUpstreamUrl(format!(
                "'{}' has no host",
                upstream_url
            )));
        }

        let upstream_region = vars
            .get("VC_UPSTREAM_REGION")
            .cloned()
            .unwrap_or_else(|| DEFAULT_UPSTREAM_REGION.to_string());

        let upstream_service = vars
            .get("VC_UPSTREAM_SERVICE")
            .cloned()
            .unwrap_or_else(|| DEFAULT_UPSTREAM_SERVICE.to_string());

        let default_version = vars
            .get("VC_DEFAULT_VERSION")
            .cloned()
            .unwrap_or_else(|| DEFAULT_API_VERSION.to_string());

        let upstream_timeout_seconds =
            if let Some(value_str) = vars.get("VC_UPSTREAM_TIMEOUT_SECONDS") {
                let value: u64 = value_str.parse().map_err(|e| {
                    ConfigError::InvalidUpstreamTimeout(format!(
                        "VC_UPSTREAM_TIMEOUT_SECONDS must be a positive integer, got '{}': {}",
                        value_str, e
                    ))
                })?;

                if value == 0 || value > MAX_UPSTREAM_TIMEOUT_SECONDS {
                    return Err(ConfigError::InvalidUpstreamTimeout(format!(
                        "VC_UPSTREAM_TIMEOUT_SECONDS must be between 1 and {}, got {}",
                        MAX_UPSTREAM_TIMEOUT_SECONDS, value
                    )));
                }
                value
            } else {
                DEFAULT_UPSTREAM_TIMEOUT_SECONDS
            };

        Ok(Config {
            bind_address,
            credentials_path,
            scenes_dir,
            upstream_url,
            upstream_region,
            upstream_service,
            default_version,
            upstream_timeout_seconds,
        })
    }
}

/// Account credentials used to sign upstream OpenAPI calls.
#[derive(Clone, Default, Deserialize)]
pub struct AccountConfig {
    #[serde(rename = "accessKeyId", default)]
    pub access_key_id: String,

    #[serde(rename = "secretKey", default)]
    pub secret_key: Option<SecretString>,
}

impl fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountConfig")
            .field("access_key_id", &self.access_key_id)
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}

/// RTC application identity used to issue client access tokens.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RtcConfig {
    #[serde(rename = "AppId", default)]
    pub app_id: String,

    /// `SecretString` already redacts itself in Debug output.
    #[serde(rename = "AppKey", default)]
    pub app_key: Option<SecretString>,
}

/// Contents of `credentials.json`.
///
/// Every section is optional so that a partial file still loads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Credentials {
    #[serde(rename = "AccountConfig", default)]
    pub account: AccountConfig,

    #[serde(rename = "RTCConfig", default)]
    pub rtc: RtcConfig,

    /// Per-scene display metadata, keyed by scene id.
    #[serde(rename = "Scenes", default)]
    pub scenes: HashMap<String, SceneMeta>,
}

impl Credentials {
    /// Read and parse a credentials file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::CredentialsUnreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Self::from_json(&raw).map_err(|e| match e {
            ConfigError::CredentialsMalformed { reason, .. } => ConfigError::CredentialsMalformed {
                path: path.display().to_string(),
                reason,
            },
            other => other,
        })
    }

    /// Parse credentials from a JSON string.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(|e| ConfigError::CredentialsMalformed {
            path: "<inline>".to_string(),
            reason: e.to_string(),
        })
    }

    /// Load credentials, falling back to an empty set when the file is
    /// missing or malformed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(credentials) => credentials,
            Err(e) => {
                tracing::warn!(
                    target: "vc.config",
                    error = %e,
                    "Credentials unavailable; requests needing them will be rejected"
                );
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_from_vars_defaults() {
        let config = Config::from_vars(&HashMap::new()).expect("Config should load successfully");

        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.credentials_path, PathBuf::from("./credentials.json"));
        assert_eq!(config.scenes_dir, PathBuf::from("./scenes"));
        assert_eq!(config.upstream_url, DEFAULT_UPSTREAM_URL);
        assert_eq!(config.upstream_region, "cn-north-1");
        assert_eq!(config.upstream_service, "rtc");
        assert_eq!(config.default_version, "2025-06-01");
        assert_eq!(config.upstream_timeout_seconds, 10);
    }

    #[test]
    fn test_from_vars_overrides() {
        let vars = HashMap::from([
            ("BIND_ADDRESS".to_string(), "127.0.0.1:9000".to_string()),
            ("VC_CREDENTIALS_PATH".to_string(), "/etc/vc/creds.json".to_string()),
            ("VC_SCENES_DIR".to_string(), "/etc/vc/scenes".to_string()),
            ("VC_UPSTREAM_URL".to_string(), "http://127.0.0.1:8089".to_string()),
            ("VC_UPSTREAM_REGION".to_string(), "ap-southeast-1".to_string()),
            ("VC_UPSTREAM_SERVICE".to_string(), "rtc-test".to_string()),
            ("VC_DEFAULT_VERSION".to_string(), "2024-12-01".to_string()),
            ("VC_UPSTREAM_TIMEOUT_SECONDS".to_string(), "30".to_string()),
        ]);

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.credentials_path, PathBuf::from("/etc/vc/creds.json"));
        assert_eq!(config.scenes_dir, PathBuf::from("/etc/vc/scenes"));
        assert_eq!(config.upstream_url, "http://127.0.0.1:8089");
        assert_eq!(config.upstream_region, "ap-southeast-1");
        assert_eq!(config.upstream_service, "rtc-test");
        assert_eq!(config.default_version, "2024-12-01");
        assert_eq!(config.upstream_timeout_seconds, 30);
    }

    #[test]
    fn test_from_vars_rejects_invalid_upstream_url() {
        let vars = HashMap::from([("VC_UPSTREAM_URL".to_string(), "not a url".to_string())]);

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidUpstreamUrl(_))));
    }

    #[test]
    fn test_from_vars_rejects_zero_timeout() {
        let vars = HashMap::from([(
            "VC_UPSTREAM_TIMEOUT_SECONDS".to_string(),
            "0".to_string(),
        )]);

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidUpstreamTimeout(msg)) if msg.contains("between 1 and 120"))
        );
    }

    #[test]
    fn test_from_vars_rejects_non_numeric_timeout() {
        let vars = HashMap::from([(
            "VC_UPSTREAM_TIMEOUT_SECONDS".to_string(),
            "ten".to_string(),
        )]);

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidUpstreamTimeout(msg)) if msg.contains("'ten'"))
        );
    }

    #[test]
    fn test_credentials_from_json_full() {
        let raw = r#"{
            "AccountConfig": { "accessKeyId": "AKLT-test", "secretKey": "sk-test" },
            "RTCConfig": { "AppId": "app-123", "AppKey": "appkey-456" },
            "Scenes": { "Custom": { "name": "Custom Bot", "botUserId": "bot_custom" } }
        }"#;

        let credentials = Credentials::from_json(raw).expect("credentials should parse");

        assert_eq!(credentials.account.access_key_id, "AKLT-test");
        assert_eq!(
            credentials
                .account
                .secret_key
                .as_ref()
                .map(|s| s.expose_secret().to_string()),
            Some("sk-test".to_string())
        );
        assert_eq!(credentials.rtc.app_id, "app-123");
        let meta = credentials.scenes.get("Custom").expect("scene meta present");
        assert_eq!(meta.name.as_deref(), Some("Custom Bot"));
        assert_eq!(meta.bot_user_id.as_deref(), Some("bot_custom"));
        assert_eq!(meta.task_id, None);
    }

    #[test]
    fn test_credentials_partial_file_loads() {
        let credentials =
            Credentials::from_json(r#"{ "RTCConfig": { "AppId": "only-app" } }"#)
                .expect("partial credentials should parse");

        assert_eq!(credentials.rtc.app_id, "only-app");
        assert!(credentials.rtc.app_key.is_none());
        assert!(credentials.account.access_key_id.is_empty());
        assert!(credentials.account.secret_key.is_none());
        assert!(credentials.scenes.is_empty());
    }

    #[test]
    fn test_credentials_malformed_json() {
        let result = Credentials::from_json("{ not json");
        assert!(matches!(result, Err(ConfigError::CredentialsMalformed { .. })));
    }

    #[test]
    fn test_credentials_missing_file_degrades_to_default() {
        let credentials =
            Credentials::load_or_default(Path::new("/nonexistent/vc/credentials.json"));
        assert!(credentials.rtc.app_id.is_empty());
        assert!(credentials.account.secret_key.is_none());
    }

    #[test]
    fn test_credentials_debug_redacts_secrets() {
        let raw = r#"{
            "AccountConfig": { "accessKeyId": "AKLT-visible", "secretKey": "account-secret-value" },
            "RTCConfig": { "AppId": "app-123", "AppKey": "app-key-secret-value" }
        }"#;
        let credentials = Credentials::from_json(raw).expect("credentials should parse");

        let debug = format!("{:?}", credentials);
        assert!(debug.contains("AKLT-visible"));
        assert!(!debug.contains("account-secret-value"));
        assert!(!debug.contains("app-key-secret-value"));
    }
}
