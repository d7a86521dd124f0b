//! Signed upstream OpenAPI transport.
//!
//! Builds `POST <endpoint>?Action=..&Version=..` requests, signs them with
//! the account key chain and sends them over HTTP. Upstream response bodies
//! are returned as-is together with their status; only transport failures
//! and non-JSON bodies become errors.
//!
//! # Security
//!
//! - The `Authorization` header and secret key are never logged
//! - Timeouts prevent hanging connections
//! - Transport errors are logged server-side, clients get a generic message

use crate::config::{Config, ConfigError};
use crate::crypto::sha256_hex;
use crate::crypto::signer::{self, SigningCredentials, UnsignedRequest};
use crate::errors::VcError;
use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use serde_json::Value;
use std::time::Duration;
use tracing::{error, instrument, warn};

/// Connect timeout for upstream requests in seconds.
const UPSTREAM_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Where signed calls go and which scope they are signed for.
#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    pub endpoint: Url,
    pub region: String,
    pub service: String,
}

impl UpstreamSettings {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let endpoint = Url::parse(&config.upstream_url).map_err(|e| {
            ConfigError::InvalidUpstreamUrl(format!("'{}': {}", config.upstream_url, e))
        })?;
        Ok(Self {
            endpoint,
            region: config.upstream_region.clone(),
            service: config.upstream_service.clone(),
        })
    }

    /// `host[:port]` as it appears in the Host header.
    fn authority(&self) -> String {
        let host = self.endpoint.host_str().unwrap_or_default();
        match self.endpoint.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }
}

/// A fully signed request, ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedUpstreamRequest {
    pub method: String,
    pub host: String,
    pub action: String,
    pub version: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// Hex HMAC, also embedded in the `Authorization` header.
    pub signature: String,
    /// `X-Date` value the signature was computed for.
    pub timestamp: String,
    pub credential_scope: String,
}

impl SignedUpstreamRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn body_json(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

/// Status and JSON body as returned by the upstream.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: Value,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Serialize `body`, sign it and produce the outbound request.
pub fn build_signed_request(
    settings: &UpstreamSettings,
    credentials: &SigningCredentials,
    action: &str,
    version: &str,
    body: &Value,
    timestamp: DateTime<Utc>,
) -> Result<SignedUpstreamRequest, VcError> {
    let body = serde_json::to_vec(body).map_err(|e| {
        error!(target: "vc.upstream", error = %e, "Failed to serialize upstream body");
        VcError::Internal
    })?;

    let host = settings.authority();
    let path = match settings.endpoint.path() {
        "" => "/".to_string(),
        path => path.to_string(),
    };
    let query = vec![
        ("Action".to_string(), action.to_string()),
        ("Version".to_string(), version.to_string()),
    ];
    let mut headers = vec![
        ("Content-Type".to_string(), "application/json".to_string()),
        ("Host".to_string(), host.clone()),
        ("X-Date".to_string(), signer::format_timestamp(timestamp)),
        ("X-Content-Sha256".to_string(), sha256_hex(&body)),
    ];

    let unsigned = UnsignedRequest {
        method: "POST".to_string(),
        host: host.clone(),
        path: path.clone(),
        query: query.clone(),
        headers: headers.clone(),
        body,
    };
    let signature = signer::sign(
        &unsigned,
        credentials,
        &settings.region,
        &settings.service,
        timestamp,
    )?;
    headers.push(("Authorization".to_string(), signature.authorization.clone()));

    // Send the query exactly as it was canonicalized so the signature holds.
    let url = format!(
        "{}://{}{}?{}",
        settings.endpoint.scheme(),
        host,
        path,
        signer::canonical_query(&query)
    );

    Ok(SignedUpstreamRequest {
        method: unsigned.method,
        host,
        action: action.to_string(),
        version: version.to_string(),
        url,
        headers,
        body: unsigned.body,
        signature: signature.signature,
        timestamp: signature.timestamp,
        credential_scope: signature.credential_scope,
    })
}

/// Trait for upstream calls (enables mocking).
#[async_trait::async_trait]
pub trait UpstreamTransport: Send + Sync {
    async fn send(&self, request: &SignedUpstreamRequest) -> Result<UpstreamResponse, VcError>;
}

/// HTTP transport backed by `reqwest`.
#[derive(Clone)]
pub struct HttpUpstream {
    client: Client,
}

impl HttpUpstream {
    /// # Errors
    ///
    /// Returns `VcError::Internal` if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, VcError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(UPSTREAM_CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                error!(target: "vc.upstream", error = %e, "Failed to build HTTP client");
                VcError::Internal
            })?;

        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl UpstreamTransport for HttpUpstream {
    #[instrument(skip_all, fields(action = %request.action))]
    async fn send(&self, request: &SignedUpstreamRequest) -> Result<UpstreamResponse, VcError> {
        let mut builder = self.client.post(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .body(request.body.clone())
            .send()
            .await
            .map_err(|e| VcError::Upstream(format!("request failed: {e}")))?;

        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| VcError::Upstream(format!("failed to read response body: {e}")))?;

        let body: Value = serde_json::from_slice(&bytes).map_err(|e| {
            VcError::Upstream(format!("non-JSON response (status {status}): {e}"))
        })?;

        if !(200..300).contains(&status) {
            warn!(target: "vc.upstream", status = status, "Upstream returned error payload");
        }

        Ok(UpstreamResponse { status, body })
    }
}

/// Mock upstream module for testing.
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Mutex, PoisonError};

    /// Records every request and answers with a canned response.
    pub struct MockUpstream {
        response: UpstreamResponse,
        requests: Mutex<Vec<SignedUpstreamRequest>>,
        call_count: AtomicUsize,
        return_error: bool,
    }

    impl MockUpstream {
        /// Always answer 200 with `body`.
        pub fn responding(body: Value) -> Self {
            Self::with_status(200, body)
        }

        pub fn with_status(status: u16, body: Value) -> Self {
            Self {
                response: UpstreamResponse { status, body },
                requests: Mutex::new(Vec::new()),
                call_count: AtomicUsize::new(0),
                return_error: false,
            }
        }

        /// Every call fails at the transport level.
        pub fn failing() -> Self {
            Self {
                return_error: true,
                ..Self::responding(Value::Null)
            }
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        /// Requests received so far, oldest first.
        pub fn requests(&self) -> Vec<SignedUpstreamRequest> {
            self.requests
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        pub fn last_request(&self) -> Option<SignedUpstreamRequest> {
            self.requests().pop()
        }
    }

    #[async_trait::async_trait]
    impl UpstreamTransport for MockUpstream {
        async fn send(
            &self,
            request: &SignedUpstreamRequest,
        ) -> Result<UpstreamResponse, VcError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            self.requests
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(request.clone());

            if self.return_error {
                return Err(VcError::Upstream("Mock upstream error".to_string()));
            }
            Ok(self.response.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use secrecy::SecretString;
    use serde_json::json;
    use wiremock::matchers::{header, header_exists, method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credentials() -> SigningCredentials {
        SigningCredentials {
            access_key_id: "AKTEST".to_string(),
            secret_key: SecretString::from("secret-test-key"),
        }
    }

    fn settings(endpoint: &str) -> UpstreamSettings {
        UpstreamSettings {
            endpoint: Url::parse(endpoint).unwrap(),
            region: "cn-north-1".to_string(),
            service: "rtc".to_string(),
        }
    }

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 8, 30, 0).unwrap()
    }

    #[test]
    fn test_build_signed_request_layout() {
        let request = build_signed_request(
            &settings("https://rtc.volcengineapi.com"),
            &credentials(),
            "StartVoiceChat",
            "2025-06-01",
            &json!({ "AppId": "app" }),
            fixed_time(),
        )
        .unwrap();

        assert_eq!(
            request.url,
            "https://rtc.volcengineapi.com/?Action=StartVoiceChat&Version=2025-06-01"
        );
        assert_eq!(request.header("host"), Some("rtc.volcengineapi.com"));
        assert_eq!(request.header("x-date"), Some("20250601T083000Z"));
        assert_eq!(request.header("content-type"), Some("application/json"));
        assert_eq!(
            request.header("x-content-sha256"),
            Some(sha256_hex(&request.body).as_str())
        );

        let authorization = request.header("authorization").unwrap();
        assert!(authorization
            .starts_with("HMAC-SHA256 Credential=AKTEST/20250601/cn-north-1/rtc/request, "));
        assert!(authorization
            .contains("SignedHeaders=content-type;host;x-content-sha256;x-date, "));
        assert!(!authorization.contains("secret-test-key"));
        assert!(authorization.ends_with(&format!("Signature={}", request.signature)));
        assert_eq!(request.timestamp, "20250601T083000Z");
        assert_eq!(request.credential_scope, "20250601/cn-north-1/rtc/request");
        assert_eq!(request.version, "2025-06-01");
        assert_eq!(request.body_json(), Some(json!({ "AppId": "app" })));
    }

    #[test]
    fn test_build_signed_request_keeps_port_in_host() {
        let request = build_signed_request(
            &settings("http://127.0.0.1:8089"),
            &credentials(),
            "StopVoiceChat",
            "2025-06-01",
            &json!({}),
            fixed_time(),
        )
        .unwrap();

        assert_eq!(request.header("host"), Some("127.0.0.1:8089"));
        assert!(request.url.starts_with("http://127.0.0.1:8089/?"));
    }

    #[test]
    fn test_build_signed_request_is_deterministic() {
        let build = || {
            build_signed_request(
                &settings("https://rtc.volcengineapi.com"),
                &credentials(),
                "StartVoiceChat",
                "2025-06-01",
                &json!({ "RoomId": "r1" }),
                fixed_time(),
            )
            .unwrap()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn test_build_signed_request_rejects_missing_secret() {
        let credentials = SigningCredentials {
            access_key_id: "AKTEST".to_string(),
            secret_key: SecretString::from(""),
        };
        let result = build_signed_request(
            &settings("https://rtc.volcengineapi.com"),
            &credentials,
            "StartVoiceChat",
            "2025-06-01",
            &json!({}),
            fixed_time(),
        );
        assert!(matches!(result, Err(VcError::Validation(_))));
    }

    #[tokio::test]
    async fn test_http_upstream_forwards_signed_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(query_param("Action", "StartVoiceChat"))
            .and(query_param("Version", "2025-06-01"))
            .and(header("content-type", "application/json"))
            .and(header_exists("authorization"))
            .and(header_exists("x-date"))
            .and(header_exists("x-content-sha256"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Result": "ok" })))
            .expect(1)
            .mount(&server)
            .await;

        let request = build_signed_request(
            &settings(&server.uri()),
            &credentials(),
            "StartVoiceChat",
            "2025-06-01",
            &json!({ "RoomId": "r1" }),
            Utc::now(),
        )
        .unwrap();

        let upstream = HttpUpstream::new(Duration::from_secs(5)).unwrap();
        let response = upstream.send(&request).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, json!({ "Result": "ok" }));
    }

    #[tokio::test]
    async fn test_http_upstream_returns_error_payload_verbatim() {
        let server = MockServer::start().await;
        let payload = json!({
            "ResponseMetadata": { "Error": { "Code": "InvalidParameter", "Message": "bad room" } }
        });
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(payload.clone()))
            .mount(&server)
            .await;

        let request = build_signed_request(
            &settings(&server.uri()),
            &credentials(),
            "StartVoiceChat",
            "2025-06-01",
            &json!({}),
            Utc::now(),
        )
        .unwrap();

        let response = HttpUpstream::new(Duration::from_secs(5))
            .unwrap()
            .send(&request)
            .await
            .unwrap();
        assert_eq!(response.status, 400);
        assert!(!response.is_success());
        assert_eq!(response.body, payload);
    }

    #[tokio::test]
    async fn test_http_upstream_non_json_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
            .mount(&server)
            .await;

        let request = build_signed_request(
            &settings(&server.uri()),
            &credentials(),
            "StopVoiceChat",
            "2025-06-01",
            &json!({}),
            Utc::now(),
        )
        .unwrap();

        let result = HttpUpstream::new(Duration::from_secs(5))
            .unwrap()
            .send(&request)
            .await;
        assert!(matches!(result, Err(VcError::Upstream(_))));
    }

    #[tokio::test]
    async fn test_mock_upstream_records_requests() {
        let mock = mock::MockUpstream::responding(json!({ "ok": true }));
        let request = build_signed_request(
            &settings("https://rtc.volcengineapi.com"),
            &credentials(),
            "ListRooms",
            "2025-06-01",
            &json!({}),
            fixed_time(),
        )
        .unwrap();

        mock.send(&request).await.unwrap();
        assert_eq!(mock.call_count(), 1);
        assert_eq!(mock.last_request().unwrap().action, "ListRooms");
    }
}
