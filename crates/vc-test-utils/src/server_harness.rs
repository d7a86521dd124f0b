//! Test server harness for E2E testing
//!
//! Provides `TestProxyServer` for spawning real proxy instances in tests,
//! pointed at a mock upstream.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use vc_service::config::{Config, Credentials};
use vc_service::repositories::SceneRegistry;
use vc_service::routes::{self, AppState};
use vc_service::services::HttpUpstream;

/// Test harness for spawning the voice chat proxy in E2E tests.
///
/// # Example
/// ```rust,ignore
/// let upstream = wiremock::MockServer::start().await;
/// let server = TestProxyServer::spawn(&upstream.uri(), test_credentials(), demo_registry()).await?;
/// let response = reqwest::get(format!("{}/health", server.url())).await?;
/// assert_eq!(response.status(), 200);
/// ```
pub struct TestProxyServer {
    addr: SocketAddr,
    state: Arc<AppState>,
    _handle: JoinHandle<()>,
}

impl TestProxyServer {
    /// Spawn a server that signs and sends upstream calls to `upstream_url`.
    ///
    /// The server binds to a random available port (127.0.0.1:0) and runs
    /// in the background until dropped.
    pub async fn spawn(
        upstream_url: &str,
        credentials: Credentials,
        scenes: SceneRegistry,
    ) -> Result<Self, anyhow::Error> {
        let vars = HashMap::from([
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            ("VC_UPSTREAM_URL".to_string(), upstream_url.to_string()),
            ("VC_UPSTREAM_TIMEOUT_SECONDS".to_string(), "5".to_string()),
        ]);
        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let upstream = HttpUpstream::new(Duration::from_secs(config.upstream_timeout_seconds))
            .map_err(|e| anyhow::anyhow!("Failed to build upstream client: {}", e))?;
        let state = Arc::new(
            AppState::new(config, credentials, scenes, Arc::new(upstream))
                .map_err(|e| anyhow::anyhow!("Failed to build app state: {}", e))?,
        );

        // Recorder is not installed globally; tests only need a handle to render
        let metrics_handle = PrometheusBuilder::new().build_recorder().handle();
        let app = routes::build_routes(state.clone(), metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;
        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            state,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Shared application state, for inspecting stored sessions.
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }
}

impl Drop for TestProxyServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}
