//! HTTP routes for the voice chat proxy.
//!
//! Defines the Axum router and application state.

use crate::config::{Config, ConfigError, Credentials};
use crate::handlers;
use crate::middleware::http_metrics_middleware;
use crate::repositories::{InMemorySessionStore, SceneRegistry, SessionStore};
use crate::services::{ActionProxy, SceneLister, UpstreamSettings, UpstreamTransport};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Session identities, shared by the proxy and the lister.
    pub sessions: Arc<dyn SessionStore>,

    pub action_proxy: Arc<ActionProxy>,

    pub scene_lister: Arc<SceneLister>,
}

impl AppState {
    /// Wire the services around one shared session store.
    pub fn new(
        config: Config,
        credentials: Credentials,
        scenes: SceneRegistry,
        upstream: Arc<dyn UpstreamTransport>,
    ) -> Result<Self, ConfigError> {
        let settings = UpstreamSettings::from_config(&config)?;
        let credentials = Arc::new(credentials);
        let scenes = Arc::new(scenes);
        let sessions: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());

        let action_proxy = Arc::new(ActionProxy::new(
            credentials.clone(),
            scenes.clone(),
            sessions.clone(),
            upstream,
            settings,
            config.default_version.clone(),
        ));
        let scene_lister = Arc::new(SceneLister::new(credentials, scenes, sessions.clone()));

        Ok(Self {
            config,
            sessions,
            action_proxy,
            scene_lister,
        })
    }
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/proxy` - Signed upstream action proxy
/// - `/getScenes` - Scene list with RTC join parameters (GET or POST)
/// - `/health` - Liveness probe (simple "OK")
/// - `/metrics` - Prometheus metrics endpoint
/// - Permissive CORS for browser clients
/// - TraceLayer for request logging
/// - HTTP metrics middleware
/// - 30 second request timeout
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let api_routes = Router::new()
        .route("/proxy", post(handlers::proxy_action))
        .route(
            "/getScenes",
            get(handlers::get_scenes).post(handlers::get_scenes),
        )
        .route("/health", get(handlers::health_check))
        .with_state(state);

    // Metrics route with its own state
    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (innermost)
    // 2. TraceLayer - Log request details
    // 3. CorsLayer - Answer preflights before tracing/timeout
    // 4. http_metrics_middleware - Record ALL responses (outermost)
    api_routes
        .merge(metrics_routes)
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(middleware::from_fn(http_metrics_middleware))
}
