//! Voice Chat Proxy
//!
//! Entry point for the voice chat proxy service.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vc_service::config::{Config, Credentials};
use vc_service::observability::metrics::init_metrics_recorder;
use vc_service::repositories::SceneRegistry;
use vc_service::routes::{self, AppState};
use vc_service::services::HttpUpstream;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vc_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Voice Chat Proxy");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        upstream_url = %config.upstream_url,
        upstream_region = %config.upstream_region,
        default_version = %config.default_version,
        upstream_timeout_seconds = config.upstream_timeout_seconds,
        "Configuration loaded successfully"
    );

    // Missing credentials or scenes degrade the service instead of failing startup
    let credentials = Credentials::load_or_default(&config.credentials_path);
    let scenes = SceneRegistry::load(&config.scenes_dir, &credentials.scenes);
    if scenes.is_empty() {
        info!(scenes_dir = %config.scenes_dir.display(), "No scenes configured");
    }

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics recorder: {}", e);
        e
    })?;

    let upstream = HttpUpstream::new(Duration::from_secs(config.upstream_timeout_seconds))?;

    let bind_address = config.bind_address.clone();
    let state = Arc::new(AppState::new(
        config,
        credentials,
        scenes,
        Arc::new(upstream),
    )?);

    let app = routes::build_routes(state, metrics_handle);

    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("Voice Chat Proxy listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Voice Chat Proxy shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
