//! Router construction and the HTTP serve loop.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use facelens_utils::config::ServerSettings;
use log::{info, warn};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use crate::handlers;
use crate::state::AppState;

/// Build the application router.
///
/// CORS is fully permissive: any origin, method and header.
pub fn build_router(state: Arc<AppState>, settings: &ServerSettings) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/predict/", post(handlers::predict))
        .route("/predict", post(handlers::predict))
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(settings.max_upload_bytes))
        .layer(cors)
        .with_state(state)
}

/// Bind `settings.bind` and serve until Ctrl+C or SIGTERM.
pub async fn run(state: Arc<AppState>, settings: &ServerSettings) -> Result<()> {
    let listener = TcpListener::bind(&settings.bind)
        .await
        .with_context(|| format!("failed to bind {} - is another instance running?", settings.bind))?;
    let addr = listener
        .local_addr()
        .context("failed to read listener address")?;
    info!(
        "HTTP server listening on {addr} (strict status codes: {})",
        state.strict_status_codes
    );

    let app = build_router(state, settings);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;
    info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!("Failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutting down HTTP server...");
}
