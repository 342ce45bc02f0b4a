//! HTTP front end: token form, push trigger and token management.

pub mod api;
pub mod pages;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::CorsLayer;

pub use api::{AppState, SharedState};

use crate::push::PushOrchestrator;

/// Configuration for the HTTP server.
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub dev_mode: bool,
    pub github_api_base: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            dev_mode: false,
            github_api_base: crate::connectors::github::DEFAULT_API_BASE_URL.to_string(),
        }
    }
}

impl ServerConfig {
    /// Dev mode listens on every interface so the form is reachable from a container host.
    pub fn bind_host(&self) -> &str {
        if self.dev_mode { "0.0.0.0" } else { &self.host }
    }
}

/// Build the full application router.
pub fn build_router(state: SharedState, dev_mode: bool) -> Router {
    let app = api::api_router().with_state(state);
    if dev_mode {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

/// Bind the listener and serve until Ctrl+C.
///
/// `on_bound` runs once the socket is bound, with the actual local address.
pub async fn start_server<F>(
    config: ServerConfig,
    orchestrator: Arc<PushOrchestrator>,
    on_bound: F,
) -> Result<()>
where
    F: FnOnce(SocketAddr),
{
    let state = Arc::new(AppState {
        orchestrator,
        github_api_base: config.github_api_base.clone(),
    });
    let app = build_router(state, config.dev_mode);

    let addr = format!("{}:{}", config.bind_host(), config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    tracing::info!(addr = %local_addr, dev_mode = config.dev_mode, "CoPri server listening");
    on_bound(local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received");
}
