//! Router and server entry point.

use std::net::SocketAddr;

use axum::{
    routing::{any, delete, get},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{api_info, health, kill_session, list_sessions, AppState};
use super::websocket::console_handler;
use crate::error::ConsoleError;

/// Build the router over `state`.
pub fn create_router(state: AppState) -> Router {
    let api_v1 = Router::new()
        .route("/", get(api_info))
        .route("/sessions", get(list_sessions))
        .route("/sessions/{id}", delete(kill_session))
        .route("/console", any(console_handler));

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_v1)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Listen address.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new("127.0.0.1", 3000)
    }
}

/// Serve until Ctrl-C or [`SessionManager::shutdown`](crate::session::SessionManager::shutdown).
///
/// Shutting down closes every session, so open sockets receive
/// `closed {reason: "server shutdown"}` before the server exits.
pub async fn serve(config: ServerConfig, state: AppState) -> crate::Result<()> {
    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Starting console-session server on {}", addr);

    let manager = state.manager.clone();
    let router = create_router(state);
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => tracing::info!("interrupt received, shutting down"),
            _ = manager.shutdown_token().cancelled() => {}
        }
        manager.shutdown();
    })
    .await
    .map_err(|e| ConsoleError::Io(std::io::Error::other(e.to_string())))?;

    Ok(())
}
