//! HTTP handlers for health, info and session management.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};

use super::types::{api_error, ApiError, ListSessionsResponse};
use crate::session::{DriverConfig, SessionId, SessionManager};
use crate::shell::{builtins, Shell, VariableStore};

/// Header carrying the user name set by the fronting authenticator.
pub const USER_HEADER: &str = "x-console-user";

/// User assumed when no authenticator header is present.
pub const ANONYMOUS: &str = "anonymous";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SessionManager>,
    pub shell: Shell,
    pub driver: DriverConfig,
}

impl AppState {
    pub fn new(manager: Arc<SessionManager>, shell: Shell, driver: DriverConfig) -> Self {
        Self {
            manager,
            shell,
            driver,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        let shell = Shell::new(
            Arc::new(builtins::registry()),
            Arc::new(VariableStore::default()),
        );
        Self::new(
            Arc::new(SessionManager::default()),
            shell,
            DriverConfig::default(),
        )
    }
}

/// User named by the authenticator header, or [`ANONYMOUS`].
pub fn user_from_headers(headers: &HeaderMap) -> String {
    headers
        .get(USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|user| !user.is_empty())
        .unwrap_or(ANONYMOUS)
        .to_string()
}

pub async fn health() -> &'static str {
    "OK"
}

pub async fn api_info(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "console-session",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "sessions": state.manager.count(),
        "commands": state.shell.registry().len(),
    }))
}

pub async fn list_sessions(State(state): State<AppState>) -> Json<ListSessionsResponse> {
    let sessions = state.manager.list();
    Json(ListSessionsResponse {
        count: sessions.len(),
        sessions,
    })
}

/// Close a live session. The driver sends `closed {reason: "killed"}`.
pub async fn kill_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id: SessionId = id.parse().map_err(|e| api_error(&e))?;
    state.manager.kill(id).map_err(|e| api_error(&e))?;
    Ok(StatusCode::NO_CONTENT)
}
