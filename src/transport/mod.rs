//! HTTP and WebSocket transport.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /api/v1` - Server information
//! - `GET /api/v1/sessions` - Live sessions
//! - `DELETE /api/v1/sessions/{id}` - Close a session
//! - `WS /api/v1/console` - Open a console session
//!
//! The console socket speaks the protocol in [`crate::session::channel`].
//! The user is taken from the `x-console-user` header.

pub mod handlers;
pub mod router;
pub mod types;
pub mod websocket;

pub use handlers::{user_from_headers, AppState, ANONYMOUS, USER_HEADER};
pub use router::{create_router, serve, ServerConfig};
pub use types::{ErrorResponse, ListSessionsResponse};
