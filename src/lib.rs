//! # console-session
//!
//! Interactive console sessions served over WebSocket.
//!
//! Each connection gets a session with a byte-level line editor (escape
//! decoding, history, tab completion) in front of a small command
//! language: aliases, variables, `;` sequencing, `|` pipelines, `>`
//! redirection and `&` background jobs, all dispatched to a registry of
//! in-process commands.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use console_session::session::{DriverConfig, ManagerConfig, SessionManager};
//! use console_session::shell::{builtins, Shell, VariableStore};
//! use console_session::transport::{serve, AppState, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> console_session::Result<()> {
//!     console_session::logging::try_init().ok();
//!
//!     let shell = Shell::new(
//!         Arc::new(builtins::registry()),
//!         Arc::new(VariableStore::default()),
//!     );
//!     let manager = Arc::new(SessionManager::new(ManagerConfig::default()));
//!     let _monitor = manager.spawn_monitor();
//!
//!     let state = AppState::new(manager, shell, DriverConfig::default());
//!     serve(ServerConfig::default(), state).await
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod input;
pub mod logging;
pub mod output;
pub mod session;
pub mod shell;
pub mod transport;

// Re-export commonly used types
pub use error::{ConsoleError, Result, ShellError, ShellResult};
pub use input::{Editor, EscapeDecoder, Key, LineBuffer};
pub use session::{SessionId, SessionManager, SessionState};
pub use shell::{Invocation, Outcome, Registry, Shell};
