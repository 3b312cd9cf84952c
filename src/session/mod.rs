//! Console sessions.
//!
//! A [`SessionManager`] admits sessions against its caps and sweeps idle
//! ones. Each admitted session is handed to [`run_session`], which speaks
//! the [`channel`] protocol with the transport.

pub mod channel;
mod driver;
mod id;
mod manager;
mod state;
mod terminal;

pub use channel::{ChannelEvent, ChannelOutput, ChannelRequest, CloseReason, StatusMessage};
pub use driver::{run_session, DriverConfig};
pub use id::SessionId;
pub use manager::{ManagerConfig, Session, SessionGuard, SessionInfo, SessionManager};
pub use state::SessionState;
pub use terminal::Terminal;
