//! Error types for console-session.
//!
//! Errors are split by tier. [`ConsoleError`] covers the session and
//! transport layer: anything that ends a session or rejects a connection.
//! [`ShellError`] covers a single dispatch: it becomes that command's result
//! and the session carries on to its next prompt.

use thiserror::Error;

/// Session and transport error.
#[derive(Error, Debug)]
pub enum ConsoleError {
    /// Session with the given ID was not found.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// A connection cap would be exceeded by admitting another session.
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// Invalid state transition attempted.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        from: crate::session::SessionState,
        to: crate::session::SessionState,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal lock was poisoned.
    #[error("internal lock poisoned")]
    LockPoisoned,

    /// The peer side of a session channel went away.
    #[error("channel closed")]
    ChannelClosed,

    /// Malformed channel request or unexpected request order.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Persisted state could not be loaded or saved.
    #[error("state file error: {0}")]
    State(String),
}

/// Convenience Result type for session and transport operations.
pub type Result<T> = std::result::Result<T, ConsoleError>;

/// Error produced by expanding or dispatching one command line.
#[derive(Error, Debug)]
pub enum ShellError {
    /// No registry entry matches the command name.
    #[error("command not found: {name}")]
    NotFound {
        name: String,
        /// Closest registry names, best first.
        suggestions: Vec<String>,
    },

    /// Bad argument count or malformed arguments.
    #[error("usage: {0}")]
    Usage(String),

    /// Nested execution went deeper than the configured maximum.
    #[error("maximum expansion depth ({max}) exceeded")]
    DepthExceeded { max: usize },

    /// The execution signal was cancelled.
    #[error("cancelled")]
    Cancelled,

    /// The line could not be split into stages (unterminated quote, empty stage).
    #[error("parse error: {0}")]
    Parse(String),

    /// A command ran and reported failure.
    #[error("{0}")]
    Failed(String),

    /// I/O error, typically from output redirection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ShellError {
    /// Shorthand for a command failure with a message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Shorthand for a usage error.
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }

    /// Numeric status reported to exec-mode clients.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotFound { .. } => 127,
            Self::Usage(_) | Self::Parse(_) => 2,
            Self::DepthExceeded { .. } => 126,
            Self::Cancelled => 130,
            Self::Failed(_) | Self::Io(_) => 1,
        }
    }

    /// Whether this error came from the cancellation signal.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result type for a single dispatch.
pub type ShellResult<T> = std::result::Result<T, ShellError>;
