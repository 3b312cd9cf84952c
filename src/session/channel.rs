//! Messages exchanged between a transport and a session driver.
//!
//! The transport decodes client frames into [`ChannelEvent`]s and encodes
//! [`ChannelOutput`]s back. Control traffic is JSON with a `type` tag:
//!
//! ```json
//! {"type": "pty_req", "term": "xterm-256color", "cols": 120, "rows": 40}
//! {"type": "exec", "command": "print hello"}
//! {"type": "exit_status", "code": 0}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

fn default_term() -> String {
    "xterm".to_string()
}

/// Request sent by the client over the control channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelRequest {
    /// Allocate a terminal. Enables echo, prompts and `\r\n` output.
    PtyReq {
        #[serde(default = "default_term")]
        term: String,
        cols: u16,
        rows: u16,
    },
    /// Set a session environment variable.
    Env { name: String, value: String },
    /// Terminal size changed.
    WindowChange { cols: u16, rows: u16 },
    /// Start the interactive shell.
    Shell,
    /// Run one line, report its status and close.
    Exec { command: String },
    /// The client will send no more input.
    Eof,
}

/// Inbound event for a session driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Request(ChannelRequest),
    /// Raw input bytes.
    Data(Vec<u8>),
    /// A client frame the transport could not decode.
    Malformed(String),
    /// The transport went away.
    Closed,
}

/// Control message sent to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatusMessage {
    /// Exec-mode result code.
    ExitStatus { code: i32 },
    Error { code: String, message: String },
    /// Last message on a channel.
    Closed { reason: String },
}

/// Outbound message from a session driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelOutput {
    /// Terminal bytes: echo, prompts and command output.
    Data(Vec<u8>),
    Status(StatusMessage),
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// The transport closed or the client sent `eof`.
    ClientClosed,
    /// Ctrl-D at an empty prompt.
    EndOfInput,
    /// An exec request finished.
    Exited,
    IdleTimeout,
    MaxDuration,
    /// Closed through the management API.
    Killed,
    Shutdown,
    ProtocolError,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CloseReason::ClientClosed => "client closed",
            CloseReason::EndOfInput => "end of input",
            CloseReason::Exited => "exited",
            CloseReason::IdleTimeout => "idle timeout",
            CloseReason::MaxDuration => "maximum duration reached",
            CloseReason::Killed => "killed",
            CloseReason::Shutdown => "server shutdown",
            CloseReason::ProtocolError => "protocol error",
        };
        f.write_str(text)
    }
}
