//! Interactive input handling.
//!
//! Bytes from the client pass through the [`decoder`] into keys, which the
//! [`editor`] applies to a [`line`] buffer with [`history`] and
//! [`completion`] support.

pub mod completion;
pub mod decoder;
pub mod editor;
pub mod history;
pub mod line;

pub use completion::{complete, suggest, Completion};
pub use decoder::{EscapeDecoder, Key, DEFAULT_ESCAPE_TIMEOUT};
pub use editor::{Action, Candidates, Editor, Step};
pub use history::{History, DEFAULT_HISTORY_SIZE};
pub use line::{LineBuffer, Submitted};
