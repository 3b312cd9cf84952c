//! Terminal geometry negotiated by the client.

use serde::{Deserialize, Serialize};

/// Terminal requested with a `pty_req`. A session without one is
/// non-interactive: no echo, no newline translation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Terminal {
    /// Terminal type, e.g. `xterm-256color`.
    pub term: String,
    pub cols: u16,
    pub rows: u16,
}

impl Terminal {
    pub fn new(term: impl Into<String>, cols: u16, rows: u16) -> Self {
        Self {
            term: term.into(),
            cols: cols.max(1),
            rows: rows.max(1),
        }
    }

    /// Apply a window change. Returns whether the geometry differs.
    pub fn resize(&mut self, cols: u16, rows: u16) -> bool {
        let (cols, rows) = (cols.max(1), rows.max(1));
        let changed = (cols, rows) != (self.cols, self.rows);
        self.cols = cols;
        self.rows = rows;
        changed
    }
}

impl Default for Terminal {
    fn default() -> Self {
        Self::new("xterm", 80, 24)
    }
}
