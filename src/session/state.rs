//! Session lifecycle.

use serde::Serialize;

/// Where a session is in its lifecycle.
///
/// ```text
/// Negotiating ──shell──▶ Interactive ◀──▶ Executing
///      │                      │               │
///      └──exec──▶ Executing   └──────┬────────┘
///                                    ▼
///                                  Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Channel accepted; collecting terminal and environment requests.
    #[default]
    Negotiating,
    /// Shell running, waiting at the prompt.
    Interactive,
    /// A command line is running.
    Executing,
    /// Torn down. No further transitions.
    Closed,
}

impl SessionState {
    pub fn can_transition_to(&self, target: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (*self, target),
            (Negotiating, Interactive)
                | (Negotiating, Executing)
                | (Interactive, Executing)
                | (Executing, Interactive)
                | (Negotiating | Interactive | Executing, Closed)
        )
    }

    /// Move to `target`, or fail leaving the state unchanged.
    pub fn transition_to(&mut self, target: SessionState) -> crate::Result<()> {
        if self.can_transition_to(target) {
            *self = target;
            Ok(())
        } else {
            Err(crate::error::ConsoleError::InvalidStateTransition {
                from: *self,
                to: target,
            })
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, SessionState::Closed)
    }
}
