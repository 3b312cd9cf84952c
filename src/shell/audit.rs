//! Audit records for top-level command dispatches.

use std::time::Duration;

use crate::output::OutputSanitizer;

/// Longest output excerpt kept in an audit record, in characters.
pub const MAX_AUDIT_OUTPUT: usize = 256;

/// One executed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub user: String,
    pub command: String,
    pub duration: Duration,
    pub success: bool,
    /// Output with escape sequences removed, cut to [`MAX_AUDIT_OUTPUT`].
    pub output: String,
}

impl AuditEntry {
    pub fn new(
        user: impl Into<String>,
        command: impl Into<String>,
        duration: Duration,
        success: bool,
        output: &str,
    ) -> Self {
        Self {
            user: user.into(),
            command: command.into(),
            duration,
            success,
            output: OutputSanitizer::excerpt(output, MAX_AUDIT_OUTPUT),
        }
    }
}

/// Receives one entry per top-level dispatch.
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: &AuditEntry);
}

/// Writes audit entries as structured events on the `audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAudit;

impl AuditSink for TracingAudit {
    fn record(&self, entry: &AuditEntry) {
        tracing::info!(
            target: "audit",
            user = %entry.user,
            command = %entry.command,
            duration_ms = entry.duration.as_millis() as u64,
            success = entry.success,
            output = %entry.output,
            "command executed"
        );
    }
}

/// Discards every entry.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAudit;

impl AuditSink for NoAudit {
    fn record(&self, _entry: &AuditEntry) {}
}
