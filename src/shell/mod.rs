//! The command language: registry, expansion, and dispatch.
//!
//! A line typed at the prompt goes through [`Shell::run`]: aliases and
//! variables are expanded (see [`expand`]), the result is split into
//! `;`-separated stages and `|`-separated pipelines (see [`parse`]), and
//! each segment is dispatched to a [`registry::Command`].

pub mod audit;
pub mod builtins;
pub mod context;
pub mod engine;
pub mod expand;
pub mod jobs;
pub mod parse;
pub mod registry;
pub mod vars;

pub use audit::{AuditEntry, AuditSink, NoAudit, TracingAudit};
pub use context::{Context, Invocation};
pub use engine::{Outcome, Shell, DEFAULT_MAX_DEPTH};
pub use jobs::{JobId, JobInfo, JobStatus, JobTable, JobTracker};
pub use registry::{Command, Entry, Handler, Lookup, Namespace, Registry};
pub use vars::{Scope, VariableStore, DEFAULT_MARKER};
