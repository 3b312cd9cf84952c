//! Expansion and dispatch of command lines.

use std::fmt;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use super::audit::{AuditEntry, AuditSink, TracingAudit};
use super::context::{Context, Invocation};
use super::expand;
use super::jobs::{JobStatus, JobTable, JobTracker};
use super::parse::{self, Redirect};
use super::registry::{Lookup, Registry};
use super::vars::VariableStore;
use crate::error::{ShellError, ShellResult};
use crate::input::completion::suggest;

/// Default limit on nested executions.
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Result of one top-level line.
#[derive(Debug)]
pub struct Outcome {
    /// Output of the stages that completed, joined with newlines.
    pub output: String,
    /// The error that stopped the line, if any.
    pub error: Option<ShellError>,
    pub duration: Duration,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn exit_code(&self) -> i32 {
        self.error.as_ref().map_or(0, ShellError::exit_code)
    }

    pub fn is_cancelled(&self) -> bool {
        self.error.as_ref().is_some_and(ShellError::is_cancelled)
    }

    /// Text shown to the user: output, then the error and any suggestions.
    pub fn render(&self) -> String {
        let mut text = self.output.clone();
        let Some(error) = &self.error else {
            return text;
        };
        if !text.is_empty() {
            text.push('\n');
        }
        match error {
            ShellError::Cancelled => text.push_str("^C"),
            error => text.push_str(&format!("error: {error}")),
        }
        if let ShellError::NotFound { suggestions, .. } = error {
            if !suggestions.is_empty() {
                text.push_str(&format!("\ndid you mean: {}?", suggestions.join(", ")));
            }
        }
        text
    }
}

/// The command interpreter shared by every session.
///
/// Cheap to clone; all state is behind `Arc`s.
#[derive(Clone)]
pub struct Shell {
    registry: Arc<Registry>,
    vars: Arc<VariableStore>,
    jobs: Arc<dyn JobTracker>,
    audit: Arc<dyn AuditSink>,
    max_depth: usize,
}

impl fmt::Debug for Shell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shell")
            .field("commands", &self.registry.len())
            .field("max_depth", &self.max_depth)
            .finish_non_exhaustive()
    }
}

impl Shell {
    pub fn new(registry: Arc<Registry>, vars: Arc<VariableStore>) -> Self {
        Self {
            registry,
            vars,
            jobs: Arc::new(JobTable::new()),
            audit: Arc::new(TracingAudit),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_jobs(mut self, jobs: Arc<dyn JobTracker>) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn vars(&self) -> &VariableStore {
        &self.vars
    }

    pub fn jobs(&self) -> &dyn JobTracker {
        self.jobs.as_ref()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Run a line typed by the user and record it with the audit sink.
    ///
    /// Output of stages that finished before a failure is kept.
    pub fn run(&self, line: &str, invocation: &Invocation) -> Outcome {
        let started = Instant::now();
        let mut outputs = Vec::new();
        let result = self.execute_into(line, invocation, 0, &mut outputs);
        let outcome = Outcome {
            output: outputs.join("\n"),
            error: result.err(),
            duration: started.elapsed(),
        };

        if !line.trim().is_empty() {
            self.audit.record(&AuditEntry::new(
                invocation.user(),
                line,
                outcome.duration,
                outcome.is_success(),
                &outcome.render(),
            ));
        }
        outcome
    }

    /// Run a line at nesting `depth` and return its output.
    pub fn execute(&self, line: &str, invocation: &Invocation, depth: usize) -> ShellResult<String> {
        let mut outputs = Vec::new();
        self.execute_into(line, invocation, depth, &mut outputs)?;
        Ok(outputs.join("\n"))
    }

    fn execute_into(
        &self,
        line: &str,
        invocation: &Invocation,
        depth: usize,
        outputs: &mut Vec<String>,
    ) -> ShellResult<()> {
        if depth > self.max_depth {
            tracing::debug!(depth, max = self.max_depth, "expansion depth exceeded");
            return Err(ShellError::DepthExceeded {
                max: self.max_depth,
            });
        }
        check_cancelled(invocation.cancel())?;

        let expanded = expand::expand(self, line, invocation, depth)?;
        for stage in parse::split_sequence(&expanded)? {
            check_cancelled(invocation.cancel())?;
            let output = self.run_stage(&stage, invocation, depth)?;
            if !output.is_empty() {
                outputs.push(output);
            }
        }
        Ok(())
    }

    fn run_stage(&self, stage: &str, invocation: &Invocation, depth: usize) -> ShellResult<String> {
        let (body, background) = parse::strip_background(stage)?;
        if background {
            if body.is_empty() {
                return Err(ShellError::Parse("empty background command".into()));
            }
            return self.spawn_background(body, invocation, depth);
        }

        let segments = parse::split_pipeline(&body)?;
        let last = segments.len() - 1;
        let mut stdin = None;
        let mut redirect = None;

        for (i, segment) in segments.iter().enumerate() {
            if i > 0 {
                check_cancelled(invocation.cancel())?;
            }
            let command = if i == last {
                let (command, target) = parse::parse_redirect(segment)?;
                redirect = target;
                command
            } else {
                segment.clone()
            };
            let words = parse::tokenize(&command)?;
            if words.is_empty() {
                return Err(ShellError::Parse("empty command".into()));
            }
            stdin = Some(self.dispatch(&words, invocation, depth, stdin.take())?);
        }

        let output = stdin.unwrap_or_default();
        match redirect {
            Some(redirect) => {
                write_redirect(&redirect, &output)?;
                Ok(String::new())
            }
            None => Ok(output),
        }
    }

    fn dispatch(
        &self,
        words: &[String],
        invocation: &Invocation,
        depth: usize,
        stdin: Option<String>,
    ) -> ShellResult<String> {
        match self.registry.lookup(words) {
            Lookup::Leaf { command, consumed } => {
                tracing::trace!(command = command.name(), depth, "dispatching");
                let mut ctx = Context::new(self, invocation, depth, stdin);
                command.invoke(&mut ctx, &words[consumed..])
            }
            Lookup::Namespace(ns) => Err(ShellError::Usage(ns.usage())),
            Lookup::NotFound { name, scope } => {
                let last = name.rsplit(' ').next().unwrap_or(&name);
                let suggestions = suggest(last, scope);
                Err(ShellError::NotFound { name, suggestions })
            }
        }
    }

    /// Hand a stage to the job tracker and run it on its own thread, one
    /// level deeper than the line that started it.
    fn spawn_background(
        &self,
        body: String,
        invocation: &Invocation,
        depth: usize,
    ) -> ShellResult<String> {
        let depth = depth + 1;
        if depth > self.max_depth {
            return Err(ShellError::DepthExceeded {
                max: self.max_depth,
            });
        }
        let cancel = CancellationToken::new();
        let id = self.jobs.register(&body, cancel.clone());
        let shell = self.clone();
        let invocation = invocation.with_cancel(cancel);
        let line = body.clone();

        let spawned = std::thread::Builder::new()
            .name(format!("job-{id}"))
            .spawn(move || {
                let status = match shell.execute(&line, &invocation, depth) {
                    Ok(output) => {
                        tracing::debug!(job = id, bytes = output.len(), "job output discarded");
                        JobStatus::Done
                    }
                    Err(ShellError::Cancelled) => JobStatus::Cancelled,
                    Err(e) => {
                        tracing::debug!(job = id, error = %e, "job failed");
                        JobStatus::Failed
                    }
                };
                shell.jobs.finish(id, status);
            });

        if let Err(e) = spawned {
            self.jobs.finish(id, JobStatus::Failed);
            return Err(e.into());
        }
        Ok(format!("[{id}] {body}"))
    }
}

fn check_cancelled(cancel: &CancellationToken) -> ShellResult<()> {
    if cancel.is_cancelled() {
        Err(ShellError::Cancelled)
    } else {
        Ok(())
    }
}

fn write_redirect(redirect: &Redirect, output: &str) -> ShellResult<()> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .append(redirect.append)
        .truncate(!redirect.append)
        .open(&redirect.path)?;
    file.write_all(output.as_bytes())?;
    if !output.is_empty() && !output.ends_with('\n') {
        file.write_all(b"\n")?;
    }
    Ok(())
}
