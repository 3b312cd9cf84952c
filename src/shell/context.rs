//! Execution context handed to command handlers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use super::engine::Shell;
use super::jobs::JobTracker;
use super::registry::Registry;
use super::vars::{Scope, VariableStore};
use crate::error::{ShellError, ShellResult};

/// Granularity of cancellation checks while a handler sleeps.
const CANCEL_POLL: Duration = Duration::from_millis(10);

/// Everything a top-level execution carries through its nested calls:
/// who runs it, their environment, the cancellation signal, and the
/// invocation-scoped variables.
#[derive(Debug, Clone)]
pub struct Invocation {
    user: String,
    env: Arc<HashMap<String, String>>,
    cancel: CancellationToken,
    scope: Arc<Scope>,
}

impl Invocation {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            user: "anonymous".to_string(),
            env: Arc::default(),
            cancel,
            scope: Arc::default(),
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = Arc::new(env);
        self
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = Arc::new(scope);
        self
    }

    /// Same user, environment and scope under a different signal.
    pub fn with_cancel(&self, cancel: CancellationToken) -> Self {
        Self {
            cancel,
            ..self.clone()
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn env(&self) -> &HashMap<String, String> {
        &self.env
    }

    pub fn cancel(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Session environment first, then the process environment.
    pub fn env_var(&self, name: &str) -> Option<String> {
        self.env
            .get(name)
            .cloned()
            .or_else(|| std::env::var(name).ok())
    }
}

/// Per-dispatch context.
pub struct Context<'a> {
    shell: &'a Shell,
    invocation: &'a Invocation,
    depth: usize,
    stdin: Option<String>,
}

impl<'a> Context<'a> {
    pub(crate) fn new(
        shell: &'a Shell,
        invocation: &'a Invocation,
        depth: usize,
        stdin: Option<String>,
    ) -> Self {
        Self {
            shell,
            invocation,
            depth,
            stdin,
        }
    }

    /// Output of the previous pipeline segment, if any.
    pub fn stdin(&self) -> Option<&str> {
        self.stdin.as_deref()
    }

    pub fn take_stdin(&mut self) -> Option<String> {
        self.stdin.take()
    }

    pub fn user(&self) -> &str {
        self.invocation.user()
    }

    pub fn env(&self) -> &HashMap<String, String> {
        self.invocation.env()
    }

    pub fn invocation(&self) -> &Invocation {
        self.invocation
    }

    pub fn cancel(&self) -> &CancellationToken {
        self.invocation.cancel()
    }

    pub fn is_cancelled(&self) -> bool {
        self.invocation.cancel().is_cancelled()
    }

    /// `Err(Cancelled)` once the execution signal has fired.
    pub fn check_cancelled(&self) -> ShellResult<()> {
        if self.is_cancelled() {
            Err(ShellError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Nesting depth of this dispatch; 0 at top level.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Run a nested command line one level deeper.
    pub fn execute(&self, line: &str) -> ShellResult<String> {
        self.shell.execute(line, self.invocation, self.depth + 1)
    }

    /// Run a nested command line one level deeper with `scope` in place of
    /// the current invocation-scoped variables.
    pub fn execute_in(&self, line: &str, scope: Scope) -> ShellResult<String> {
        let invocation = self.invocation.clone().with_scope(scope);
        self.shell.execute(line, &invocation, self.depth + 1)
    }

    pub fn vars(&self) -> &VariableStore {
        self.shell.vars()
    }

    pub fn registry(&self) -> &Registry {
        self.shell.registry()
    }

    pub fn jobs(&self) -> &dyn JobTracker {
        self.shell.jobs()
    }

    /// Block for `duration`, returning early with `Cancelled` when the
    /// signal fires.
    pub fn sleep(&self, duration: Duration) -> ShellResult<()> {
        let deadline = Instant::now() + duration;
        loop {
            self.check_cancelled()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            std::thread::sleep(CANCEL_POLL.min(deadline - now));
        }
    }
}
