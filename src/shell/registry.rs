//! Command registry: named leaf handlers and namespaces of further entries.
//!
//! The registry is built once at startup and shared behind an `Arc`. It is
//! never mutated afterwards, so lookups take no lock.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use super::context::Context;
use crate::error::ShellResult;

/// Something that can run a command.
///
/// Implemented for plain closures, so most commands are registered as
/// `Command::new("name", |ctx, args| { ... })`.
pub trait Handler: Send + Sync {
    /// Run with the dispatch context and the arguments after the command name.
    fn call(&self, ctx: &mut Context<'_>, args: &[String]) -> ShellResult<String>;
}

impl<F> Handler for F
where
    F: Fn(&mut Context<'_>, &[String]) -> ShellResult<String> + Send + Sync,
{
    fn call(&self, ctx: &mut Context<'_>, args: &[String]) -> ShellResult<String> {
        self(ctx, args)
    }
}

/// An invocable command.
#[derive(Clone)]
pub struct Command {
    name: String,
    aliases: Vec<String>,
    description: String,
    usage: String,
    min_args: usize,
    max_args: Option<usize>,
    handler: Arc<dyn Handler>,
}

impl Command {
    pub fn new(name: impl Into<String>, handler: impl Handler + 'static) -> Self {
        let name = name.into();
        Self {
            usage: name.clone(),
            name,
            aliases: Vec::new(),
            description: String::new(),
            min_args: 0,
            max_args: None,
            handler: Arc::new(handler),
        }
    }

    /// Add a short alias.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// One-line description for `help`.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Usage string (e.g. "grep [-v] [-i] <pattern>").
    pub fn usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = usage.into();
        self
    }

    /// Accepted argument count; `max = None` means unbounded.
    pub fn args(mut self, min: usize, max: Option<usize>) -> Self {
        self.min_args = min;
        self.max_args = max;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn usage_text(&self) -> &str {
        &self.usage
    }

    /// Check the argument count, then run the handler.
    pub fn invoke(&self, ctx: &mut Context<'_>, args: &[String]) -> ShellResult<String> {
        let too_many = self.max_args.is_some_and(|max| args.len() > max);
        if args.len() < self.min_args || too_many {
            return Err(crate::error::ShellError::Usage(self.usage.clone()));
        }
        self.handler.call(ctx, args)
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .finish_non_exhaustive()
    }
}

/// A named container of further entries (e.g. `job list`, `job kill`).
#[derive(Debug, Clone)]
pub struct Namespace {
    name: String,
    aliases: Vec<String>,
    description: String,
    entries: EntryMap,
}

impl Namespace {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            description: String::new(),
            entries: EntryMap::default(),
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add a child entry.
    pub fn with(mut self, entry: impl Into<Entry>) -> Self {
        self.entries.insert(entry.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Names of the direct children (aliases included).
    pub fn names(&self) -> Vec<&str> {
        self.entries.names()
    }

    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    /// Usage line listing the children.
    pub fn usage(&self) -> String {
        let children: Vec<&str> = self.entries.iter().map(Entry::name).collect();
        format!("{} <{}>", self.name, children.join("|"))
    }
}

/// A registry entry.
#[derive(Debug, Clone)]
pub enum Entry {
    Leaf(Command),
    Namespace(Namespace),
}

impl Entry {
    pub fn name(&self) -> &str {
        match self {
            Self::Leaf(cmd) => cmd.name(),
            Self::Namespace(ns) => ns.name(),
        }
    }

    pub fn aliases(&self) -> &[String] {
        match self {
            Self::Leaf(cmd) => &cmd.aliases,
            Self::Namespace(ns) => &ns.aliases,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Self::Leaf(cmd) => cmd.description(),
            Self::Namespace(ns) => ns.description(),
        }
    }
}

impl From<Command> for Entry {
    fn from(cmd: Command) -> Self {
        Self::Leaf(cmd)
    }
}

impl From<Namespace> for Entry {
    fn from(ns: Namespace) -> Self {
        Self::Namespace(ns)
    }
}

/// Entries keyed by name, with a short-alias index.
#[derive(Debug, Clone, Default)]
struct EntryMap {
    entries: BTreeMap<String, Entry>,
    aliases: HashMap<String, String>,
}

impl EntryMap {
    fn insert(&mut self, entry: Entry) {
        let name = entry.name().to_string();
        for alias in entry.aliases() {
            self.aliases.insert(alias.clone(), name.clone());
        }
        if self.entries.insert(name.clone(), entry).is_some() {
            tracing::debug!(command = %name, "replaced existing registry entry");
        }
    }

    fn get(&self, name: &str) -> Option<&Entry> {
        self.entries.get(name).or_else(|| {
            self.aliases
                .get(name)
                .and_then(|target| self.entries.get(target))
        })
    }

    fn names(&self) -> Vec<&str> {
        self.entries
            .keys()
            .chain(self.aliases.keys())
            .map(String::as_str)
            .collect()
    }

    fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }
}

/// Result of resolving a command path.
#[derive(Debug)]
pub enum Lookup<'r> {
    /// A leaf command; `consumed` words of the input named it.
    Leaf { command: &'r Command, consumed: usize },
    /// A namespace named without a child.
    Namespace(&'r Namespace),
    /// Nothing matches `name`; `scope` lists the names that were valid there.
    NotFound { name: String, scope: Vec<&'r str> },
}

/// The set of registered commands.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    root: EntryMap,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entry. Replaces any existing entry with the same name.
    pub fn register(&mut self, entry: impl Into<Entry>) {
        self.root.insert(entry.into());
    }

    /// Resolve the leading words of a command line.
    pub fn lookup<'r>(&'r self, words: &[String]) -> Lookup<'r> {
        let Some(first) = words.first() else {
            return Lookup::NotFound {
                name: String::new(),
                scope: self.names(),
            };
        };

        let mut scope = &self.root;
        let mut entry = match scope.get(first) {
            Some(entry) => entry,
            None => {
                return Lookup::NotFound {
                    name: first.clone(),
                    scope: scope.names(),
                }
            }
        };
        let mut consumed = 1;

        loop {
            match entry {
                Entry::Leaf(command) => return Lookup::Leaf { command, consumed },
                Entry::Namespace(ns) => {
                    let Some(next) = words.get(consumed) else {
                        return Lookup::Namespace(ns);
                    };
                    scope = &ns.entries;
                    entry = match scope.get(next) {
                        Some(child) => child,
                        None => {
                            return Lookup::NotFound {
                                name: words[..=consumed].join(" "),
                                scope: scope.names(),
                            }
                        }
                    };
                    consumed += 1;
                }
            }
        }
    }

    /// Top-level invocable names, aliases included.
    pub fn names(&self) -> Vec<&str> {
        self.root.names()
    }

    /// Names valid after the given leading words (for completing the
    /// second word of `job kill`, say). Empty when `path` is not a namespace.
    pub fn names_after(&self, path: &[String]) -> Vec<&str> {
        if path.is_empty() {
            return self.names();
        }
        match self.lookup(path) {
            Lookup::Namespace(ns) => ns.names(),
            _ => Vec::new(),
        }
    }

    /// Top-level entries in name order.
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.root.iter()
    }

    /// Find an entry by name or alias.
    pub fn get(&self, name: &str) -> Option<&Entry> {
        self.root.get(name)
    }

    pub fn len(&self) -> usize {
        self.root.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.entries.is_empty()
    }
}

impl crate::input::Candidates for Registry {
    fn candidates(&self, preceding: &[String]) -> Vec<String> {
        self.names_after(preceding)
            .into_iter()
            .map(String::from)
            .collect()
    }
}
