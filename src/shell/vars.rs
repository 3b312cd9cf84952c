//! Process-wide variables and aliases, and the per-invocation scope.
//!
//! Variable keys always carry the marker prefix (`$name`). The store is
//! shared by every session; when a state file is configured, each change
//! is written back to it as JSON.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::ffi::OsString;
use std::sync::{Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use crate::error::{ConsoleError, Result};

/// Default variable marker.
pub const DEFAULT_MARKER: char = '$';

/// On-disk form of the store.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedState {
    #[serde(default)]
    variables: BTreeMap<String, String>,
    #[serde(default)]
    aliases: BTreeMap<String, String>,
}

/// Shared variables and alias definitions.
#[derive(Debug)]
pub struct VariableStore {
    marker: char,
    variables: RwLock<BTreeMap<String, String>>,
    aliases: RwLock<BTreeMap<String, String>>,
    state_file: Option<PathBuf>,
    /// Held across snapshot and write so saves land whole and in order.
    save_lock: Mutex<()>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl VariableStore {
    /// In-memory store.
    pub fn new(marker: char) -> Self {
        Self {
            marker,
            variables: RwLock::default(),
            aliases: RwLock::default(),
            state_file: None,
            save_lock: Mutex::new(()),
        }
    }

    /// Store backed by `path`. A missing file starts empty.
    pub fn open(marker: char, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str::<PersistedState>(&content).map_err(|e| {
                ConsoleError::State(format!("{}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => PersistedState::default(),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(
            path = %path.display(),
            variables = state.variables.len(),
            aliases = state.aliases.len(),
            "loaded shell state"
        );

        let variables = state
            .variables
            .into_iter()
            .map(|(k, v)| (normalize(marker, &k), v))
            .collect();

        Ok(Self {
            marker,
            variables: RwLock::new(variables),
            aliases: RwLock::new(state.aliases),
            state_file: Some(path),
            save_lock: Mutex::new(()),
        })
    }

    pub fn marker(&self) -> char {
        self.marker
    }

    pub fn state_file(&self) -> Option<&Path> {
        self.state_file.as_deref()
    }

    /// Prefix `name` with the marker unless it already has it.
    pub fn key(&self, name: &str) -> String {
        normalize(self.marker, name)
    }

    pub fn get(&self, name: &str) -> Option<String> {
        read(&self.variables).get(&self.key(name)).cloned()
    }

    pub fn set(&self, name: &str, value: &str) {
        write(&self.variables).insert(self.key(name), value.to_string());
        self.persist();
    }

    /// Remove a variable; returns whether it existed.
    pub fn unset(&self, name: &str) -> bool {
        let removed = write(&self.variables).remove(&self.key(name)).is_some();
        if removed {
            self.persist();
        }
        removed
    }

    /// All variables, sorted by key.
    pub fn variables(&self) -> Vec<(String, String)> {
        read(&self.variables)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn alias(&self, name: &str) -> Option<String> {
        read(&self.aliases).get(name).cloned()
    }

    pub fn set_alias(&self, name: &str, replacement: &str) {
        write(&self.aliases).insert(name.to_string(), replacement.to_string());
        self.persist();
    }

    pub fn unset_alias(&self, name: &str) -> bool {
        let removed = write(&self.aliases).remove(name).is_some();
        if removed {
            self.persist();
        }
        removed
    }

    /// All aliases, sorted by name.
    pub fn aliases(&self) -> Vec<(String, String)> {
        read(&self.aliases)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Write the current state to the state file, if one is configured.
    ///
    /// The file is replaced atomically through a sibling temp file.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.state_file else {
            return Ok(());
        };
        let _saving = self.save_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let state = PersistedState {
            variables: read(&self.variables).clone(),
            aliases: read(&self.aliases).clone(),
        };
        let json = serde_json::to_string_pretty(&state)
            .map_err(|e| ConsoleError::State(e.to_string()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = temp_path(path);
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    fn persist(&self) {
        if let Err(e) = self.save() {
            tracing::warn!(error = %e, "failed to persist shell state");
        }
    }
}

impl Default for VariableStore {
    fn default() -> Self {
        Self::new(DEFAULT_MARKER)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("state"));
    name.push(".tmp");
    path.with_file_name(name)
}

fn normalize(marker: char, name: &str) -> String {
    if name.starts_with(marker) {
        name.to_string()
    } else {
        format!("{marker}{name}")
    }
}

/// Variables visible to one top-level execution only: positional
/// arguments and their count.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    values: HashMap<String, String>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scope holding `$1..$n`, `$#` and `$*` for `args`.
    pub fn positional(marker: char, args: &[String]) -> Self {
        let mut values = HashMap::new();
        for (i, arg) in args.iter().enumerate() {
            values.insert(format!("{marker}{}", i + 1), arg.clone());
        }
        values.insert(format!("{marker}#"), args.len().to_string());
        values.insert(format!("{marker}*"), args.join(" "));
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
