//! Configuration management for console-session.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cli::Args;
use crate::input::{DEFAULT_ESCAPE_TIMEOUT, DEFAULT_HISTORY_SIZE};
use crate::session::{DriverConfig, ManagerConfig};
use crate::shell::{Registry, Shell, VariableStore, DEFAULT_MARKER, DEFAULT_MAX_DEPTH};
use crate::transport::ServerConfig;

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerSection,
    pub limits: LimitsSection,
    pub shell: ShellSection,
    pub logging: LoggingSection,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Host address to bind to.
    pub host: String,
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// Session caps and timeouts. A zero timeout disables it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsSection {
    pub max_sessions: usize,
    pub max_sessions_per_user: usize,
    pub idle_timeout_secs: u64,
    pub max_session_secs: u64,
    pub monitor_tick_secs: u64,
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            max_sessions: 64,
            max_sessions_per_user: 8,
            idle_timeout_secs: 15 * 60,
            max_session_secs: 0,
            monitor_tick_secs: 10,
        }
    }
}

/// Command language and line editor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellSection {
    pub max_depth: usize,
    pub history_size: usize,
    pub escape_timeout_ms: u64,
    /// Prefix that marks a variable reference.
    pub marker: char,
    pub prompt: String,
    pub continuation_prompt: String,
    /// Where variables and aliases persist. In memory only when unset.
    pub state_file: Option<PathBuf>,
}

impl Default for ShellSection {
    fn default() -> Self {
        let driver = DriverConfig::default();
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            history_size: DEFAULT_HISTORY_SIZE,
            escape_timeout_ms: DEFAULT_ESCAPE_TIMEOUT.as_millis() as u64,
            marker: DEFAULT_MARKER,
            prompt: driver.prompt,
            continuation_prompt: driver.continuation_prompt,
            state_file: None,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace) or a full filter directive.
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    /// Apply overrides from `lookup`, which maps variable names to values.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("CONSOLE_SESSION_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("CONSOLE_SESSION_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(max) = lookup("CONSOLE_SESSION_MAX_SESSIONS").and_then(|m| m.parse().ok()) {
            self.limits.max_sessions = max;
        }
        if let Some(level) = lookup("CONSOLE_SESSION_LOG_LEVEL").or_else(|| lookup("RUST_LOG")) {
            self.logging.level = level;
        }
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(host) = args.host {
            self.server.host = host.to_string();
        }
        if let Some(port) = args.port {
            self.server.port = port;
        }
        if let Some(max) = args.max_sessions {
            self.limits.max_sessions = max;
        }
        if let Some(secs) = args.idle_timeout {
            self.limits.idle_timeout_secs = secs;
        }
        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = match args.config {
            Some(ref path) => Config::from_file(path)?,
            None => Config::default(),
        };
        config.apply_env();
        config.apply_args(args);
        config.validate()?;
        Ok(config)
    }

    /// Reject values no session could run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            (self.limits.max_sessions == 0, "limits.max_sessions must be at least 1"),
            (
                self.limits.max_sessions_per_user == 0,
                "limits.max_sessions_per_user must be at least 1",
            ),
            (self.limits.monitor_tick_secs == 0, "limits.monitor_tick_secs must be at least 1"),
            (self.shell.history_size == 0, "shell.history_size must be at least 1"),
            (
                self.shell.marker.is_alphanumeric() || self.shell.marker.is_whitespace(),
                "shell.marker must be a symbol",
            ),
        ];
        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, message)) => Err(ConfigError::Invalid(message.to_string())),
            None => Ok(()),
        }
    }

    /// Convert to ServerConfig for the transport.
    pub fn to_server_config(&self) -> Result<ServerConfig, ConfigError> {
        let host: IpAddr = self
            .server
            .host
            .parse()
            .map_err(|_| ConfigError::InvalidHost(self.server.host.clone()))?;
        Ok(ServerConfig::new(host.to_string(), self.server.port))
    }

    pub fn to_manager_config(&self) -> ManagerConfig {
        let secs = |value: u64| (value > 0).then(|| Duration::from_secs(value));
        ManagerConfig {
            max_sessions: self.limits.max_sessions,
            max_sessions_per_user: self.limits.max_sessions_per_user,
            idle_timeout: secs(self.limits.idle_timeout_secs),
            max_duration: secs(self.limits.max_session_secs),
            monitor_tick: Duration::from_secs(self.limits.monitor_tick_secs.max(1)),
        }
    }

    pub fn to_driver_config(&self) -> DriverConfig {
        DriverConfig {
            prompt: self.shell.prompt.clone(),
            continuation_prompt: self.shell.continuation_prompt.clone(),
            history_size: self.shell.history_size,
            escape_timeout: Duration::from_millis(self.shell.escape_timeout_ms),
        }
    }

    /// Variable store, loaded from `shell.state_file` when one is set.
    pub fn open_store(&self) -> Result<VariableStore, ConfigError> {
        match self.shell.state_file {
            Some(ref path) => VariableStore::open(self.shell.marker, path)
                .map_err(|e| ConfigError::State(e.to_string())),
            None => Ok(VariableStore::new(self.shell.marker)),
        }
    }

    /// Shell over `registry` with this configuration's store and depth limit.
    pub fn build_shell(&self, registry: Registry) -> Result<Shell, ConfigError> {
        let store = self.open_store()?;
        Ok(Shell::new(Arc::new(registry), Arc::new(store)).with_max_depth(self.shell.max_depth))
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(std::io::Error),

    #[error("failed to parse config file: {0}")]
    Json(serde_json::Error),

    #[error("invalid host address: {0}")]
    InvalidHost(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to load state file: {0}")]
    State(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.limits.max_sessions, 64);
        assert_eq!(config.shell.marker, '$');
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_partial_json() {
        let json = r#"{
            "server": { "port": 9000 },
            "limits": { "max_sessions": 2, "idle_timeout_secs": 0 },
            "shell": { "prompt": "> ", "marker": "%" }
        }"#;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.limits.max_sessions, 2);
        assert_eq!(config.limits.max_sessions_per_user, 8);
        assert_eq!(config.shell.prompt, "> ");
        assert_eq!(config.shell.marker, '%');
    }

    #[test]
    fn test_malformed_json() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"{ server: ").unwrap();
        assert!(matches!(Config::from_file(file.path()), Err(ConfigError::Json(_))));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("CONSOLE_SESSION_HOST", "0.0.0.0"),
            ("CONSOLE_SESSION_PORT", "4000"),
            ("CONSOLE_SESSION_MAX_SESSIONS", "3"),
            ("RUST_LOG", "debug"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env_from(|name| vars.get(name).map(|v| v.to_string()));
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.limits.max_sessions, 3);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_env_log_level_beats_rust_log() {
        let mut config = Config::default();
        config.apply_env_from(|name| match name {
            "CONSOLE_SESSION_LOG_LEVEL" => Some("warn".into()),
            "RUST_LOG" => Some("trace".into()),
            _ => None,
        });
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_args_override_file_values() {
        let mut config = Config::default();
        config.server.port = 9000;
        let args = Args {
            host: Some("192.168.1.1".parse().unwrap()),
            max_sessions: Some(5),
            idle_timeout: Some(30),
            ..Args::default()
        };

        config.apply_args(&args);
        assert_eq!(config.server.host, "192.168.1.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.limits.max_sessions, 5);
        assert_eq!(config.limits.idle_timeout_secs, 30);
    }

    #[test]
    fn test_zero_timeouts_disable() {
        let mut config = Config::default();
        config.limits.idle_timeout_secs = 0;
        config.limits.max_session_secs = 0;
        let manager = config.to_manager_config();
        assert_eq!(manager.idle_timeout, None);
        assert_eq!(manager.max_duration, None);

        config.limits.max_session_secs = 60;
        assert_eq!(
            config.to_manager_config().max_duration,
            Some(Duration::from_secs(60))
        );
    }

    #[test]
    fn test_validate_rejects_zero_cap() {
        let mut config = Config::default();
        config.limits.max_sessions = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_letter_marker() {
        let mut config = Config::default();
        config.shell.marker = 'v';
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_driver_config() {
        let mut config = Config::default();
        config.shell.escape_timeout_ms = 120;
        let driver = config.to_driver_config();
        assert_eq!(driver.escape_timeout, Duration::from_millis(120));
        assert_eq!(driver.prompt, "$ ");
    }

    #[test]
    fn test_invalid_host() {
        let mut config = Config::default();
        config.server.host = "not-an-ip".to_string();
        assert!(matches!(
            config.to_server_config(),
            Err(ConfigError::InvalidHost(_))
        ));
    }

    #[test]
    fn test_build_shell_with_state_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, r#"{"variables":{"$who":"world"},"aliases":{}}"#).unwrap();

        let mut config = Config::default();
        config.shell.state_file = Some(path);
        config.shell.max_depth = 3;
        let shell = config.build_shell(Registry::new()).unwrap();
        assert_eq!(shell.max_depth(), 3);
        assert_eq!(shell.vars().get("who").as_deref(), Some("world"));
    }
}
