//! Command-line interface for console-session.
//!
//! Uses lexopt for minimal binary size overhead.

use std::ffi::OsString;
use std::net::IpAddr;
use std::path::PathBuf;

use lexopt::ValueExt;

/// Command-line arguments. Unset options fall through to the environment,
/// then the config file.
#[derive(Debug, Clone, Default)]
pub struct Args {
    pub host: Option<IpAddr>,
    pub port: Option<u16>,
    /// Path to configuration file.
    pub config: Option<PathBuf>,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
    pub max_sessions: Option<usize>,
    /// Idle timeout in seconds; 0 disables it.
    pub idle_timeout: Option<u64>,
    /// Show version and exit.
    pub version: bool,
    /// Show help and exit.
    pub help: bool,
}

/// Parse command-line arguments.
pub fn parse_args() -> Result<Args, ArgsError> {
    parse_args_from(std::env::args_os())
}

/// Parse arguments from an iterator (for testing).
pub fn parse_args_from<I>(args: I) -> Result<Args, ArgsError>
where
    I: IntoIterator<Item = OsString>,
{
    use lexopt::prelude::*;

    let mut result = Args::default();
    let mut parser = lexopt::Parser::from_iter(args);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => result.help = true,
            Short('V') | Long("version") => result.version = true,
            Short('H') | Long("host") => {
                result.host = Some(parse_value(&mut parser, "host")?);
            }
            Short('p') | Long("port") => {
                result.port = Some(parse_value(&mut parser, "port")?);
            }
            Short('c') | Long("config") => {
                result.config = Some(parser.value()?.parse()?);
            }
            Short('l') | Long("log-level") => {
                result.log_level = Some(parser.value()?.parse()?);
            }
            Long("max-sessions") => {
                result.max_sessions = Some(parse_value(&mut parser, "max-sessions")?);
            }
            Long("idle-timeout") => {
                result.idle_timeout = Some(parse_value(&mut parser, "idle-timeout")?);
            }
            Value(val) => {
                return Err(ArgsError::UnexpectedArgument(val.to_string_lossy().into()));
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    Ok(result)
}

fn parse_value<T: std::str::FromStr>(
    parser: &mut lexopt::Parser,
    name: &'static str,
) -> Result<T, ArgsError> {
    let value: String = parser.value()?.parse()?;
    value
        .parse()
        .map_err(|_| ArgsError::InvalidValue(name, value))
}

/// Print help message.
pub fn print_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"console-session {version}
Interactive console sessions over WebSocket

USAGE:
    console-session [OPTIONS]

OPTIONS:
    -H, --host <ADDR>         Host address to bind [default: 127.0.0.1]
    -p, --port <PORT>         Port to listen on [default: 3000]
    -c, --config <FILE>       Path to configuration file (JSON)
    -l, --log-level <LVL>     Log level (error, warn, info, debug, trace)
        --max-sessions <N>    Sessions open at once [default: 64]
        --idle-timeout <SECS> Close sessions idle this long, 0 = never [default: 900]
    -h, --help                Print help
    -V, --version             Print version

ENVIRONMENT VARIABLES:
    CONSOLE_SESSION_HOST          Host address (overrides config)
    CONSOLE_SESSION_PORT          Port number (overrides config)
    CONSOLE_SESSION_MAX_SESSIONS  Session cap (overrides config)
    CONSOLE_SESSION_LOG_LEVEL     Log level (overrides config)
    RUST_LOG                      Alternative log level setting

EXAMPLES:
    # Start with defaults (localhost:3000)
    console-session

    # Listen on all interfaces behind an authenticating proxy
    console-session -H 0.0.0.0 -p 8080 --max-sessions 16

    # Start with config file
    console-session -c /etc/console-session/config.json
"#
    );
}

/// Print version.
pub fn print_version() {
    println!("console-session {}", env!("CARGO_PKG_VERSION"));
}

/// Argument parsing errors.
#[derive(Debug)]
pub enum ArgsError {
    /// Lexopt parsing error.
    Lexopt(lexopt::Error),
    /// Invalid argument value.
    InvalidValue(&'static str, String),
    /// Unexpected positional argument.
    UnexpectedArgument(String),
}

impl std::fmt::Display for ArgsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lexopt(e) => write!(f, "{}", e),
            Self::InvalidValue(name, value) => {
                write!(f, "invalid value for --{}: '{}'", name, value)
            }
            Self::UnexpectedArgument(arg) => {
                write!(f, "unexpected argument: '{}'", arg)
            }
        }
    }
}

impl std::error::Error for ArgsError {}

impl From<lexopt::Error> for ArgsError {
    fn from(e: lexopt::Error) -> Self {
        Self::Lexopt(e)
    }
}
