//! console-session binary entry point.

use std::process::ExitCode;
use std::sync::Arc;

use console_session::cli::{self, Args};
use console_session::config::Config;
use console_session::logging;
use console_session::session::SessionManager;
use console_session::shell::builtins;
use console_session::transport::{serve, AppState};
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {e}");
            eprintln!("Try 'console-session --help' for more information.");
            return ExitCode::from(2);
        }
    };
    if args.help {
        cli::print_help();
        return ExitCode::SUCCESS;
    }
    if args.version {
        cli::print_version();
        return ExitCode::SUCCESS;
    }

    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(args)?;
    logging::init_with_filter(config.log_filter())?;

    info!("console-session v{}", env!("CARGO_PKG_VERSION"));

    let server = config.to_server_config()?;
    let shell = config.build_shell(builtins::registry())?;
    let manager = Arc::new(SessionManager::new(config.to_manager_config()));
    let monitor = manager.spawn_monitor();
    info!(
        commands = shell.registry().len(),
        max_sessions = manager.config().max_sessions,
        "shell ready"
    );

    let state = AppState::new(Arc::clone(&manager), shell.clone(), config.to_driver_config());
    let served = serve(server, state).await;

    manager.shutdown();
    let _ = monitor.await;
    if let Err(e) = shell.vars().save() {
        error!(error = %e, "failed to save shell state");
    }
    info!("console-session stopped");
    served?;
    Ok(())
}
