//! BMDInfo CLI - sign in to BMDInfo and walk its routes from a terminal.
//!
//! The session persists between runs the same way it does across page
//! loads in the browser client.

mod commands;

use std::io;

use anyhow::Result;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bmdinfo_core::{Config, Environment, SessionManager};

/// Directory for a daily-rolling log file, when set
const LOG_DIR_ENV: &str = "BMDINFO_LOG_DIR";

const USAGE: &str = "\
Usage: bmdinfo [--non-interactive] <command>

Commands:
  login [username]            Sign in (password from BMDINFO_PASSWORD or prompt)
  register <username> <email> Create an account and sign in
  logout                      End the session
  whoami                      Show the signed-in user
  open <path>                 Navigate to a route, e.g. /dashboard/bid-tracker
";

/// Initialize the tracing subscriber for logging
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(LOG_DIR_ENV) {
        Ok(dir) if !dir.is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, "bmdinfo.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let environment = if take_flag(&mut args, "--non-interactive") {
        Environment::NonInteractive
    } else {
        Environment::Interactive
    };

    let config = Config::load()?;
    let manager = SessionManager::from_config(config, environment)?;
    info!(?environment, "BMDInfo CLI starting");

    let _auth_log = manager.subscribe(|user| match user {
        Some(u) => debug!(user_id = %u.id, "Auth state: signed in"),
        None => debug!("Auth state: signed out"),
    });

    let arg = |i: usize| args.get(i).map(String::as_str);
    match arg(0) {
        Some("login") => commands::login(&manager, arg(1)).await,
        Some("register") => match (arg(1), arg(2)) {
            (Some(username), Some(email)) => commands::register(&manager, username, email).await,
            _ => usage(),
        },
        Some("logout") => {
            commands::logout(&manager);
            Ok(())
        }
        Some("whoami") => {
            commands::whoami(&manager);
            Ok(())
        }
        Some("open") => match arg(1) {
            Some(path) => {
                commands::open(&manager, path);
                Ok(())
            }
            None => usage(),
        },
        _ => usage(),
    }
}

fn usage() -> Result<()> {
    eprint!("{}", USAGE);
    Ok(())
}

/// Remove `flag` from `args`, reporting whether it was present.
fn take_flag(args: &mut Vec<String>, flag: &str) -> bool {
    let before = args.len();
    args.retain(|a| a != flag);
    args.len() != before
}
