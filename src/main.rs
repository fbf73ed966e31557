//! CLI entry point for the harvester tool.

use std::io::{self, IsTerminal};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use tracing::{debug, error, info, warn};

mod app;
mod cli;

use app::exit_handler::ProcessExit;
use app::runtime::run;
use app::terminal::{
    default_log_level, init_tracing, is_dumb_terminal, no_color_env_requested, should_use_spinner,
};
use app::validation::RunConfig;
use cli::Args;

/// Raises `stop` on the first Ctrl-C; a second one exits immediately.
fn install_stop_handler(stop: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("stop requested; finishing in-flight work (Ctrl-C again to abort)");
        stop.store(true, Ordering::SeqCst);
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(ProcessExit::Failure.code());
        }
    });
}

#[tokio::main]
async fn main() {
    // .env first so clap's env fallbacks see it
    let _ = dotenvy::dotenv();

    // Parse CLI arguments before tracing, so --help works without logs
    let args = Args::parse();

    init_tracing(
        default_log_level(args.quiet, args.verbose),
        no_color_env_requested() || is_dumb_terminal(),
    );
    debug!(?args, "CLI arguments parsed");

    let config = match RunConfig::from_args(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("configuration error: {e}");
            std::process::exit(ProcessExit::Failure.code());
        }
    };

    info!(stage = ?config.stage, "harvester starting");
    let stop = Arc::new(AtomicBool::new(false));
    install_stop_handler(Arc::clone(&stop));

    let use_spinner =
        should_use_spinner(io::stderr().is_terminal(), args.quiet, is_dumb_terminal());
    let outcome = match run(config, stop, use_spinner).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("{e:#}");
            ProcessExit::Failure
        }
    };

    info!(?outcome, "harvester finished");
    std::process::exit(outcome.code());
}
