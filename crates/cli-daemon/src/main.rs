//! CLI entry point for the revoice daemon.
//!
//! Loads configuration from environment variables, runs startup checks,
//! and starts the HTTP API server. No subcommands.

use clap::Parser;
use revoice_daemon::{Config, Daemon};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Revoice daemon - voice replacement, TTS, and audio mixing pipeline
#[derive(Parser, Debug)]
#[command(name = "revoiced")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Skip startup checks (ffmpeg, ffprobe). For testing only.
    #[arg(long, default_value = "false")]
    skip_checks: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = Config::from_env();

    info!(
        host = %config.server.host,
        port = config.server.port,
        storage = %config.storage.root.display(),
        "revoice daemon starting"
    );

    let daemon_result = if args.skip_checks {
        info!("skipping startup checks (--skip-checks enabled)");
        Daemon::new_without_checks(config)
    } else {
        Daemon::new(config)
    };

    match daemon_result {
        Ok(daemon) => {
            if let Err(err) = daemon.run().await {
                error!(%err, "daemon error");
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(%err, "failed to initialize daemon");
            ExitCode::FAILURE
        }
    }
}
