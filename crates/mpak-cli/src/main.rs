//! `mpak` binary entry point.
//!
//! Parses arguments, initializes logging on stderr, loads the archive
//! configuration and runs one subcommand. Reports go to stdout.

mod cli;
mod commands;
mod error;

use clap::Parser;
use cli::Cli;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = cli.config.load().map_err(anyhow::Error::from).and_then(|config| {
        tracing::debug!("Configuration: {:?}", config);
        commands::run(cli.command, config, &mut std::io::stdout().lock())
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            error::exit_code_for(&e)
        }
    }
}
