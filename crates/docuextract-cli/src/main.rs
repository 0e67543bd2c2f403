#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod command;
mod config;

use std::process;

use crate::config::Cli;

// Tracing target constants
pub const TRACING_TARGET_STARTUP: &str = "docuextract_cli::startup";
pub const TRACING_TARGET_SHUTDOWN: &str = "docuextract_cli::shutdown";
pub const TRACING_TARGET_CONFIG: &str = "docuextract_cli::config";
pub const TRACING_TARGET_COMMAND: &str = "docuextract_cli::command";

#[tokio::main]
async fn main() {
    let Err(error) = run().await else {
        process::exit(0);
    };

    if tracing::enabled!(tracing::Level::ERROR) {
        tracing::error!(
            target: TRACING_TARGET_SHUTDOWN,
            error = %error,
            "command failed"
        );
    } else {
        eprintln!("Error: {error:#}");
    }

    process::exit(1);
}

/// Main application entry point.
async fn run() -> anyhow::Result<()> {
    let cli = Cli::init();

    Cli::init_tracing();
    cli.log();

    command::run(cli.client, cli.command).await
}
