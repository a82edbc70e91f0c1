//! depimg - Incremental container image builder
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use depimg::cli::{Cli, Commands};
use depimg::error::DepimgResult;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> DepimgResult<()> {
    let cli = Cli::parse();

    // Initialize logging: 0 = warn, 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("depimg=warn"),
        1 => EnvFilter::new("depimg=info"),
        _ => EnvFilter::new("depimg=debug"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    match cli.command {
        Commands::Build(args) => depimg::cli::commands::build(args, &cli.runtime).await,
        Commands::Init(args) => depimg::cli::commands::init(args).await,
    }
}
