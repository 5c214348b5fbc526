//! copycache - build-time source cache
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use copycache::cli::{Cli, Commands};
use copycache::config::{ConfigManager, LogFormat};
use copycache::error::CacheResult;
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
            } else if e.is_retryable() {
                eprintln!(
                    "{} The failure may be transient; run the command again",
                    style("Hint:").yellow()
                );
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> CacheResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    // 0 = warn, 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("copycache=warn"),
        1 => EnvFilter::new("copycache=info"),
        _ => EnvFilter::new("copycache=debug"),
    };

    // Logs go to stderr; stdout carries listings and JSON output
    match config.general.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .without_time()
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }

    match cli.command {
        Commands::List(args) => copycache::cli::commands::list(args, &config).await,
        Commands::Rm(args) => copycache::cli::commands::remove(args, &config).await,
        Commands::Clear(args) => copycache::cli::commands::clear(args, &config).await,
        Commands::Resolve(args) => copycache::cli::commands::resolve(args, &config).await,
        Commands::Config(args) => {
            copycache::cli::commands::config(args, &config, &config_manager).await
        }
    }
}
