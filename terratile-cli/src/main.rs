//! Terratile command-line driver.
//!
//! Exercises the tile pipeline outside a renderer: prefetch a region into
//! the cache, inspect or clear the disk cache, and manage configuration.

mod commands;

use std::process::ExitCode;

use clap::{Parser, Subcommand};

use commands::{cache, config, fetch};

#[derive(Parser)]
#[command(
    name = "terratile",
    version,
    about = "Tiled satellite imagery pipeline for globe viewers"
)]
struct Cli {
    /// Log filter when RUST_LOG is unset (e.g. "terratile=debug")
    #[arg(long, global = true, default_value = "terratile=info")]
    log: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Prefetch a region of tiles into the cache
    Fetch(fetch::FetchArgs),

    /// Inspect or clear the disk cache
    Cache(cache::CacheArgs),

    /// Show or initialize the configuration file
    Config(config::ConfigArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = terratile::telemetry::init_logging(&cli.log, None) {
        eprintln!("warning: {}", e);
    }

    let result = match cli.command {
        Command::Fetch(args) => fetch::run(args).await,
        Command::Cache(args) => cache::run(args).await,
        Command::Config(args) => config::run(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", console::style("error:").red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
