//! Configuration inspection and bootstrap.

use std::path::PathBuf;

use clap::{Args, Subcommand};

use terratile::config::{default_config_path, write_default_config};

use super::{resolve_config, CommandError};

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the resolved configuration
    Show {
        /// Config file (defaults to the standard location when present)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Write a config file populated with defaults
    Init {
        /// Target path (defaults to the standard location)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

pub fn run(args: ConfigArgs) -> Result<(), CommandError> {
    match args.command {
        ConfigCommand::Show { config } => {
            let resolved = resolve_config(config.as_ref())?;
            println!("workers            = {}", resolved.workers);
            println!(
                "connect timeout    = {}s",
                resolved.connect_timeout.as_secs()
            );
            println!("read timeout       = {}s", resolved.read_timeout.as_secs());
            println!(
                "memory cache       = {} bytes",
                resolved.memory_cache_bytes
            );
            println!("cache root         = {}", resolved.cache_root.display());
            Ok(())
        }
        ConfigCommand::Init { path } => {
            let target = path.unwrap_or_else(default_config_path);
            if target.exists() {
                return Err(format!("{} already exists", target.display()).into());
            }
            write_default_config(&target)?;
            println!("Wrote {}", target.display());
            Ok(())
        }
    }
}
