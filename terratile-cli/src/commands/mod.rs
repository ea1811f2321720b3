//! CLI subcommands.

pub mod cache;
pub mod config;
pub mod fetch;

use std::error::Error;
use std::path::PathBuf;

use terratile::config::{default_config_path, load_config, PipelineConfig};

/// Boxed error type shared by the subcommands.
pub type CommandError = Box<dyn Error + Send + Sync>;

/// Resolves the pipeline configuration: an explicit `--config` path must
/// load; the default path is used when present and silently skipped when
/// not.
pub fn resolve_config(path: Option<&PathBuf>) -> Result<PipelineConfig, CommandError> {
    match path {
        Some(path) => Ok(load_config(path)?),
        None => {
            let default = default_config_path();
            if default.exists() {
                Ok(load_config(&default)?)
            } else {
                Ok(PipelineConfig::default())
            }
        }
    }
}
