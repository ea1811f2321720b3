//! Disk cache inspection and maintenance.

use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};

use super::{resolve_config, CommandError};

#[derive(Args)]
pub struct CacheArgs {
    /// Config file (defaults to the standard location when present)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: CacheCommand,
}

#[derive(Subcommand)]
enum CacheCommand {
    /// Show per-dataset cache usage
    Stats,

    /// Delete all cached tiles
    Clear {
        /// Skip the confirmation requirement
        #[arg(long)]
        yes: bool,
    },
}

pub async fn run(args: CacheArgs) -> Result<(), CommandError> {
    let config = resolve_config(args.config.as_ref())?;
    let root = config.cache_root;

    match args.command {
        CacheCommand::Stats => stats(&root),
        CacheCommand::Clear { yes } => clear(&root, yes),
    }
}

fn stats(root: &Path) -> Result<(), CommandError> {
    if !root.exists() {
        println!("Cache root {} does not exist yet", root.display());
        return Ok(());
    }

    println!("Cache root: {}", root.display());
    let mut total_entries = 0u64;
    let mut total_bytes = 0u64;

    // Top-level directories group datasets by publisher prefix
    let mut groups: Vec<_> = std::fs::read_dir(root)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .map(|entry| entry.path())
        .collect();
    groups.sort();

    for group in groups {
        let (entries, bytes) = walk(&group)?;
        total_entries += entries;
        total_bytes += bytes;
        let name = group
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        println!(
            "  {:<30} {:>8} tiles {:>10}",
            console::style(name).bold(),
            entries,
            format_bytes(bytes)
        );
    }

    println!("  total: {} tiles, {}", total_entries, format_bytes(total_bytes));
    Ok(())
}

fn clear(root: &Path, yes: bool) -> Result<(), CommandError> {
    if !root.exists() {
        println!("Cache root {} does not exist; nothing to clear", root.display());
        return Ok(());
    }
    if !yes {
        return Err(format!(
            "refusing to delete {} without --yes",
            root.display()
        )
        .into());
    }

    let (entries, bytes) = walk(root)?;
    std::fs::remove_dir_all(root)?;
    println!("Deleted {} tiles ({})", entries, format_bytes(bytes));
    Ok(())
}

fn walk(root: &Path) -> Result<(u64, u64), CommandError> {
    let mut entries = 0u64;
    let mut bytes = 0u64;
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if metadata.is_dir() {
                stack.push(entry.path());
            } else {
                entries += 1;
                bytes += metadata.len();
            }
        }
    }

    Ok((entries, bytes))
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[unit])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
