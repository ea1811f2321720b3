//! Region prefetch command.

use std::path::PathBuf;

use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

use terratile::coord::{to_tile_address, TileAddress};
use terratile::layer::LayerDescriptor;
use terratile::TileService;

use super::{resolve_config, CommandError};

#[derive(Args)]
pub struct FetchArgs {
    /// Layer descriptor JSON file
    #[arg(long)]
    descriptor: PathBuf,

    /// Pyramid level to fetch
    #[arg(long)]
    level: u8,

    /// Southern edge of the region (degrees)
    #[arg(long, allow_hyphen_values = true)]
    min_lat: f64,

    /// Northern edge of the region (degrees)
    #[arg(long, allow_hyphen_values = true)]
    max_lat: f64,

    /// Western edge of the region (degrees)
    #[arg(long, allow_hyphen_values = true)]
    min_lon: f64,

    /// Eastern edge of the region (degrees)
    #[arg(long, allow_hyphen_values = true)]
    max_lon: f64,

    /// Config file (defaults to the standard location when present)
    #[arg(long)]
    config: Option<PathBuf>,
}

pub async fn run(args: FetchArgs) -> Result<(), CommandError> {
    if args.min_lat >= args.max_lat {
        return Err("min-lat must be south of max-lat".into());
    }
    if args.min_lon >= args.max_lon {
        return Err("min-lon must be west of max-lon".into());
    }

    let config = resolve_config(args.config.as_ref())?;
    let descriptor = LayerDescriptor::from_path(&args.descriptor)?;
    let display_name = descriptor.display_name.clone();
    if args.level >= descriptor.level_count {
        return Err(format!(
            "layer {:?} has levels 0..{}, requested {}",
            descriptor.dataset,
            descriptor.level_count - 1,
            args.level
        )
        .into());
    }

    // Tile rows grow southward: the north-west corner gives the first
    // row/column, the south-east corner the last.
    let northwest = to_tile_address(args.max_lat, args.min_lon, args.level)?;
    let southeast = to_tile_address(args.min_lat, args.max_lon, args.level)?;

    let rows = northwest.row..=southeast.row;
    let cols = northwest.col..=southeast.col;
    let total = (rows.end() - rows.start() + 1) as u64 * (cols.end() - cols.start() + 1) as u64;

    println!(
        "Fetching {} tiles of {} at level {}",
        total,
        console::style(&display_name).bold(),
        args.level
    );

    let service = TileService::start(config, descriptor)?;

    let center_row = (rows.start() + rows.end()) as f64 / 2.0;
    let center_col = (cols.start() + cols.end()) as f64 / 2.0;

    let progress = ProgressBar::new(total).with_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} ({eta}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let mut ready = 0u64;
    let mut absent = 0u64;
    let mut failed = 0u64;

    // Schedule the whole region up front so the pool stays busy while we
    // collect results tile by tile
    for row in rows.clone() {
        for col in cols.clone() {
            let address = TileAddress::new(args.level, row, col);
            let priority = (row as f64 - center_row).hypot(col as f64 - center_col);
            service.request_tile(address, priority);
        }
    }

    for row in rows.clone() {
        for col in cols.clone() {
            let address = TileAddress::new(args.level, row, col);
            // Center-out priority, like distance-to-viewer in a renderer
            let priority = (row as f64 - center_row).hypot(col as f64 - center_col);

            match service.await_tile(address, priority).await {
                Some(_) => ready += 1,
                None if service.is_tile_absent(address) => {
                    debug!(%address, "tile absent");
                    absent += 1;
                }
                None => failed += 1,
            }
            progress.inc(1);
        }
    }
    progress.finish_and_clear();

    let snapshot = service.metrics();
    println!(
        "{} ready, {} absent, {} failed ({} downloaded, {:.1} MB)",
        console::style(ready).green(),
        console::style(absent).yellow(),
        console::style(failed).red(),
        snapshot.downloads_completed,
        snapshot.bytes_downloaded as f64 / 1_000_000.0
    );

    service.shutdown().await;
    Ok(())
}
