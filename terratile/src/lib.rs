//! Terratile - tiled satellite imagery retrieval and caching for globe
//! viewers.
//!
//! This library implements the tile pipeline a globe renderer sits on
//! top of: priority-ordered asynchronous fetch of remote imagery tiles,
//! format-aware post-processing (decode, Mercator reprojection, mask
//! compositing, BC compression), a persistent disk cache with per-level
//! freshness windows, a byte-bounded in-memory texture cache, and
//! absent-resource bookkeeping that keeps the pipeline from hammering
//! servers for tiles they cannot provide.
//!
//! The entry point is [`TileService`]: one service per
//! [`LayerDescriptor`], with a non-blocking
//! [`request_tile`](TileService::request_tile) interface designed to be
//! called from a render loop.
//!
//! # Example
//!
//! ```no_run
//! use terratile::coord::TileAddress;
//! use terratile::layer::LayerDescriptor;
//! use terratile::{PipelineConfig, TileService};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let descriptor = LayerDescriptor::from_path("bluemarble.json".as_ref())?;
//! let service = TileService::start(PipelineConfig::default(), descriptor)?;
//!
//! // In the render loop: never blocks, fetches happen in the background.
//! let address = TileAddress::new(8, 97, 130);
//! match service.request_tile(address, 1250.0) {
//!     Some(_texture) => { /* upload and draw */ }
//!     None => { /* draw a lower-resolution ancestor, poll again next frame */ }
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod coord;
pub mod fetch;
pub mod layer;
pub mod process;
pub mod service;
pub mod telemetry;
pub mod texture;

pub use config::PipelineConfig;
pub use coord::{TileAddress, TileId};
pub use layer::LayerDescriptor;
pub use service::{ServiceError, TileService};
pub use texture::TileTexture;
