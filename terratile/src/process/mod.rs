//! Format-aware tile post-processing.
//!
//! Raw fetch responses pass through a decision table keyed on HTTP status
//! and content type:
//!
//! - no-content or non-2xx statuses mark the tile absent, nothing is
//!   written;
//! - error documents served as 200 (xml/html/text) are logged as
//!   diagnostics and mark the tile absent;
//! - payloads already in the native compressed texture format (or an
//!   archive of it) are written to the disk cache verbatim;
//! - generic imagery is decoded, validated, reprojected and masked as the
//!   layer descriptor requires, then re-encoded to the stored format.
//!
//! CPU-heavy image work runs on the blocking pool; disk writes go through
//! the cache store's per-layer lock. A failed disk write is logged and
//! the texture is still published to the memory cache — the next process
//! restart simply fetches the tile again.

mod remap;

pub use remap::mercator_to_equirect;

use std::sync::Arc;

use bytes::Bytes;
use image::RgbaImage;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::{AbsentReason, DiskCacheStore};
use crate::coord::{MercatorSector, TileId};
use crate::fetch::{FetchResponse, HttpClient};
use crate::layer::{LayerDescriptor, Projection, StoredFormat};
use crate::texture::{parse_dds_dimensions, DdsEncoder, DdsFormat, TextureFormat, TileTexture};

/// Mipmap levels emitted when re-encoding imagery to DDS.
const DDS_MIPMAP_COUNT: usize = 5;

/// Longest error-document excerpt written to the log.
const DIAGNOSTIC_EXCERPT_LEN: usize = 512;

/// Content-type tokens that identify an error document.
const ERROR_DOCUMENT_TOKENS: [&str; 3] = ["xml", "html", "text"];

/// Content-type tokens for payloads already in the target format.
const NATIVE_FORMAT_TOKENS: [&str; 2] = ["dds", "zip"];

/// Transient post-processing failures.
///
/// These do not mark the tile absent; the fetch may be retried by a later
/// cache miss.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// A blocking image task could not be joined.
    #[error("image task failed: {0}")]
    Task(String),
}

/// Outcome of post-processing one fetch response.
#[derive(Debug)]
pub enum ProcessedTile {
    /// The tile is render-ready (and persisted, barring a logged write
    /// failure).
    Ready(TileTexture),
    /// The tile cannot be provided; callers mark it absent.
    Absent(AbsentReason),
}

/// Format-aware pipeline from raw response bytes to a cached texture.
pub struct TilePostProcessor {
    descriptor: Arc<LayerDescriptor>,
    disk: Arc<DiskCacheStore>,
    http: Arc<dyn HttpClient>,
}

impl TilePostProcessor {
    /// Creates a post-processor for one layer.
    ///
    /// The HTTP client is used only for mask-overlay fetches.
    pub fn new(
        descriptor: Arc<LayerDescriptor>,
        disk: Arc<DiskCacheStore>,
        http: Arc<dyn HttpClient>,
    ) -> Self {
        Self {
            descriptor,
            disk,
            http,
        }
    }

    /// Runs the decision table over a completed fetch.
    pub async fn process(
        &self,
        id: &TileId,
        response: FetchResponse,
    ) -> Result<ProcessedTile, ProcessError> {
        if response.is_no_content() {
            debug!(tile = %id, "server reported no content for tile");
            return Ok(ProcessedTile::Absent(AbsentReason::NoContent));
        }
        if !response.is_success() {
            debug!(tile = %id, status = response.status, "tile fetch rejected by server");
            return Ok(ProcessedTile::Absent(AbsentReason::HttpStatus(
                response.status,
            )));
        }

        if ERROR_DOCUMENT_TOKENS
            .iter()
            .any(|token| response.content_type_contains(token))
        {
            let excerpt_len = response.body.len().min(DIAGNOSTIC_EXCERPT_LEN);
            let excerpt = String::from_utf8_lossy(&response.body[..excerpt_len]);
            warn!(
                tile = %id,
                content_type = response.content_type.as_deref().unwrap_or("-"),
                %excerpt,
                "server returned an error document instead of imagery"
            );
            return Ok(ProcessedTile::Absent(AbsentReason::ErrorDocument));
        }

        if NATIVE_FORMAT_TOKENS
            .iter()
            .any(|token| response.content_type_contains(token))
        {
            return Ok(self.accept_native(id, response.body).await);
        }

        self.process_image(id, response.body).await
    }

    /// Payload is already in the target format: persist verbatim.
    async fn accept_native(&self, id: &TileId, body: Bytes) -> ProcessedTile {
        self.persist(id, &body).await;

        let (width, height) = parse_dds_dimensions(&body).unwrap_or((0, 0));
        ProcessedTile::Ready(TileTexture {
            id: id.clone(),
            format: TextureFormat::Dds(self.native_dds_format()),
            width,
            height,
            data: body,
        })
    }

    /// Decode, validate, reproject, mask, re-encode, persist.
    async fn process_image(
        &self,
        id: &TileId,
        body: Bytes,
    ) -> Result<ProcessedTile, ProcessError> {
        let decoded = run_image_task(move || {
            image::load_from_memory(&body).map(|image| image.to_rgba8())
        })
        .await?;

        let mut image = match decoded {
            Ok(image) => image,
            Err(e) => {
                warn!(tile = %id, error = %e, "discarding undecodable tile payload");
                return Ok(ProcessedTile::Absent(AbsentReason::CorruptData));
            }
        };

        if self.descriptor.reject_blank_tiles && is_blank(&image) {
            debug!(tile = %id, "rejecting blank tile");
            return Ok(ProcessedTile::Absent(AbsentReason::InvalidTile));
        }

        if self.descriptor.projection == Projection::Mercator {
            let sector = MercatorSector::for_address(&id.address);
            image = run_image_task(move || mercator_to_equirect(&image, &sector)).await?;
        }

        if let Some(mask_url) = self.descriptor.mask_url_for(&id.address) {
            if let Some(mask) = self.fetch_mask(id, &mask_url).await {
                image = run_image_task(move || apply_mask(image, &mask)).await?;
            }
        }

        let (width, height) = image.dimensions();
        match self.descriptor.stored_format {
            StoredFormat::Dds(format) => {
                let encoder = DdsEncoder::new(format).with_mipmap_count(DDS_MIPMAP_COUNT);
                let encoded = match run_image_task(move || encoder.encode(&image)).await? {
                    Ok(encoded) => encoded,
                    Err(e) => {
                        warn!(tile = %id, error = %e, "tile cannot be compressed");
                        return Ok(ProcessedTile::Absent(AbsentReason::InvalidTile));
                    }
                };
                self.persist(id, &encoded).await;
                Ok(ProcessedTile::Ready(TileTexture {
                    id: id.clone(),
                    format: TextureFormat::Dds(format),
                    width,
                    height,
                    data: Bytes::from(encoded),
                }))
            }
            stored @ (StoredFormat::Png | StoredFormat::Jpeg) => {
                let (encoded, image) =
                    run_image_task(move || (encode_stored(&image, stored), image)).await?;
                match encoded {
                    Ok(encoded) => self.persist(id, &encoded).await,
                    Err(e) => warn!(tile = %id, error = %e, "tile re-encode failed, kept in memory only"),
                }
                Ok(ProcessedTile::Ready(TileTexture {
                    id: id.clone(),
                    format: TextureFormat::Rgba8,
                    width,
                    height,
                    data: Bytes::from(image.into_raw()),
                }))
            }
        }
    }

    /// Fetches and decodes the layer's mask tile; any failure degrades to
    /// an unmasked tile.
    async fn fetch_mask(&self, id: &TileId, mask_url: &str) -> Option<RgbaImage> {
        let response = match self.http.get(mask_url).await {
            Ok(response) if response.is_success() && !response.is_no_content() => response,
            Ok(response) => {
                debug!(tile = %id, status = response.status, "mask tile unavailable");
                return None;
            }
            Err(e) => {
                warn!(tile = %id, error = %e, "mask fetch failed, compositing skipped");
                return None;
            }
        };

        let body = response.body;
        match run_image_task(move || image::load_from_memory(&body).map(|m| m.to_rgba8())).await {
            Ok(Ok(mask)) => Some(mask),
            Ok(Err(e)) => {
                warn!(tile = %id, error = %e, "mask tile undecodable, compositing skipped");
                None
            }
            Err(_) => None,
        }
    }

    /// Writes through the per-layer file lock; failure downgrades to an
    /// in-memory-only tile.
    async fn persist(&self, id: &TileId, bytes: &[u8]) {
        if let Err(e) = self.disk.write(id, bytes).await {
            warn!(tile = %id, error = %e, "disk cache write failed, tile kept in memory only");
        }
    }

    fn native_dds_format(&self) -> DdsFormat {
        match self.descriptor.stored_format {
            StoredFormat::Dds(format) => format,
            _ => DdsFormat::BC1,
        }
    }
}

async fn run_image_task<T, F>(task: F) -> Result<T, ProcessError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| ProcessError::Task(e.to_string()))
}

/// True if every pixel equals the first: provider placeholders and empty
/// ocean fills, the tiles `reject_blank_tiles` filters out.
pub fn is_blank(image: &RgbaImage) -> bool {
    let mut pixels = image.pixels();
    let Some(first) = pixels.next() else {
        return true;
    };
    pixels.all(|pixel| pixel == first)
}

/// Composites a mask tile's alpha channel onto the imagery.
///
/// Dimensions must match; a mismatched mask leaves the image untouched.
pub fn apply_mask(mut image: RgbaImage, mask: &RgbaImage) -> RgbaImage {
    if image.dimensions() != mask.dimensions() {
        return image;
    }
    for (pixel, mask_pixel) in image.pixels_mut().zip(mask.pixels()) {
        pixel[3] = pixel[3].min(mask_pixel[3]);
    }
    image
}

fn encode_stored(image: &RgbaImage, format: StoredFormat) -> Result<Vec<u8>, image::ImageError> {
    let mut out = std::io::Cursor::new(Vec::new());
    match format {
        StoredFormat::Png => {
            image.write_to(&mut out, image::ImageFormat::Png)?;
        }
        StoredFormat::Jpeg => {
            // JPEG has no alpha channel
            let rgb = image::DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            rgb.write_to(&mut out, image::ImageFormat::Jpeg)?;
        }
        StoredFormat::Dds(_) => unreachable!("DDS goes through DdsEncoder"),
    }
    Ok(out.into_inner())
}

/// Rebuilds a render-ready texture from a cached file's bytes.
///
/// Returns `None` when the payload is corrupt; callers delete the file
/// and mark the tile absent.
pub fn texture_from_stored(
    descriptor: &LayerDescriptor,
    id: &TileId,
    bytes: Vec<u8>,
) -> Option<TileTexture> {
    if bytes.is_empty() {
        return None;
    }
    match descriptor.stored_format {
        StoredFormat::Dds(format) => {
            let (width, height) = parse_dds_dimensions(&bytes).unwrap_or((0, 0));
            Some(TileTexture {
                id: id.clone(),
                format: TextureFormat::Dds(format),
                width,
                height,
                data: Bytes::from(bytes),
            })
        }
        StoredFormat::Png | StoredFormat::Jpeg => {
            let image = image::load_from_memory(&bytes).ok()?.to_rgba8();
            let (width, height) = image.dimensions();
            Some(TileTexture {
                id: id.clone(),
                format: TextureFormat::Rgba8,
                width,
                height,
                data: Bytes::from(image.into_raw()),
            })
        }
    }
}
