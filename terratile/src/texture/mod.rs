//! Render-ready tile payloads and texture encoding.
//!
//! A [`TileTexture`] is what the memory cache hands to the rendering
//! consumer: either raw RGBA pixels or a DDS container with BC-compressed
//! blocks that can be uploaded to the GPU as-is.

mod dds;

pub use dds::{DdsEncoder, DdsFormat, parse_dds_dimensions, DDS_HEADER_LEN};

use bytes::Bytes;
use thiserror::Error;

use crate::coord::TileId;

/// Errors from texture encoding.
#[derive(Debug, Error)]
pub enum TextureError {
    /// Image dimensions unsupported by the encoder.
    #[error("invalid dimensions {width}x{height}: {reason}")]
    InvalidDimensions {
        width: u32,
        height: u32,
        reason: &'static str,
    },

    /// Encoding to the target container failed.
    #[error("encode failed: {0}")]
    Encode(String),
}

/// Pixel layout of a render-ready tile payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFormat {
    /// Raw RGBA, 4 bytes per pixel, row-major.
    Rgba8,
    /// DDS container with BC-compressed blocks.
    Dds(DdsFormat),
}

/// Decoded, render-ready image payload for one tile.
///
/// Owned by the memory cache once inserted; consumers receive
/// `Arc<TileTexture>` handles, so eviction only drops the cache's own
/// reference.
#[derive(Debug, Clone)]
pub struct TileTexture {
    /// Identity of the tile this payload renders.
    pub id: TileId,
    /// Payload layout.
    pub format: TextureFormat,
    /// Width in pixels (0 if unknown, e.g. opaque native payloads).
    pub width: u32,
    /// Height in pixels (0 if unknown).
    pub height: u32,
    /// The payload bytes.
    pub data: Bytes,
}

impl TileTexture {
    /// Payload size in bytes, used for cache weighting.
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::TileAddress;

    fn test_id() -> TileId {
        TileId::new("test", TileAddress::new(3, 1, 2))
    }

    #[test]
    fn test_byte_len() {
        let texture = TileTexture {
            id: test_id(),
            format: TextureFormat::Rgba8,
            width: 2,
            height: 2,
            data: Bytes::from(vec![0u8; 16]),
        };
        assert_eq!(texture.byte_len(), 16);
    }

    #[test]
    fn test_format_equality() {
        assert_eq!(TextureFormat::Dds(DdsFormat::BC1), TextureFormat::Dds(DdsFormat::BC1));
        assert_ne!(TextureFormat::Dds(DdsFormat::BC1), TextureFormat::Dds(DdsFormat::BC3));
        assert_ne!(TextureFormat::Rgba8, TextureFormat::Dds(DdsFormat::BC1));
    }
}
