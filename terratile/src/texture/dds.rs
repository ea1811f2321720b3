//! DDS container writer with BC1/BC3 block compression.
//!
//! Encodes RGBA images to DirectDraw Surface files, optionally with a
//! mipmap chain. Block compression is done with `intel_tex_2`.

use image::imageops::FilterType;
use image::RgbaImage;
use intel_tex_2::{bc1, bc3, RgbaSurface};
use serde::{Deserialize, Serialize};

use crate::texture::TextureError;

/// Size of the DDS magic plus header, in bytes.
pub const DDS_HEADER_LEN: usize = 128;

const DDSD_CAPS: u32 = 0x1;
const DDSD_HEIGHT: u32 = 0x2;
const DDSD_WIDTH: u32 = 0x4;
const DDSD_PIXELFORMAT: u32 = 0x1000;
const DDSD_MIPMAPCOUNT: u32 = 0x20000;
const DDSD_LINEARSIZE: u32 = 0x80000;

const DDPF_FOURCC: u32 = 0x4;

const DDSCAPS_COMPLEX: u32 = 0x8;
const DDSCAPS_TEXTURE: u32 = 0x1000;
const DDSCAPS_MIPMAP: u32 = 0x400000;

/// DDS block-compression format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DdsFormat {
    /// BC1 (DXT1): 8 bytes per 4x4 block, 1-bit alpha.
    BC1,
    /// BC3 (DXT5): 16 bytes per 4x4 block, interpolated alpha.
    BC3,
}

impl DdsFormat {
    /// Bytes per 4x4 block.
    pub fn block_size(&self) -> usize {
        match self {
            DdsFormat::BC1 => 8,
            DdsFormat::BC3 => 16,
        }
    }

    fn four_cc(&self) -> &'static [u8; 4] {
        match self {
            DdsFormat::BC1 => b"DXT1",
            DdsFormat::BC3 => b"DXT5",
        }
    }
}

/// DDS texture encoder.
///
/// # Example
///
/// ```
/// use terratile::texture::{DdsEncoder, DdsFormat};
///
/// let encoder = DdsEncoder::new(DdsFormat::BC1).with_mipmap_count(3);
/// assert_eq!(encoder.expected_size(256, 256), 128 + 32768 + 8192 + 2048);
/// ```
#[derive(Debug, Clone)]
pub struct DdsEncoder {
    format: DdsFormat,
    mipmap_count: usize,
}

impl DdsEncoder {
    /// Create an encoder producing a single base level.
    pub fn new(format: DdsFormat) -> Self {
        Self {
            format,
            mipmap_count: 1,
        }
    }

    /// Set the number of mipmap levels (including the base level).
    pub fn with_mipmap_count(mut self, count: usize) -> Self {
        self.mipmap_count = count.max(1);
        self
    }

    /// The compression format.
    pub fn format(&self) -> DdsFormat {
        self.format
    }

    /// The mipmap level count.
    pub fn mipmap_count(&self) -> usize {
        self.mipmap_count
    }

    /// Total output size for an image of the given dimensions.
    pub fn expected_size(&self, width: u32, height: u32) -> usize {
        let mut total = DDS_HEADER_LEN;
        let (mut w, mut h) = (width, height);
        for _ in 0..self.effective_mipmap_count(width, height) {
            total += blocks(w) * blocks(h) * self.format.block_size();
            w = (w / 2).max(1);
            h = (h / 2).max(1);
        }
        total
    }

    /// Encode an RGBA image to a complete DDS file.
    ///
    /// Dimensions must be non-zero multiples of 4 (the BC block size).
    /// The mipmap chain stops early rather than emit levels smaller than
    /// one block.
    pub fn encode(&self, image: &RgbaImage) -> Result<Vec<u8>, TextureError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(TextureError::InvalidDimensions {
                width,
                height,
                reason: "zero-sized image",
            });
        }
        if width % 4 != 0 || height % 4 != 0 {
            return Err(TextureError::InvalidDimensions {
                width,
                height,
                reason: "dimensions must be multiples of 4",
            });
        }

        let mip_count = self.effective_mipmap_count(width, height);
        let mut out = Vec::with_capacity(self.expected_size(width, height));
        write_header(&mut out, width, height, self.format, mip_count);

        let mut level = image.clone();
        for i in 0..mip_count {
            if i > 0 {
                let (w, h) = level.dimensions();
                level = image::imageops::resize(&level, w / 2, h / 2, FilterType::Triangle);
            }
            out.extend_from_slice(&compress_level(&level, self.format));
        }

        Ok(out)
    }

    /// Mipmap levels actually emitted: stops once a level would drop
    /// below 4x4 or off the block grid.
    fn effective_mipmap_count(&self, width: u32, height: u32) -> u32 {
        let mut count = 0u32;
        let (mut w, mut h) = (width, height);
        while count < self.mipmap_count as u32 && w >= 4 && h >= 4 && w % 4 == 0 && h % 4 == 0 {
            count += 1;
            w /= 2;
            h /= 2;
        }
        count.max(1)
    }
}

fn blocks(dim: u32) -> usize {
    dim.div_ceil(4) as usize
}

fn compress_level(level: &RgbaImage, format: DdsFormat) -> Vec<u8> {
    let (w, h) = level.dimensions();
    let surface = RgbaSurface {
        data: level.as_raw(),
        width: w,
        height: h,
        stride: w * 4,
    };
    match format {
        DdsFormat::BC1 => bc1::compress_blocks(&surface),
        DdsFormat::BC3 => bc3::compress_blocks(&surface),
    }
}

fn write_header(out: &mut Vec<u8>, width: u32, height: u32, format: DdsFormat, mip_count: u32) {
    let linear_size = (blocks(width) * blocks(height) * format.block_size()) as u32;
    let mut flags = DDSD_CAPS | DDSD_HEIGHT | DDSD_WIDTH | DDSD_PIXELFORMAT | DDSD_LINEARSIZE;
    let mut caps = DDSCAPS_TEXTURE;
    if mip_count > 1 {
        flags |= DDSD_MIPMAPCOUNT;
        caps |= DDSCAPS_COMPLEX | DDSCAPS_MIPMAP;
    }

    out.extend_from_slice(b"DDS ");
    out.extend_from_slice(&124u32.to_le_bytes()); // header size
    out.extend_from_slice(&flags.to_le_bytes());
    out.extend_from_slice(&height.to_le_bytes());
    out.extend_from_slice(&width.to_le_bytes());
    out.extend_from_slice(&linear_size.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes()); // depth
    out.extend_from_slice(&mip_count.to_le_bytes());
    out.extend_from_slice(&[0u8; 44]); // reserved1

    // DDS_PIXELFORMAT
    out.extend_from_slice(&32u32.to_le_bytes());
    out.extend_from_slice(&DDPF_FOURCC.to_le_bytes());
    out.extend_from_slice(format.four_cc());
    out.extend_from_slice(&[0u8; 20]); // bit count + masks, unused for FourCC

    out.extend_from_slice(&caps.to_le_bytes());
    out.extend_from_slice(&[0u8; 16]); // caps2..4 + reserved2
}

/// Read width/height from a DDS header, if the payload carries one.
pub fn parse_dds_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    if data.len() < DDS_HEADER_LEN || &data[0..4] != b"DDS " {
        return None;
    }
    let height = u32::from_le_bytes(data[12..16].try_into().ok()?);
    let width = u32::from_le_bytes(data[16..20].try_into().ok()?);
    Some((width, height))
}
