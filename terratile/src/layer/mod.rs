//! Declarative layer descriptors.
//!
//! A [`LayerDescriptor`] describes one imagery dataset: where its tiles
//! come from, how they are projected, what format they are stored in, and
//! how long cached copies stay fresh. One descriptor configures one
//! `TileService`; adding a dataset means writing a descriptor, not a type.
//!
//! Descriptors are plain data and load from JSON files, so a catalog of
//! datasets can ship beside the application.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::coord::TileAddress;
use crate::texture::DdsFormat;

/// Errors from descriptor loading and validation.
#[derive(Debug, Error)]
pub enum LayerError {
    /// Descriptor file could not be read.
    #[error("failed to read descriptor: {0}")]
    Io(#[from] std::io::Error),

    /// Descriptor file is not valid JSON.
    #[error("failed to parse descriptor: {0}")]
    Parse(#[from] serde_json::Error),

    /// Descriptor contents are inconsistent.
    #[error("invalid descriptor: {0}")]
    Invalid(String),
}

/// On-disk format for cached tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoredFormat {
    /// Lossless PNG.
    Png,
    /// JPEG (alpha discarded).
    Jpeg,
    /// BC-compressed DDS container.
    Dds(DdsFormat),
}

impl StoredFormat {
    /// File extension for cached tiles in this format.
    pub fn extension(&self) -> &'static str {
        match self {
            StoredFormat::Png => "png",
            StoredFormat::Jpeg => "jpg",
            StoredFormat::Dds(_) => "dds",
        }
    }
}

/// Projection of the imagery delivered by the tile server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Projection {
    /// Web Mercator; rows must be remapped before display.
    Mercator,
    /// Linear-latitude rows; usable as delivered.
    Equirectangular,
}

/// Declarative description of one imagery dataset.
///
/// # Example
///
/// ```
/// use terratile::layer::{LayerDescriptor, Projection, StoredFormat};
///
/// let descriptor = LayerDescriptor {
///     dataset: "bluemarble".into(),
///     display_name: "Blue Marble".into(),
///     url_template: "https://tiles.example.com/bm/{level}/{row}/{col}.jpg".into(),
///     mask_url_template: None,
///     cache_prefix: "example/bluemarble".into(),
///     stored_format: StoredFormat::Png,
///     projection: Projection::Mercator,
///     level_count: 10,
///     reject_blank_tiles: false,
///     default_expiry_secs: Some(86_400),
///     level_expiry_secs: Default::default(),
/// };
/// assert!(descriptor.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerDescriptor {
    /// Dataset identifier; becomes the dataset component of tile ids.
    pub dataset: String,

    /// Human-readable name for UIs and logs.
    pub display_name: String,

    /// Tile URL template with `{level}`, `{row}` and `{col}` placeholders.
    pub url_template: String,

    /// Optional alpha-mask URL template with the same placeholders.
    ///
    /// When present, the mask tile's alpha channel is composited onto the
    /// imagery during post-processing.
    #[serde(default)]
    pub mask_url_template: Option<String>,

    /// Relative directory under the cache root for this dataset's files.
    pub cache_prefix: String,

    /// Format tiles are stored in (and re-encoded to, if needed).
    pub stored_format: StoredFormat,

    /// Projection of the imagery as delivered by the server.
    pub projection: Projection,

    /// Number of pyramid levels the dataset provides.
    pub level_count: u8,

    /// Reject tiles whose pixels are all identical (provider placeholders).
    #[serde(default)]
    pub reject_blank_tiles: bool,

    /// Expiry window in seconds applied to levels without an override.
    /// `None` means cached tiles never expire.
    #[serde(default)]
    pub default_expiry_secs: Option<u64>,

    /// Per-level expiry overrides in seconds.
    #[serde(default)]
    pub level_expiry_secs: HashMap<u8, u64>,
}

impl LayerDescriptor {
    /// Load a descriptor from a JSON file.
    pub fn from_path(path: &Path) -> Result<Self, LayerError> {
        let text = std::fs::read_to_string(path)?;
        let descriptor: Self = serde_json::from_str(&text)?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Check the descriptor for internal consistency.
    pub fn validate(&self) -> Result<(), LayerError> {
        if self.dataset.is_empty() {
            return Err(LayerError::Invalid("dataset must not be empty".into()));
        }
        if self.cache_prefix.is_empty() {
            return Err(LayerError::Invalid("cache_prefix must not be empty".into()));
        }
        if self.level_count == 0 {
            return Err(LayerError::Invalid("level_count must be at least 1".into()));
        }
        for template in std::iter::once(&self.url_template).chain(self.mask_url_template.iter()) {
            for placeholder in ["{level}", "{row}", "{col}"] {
                if !template.contains(placeholder) {
                    return Err(LayerError::Invalid(format!(
                        "url template {:?} is missing {}",
                        template, placeholder
                    )));
                }
            }
        }
        Ok(())
    }

    /// Build the imagery URL for a tile.
    pub fn url_for(&self, address: &TileAddress) -> String {
        expand_template(&self.url_template, address)
    }

    /// Build the mask URL for a tile, if a mask is configured.
    pub fn mask_url_for(&self, address: &TileAddress) -> Option<String> {
        self.mask_url_template
            .as_ref()
            .map(|template| expand_template(template, address))
    }

    /// Expiry window for cached tiles at the given level.
    pub fn expiry_for(&self, level: u8) -> Option<Duration> {
        self.level_expiry_secs
            .get(&level)
            .copied()
            .or(self.default_expiry_secs)
            .map(Duration::from_secs)
    }
}

fn expand_template(template: &str, address: &TileAddress) -> String {
    template
        .replace("{level}", &address.level.to_string())
        .replace("{row}", &address.row.to_string())
        .replace("{col}", &address.col.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> LayerDescriptor {
        LayerDescriptor {
            dataset: "radio_k".into(),
            display_name: "Potassium (K)".into(),
            url_template: "https://tiles.example.com/radio_k/{level}/{row}/{col}.jpg".into(),
            mask_url_template: Some(
                "https://tiles.example.com/radio_mask/{level}/{row}/{col}.png".into(),
            ),
            cache_prefix: "example/radiometrics/radio_k".into(),
            stored_format: StoredFormat::Dds(DdsFormat::BC3),
            projection: Projection::Mercator,
            level_count: 8,
            reject_blank_tiles: true,
            default_expiry_secs: Some(3600),
            level_expiry_secs: HashMap::from([(0, 86_400)]),
        }
    }

    #[test]
    fn test_url_for_substitutes_placeholders() {
        let url = descriptor().url_for(&TileAddress::new(5, 10, 20));
        assert_eq!(url, "https://tiles.example.com/radio_k/5/10/20.jpg");
    }

    #[test]
    fn test_mask_url_for() {
        let url = descriptor().mask_url_for(&TileAddress::new(2, 1, 3));
        assert_eq!(
            url.as_deref(),
            Some("https://tiles.example.com/radio_mask/2/1/3.png")
        );
    }

    #[test]
    fn test_mask_url_absent() {
        let mut d = descriptor();
        d.mask_url_template = None;
        assert_eq!(d.mask_url_for(&TileAddress::new(2, 1, 3)), None);
    }

    #[test]
    fn test_expiry_override_and_default() {
        let d = descriptor();
        assert_eq!(d.expiry_for(0), Some(Duration::from_secs(86_400)));
        assert_eq!(d.expiry_for(5), Some(Duration::from_secs(3600)));
    }

    #[test]
    fn test_expiry_none_means_never() {
        let mut d = descriptor();
        d.default_expiry_secs = None;
        d.level_expiry_secs.clear();
        assert_eq!(d.expiry_for(3), None);
    }

    #[test]
    fn test_validate_rejects_bad_template() {
        let mut d = descriptor();
        d.url_template = "https://tiles.example.com/static.jpg".into();
        assert!(matches!(d.validate(), Err(LayerError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_empty_dataset() {
        let mut d = descriptor();
        d.dataset = String::new();
        assert!(matches!(d.validate(), Err(LayerError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_zero_levels() {
        let mut d = descriptor();
        d.level_count = 0;
        assert!(matches!(d.validate(), Err(LayerError::Invalid(_))));
    }

    #[test]
    fn test_json_roundtrip() {
        let d = descriptor();
        let json = serde_json::to_string(&d).unwrap();
        let back: LayerDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back.dataset, d.dataset);
        assert_eq!(back.stored_format, d.stored_format);
        assert_eq!(back.projection, d.projection);
        assert_eq!(back.level_expiry_secs, d.level_expiry_secs);
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layer.json");
        std::fs::write(&path, serde_json::to_string(&descriptor()).unwrap()).unwrap();

        let loaded = LayerDescriptor::from_path(&path).unwrap();
        assert_eq!(loaded.dataset, "radio_k");
    }

    #[test]
    fn test_extension_matches_format() {
        assert_eq!(StoredFormat::Png.extension(), "png");
        assert_eq!(StoredFormat::Jpeg.extension(), "jpg");
        assert_eq!(StoredFormat::Dds(DdsFormat::BC1).extension(), "dds");
    }
}
