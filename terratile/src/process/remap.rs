//! Mercator-to-equirectangular row remap.
//!
//! Tile servers deliver Web Mercator imagery: row spacing is uniform on
//! the Mercator axis, not in latitude. The display layer addresses rows
//! linearly in latitude, so each output row is filled from the input row
//! whose Mercator position corresponds to the output row's latitude —
//! a nearest-neighbor remap keyed by the inverse Gudermannian function.
//! Rows are independent, so the copy is parallelized with rayon.

use image::RgbaImage;
use rayon::prelude::*;

use crate::coord::{gudermannian_inverse, MercatorSector};

/// Remaps a Mercator tile image to linear-latitude row spacing.
///
/// Output dimensions equal input dimensions; each output row is a copy of
/// the nearest source row. Images shorter than two rows are returned
/// unchanged.
pub fn mercator_to_equirect(image: &RgbaImage, sector: &MercatorSector) -> RgbaImage {
    let (width, height) = image.dimensions();
    if height < 2 {
        return image.clone();
    }

    let row_len = width as usize * 4;
    let src = image.as_raw();
    let min_percent = sector.min_lat_percent();
    let span = sector.max_lat_percent() - min_percent;
    let min_lat = sector.min_latitude();
    let delta_lat = sector.delta_latitude();
    let max_row = (height - 1) as f64;

    let mut out = vec![0u8; src.len()];
    out.par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(y, row)| {
            let sy = 1.0 - y as f64 / max_row;
            let lat = sy * delta_lat + min_lat;
            let dy = (1.0 - (gudermannian_inverse(lat) - min_percent) / span).clamp(0.0, 1.0);
            let source_row = (dy * max_row).round() as usize;
            row.copy_from_slice(&src[source_row * row_len..][..row_len]);
        });

    match RgbaImage::from_raw(width, height, out) {
        Some(remapped) => remapped,
        None => image.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::TileAddress;
    use image::Rgba;

    /// Image whose every row is filled with its own row index.
    fn row_indexed_image(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |_, y| Rgba([y as u8, 0, 0, 255]))
    }

    fn sector(level: u8, row: u32) -> MercatorSector {
        MercatorSector::for_address(&TileAddress::new(level, row, 0))
    }

    #[test]
    fn test_dimensions_preserved() {
        let image = row_indexed_image(8, 16);
        let out = mercator_to_equirect(&image, &sector(3, 1));
        assert_eq!(out.dimensions(), (8, 16));
    }

    #[test]
    fn test_edge_rows_map_to_themselves() {
        let image = row_indexed_image(4, 32);
        let out = mercator_to_equirect(&image, &sector(4, 5));

        // y=0 is the sector's top latitude, y=h-1 its bottom; both are
        // fixed points of the remap
        assert_eq!(out.get_pixel(0, 0)[0], 0);
        assert_eq!(out.get_pixel(0, 31)[0], 31);
    }

    #[test]
    fn test_source_rows_monotonic() {
        let image = row_indexed_image(4, 64);
        let out = mercator_to_equirect(&image, &sector(5, 3));

        let mut last = 0u8;
        for y in 0..64 {
            let source = out.get_pixel(0, y)[0];
            assert!(source >= last, "row {} sourced above previous", y);
            last = source;
        }
    }

    #[test]
    fn test_northern_tile_samples_southward() {
        // In a northern-hemisphere tile, linear-latitude rows fall south
        // of their Mercator counterparts, so interior rows pull imagery
        // from below
        let image = row_indexed_image(4, 64);
        let out = mercator_to_equirect(&image, &sector(1, 0));

        for y in 0..64 {
            let source = out.get_pixel(0, y)[0] as u32;
            assert!(source >= y, "row {} sourced from {} (north of it)", y, source);
        }
        assert!(out.get_pixel(0, 32)[0] as u32 > 32);
    }

    #[test]
    fn test_single_row_image_unchanged() {
        let image = row_indexed_image(4, 1);
        let out = mercator_to_equirect(&image, &sector(3, 1));
        assert_eq!(out.as_raw(), image.as_raw());
    }
}
