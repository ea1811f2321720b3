//! Tile addressing and Mercator sector math.
//!
//! Provides conversions between geographic coordinates (latitude/longitude)
//! and XYZ tile addresses, plus the [`MercatorSector`] type used when
//! remapping Mercator-projected imagery into the row spacing the display
//! layer expects.

use std::f64::consts::PI;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Minimum latitude representable in Web Mercator (degrees).
pub const MIN_LAT: f64 = -85.05112878;

/// Maximum latitude representable in Web Mercator (degrees).
pub const MAX_LAT: f64 = 85.05112878;

/// Minimum longitude (degrees).
pub const MIN_LON: f64 = -180.0;

/// Maximum longitude (degrees).
pub const MAX_LON: f64 = 180.0;

/// Maximum supported pyramid level.
pub const MAX_LEVEL: u8 = 22;

/// Errors from coordinate conversion.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordError {
    /// Latitude outside the Web Mercator range.
    #[error("invalid latitude: {0} (must be {MIN_LAT}..={MAX_LAT})")]
    InvalidLatitude(f64),

    /// Longitude outside -180..=180.
    #[error("invalid longitude: {0} (must be {MIN_LON}..={MAX_LON})")]
    InvalidLongitude(f64),

    /// Level above [`MAX_LEVEL`].
    #[error("invalid level: {0} (max {MAX_LEVEL})")]
    InvalidLevel(u8),
}

/// Position of a tile within a dataset's pyramid.
///
/// Uses XYZ addressing: row 0 is the northernmost row, column 0 the
/// westernmost column, and level `n` has `2^n` rows and columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileAddress {
    /// Pyramid level (0 = whole world in one tile).
    pub level: u8,
    /// Tile row (north to south).
    pub row: u32,
    /// Tile column (west to east).
    pub col: u32,
}

impl TileAddress {
    /// Create a new tile address.
    pub fn new(level: u8, row: u32, col: u32) -> Self {
        Self { level, row, col }
    }

    /// Number of rows (and columns) at this address's level.
    pub fn tiles_per_side(&self) -> u32 {
        1u32 << self.level.min(31)
    }
}

impl fmt::Display for TileAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.level, self.row, self.col)
    }
}

/// Identity of a tile: dataset plus pyramid position.
///
/// This is the sole cache and request key throughout the pipeline. Two
/// identities with equal fields always denote the same tile.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileId {
    /// Dataset identifier (from the layer descriptor).
    pub dataset: Arc<str>,
    /// Position within the dataset's pyramid.
    pub address: TileAddress,
}

impl TileId {
    /// Create a new tile identity.
    pub fn new(dataset: impl Into<Arc<str>>, address: TileAddress) -> Self {
        Self {
            dataset: dataset.into(),
            address,
        }
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.dataset, self.address)
    }
}

/// Converts geographic coordinates to the containing tile address.
///
/// # Arguments
///
/// * `lat` - Latitude in degrees (clamped to the Web Mercator range)
/// * `lon` - Longitude in degrees (-180.0 to 180.0)
/// * `level` - Pyramid level (0 to [`MAX_LEVEL`])
pub fn to_tile_address(lat: f64, lon: f64, level: u8) -> Result<TileAddress, CoordError> {
    if !(MIN_LAT..=MAX_LAT).contains(&lat) {
        return Err(CoordError::InvalidLatitude(lat));
    }
    if !(MIN_LON..=MAX_LON).contains(&lon) {
        return Err(CoordError::InvalidLongitude(lon));
    }
    if level > MAX_LEVEL {
        return Err(CoordError::InvalidLevel(level));
    }

    let n = 2.0_f64.powi(level as i32);
    let max_index = (1u32 << level) - 1;

    let col = (((lon + 180.0) / 360.0 * n) as u32).min(max_index);

    let lat_rad = lat.to_radians();
    let row = ((((1.0 - lat_rad.tan().asinh() / PI) / 2.0) * n) as u32).min(max_index);

    Ok(TileAddress { level, row, col })
}

/// Converts a tile address back to geographic coordinates.
///
/// Returns the latitude/longitude of the tile's northwest corner in degrees.
pub fn tile_to_lat_lon(address: &TileAddress) -> (f64, f64) {
    let n = 2.0_f64.powi(address.level as i32);
    let lon = address.col as f64 / n * 360.0 - 180.0;
    let lat_rad = (PI * (1.0 - 2.0 * address.row as f64 / n)).sinh().atan();
    (lat_rad.to_degrees(), lon)
}

/// Latitude bounds of a Mercator tile, in both latitude-percent and radians.
///
/// "Latitude percent" is the Gudermannian-inverse of latitude scaled to
/// \[-1, 1\]: the vertical axis of the Mercator projection. A tile spans a
/// uniform band of this axis, which is what makes the row remap in the
/// post-processor a pure function of these bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MercatorSector {
    min_lat_percent: f64,
    max_lat_percent: f64,
}

impl MercatorSector {
    /// Sector covered by the given tile address.
    pub fn for_address(address: &TileAddress) -> Self {
        let n = 2.0_f64.powi(address.level as i32);
        Self {
            min_lat_percent: 1.0 - 2.0 * (address.row as f64 + 1.0) / n,
            max_lat_percent: 1.0 - 2.0 * address.row as f64 / n,
        }
    }

    /// Lower latitude bound on the Mercator axis, in \[-1, 1\].
    pub fn min_lat_percent(&self) -> f64 {
        self.min_lat_percent
    }

    /// Upper latitude bound on the Mercator axis, in \[-1, 1\].
    pub fn max_lat_percent(&self) -> f64 {
        self.max_lat_percent
    }

    /// Lower latitude bound in radians.
    pub fn min_latitude(&self) -> f64 {
        gudermannian(self.min_lat_percent)
    }

    /// Upper latitude bound in radians.
    pub fn max_latitude(&self) -> f64 {
        gudermannian(self.max_lat_percent)
    }

    /// Latitude extent in radians.
    pub fn delta_latitude(&self) -> f64 {
        self.max_latitude() - self.min_latitude()
    }
}

/// Gudermannian function: Mercator axis position (\[-1, 1\]) to latitude
/// in radians.
pub fn gudermannian(percent: f64) -> f64 {
    (percent * PI).sinh().atan()
}

/// Inverse Gudermannian: latitude in radians to Mercator axis position.
pub fn gudermannian_inverse(lat_rad: f64) -> f64 {
    lat_rad.tan().asinh() / PI
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_to_tile_address_equator_origin() {
        // (0, 0) at level 1 lands in the southeast quadrant tile
        let addr = to_tile_address(0.0, 0.0, 1).unwrap();
        assert_eq!(addr, TileAddress::new(1, 1, 1));
    }

    #[test]
    fn test_to_tile_address_level_zero() {
        let addr = to_tile_address(45.0, -120.0, 0).unwrap();
        assert_eq!(addr, TileAddress::new(0, 0, 0));
    }

    #[test]
    fn test_to_tile_address_northwest_extreme() {
        let addr = to_tile_address(MAX_LAT, MIN_LON, 3).unwrap();
        assert_eq!(addr.row, 0);
        assert_eq!(addr.col, 0);
    }

    #[test]
    fn test_to_tile_address_southeast_extreme() {
        // The antimeridian and south edge clamp to the last tile index
        let addr = to_tile_address(MIN_LAT, MAX_LON, 3).unwrap();
        assert_eq!(addr.row, 7);
        assert_eq!(addr.col, 7);
    }

    #[test]
    fn test_invalid_latitude() {
        assert_eq!(
            to_tile_address(90.0, 0.0, 4),
            Err(CoordError::InvalidLatitude(90.0))
        );
    }

    #[test]
    fn test_invalid_longitude() {
        assert_eq!(
            to_tile_address(0.0, 200.0, 4),
            Err(CoordError::InvalidLongitude(200.0))
        );
    }

    #[test]
    fn test_invalid_level() {
        assert_eq!(
            to_tile_address(0.0, 0.0, 23),
            Err(CoordError::InvalidLevel(23))
        );
    }

    #[test]
    fn test_tile_to_lat_lon_origin() {
        let (lat, lon) = tile_to_lat_lon(&TileAddress::new(1, 1, 1));
        assert!(lat.abs() < 1e-9);
        assert!(lon.abs() < 1e-9);
    }

    #[test]
    fn test_tile_id_equality_and_hash() {
        use std::collections::HashSet;

        let a = TileId::new("bluemarble", TileAddress::new(5, 10, 20));
        let b = TileId::new("bluemarble", TileAddress::new(5, 10, 20));
        let c = TileId::new("radiometry", TileAddress::new(5, 10, 20));

        assert_eq!(a, b);
        assert_ne!(a, c);

        let mut set = HashSet::new();
        set.insert(a);
        set.insert(b);
        set.insert(c);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_tile_id_display() {
        let id = TileId::new("bluemarble", TileAddress::new(5, 10, 20));
        assert_eq!(id.to_string(), "bluemarble/5/10/20");
    }

    #[test]
    fn test_sector_bounds_level_one() {
        // Northern tile of a 2x2 pyramid spans the upper half of the axis
        let sector = MercatorSector::for_address(&TileAddress::new(1, 0, 0));
        assert!((sector.min_lat_percent() - 0.0).abs() < 1e-12);
        assert!((sector.max_lat_percent() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_sector_latitudes_are_ordered() {
        let sector = MercatorSector::for_address(&TileAddress::new(4, 3, 0));
        assert!(sector.min_latitude() < sector.max_latitude());
        assert!(sector.delta_latitude() > 0.0);
    }

    #[test]
    fn test_gudermannian_roundtrip() {
        for percent in [-0.99, -0.5, 0.0, 0.25, 0.75] {
            let lat = gudermannian(percent);
            let back = gudermannian_inverse(lat);
            assert!(
                (back - percent).abs() < 1e-12,
                "percent {} round-tripped to {}",
                percent,
                back
            );
        }
    }

    #[test]
    fn test_gudermannian_covers_mercator_range() {
        // The axis extremes map to the Web Mercator latitude limits
        let lat = gudermannian(1.0).to_degrees();
        assert!((lat - MAX_LAT).abs() < 1e-6);
    }

    proptest! {
        #[test]
        fn prop_tile_roundtrip_contains_point(
            lat in -80.0f64..80.0,
            lon in -179.0f64..179.0,
            level in 1u8..12,
        ) {
            let addr = to_tile_address(lat, lon, level).unwrap();
            let (nw_lat, nw_lon) = tile_to_lat_lon(&addr);
            let (se_lat, se_lon) =
                tile_to_lat_lon(&TileAddress::new(level, addr.row + 1, addr.col + 1));

            prop_assert!(nw_lon <= lon && lon <= se_lon + 1e-9);
            prop_assert!(se_lat - 1e-9 <= lat && lat <= nw_lat + 1e-9);
        }

        #[test]
        fn prop_gudermannian_inverse_monotonic(a in -1.4f64..1.4, b in -1.4f64..1.4) {
            prop_assume!(a < b);
            prop_assert!(gudermannian_inverse(a) < gudermannian_inverse(b));
        }
    }
}
