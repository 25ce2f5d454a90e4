//! Web Mercator tile math.
//!
//! Maps XYZ tile addresses to projected EPSG:3857 extents and provides the
//! forward/backward lon-lat transform used by the built-in reprojection.

use std::f64::consts::PI;

use geo::Coord;

use crate::bounds::GeoBox;
use crate::model::Reprojection;

/// Spherical earth radius used by EPSG:3857.
pub const EARTH_RADIUS: f64 = 6_378_137.0;

/// Half the extent of the Web Mercator plane.
pub const MERCATOR_BOUND: f64 = PI * EARTH_RADIUS;

/// Latitude beyond which the Mercator projection diverges.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// OGC standardized rendering pixel size in meters (0.28 mm).
const OGC_PIXEL_SIZE: f64 = 0.000_28;

/// Meters per degree along the equator.
const METERS_PER_DEGREE: f64 = 111_319.490_793_273_57;

/// Projected extent of the tile at address (x, y, z).
///
/// Row 0 is the northernmost row, matching the XYZ tiling scheme.
pub fn merc_extent(x: u64, y: u64, z: u64) -> GeoBox {
    let tile_span = 2.0 * MERCATOR_BOUND / (1u64 << z) as f64;
    let min_x = -MERCATOR_BOUND + x as f64 * tile_span;
    let max_y = MERCATOR_BOUND - y as f64 * tile_span;
    GeoBox::new(min_x, max_y - tile_span, min_x + tile_span, max_y)
}

/// OGC scale denominator for a resolution in map units per pixel.
pub fn scale_denominator(scale: f64, is_geographic: bool) -> f64 {
    let meters = if is_geographic {
        scale * METERS_PER_DEGREE
    } else {
        scale
    };
    meters / OGC_PIXEL_SIZE
}

/// Forward transform: lon/lat degrees to Web Mercator meters.
///
/// Longitudes beyond +/-180 extrapolate linearly (buffered extents may
/// poke past the antimeridian); latitudes beyond the Mercator limit
/// cannot be represented and return `None`.
pub fn lonlat_to_merc(c: Coord<f64>) -> Option<Coord<f64>> {
    if !c.x.is_finite() || !c.y.is_finite() || c.y.abs() > MAX_LATITUDE {
        return None;
    }
    let x = c.x * MERCATOR_BOUND / 180.0;
    let y = EARTH_RADIUS * (PI / 4.0 + c.y.to_radians() / 2.0).tan().ln();
    Some(Coord { x, y })
}

/// Backward transform: Web Mercator meters to lon/lat degrees.
///
/// Defined for the whole plane; x beyond the world bound extrapolates
/// past +/-180 degrees.
pub fn merc_to_lonlat(c: Coord<f64>) -> Option<Coord<f64>> {
    if !c.x.is_finite() || !c.y.is_finite() {
        return None;
    }
    let lon = c.x / MERCATOR_BOUND * 180.0;
    let lat = (2.0 * (c.y / EARTH_RADIUS).exp().atan() - PI / 2.0).to_degrees();
    Some(Coord { x: lon, y: lat })
}

/// Built-in reprojection for lon/lat layers on a Web Mercator map.
#[derive(Debug, Clone, Copy, Default)]
pub struct LonLatToMercator;

impl Reprojection for LonLatToMercator {
    fn layer_to_map(&self, c: Coord<f64>) -> Option<Coord<f64>> {
        lonlat_to_merc(c)
    }

    fn map_to_layer(&self, c: Coord<f64>) -> Option<Coord<f64>> {
        merc_to_lonlat(c)
    }
}
