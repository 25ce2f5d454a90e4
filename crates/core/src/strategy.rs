//! Coordinate transform strategies.
//!
//! Converts double-precision source coordinates into tile-integer space.
//! Two strategies exist, selected once per layer: a direct viewport
//! transform when the layer shares the map projection, and a reprojecting
//! variant composing the layer's black-box CRS transform with the same
//! viewport transform.

use std::sync::Arc;

use geo::{Coord, Geometry, MapCoords};

use crate::bounds::GeoBox;
use crate::model::Reprojection;

/// Affine transform from a geographic extent onto the integer tile grid.
///
/// Tile y grows downward, so the geographic y axis is flipped.
#[derive(Debug, Clone, Copy)]
pub struct ViewTransform {
    width: f64,
    height: f64,
    extent: GeoBox,
    offset_x: i64,
    offset_y: i64,
}

impl ViewTransform {
    /// Map `extent` onto a `width` x `height` integer grid.
    pub fn new(width: u32, height: u32, extent: GeoBox, offset_x: i64, offset_y: i64) -> Self {
        Self {
            width: width as f64,
            height: height as f64,
            extent,
            offset_x,
            offset_y,
        }
    }

    /// Forward transform into (fractional) tile coordinates.
    pub fn forward(&self, c: Coord<f64>) -> Coord<f64> {
        Coord {
            x: (c.x - self.extent.min_x) * self.width / self.extent.width() - self.offset_x as f64,
            y: (self.extent.max_y - c.y) * self.height / self.extent.height()
                - self.offset_y as f64,
        }
    }
}

/// Per-layer choice between plain viewport transform and reproject-then-
/// transform.
#[derive(Clone)]
pub enum TransformStrategy {
    Direct(ViewTransform),
    Reproject(Arc<dyn Reprojection>, ViewTransform),
}

impl TransformStrategy {
    /// Transform a source geometry into tile-integer space.
    ///
    /// Returns `None` when the reprojection cannot map a coordinate; the
    /// feature is then silently dropped by the caller, matching the
    /// treat-as-empty recovery policy.
    pub fn execute(&self, geom: &Geometry<f64>) -> Option<Geometry<i64>> {
        let result: Result<Geometry<i64>, ()> = geom.try_map_coords(|c| {
            let mapped = match self {
                TransformStrategy::Direct(_) => c,
                TransformStrategy::Reproject(projection, _) => {
                    projection.layer_to_map(c).ok_or(())?
                }
            };
            let view = match self {
                TransformStrategy::Direct(view) | TransformStrategy::Reproject(_, view) => view,
            };
            let t = view.forward(mapped);
            Ok(Coord {
                x: t.x.round() as i64,
                y: t.y.round() as i64,
            })
        });
        result.ok()
    }
}

impl std::fmt::Debug for TransformStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransformStrategy::Direct(view) => f.debug_tuple("Direct").field(view).finish(),
            TransformStrategy::Reproject(_, view) => {
                f.debug_tuple("Reproject").field(view).finish()
            }
        }
    }
}
