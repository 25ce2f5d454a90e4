//! Integer geometry translation.
//!
//! Shifts every coordinate by a fixed `(tx, ty)`. Used by the wafer tiler
//! to re-base geometry clipped against a sub-tile's box into that
//! sub-tile's local coordinate frame.

use geo::{Coord, Geometry, MapCoords};

use crate::indexer::GeometrySink;

/// Stage adding `(tx, ty)` to every coordinate before forwarding.
pub struct GeometryTranslator<'a, N: GeometrySink> {
    tx: i64,
    ty: i64,
    next: &'a mut N,
}

impl<'a, N: GeometrySink> GeometryTranslator<'a, N> {
    pub fn new(tx: i64, ty: i64, next: &'a mut N) -> Self {
        Self { tx, ty, next }
    }
}

impl<N: GeometrySink> GeometrySink for GeometryTranslator<'_, N> {
    fn geometry(&mut self, geom: Geometry<i64>) {
        match geom {
            Geometry::GeometryCollection(gc) => {
                for member in gc.0 {
                    self.geometry(member);
                }
            }
            other => {
                let (tx, ty) = (self.tx, self.ty);
                self.next.geometry(other.map_coords(|c| Coord {
                    x: c.x + tx,
                    y: c.y + ty,
                }));
            }
        }
    }
}
