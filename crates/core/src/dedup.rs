//! Consecutive point de-duplication.
//!
//! Collapses runs of identical vertices in point and line geometry before
//! clipping; repeated vertices otherwise produce zero-length segments that
//! upset the clip and encode stages. Deliberately consecutive-only (the
//! `std::unique` semantics of the original): non-adjacent repeats are
//! legitimate geometry (a line revisiting a vertex) and are left alone.
//! Polygons pass through untouched; degenerate rings are the clipper's
//! concern.

use geo::Geometry;

use crate::indexer::GeometrySink;

/// Stage removing consecutive duplicate vertices.
pub struct PointDeduplicator<'a, N: GeometrySink> {
    next: &'a mut N,
}

impl<'a, N: GeometrySink> PointDeduplicator<'a, N> {
    pub fn new(next: &'a mut N) -> Self {
        Self { next }
    }
}

impl<N: GeometrySink> GeometrySink for PointDeduplicator<'_, N> {
    fn geometry(&mut self, geom: Geometry<i64>) {
        match geom {
            Geometry::MultiPoint(mut mp) => {
                mp.0.dedup();
                self.next.geometry(Geometry::MultiPoint(mp));
            }
            Geometry::LineString(mut ls) => {
                ls.0.dedup();
                self.next.geometry(Geometry::LineString(ls));
            }
            Geometry::MultiLineString(mut mls) => {
                for line in &mut mls.0 {
                    line.0.dedup();
                }
                self.next.geometry(Geometry::MultiLineString(mls));
            }
            Geometry::GeometryCollection(gc) => {
                for member in gc.0 {
                    self.geometry(member);
                }
            }
            other => self.next.geometry(other),
        }
    }
}
