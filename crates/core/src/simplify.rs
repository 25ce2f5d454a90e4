//! Distance-tolerance line simplification.
//!
//! Ramer-Douglas-Peucker via `geo::Simplify`, applied in tile-integer
//! space after the viewport transform and before clipping, so the
//! tolerance is a tile-pixel distance independent of latitude and zoom.
//! Coordinates are lifted to f64 for the algorithm (exact for tile-sized
//! magnitudes) and rounded back.
//!
//! The stage is only inserted into the pipeline when the configured
//! distance is positive; point geometry always passes through unchanged.

use geo::{Coord, Geometry, LineString, MapCoords, MultiLineString, MultiPolygon, Polygon, Simplify};

use crate::indexer::GeometrySink;

fn to_f64<G, O>(geom: &G) -> O
where
    G: MapCoords<i64, f64, Output = O>,
{
    geom.map_coords(|c| Coord {
        x: c.x as f64,
        y: c.y as f64,
    })
}

fn to_i64<G, O>(geom: &G) -> O
where
    G: MapCoords<f64, i64, Output = O>,
{
    geom.map_coords(|c| Coord {
        x: c.x.round() as i64,
        y: c.y.round() as i64,
    })
}

fn simplify_line(line: &LineString<i64>, tolerance: f64) -> LineString<i64> {
    if line.0.len() < 3 {
        return line.clone();
    }
    let lifted: LineString<f64> = to_f64(line);
    to_i64(&lifted.simplify(&tolerance))
}

fn simplify_polygon(poly: &Polygon<i64>, tolerance: f64) -> Polygon<i64> {
    let lifted: Polygon<f64> = to_f64(poly);
    to_i64(&lifted.simplify(&tolerance))
}

/// Simplify a tile-space geometry under a distance tolerance.
pub fn simplify_geometry(geom: Geometry<i64>, tolerance: f64) -> Geometry<i64> {
    if tolerance <= 0.0 {
        return geom;
    }
    match geom {
        Geometry::LineString(ls) => Geometry::LineString(simplify_line(&ls, tolerance)),
        Geometry::MultiLineString(mls) => Geometry::MultiLineString(MultiLineString::new(
            mls.0.iter().map(|ls| simplify_line(ls, tolerance)).collect(),
        )),
        Geometry::Polygon(poly) => Geometry::Polygon(simplify_polygon(&poly, tolerance)),
        Geometry::MultiPolygon(mp) => Geometry::MultiPolygon(MultiPolygon::new(
            mp.0.iter().map(|p| simplify_polygon(p, tolerance)).collect(),
        )),
        other => other,
    }
}

/// Stage applying distance simplification before de-duplication and clipping.
pub struct GeometrySimplifier<'a, N: GeometrySink> {
    tolerance: f64,
    next: &'a mut N,
}

impl<'a, N: GeometrySink> GeometrySimplifier<'a, N> {
    pub fn new(tolerance: f64, next: &'a mut N) -> Self {
        Self { tolerance, next }
    }
}

impl<N: GeometrySink> GeometrySink for GeometrySimplifier<'_, N> {
    fn geometry(&mut self, geom: Geometry<i64>) {
        match geom {
            Geometry::GeometryCollection(gc) => {
                for member in gc.0 {
                    self.geometry(member);
                }
            }
            other => self.next.geometry(simplify_geometry(other, self.tolerance)),
        }
    }
}
