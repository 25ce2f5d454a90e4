//! Geometry indexing: envelopes for cheap intersection pre-filtering.
//!
//! The pipeline stages are composable sinks. A [`GeometrySink`] accepts
//! tile-space geometry; the indexer wraps each geometry with its envelope
//! and forwards an [`IndexedGeometry`] to an [`IndexedGeometrySink`]
//! (the clip stage). Geometry collections are flattened: every member is
//! indexed and forwarded on its own.

use geo::{Geometry, LineString, MultiPoint, Point, Polygon};

use crate::bounds::TileBox;

/// A pipeline stage accepting tile-space geometry.
pub trait GeometrySink {
    fn geometry(&mut self, geom: Geometry<i64>);
}

/// A pipeline stage accepting indexed geometry.
pub trait IndexedGeometrySink {
    fn indexed(&mut self, geom: &IndexedGeometry);
}

/// A sub-geometry of a multi geometry together with its own envelope.
#[derive(Debug, Clone)]
pub struct IndexedPart<G> {
    pub geom: G,
    pub envelope: TileBox,
}

/// A geometry paired with its tile-space envelope.
///
/// Multi variants carry per-part envelopes plus the aggregate envelope;
/// the aggregate is initialized from the first part and expanded by the
/// rest, never default-initialized.
#[derive(Debug, Clone)]
pub enum IndexedGeometry {
    Point {
        geom: Point<i64>,
        envelope: TileBox,
    },
    MultiPoint {
        geom: MultiPoint<i64>,
        envelope: TileBox,
    },
    LineString {
        geom: LineString<i64>,
        envelope: TileBox,
    },
    MultiLineString {
        parts: Vec<IndexedPart<LineString<i64>>>,
        envelope: TileBox,
    },
    Polygon {
        geom: Polygon<i64>,
        envelope: TileBox,
    },
    MultiPolygon {
        parts: Vec<IndexedPart<Polygon<i64>>>,
        envelope: TileBox,
    },
}

impl IndexedGeometry {
    /// The aggregate envelope of the indexed geometry.
    pub fn envelope(&self) -> &TileBox {
        match self {
            IndexedGeometry::Point { envelope, .. }
            | IndexedGeometry::MultiPoint { envelope, .. }
            | IndexedGeometry::LineString { envelope, .. }
            | IndexedGeometry::MultiLineString { envelope, .. }
            | IndexedGeometry::Polygon { envelope, .. }
            | IndexedGeometry::MultiPolygon { envelope, .. } => envelope,
        }
    }
}

fn line_envelope(line: &LineString<i64>) -> TileBox {
    TileBox::of_coords(line.0.iter())
}

fn polygon_envelope(poly: &Polygon<i64>) -> TileBox {
    // Interior rings cannot extend past the exterior in valid input, but
    // the clipper tolerates invalid input, so include them.
    let mut envelope = line_envelope(poly.exterior());
    for ring in poly.interiors() {
        envelope.expand_to_include(&line_envelope(ring));
    }
    envelope
}

fn aggregate_envelope<G>(parts: &[IndexedPart<G>]) -> TileBox {
    let mut iter = parts.iter();
    match iter.next() {
        None => TileBox::empty(),
        Some(first) => {
            let mut envelope = first.envelope;
            for part in iter {
                envelope.expand_to_include(&part.envelope);
            }
            envelope
        }
    }
}

/// Stage wrapping geometry with envelopes before clipping.
pub struct GeometryIndexer<'a, N: IndexedGeometrySink> {
    next: &'a mut N,
}

impl<'a, N: IndexedGeometrySink> GeometryIndexer<'a, N> {
    pub fn new(next: &'a mut N) -> Self {
        Self { next }
    }
}

impl<N: IndexedGeometrySink> GeometrySink for GeometryIndexer<'_, N> {
    fn geometry(&mut self, geom: Geometry<i64>) {
        match geom {
            Geometry::Point(p) => {
                let envelope = TileBox::new(p.0.x, p.0.y, p.0.x, p.0.y);
                self.next.indexed(&IndexedGeometry::Point { geom: p, envelope });
            }
            Geometry::MultiPoint(mp) => {
                let envelope = TileBox::of_coords(mp.0.iter().map(|p| &p.0));
                self.next
                    .indexed(&IndexedGeometry::MultiPoint { geom: mp, envelope });
            }
            Geometry::LineString(ls) => {
                let envelope = line_envelope(&ls);
                self.next
                    .indexed(&IndexedGeometry::LineString { geom: ls, envelope });
            }
            Geometry::MultiLineString(mls) => {
                let parts: Vec<_> = mls
                    .0
                    .into_iter()
                    .map(|line| IndexedPart {
                        envelope: line_envelope(&line),
                        geom: line,
                    })
                    .collect();
                let envelope = aggregate_envelope(&parts);
                self.next
                    .indexed(&IndexedGeometry::MultiLineString { parts, envelope });
            }
            Geometry::Polygon(poly) => {
                let envelope = polygon_envelope(&poly);
                self.next.indexed(&IndexedGeometry::Polygon {
                    geom: poly,
                    envelope,
                });
            }
            Geometry::MultiPolygon(mp) => {
                let parts: Vec<_> = mp
                    .0
                    .into_iter()
                    .map(|poly| IndexedPart {
                        envelope: polygon_envelope(&poly),
                        geom: poly,
                    })
                    .collect();
                let envelope = aggregate_envelope(&parts);
                self.next
                    .indexed(&IndexedGeometry::MultiPolygon { parts, envelope });
            }
            Geometry::GeometryCollection(gc) => {
                for member in gc.0 {
                    self.geometry(member);
                }
            }
            // Normalize the convenience variants into the canonical ones.
            Geometry::Line(line) => {
                self.geometry(Geometry::LineString(LineString::new(vec![
                    line.start, line.end,
                ])));
            }
            Geometry::Rect(rect) => {
                self.geometry(Geometry::Polygon(rect.to_polygon()));
            }
            Geometry::Triangle(tri) => {
                self.geometry(Geometry::Polygon(tri.to_polygon()));
            }
        }
    }
}
