//! Geometry clipping against the padded tile box.
//!
//! The most involved stage of the pipeline. Points are containment-tested,
//! lines are clipped with `geo`'s boolean clip, and polygons go through a
//! two-phase scheme:
//!
//! 1. **Quick-clip**: each ring is reduced by an integer Sutherland-Hodgman
//!    pass against the box, a cheap rejection/reduction step.
//! 2. **Union**: surviving rings accumulate into `i_overlay`'s polygon
//!    Boolean engine and are resolved in a single union under the
//!    configured fill rule. This repairs self-intersections and resolves
//!    overlapping rings the way the fill rule dictates.
//!
//! Ring orientation before the union: exteriors are oriented to positive
//! signed area, holes to negative, the convention `i_overlay` expects.

use geo::{
    BooleanOps, Coord, Geometry, LineString, MultiLineString, MultiPoint, MultiPolygon, Point,
    Polygon, Rect,
};
use i_overlay::core::fill_rule::FillRule;
use i_overlay::float::simplify::SimplifyShape;

use crate::bounds::TileBox;
use crate::indexer::{GeometrySink, IndexedGeometry, IndexedGeometrySink, IndexedPart};

/// Fill rule applied when the polygon union resolves overlapping regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FillType {
    EvenOdd,
    NonZero,
    #[default]
    Positive,
    Negative,
}

impl FillType {
    fn fill_rule(self) -> FillRule {
        match self {
            FillType::EvenOdd => FillRule::EvenOdd,
            FillType::NonZero => FillRule::NonZero,
            FillType::Positive => FillRule::Positive,
            FillType::Negative => FillRule::Negative,
        }
    }
}

/// Per-layer clipping configuration.
#[derive(Debug, Clone, Copy)]
pub struct ClipParams {
    /// Minimum absolute ring area to retain.
    pub area_threshold: f64,
    /// Reserved: strict simplicity of output polygons is not yet enforced.
    pub strictly_simple: bool,
    /// Union all parts of a multi polygon in one pass instead of clipping
    /// each part independently. Merges touching parts; a policy choice.
    pub multi_polygon_union: bool,
    /// Fill rule for the polygon union.
    pub fill_type: FillType,
    /// Tolerate rings that would otherwise reject the whole polygon.
    pub process_all_rings: bool,
}

impl Default for ClipParams {
    fn default() -> Self {
        Self {
            area_threshold: 0.1,
            strictly_simple: true,
            multi_polygon_union: false,
            fill_type: FillType::Positive,
            process_all_rings: false,
        }
    }
}

/// Signed area of an open ring, summed cyclically.
///
/// Positive for counter-clockwise vertex order in a y-up interpretation
/// of the coordinates.
pub fn signed_area(ring: &[Coord<i64>]) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }
    let mut a = 0.0;
    let mut prev = ring[ring.len() - 1];
    for &c in ring {
        a += (prev.x + c.x) as f64 * (prev.y - c.y) as f64;
        prev = c;
    }
    -a * 0.5
}

/// Ring vertices without the closing duplicate.
fn open_ring(ring: &LineString<i64>) -> Vec<Coord<i64>> {
    let mut pts = ring.0.clone();
    if pts.len() > 1 && pts.first() == pts.last() {
        pts.pop();
    }
    pts
}

/// Clip ring vertices against a single box edge (one Sutherland-Hodgman
/// pass). `inside` tests a vertex, `intersect` computes the crossing of an
/// edge leaving or entering the half-plane.
fn clip_against_edge<F, I>(vertices: &[Coord<i64>], inside: F, intersect: I) -> Vec<Coord<i64>>
where
    F: Fn(&Coord<i64>) -> bool,
    I: Fn(&Coord<i64>, &Coord<i64>) -> Coord<i64>,
{
    if vertices.is_empty() {
        return Vec::new();
    }

    let mut output = Vec::with_capacity(vertices.len() + 4);
    for i in 0..vertices.len() {
        let current = &vertices[i];
        let next = &vertices[(i + 1) % vertices.len()];

        let current_inside = inside(current);
        let next_inside = inside(next);

        if current_inside {
            output.push(*current);
            if !next_inside {
                output.push(intersect(current, next));
            }
        } else if next_inside {
            output.push(intersect(current, next));
        }
    }
    output
}

/// Sutherland-Hodgman quick-clip of an open ring against the box.
///
/// Returns an open ring; intersection points are rounded to the integer
/// grid. Output with fewer than 3 vertices means the ring was clipped away.
pub fn quick_clip(ring: &[Coord<i64>], bounds: &TileBox) -> Vec<Coord<i64>> {
    let lerp = |a: i64, b: i64, bound: i64, oa: i64, ob: i64| -> i64 {
        let t = (bound - a) as f64 / (b - a) as f64;
        (oa as f64 + t * (ob - oa) as f64).round() as i64
    };

    let mut out = clip_against_edge(
        ring,
        |c| c.x >= bounds.min_x,
        |c1, c2| Coord {
            x: bounds.min_x,
            y: lerp(c1.x, c2.x, bounds.min_x, c1.y, c2.y),
        },
    );
    out = clip_against_edge(
        &out,
        |c| c.x <= bounds.max_x,
        |c1, c2| Coord {
            x: bounds.max_x,
            y: lerp(c1.x, c2.x, bounds.max_x, c1.y, c2.y),
        },
    );
    out = clip_against_edge(
        &out,
        |c| c.y >= bounds.min_y,
        |c1, c2| Coord {
            x: lerp(c1.y, c2.y, bounds.min_y, c1.x, c2.x),
            y: bounds.min_y,
        },
    );
    out = clip_against_edge(
        &out,
        |c| c.y <= bounds.max_y,
        |c1, c2| Coord {
            x: lerp(c1.y, c2.y, bounds.max_y, c1.x, c2.x),
            y: bounds.max_y,
        },
    );

    out.dedup();
    if out.len() > 1 && out.first() == out.last() {
        out.pop();
    }
    out
}

type Contour = Vec<[f64; 2]>;

fn contour(ring: &[Coord<i64>]) -> Contour {
    ring.iter().map(|c| [c.x as f64, c.y as f64]).collect()
}

fn contour_to_ring(contour: &[[f64; 2]]) -> LineString<i64> {
    let mut pts: Vec<Coord<i64>> = contour
        .iter()
        .map(|p| Coord {
            x: p[0].round() as i64,
            y: p[1].round() as i64,
        })
        .collect();
    pts.dedup();
    if pts.len() > 1 && pts.first() == pts.last() {
        pts.pop();
    }
    if let Some(&first) = pts.first() {
        pts.push(first);
    }
    LineString::new(pts)
}

/// Union the accumulated rings under the fill rule and rebuild polygons.
fn execute_union(subject: Vec<Contour>, fill_type: FillType) -> MultiPolygon<i64> {
    if subject.is_empty() {
        return MultiPolygon::new(Vec::new());
    }
    let shapes = subject.simplify_shape(fill_type.fill_rule(), 0.0);

    let mut polygons = Vec::new();
    for shape in shapes {
        let mut rings = shape.into_iter();
        let Some(first) = rings.next() else {
            continue;
        };
        let exterior = contour_to_ring(&first);
        // A closed ring needs 3 distinct vertices plus the closing one.
        if exterior.0.len() < 4 {
            continue;
        }
        let holes: Vec<LineString<i64>> = rings
            .filter_map(|c| {
                let ring = contour_to_ring(&c);
                (ring.0.len() >= 4).then_some(ring)
            })
            .collect();
        polygons.push(Polygon::new(exterior, holes));
    }
    MultiPolygon::new(polygons)
}

/// Quick-clip the rings of one polygon into the union accumulator.
///
/// Ring policy: the first ring is the exterior, the rest are holes. A
/// degenerate or sub-threshold exterior rejects the whole polygon unless
/// `process_all_rings` is set; bad holes are skipped individually.
fn accumulate_polygon(
    poly: &Polygon<i64>,
    bounds: &TileBox,
    params: &ClipParams,
    subject: &mut Vec<Contour>,
) {
    let mut first = true;
    for ring in std::iter::once(poly.exterior()).chain(poly.interiors().iter()) {
        let mut pts = open_ring(ring);
        if pts.len() < 3 {
            if first {
                if !params.process_all_rings {
                    return;
                }
                first = false;
            }
            continue;
        }
        let area = signed_area(&pts);
        if first {
            first = false;
            if area.abs() < params.area_threshold && !params.process_all_rings {
                return;
            }
            if area < 0.0 {
                pts.reverse();
            }
            let clipped = quick_clip(&pts, bounds);
            if clipped.len() < 3 {
                if params.process_all_rings {
                    continue;
                }
                return;
            }
            subject.push(contour(&clipped));
        } else {
            if area.abs() < params.area_threshold {
                continue;
            }
            if area > 0.0 {
                pts.reverse();
            }
            let clipped = quick_clip(&pts, bounds);
            if clipped.len() < 3 {
                continue;
            }
            subject.push(contour(&clipped));
        }
    }
}

/// Clip line strings against the box polygon, in f64 (integer input is
/// exact), rounding results back to the integer grid.
fn clip_lines<'a, I>(lines: I, bounds: &TileBox) -> MultiLineString<i64>
where
    I: IntoIterator<Item = &'a LineString<i64>>,
{
    let subject = MultiLineString::new(
        lines
            .into_iter()
            .map(|ls| {
                LineString::new(
                    ls.0.iter()
                        .map(|c| Coord {
                            x: c.x as f64,
                            y: c.y as f64,
                        })
                        .collect(),
                )
            })
            .collect(),
    );

    let clip_poly = Rect::new(
        Coord {
            x: bounds.min_x as f64,
            y: bounds.min_y as f64,
        },
        Coord {
            x: bounds.max_x as f64,
            y: bounds.max_y as f64,
        },
    )
    .to_polygon();

    let clipped = clip_poly.clip(&subject, false);

    MultiLineString::new(
        clipped
            .0
            .into_iter()
            .filter_map(|ls| {
                let mut pts: Vec<Coord<i64>> = ls
                    .0
                    .iter()
                    .map(|c| Coord {
                        x: c.x.round() as i64,
                        y: c.y.round() as i64,
                    })
                    .collect();
                pts.dedup();
                (pts.len() >= 2).then_some(LineString::new(pts))
            })
            .collect(),
    )
}

/// Stage clipping indexed geometry against a padded tile box.
pub struct GeometryClipper<'a, N: GeometrySink> {
    tile_box: TileBox,
    params: ClipParams,
    next: &'a mut N,
}

impl<'a, N: GeometrySink> GeometryClipper<'a, N> {
    pub fn new(tile_box: TileBox, params: ClipParams, next: &'a mut N) -> Self {
        Self {
            tile_box,
            params,
            next,
        }
    }

    fn clip_multi_polygon(&mut self, parts: &[IndexedPart<Polygon<i64>>]) {
        if parts.is_empty() {
            return;
        }
        let result = if self.params.multi_polygon_union {
            let mut subject = Vec::new();
            for part in parts {
                if !self.tile_box.intersects(&part.envelope) {
                    continue;
                }
                accumulate_polygon(&part.geom, &self.tile_box, &self.params, &mut subject);
            }
            execute_union(subject, self.params.fill_type)
        } else {
            let mut polygons = Vec::new();
            for part in parts {
                if !self.tile_box.intersects(&part.envelope) {
                    continue;
                }
                let mut subject = Vec::new();
                accumulate_polygon(&part.geom, &self.tile_box, &self.params, &mut subject);
                polygons.extend(execute_union(subject, self.params.fill_type).0);
            }
            MultiPolygon::new(polygons)
        };
        if !result.0.is_empty() {
            self.next.geometry(Geometry::MultiPolygon(result));
        }
    }
}

impl<N: GeometrySink> IndexedGeometrySink for GeometryClipper<'_, N> {
    fn indexed(&mut self, geom: &IndexedGeometry) {
        match geom {
            IndexedGeometry::Point { geom: p, .. } => {
                if self.tile_box.contains(p.0.x, p.0.y) {
                    self.next.geometry(Geometry::Point(*p));
                }
            }
            IndexedGeometry::MultiPoint { geom: mp, .. } => {
                let inside: Vec<Point<i64>> = mp
                    .0
                    .iter()
                    .filter(|p| self.tile_box.contains(p.0.x, p.0.y))
                    .copied()
                    .collect();
                if !inside.is_empty() {
                    self.next.geometry(Geometry::MultiPoint(MultiPoint::new(inside)));
                }
            }
            IndexedGeometry::LineString { geom: ls, .. } => {
                if ls.0.len() < 2 {
                    return;
                }
                let result = clip_lines(std::iter::once(ls), &self.tile_box);
                if !result.0.is_empty() {
                    self.next.geometry(Geometry::MultiLineString(result));
                }
            }
            IndexedGeometry::MultiLineString { parts, .. } => {
                let result = clip_lines(
                    parts
                        .iter()
                        .filter(|part| {
                            part.geom.0.len() >= 2 && self.tile_box.intersects(&part.envelope)
                        })
                        .map(|part| &part.geom),
                    &self.tile_box,
                );
                if !result.0.is_empty() {
                    self.next.geometry(Geometry::MultiLineString(result));
                }
            }
            IndexedGeometry::Polygon { geom: poly, .. } => {
                let mut subject = Vec::new();
                accumulate_polygon(poly, &self.tile_box, &self.params, &mut subject);
                let result = execute_union(subject, self.params.fill_type);
                if !result.0.is_empty() {
                    self.next.geometry(Geometry::MultiPolygon(result));
                }
            }
            IndexedGeometry::MultiPolygon { parts, .. } => {
                self.clip_multi_polygon(parts);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::GeometryIndexer;
    use geo::{line_string, point, polygon};

    struct Collector {
        seen: Vec<Geometry<i64>>,
    }

    impl GeometrySink for Collector {
        fn geometry(&mut self, geom: Geometry<i64>) {
            self.seen.push(geom);
        }
    }

    fn clip(geom: Geometry<i64>, tile_box: TileBox, params: ClipParams) -> Vec<Geometry<i64>> {
        let mut sink = Collector { seen: vec![] };
        {
            let mut clipper = GeometryClipper::new(tile_box, params, &mut sink);
            let mut indexer = GeometryIndexer::new(&mut clipper);
            indexer.geometry(geom);
        }
        sink.seen
    }

    fn the_box() -> TileBox {
        TileBox::new(0, 0, 100, 100)
    }

    fn assert_within_box(geom: &Geometry<i64>, b: &TileBox) {
        let envelope = match geom {
            Geometry::MultiPolygon(mp) => TileBox::of_coords(
                mp.0.iter()
                    .flat_map(|p| p.exterior().0.iter().chain(p.interiors().iter().flatten())),
            ),
            Geometry::MultiLineString(mls) => {
                TileBox::of_coords(mls.0.iter().flat_map(|ls| ls.0.iter()))
            }
            other => panic!("unexpected geometry {:?}", other),
        };
        assert!(
            b.min_x <= envelope.min_x
                && b.min_y <= envelope.min_y
                && b.max_x >= envelope.max_x
                && b.max_y >= envelope.max_y,
            "output {:?} escapes box {:?}",
            envelope,
            b
        );
    }

    // ========== Signed Area ==========

    #[test]
    fn test_signed_area_ccw_positive() {
        let ring = [
            Coord { x: 0_i64, y: 0 },
            Coord { x: 10, y: 0 },
            Coord { x: 10, y: 10 },
            Coord { x: 0, y: 10 },
        ];
        assert_eq!(signed_area(&ring), 100.0);

        let mut reversed = ring;
        reversed.reverse();
        assert_eq!(signed_area(&reversed), -100.0);
    }

    #[test]
    fn test_signed_area_degenerate() {
        assert_eq!(signed_area(&[Coord { x: 0_i64, y: 0 }, Coord { x: 5, y: 5 }]), 0.0);
    }

    // ========== Quick Clip ==========

    #[test]
    fn test_quick_clip_contained_ring_unchanged() {
        let ring = [
            Coord { x: 10_i64, y: 10 },
            Coord { x: 20, y: 10 },
            Coord { x: 20, y: 20 },
            Coord { x: 10, y: 20 },
        ];
        assert_eq!(quick_clip(&ring, &the_box()), ring.to_vec());
    }

    #[test]
    fn test_quick_clip_overlapping_ring_reduced() {
        let ring = [
            Coord { x: -50_i64, y: -50 },
            Coord { x: 50, y: -50 },
            Coord { x: 50, y: 50 },
            Coord { x: -50, y: 50 },
        ];
        let clipped = quick_clip(&ring, &the_box());
        assert_eq!(
            clipped,
            vec![
                Coord { x: 50_i64, y: 0 },
                Coord { x: 50, y: 50 },
                Coord { x: 0, y: 50 },
                Coord { x: 0, y: 0 },
            ]
        );
    }

    #[test]
    fn test_quick_clip_disjoint_ring_empty() {
        let ring = [
            Coord { x: 200_i64, y: 200 },
            Coord { x: 300, y: 200 },
            Coord { x: 300, y: 300 },
        ];
        assert!(quick_clip(&ring, &the_box()).is_empty());
    }

    // ========== Points ==========

    #[test]
    fn test_point_inside_kept() {
        let out = clip(
            Geometry::Point(point!(x: 50_i64, y: 50)),
            the_box(),
            ClipParams::default(),
        );
        assert_eq!(out, vec![Geometry::Point(point!(x: 50_i64, y: 50))]);
    }

    #[test]
    fn test_point_on_boundary_kept() {
        let out = clip(
            Geometry::Point(point!(x: 100_i64, y: 0)),
            the_box(),
            ClipParams::default(),
        );
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_point_outside_dropped() {
        let out = clip(
            Geometry::Point(point!(x: 101_i64, y: 50)),
            the_box(),
            ClipParams::default(),
        );
        assert!(out.is_empty());
    }

    #[test]
    fn test_multipoint_filtered_subsequence() {
        let out = clip(
            Geometry::MultiPoint(MultiPoint::new(vec![
                point!(x: 10_i64, y: 10),
                point!(x: 500, y: 500),
                point!(x: 90, y: 90),
            ])),
            the_box(),
            ClipParams::default(),
        );
        assert_eq!(
            out,
            vec![Geometry::MultiPoint(MultiPoint::new(vec![
                point!(x: 10_i64, y: 10),
                point!(x: 90, y: 90),
            ]))]
        );
    }

    #[test]
    fn test_multipoint_all_outside_emits_nothing() {
        let out = clip(
            Geometry::MultiPoint(MultiPoint::new(vec![point!(x: -5_i64, y: -5)])),
            the_box(),
            ClipParams::default(),
        );
        assert!(out.is_empty());
    }

    // ========== Lines ==========

    #[test]
    fn test_line_crossing_box() {
        let out = clip(
            Geometry::LineString(line_string![(x: -50_i64, y: 50), (x: 150, y: 50)]),
            the_box(),
            ClipParams::default(),
        );
        assert_eq!(out.len(), 1);
        assert_within_box(&out[0], &the_box());
        match &out[0] {
            Geometry::MultiLineString(mls) => {
                assert_eq!(mls.0.len(), 1);
                let xs: Vec<i64> = mls.0[0].0.iter().map(|c| c.x).collect();
                assert!(xs.contains(&0) && xs.contains(&100));
            }
            other => panic!("expected multi line string, got {:?}", other),
        }
    }

    #[test]
    fn test_line_outside_box_dropped() {
        let out = clip(
            Geometry::LineString(line_string![(x: 200_i64, y: 200), (x: 300, y: 300)]),
            the_box(),
            ClipParams::default(),
        );
        assert!(out.is_empty());
    }

    #[test]
    fn test_degenerate_line_dropped_before_clip() {
        let out = clip(
            Geometry::LineString(line_string![(x: 50_i64, y: 50)]),
            the_box(),
            ClipParams::default(),
        );
        assert!(out.is_empty());
    }

    #[test]
    fn test_multi_line_skips_disjoint_parts() {
        let out = clip(
            Geometry::MultiLineString(MultiLineString::new(vec![
                line_string![(x: 10_i64, y: 10), (x: 90, y: 90)],
                line_string![(x: 500, y: 500), (x: 600, y: 600)],
            ])),
            the_box(),
            ClipParams::default(),
        );
        match &out[0] {
            Geometry::MultiLineString(mls) => assert_eq!(mls.0.len(), 1),
            other => panic!("expected multi line string, got {:?}", other),
        }
    }

    // ========== Polygons ==========

    #[test]
    fn test_polygon_partial_overlap_clipped() {
        let out = clip(
            Geometry::Polygon(polygon![
                (x: -50_i64, y: -50),
                (x: 50, y: -50),
                (x: 50, y: 50),
                (x: -50, y: 50),
                (x: -50, y: -50),
            ]),
            the_box(),
            ClipParams::default(),
        );
        assert_eq!(out.len(), 1);
        assert_within_box(&out[0], &the_box());
    }

    #[test]
    fn test_polygon_winding_does_not_matter() {
        let ccw = clip(
            Geometry::Polygon(polygon![
                (x: 10_i64, y: 10),
                (x: 90, y: 10),
                (x: 90, y: 90),
                (x: 10, y: 90),
                (x: 10, y: 10),
            ]),
            the_box(),
            ClipParams::default(),
        );
        let cw = clip(
            Geometry::Polygon(polygon![
                (x: 10_i64, y: 10),
                (x: 10, y: 90),
                (x: 90, y: 90),
                (x: 90, y: 10),
                (x: 10, y: 10),
            ]),
            the_box(),
            ClipParams::default(),
        );
        assert_eq!(ccw, cw);
    }

    #[test]
    fn test_polygon_below_area_threshold_rejected() {
        let sliver = Geometry::Polygon(polygon![
            (x: 10_i64, y: 10),
            (x: 12, y: 10),
            (x: 12, y: 11),
            (x: 10, y: 11),
            (x: 10, y: 10),
        ]);
        let params = ClipParams {
            area_threshold: 10.0,
            ..Default::default()
        };
        assert!(clip(sliver.clone(), the_box(), params).is_empty());

        // With process_all_rings the threshold no longer rejects the
        // exterior.
        let tolerant = ClipParams {
            area_threshold: 10.0,
            process_all_rings: true,
            ..Default::default()
        };
        assert_eq!(clip(sliver, the_box(), tolerant).len(), 1);
    }

    #[test]
    fn test_polygon_hole_preserved() {
        let out = clip(
            Geometry::Polygon(polygon![
                exterior: [
                    (x: 10_i64, y: 10),
                    (x: 90, y: 10),
                    (x: 90, y: 90),
                    (x: 10, y: 90),
                    (x: 10, y: 10),
                ],
                interiors: [[
                    (x: 30, y: 30),
                    (x: 30, y: 70),
                    (x: 70, y: 70),
                    (x: 70, y: 30),
                    (x: 30, y: 30),
                ]],
            ]),
            the_box(),
            ClipParams::default(),
        );
        match &out[0] {
            Geometry::MultiPolygon(mp) => {
                assert_eq!(mp.0.len(), 1);
                assert_eq!(mp.0[0].interiors().len(), 1);
            }
            other => panic!("expected multi polygon, got {:?}", other),
        }
    }

    #[test]
    fn test_sub_threshold_hole_skipped() {
        let out = clip(
            Geometry::Polygon(polygon![
                exterior: [
                    (x: 10_i64, y: 10),
                    (x: 90, y: 10),
                    (x: 90, y: 90),
                    (x: 10, y: 90),
                    (x: 10, y: 10),
                ],
                interiors: [[
                    (x: 30, y: 30),
                    (x: 30, y: 31),
                    (x: 31, y: 31),
                    (x: 31, y: 30),
                    (x: 30, y: 30),
                ]],
            ]),
            the_box(),
            ClipParams {
                area_threshold: 10.0,
                ..Default::default()
            },
        );
        match &out[0] {
            Geometry::MultiPolygon(mp) => assert!(mp.0[0].interiors().is_empty()),
            other => panic!("expected multi polygon, got {:?}", other),
        }
    }

    #[test]
    fn test_bowtie_repaired_by_union() {
        // Self-intersecting figure-8 crossing the box; the union pass must
        // produce simple output confined to the box. The lobes cancel in
        // the shoelace sum, so the area threshold is disabled here.
        let out = clip(
            Geometry::Polygon(polygon![
                (x: -20_i64, y: -20),
                (x: 120, y: 120),
                (x: 120, y: -20),
                (x: -20, y: 120),
                (x: -20, y: -20),
            ]),
            the_box(),
            ClipParams {
                area_threshold: 0.0,
                fill_type: FillType::EvenOdd,
                ..Default::default()
            },
        );
        assert_eq!(out.len(), 1);
        assert_within_box(&out[0], &the_box());
    }

    #[test]
    fn test_quick_clipped_away_exterior_rejects_polygon() {
        // Exterior fully outside the box, hole inside it.
        let poly = Geometry::Polygon(polygon![
            exterior: [
                (x: 200_i64, y: 200),
                (x: 300, y: 200),
                (x: 300, y: 300),
                (x: 200, y: 300),
                (x: 200, y: 200),
            ],
            interiors: [[
                (x: 20, y: 20),
                (x: 20, y: 80),
                (x: 80, y: 80),
                (x: 80, y: 20),
                (x: 20, y: 20),
            ]],
        ]);
        let strict = ClipParams {
            fill_type: FillType::EvenOdd,
            ..Default::default()
        };
        assert!(clip(poly.clone(), the_box(), strict).is_empty());

        // With process_all_rings only the clipped-away ring is skipped and
        // the sibling ring is still attempted.
        let tolerant = ClipParams {
            fill_type: FillType::EvenOdd,
            process_all_rings: true,
            ..Default::default()
        };
        assert_eq!(clip(poly, the_box(), tolerant).len(), 1);
    }

    #[test]
    fn test_polygon_envelope_disjoint_no_output() {
        let out = clip(
            Geometry::Polygon(polygon![
                (x: 500_i64, y: 500),
                (x: 600, y: 500),
                (x: 600, y: 600),
                (x: 500, y: 600),
                (x: 500, y: 500),
            ]),
            the_box(),
            ClipParams::default(),
        );
        assert!(out.is_empty());
    }

    // ========== Multi Polygons ==========

    fn two_touching_squares() -> Geometry<i64> {
        Geometry::MultiPolygon(MultiPolygon::new(vec![
            polygon![
                (x: 10_i64, y: 10),
                (x: 50, y: 10),
                (x: 50, y: 50),
                (x: 10, y: 50),
                (x: 10, y: 10),
            ],
            polygon![
                (x: 50, y: 10),
                (x: 90, y: 10),
                (x: 90, y: 50),
                (x: 50, y: 50),
                (x: 50, y: 10),
            ],
        ]))
    }

    #[test]
    fn test_multi_polygon_independent_parts() {
        let out = clip(two_touching_squares(), the_box(), ClipParams::default());
        match &out[0] {
            Geometry::MultiPolygon(mp) => assert_eq!(mp.0.len(), 2),
            other => panic!("expected multi polygon, got {:?}", other),
        }
    }

    #[test]
    fn test_multi_polygon_union_merges_touching_parts() {
        let out = clip(
            two_touching_squares(),
            the_box(),
            ClipParams {
                multi_polygon_union: true,
                ..Default::default()
            },
        );
        match &out[0] {
            Geometry::MultiPolygon(mp) => assert_eq!(mp.0.len(), 1),
            other => panic!("expected multi polygon, got {:?}", other),
        }
    }

    #[test]
    fn test_multi_polygon_skips_disjoint_parts() {
        let out = clip(
            Geometry::MultiPolygon(MultiPolygon::new(vec![
                polygon![
                    (x: 10_i64, y: 10),
                    (x: 40, y: 10),
                    (x: 40, y: 40),
                    (x: 10, y: 40),
                    (x: 10, y: 10),
                ],
                polygon![
                    (x: 500, y: 500),
                    (x: 600, y: 500),
                    (x: 600, y: 600),
                    (x: 500, y: 600),
                    (x: 500, y: 500),
                ],
            ])),
            the_box(),
            ClipParams::default(),
        );
        match &out[0] {
            Geometry::MultiPolygon(mp) => assert_eq!(mp.0.len(), 1),
            other => panic!("expected multi polygon, got {:?}", other),
        }
    }
}
