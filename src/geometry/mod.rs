//! 2D geometry kernel: fixed-point integer polygons, boolean ops,
//! offsetting, simplification. Boolean operations wrap `geo-clipper`
//! (`offset`, `difference`, `intersection`) over `geo`'s ring/multipolygon
//! types; closest-point and move-inside queries build on top in `query.rs`.
//!
//! Clipper is integer-native; `geo-clipper` exposes it over `geo`'s f64
//! coordinates through an explicit `scale` factor that quantizes before
//! handing off to Clipper and rescales on the way back. Every micrometre
//! coordinate in this crate is already a whole number stored as `f64`, so a
//! scale of `1.0` round-trips exactly ("given the same integer inputs
//! the output is bit-exact").

pub mod grid;
pub mod query;

use geo::{BooleanOps, Coord, LineString, MultiLineString, MultiPolygon};
use geo_clipper::{Clipper, EndType, JoinType};
use itertools::Itertools;

use crate::error::GeometryError;
use crate::units::Point;

/// Clipper internally works in integers; our coordinates already are
/// integers stored as f64, so a scale of 1.0 is lossless.
const CLIPPER_SCALE: f64 = 1.0;

/// Round join arc tolerance, in the same units as coordinates.
const ROUND_JOIN_ARC_TOLERANCE: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinStyle {
    Miter,
    Round,
    Square,
}

impl JoinStyle {
    fn to_clipper(self) -> JoinType {
        match self {
            JoinStyle::Miter => JoinType::Miter(2.0),
            JoinStyle::Round => JoinType::Round(ROUND_JOIN_ARC_TOLERANCE),
            JoinStyle::Square => JoinType::Square,
        }
    }
}

/// One closed loop or open polyline. Orientation (CW/CCW) encodes outer vs.
/// hole when it is a member of a `Polygons` interpreted by winding.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    pub points: Vec<Point>,
}

impl Polygon {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn is_empty(&self) -> bool {
        self.points.len() < 3
    }

    pub fn area(&self) -> f64 {
        if self.points.len() < 3 {
            return 0.0;
        }
        let mut sum = 0.0;
        for (a, b) in self.points.iter().circular_tuple_windows() {
            sum += (a.x * b.y - b.x * a.y) as f64;
        }
        sum / 2.0
    }

    /// True if the winding is counter-clockwise (positive area): the
    /// convention this crate uses for outer loops.
    pub fn is_outer(&self) -> bool {
        self.area() > 0.0
    }

    pub fn perimeter(&self) -> f64 {
        self.points
            .iter()
            .circular_tuple_windows()
            .map(|(a, b)| a.distance(*b))
            .sum()
    }

    fn to_geo(&self) -> geo::Polygon<f64> {
        let ring: LineString<f64> = self.points.iter().map(|p| Coord::from(*p)).collect();
        geo::Polygon::new(ring, vec![])
    }
}

/// A set of polygons interpreted by even-odd/non-zero winding for boolean
/// operations. `polygon[0]` of a split-out part is always the outer loop
/// by convention.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Polygons {
    pub polygons: Vec<Polygon>,
}

impl Polygons {
    pub fn new(polygons: Vec<Polygon>) -> Self {
        Self { polygons }
    }

    pub fn empty() -> Self {
        Self { polygons: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.iter().all(Polygon::is_empty)
    }

    pub fn area(&self) -> f64 {
        self.polygons.iter().map(Polygon::area).sum()
    }

    fn to_geo(&self) -> MultiPolygon<f64> {
        // Clipper's even-odd fill rule recovers hole/outer structure from
        // the flat loop set regardless of how we group rings here, so we
        // hand every loop through as its own single-ring polygon and let
        // the boolean op (or simplify) sort winding out.
        MultiPolygon(self.polygons.iter().map(Polygon::to_geo).collect())
    }

    fn from_geo(mp: MultiPolygon<f64>) -> Self {
        let mut out = Vec::new();
        for poly in mp.0 {
            out.push(ring_to_polygon(poly.exterior()));
            for hole in poly.interiors() {
                out.push(ring_to_polygon(hole));
            }
        }
        Polygons::new(out)
    }

    /// Minkowski sum (`d > 0`) or erosion (`d < 0`) with a disc of radius
    /// `|d|`.
    pub fn offset(&self, d: f64, join: JoinStyle) -> Polygons {
        if self.is_empty() {
            return Polygons::empty();
        }
        let result = self
            .to_geo()
            .offset(d, join.to_clipper(), EndType::ClosedPolygon, CLIPPER_SCALE);
        Polygons::from_geo(result)
    }

    pub fn union(&self, other: &Polygons) -> Polygons {
        Polygons::from_geo(self.to_geo().union(&other.to_geo()))
    }

    pub fn difference(&self, other: &Polygons) -> Polygons {
        Polygons::from_geo(self.to_geo().difference(&other.to_geo()))
    }

    pub fn intersection(&self, other: &Polygons) -> Polygons {
        Polygons::from_geo(self.to_geo().intersection(&other.to_geo()))
    }

    pub fn xor(&self, other: &Polygons) -> Polygons {
        Polygons::from_geo(self.to_geo().xor(&other.to_geo()))
    }

    /// Remove collinear vertices and drop segments shorter than
    /// `segment_eps`, unless doing so would move the contour by more than
    /// `deviation_eps`.
    pub fn simplify(&self, segment_eps: f64, deviation_eps: f64) -> Polygons {
        Polygons::new(
            self.polygons
                .iter()
                .map(|p| simplify_polygon(p, segment_eps, deviation_eps))
                .filter(|p| !p.is_empty())
                .collect(),
        )
    }

    /// Partitions into (outer, holes...) groups. Each returned `Polygons`
    /// has its outer loop first.
    pub fn split_into_parts(&self) -> Vec<Polygons> {
        let mut outers = Vec::new();
        let mut holes = Vec::new();
        for p in &self.polygons {
            if p.is_empty() {
                continue;
            }
            if p.is_outer() {
                outers.push(p.clone());
            } else {
                holes.push(p.clone());
            }
        }

        outers
            .into_iter()
            .map(|outer| {
                let outer_geo = outer.to_geo();
                let mut part = vec![outer.clone()];
                for hole in &holes {
                    // A hole belongs to this part if its first vertex lies
                    // inside the outer ring.
                    if let Some(&first) = hole.points.first() {
                        if point_in_ring(first, outer_geo.exterior()) {
                            part.push(hole.clone());
                        }
                    }
                }
                Polygons::new(part)
            })
            .collect()
    }

    /// Keeps only the sub-segments of `lines` that lie inside `self`.
    pub fn intersect_polylines(&self, lines: &[Vec<Point>]) -> Vec<Vec<Point>> {
        let mp = self.to_geo();
        lines
            .iter()
            .flat_map(|line| clip_polyline_to_multipolygon(line, &mp))
            .collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Polygon> {
        self.polygons.iter()
    }
}

fn ring_to_polygon(ring: &LineString<f64>) -> Polygon {
    let mut points: Vec<Point> = ring.0.iter().map(|&c| Point::from(c)).collect();
    // geo closes rings by repeating the first point; our representation
    // does not.
    if points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    Polygon::new(points)
}

fn point_in_ring(p: Point, ring: &LineString<f64>) -> bool {
    use geo::algorithm::coordinate_position::{CoordPos, CoordinatePosition};
    let poly = geo::Polygon::new(ring.clone(), vec![]);
    poly.coordinate_position(&Coord::from(p)) != CoordPos::Outside
}

fn simplify_polygon(poly: &Polygon, segment_eps: f64, deviation_eps: f64) -> Polygon {
    if poly.points.len() < 4 {
        return poly.clone();
    }
    let mut points = poly.points.clone();
    let mut changed = true;
    while changed && points.len() > 3 {
        changed = false;
        let n = points.len();
        'outer: for i in 0..n {
            if points.len() <= 3 {
                break;
            }
            let prev = points[(i + points.len() - 1) % points.len()];
            let cur = points[i % points.len()];
            let next = points[(i + 1) % points.len()];
            if prev.distance(cur) < segment_eps || cur.distance(next) < segment_eps {
                let deviation = point_to_segment_distance(cur, prev, next);
                if deviation <= deviation_eps {
                    let idx = points.iter().position(|&pt| pt == cur).unwrap();
                    points.remove(idx);
                    changed = true;
                    break 'outer;
                }
            }
        }
    }
    Polygon::new(points)
}

pub(crate) fn point_to_segment_distance(p: Point, a: Point, b: Point) -> f64 {
    let ab = b - a;
    let ap = p - a;
    let ab_len2 = (ab.x * ab.x + ab.y * ab.y) as f64;
    if ab_len2 == 0.0 {
        return a.distance(p);
    }
    let t = (ap.dot(ab) as f64 / ab_len2).clamp(0.0, 1.0);
    let proj = Point::new(
        a.x + (ab.x as f64 * t).round() as i64,
        a.y + (ab.y as f64 * t).round() as i64,
    );
    p.distance(proj)
}

fn clip_polyline_to_multipolygon(line: &[Point], mp: &MultiPolygon<f64>) -> Vec<Vec<Point>> {
    use geo::algorithm::coordinate_position::{CoordPos, CoordinatePosition};
    if line.len() < 2 {
        return Vec::new();
    }
    let mut segments = Vec::new();
    let mut current: Vec<Point> = Vec::new();
    let samples_per_segment = 8;
    for window in line.windows(2) {
        let (a, b) = (window[0], window[1]);
        for step in 0..samples_per_segment {
            let t0 = step as f64 / samples_per_segment as f64;
            let pt = lerp_point(a, b, t0);
            let inside = mp.coordinate_position(&Coord::from(pt)) != CoordPos::Outside;
            if inside {
                if current.is_empty() {
                    current.push(pt);
                }
            } else if !current.is_empty() {
                current.push(pt);
                segments.push(std::mem::take(&mut current));
            }
        }
    }
    if let Some(&last) = line.last() {
        let inside = mp.coordinate_position(&Coord::from(last)) != CoordPos::Outside;
        if inside {
            current.push(last);
        }
    }
    if current.len() >= 2 {
        segments.push(current);
    }
    segments.retain(|s| s.len() >= 2);
    segments
}

fn lerp_point(a: Point, b: Point, t: f64) -> Point {
    Point::new(
        a.x + ((b.x - a.x) as f64 * t).round() as i64,
        a.y + ((b.y - a.y) as f64 * t).round() as i64,
    )
}

/// Convenience used by callers who need to assert an operation's input
/// wasn't empty before doing something meaningful with the result.
pub fn require_non_empty(p: &Polygons) -> Result<(), GeometryError> {
    if p.is_empty() {
        Err(GeometryError::Empty)
    } else {
        Ok(())
    }
}

#[test]
fn offset_erosion_is_contained_in_original() {
    let square = Polygons::new(vec![Polygon::new(vec![
        Point::new(0, 0),
        Point::new(10_000, 0),
        Point::new(10_000, 10_000),
        Point::new(0, 10_000),
    ])]);
    let eroded = square.offset(-1_000.0, JoinStyle::Miter);
    assert!((square.area() - eroded.area()) > 0.0);
    assert!(eroded.area() > 0.0);
}

#[test]
fn offset_then_expand_round_trips_area_close_to_original() {
    let square = Polygons::new(vec![Polygon::new(vec![
        Point::new(0, 0),
        Point::new(10_000, 0),
        Point::new(10_000, 10_000),
        Point::new(0, 10_000),
    ])]);
    let eroded = square.offset(-500.0, JoinStyle::Round);
    let restored = eroded.offset(500.0, JoinStyle::Round);
    // Round join erosion+dilation rounds the corners; area should shrink
    // slightly but stay close.
    assert!(restored.area() <= square.area());
    assert!(restored.area() > square.area() * 0.9);
}

#[test]
fn split_into_parts_groups_hole_with_its_outer() {
    let outer = Polygon::new(vec![
        Point::new(0, 0),
        Point::new(20_000, 0),
        Point::new(20_000, 20_000),
        Point::new(0, 20_000),
    ]);
    let hole = Polygon::new(vec![
        Point::new(8_000, 12_000),
        Point::new(8_000, 8_000),
        Point::new(12_000, 8_000),
        Point::new(12_000, 12_000),
    ]);
    let polys = Polygons::new(vec![outer, hole]);
    let parts = polys.split_into_parts();
    assert_eq!(parts.len(), 1);
    assert_eq!(parts[0].polygons.len(), 2);
}

#[test]
fn empty_polygons_signal_empty_error() {
    assert!(require_non_empty(&Polygons::empty()).is_err());
}
