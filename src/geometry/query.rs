//! Closest-point and "move inside" queries: locating the nearest boundary
//! point to an arbitrary location, and nudging a point across a polygon
//! boundary by a fixed distance.

use geo::algorithm::coordinate_position::{CoordPos, CoordinatePosition};
use geo::Coord;

use super::{Polygon, Polygons};
use crate::error::GeometryError;
use crate::units::Point;

/// The closest point on one polygon's boundary to `p`, and the index of
/// the vertex that precedes it along the boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosestPoint {
    pub point: Point,
    pub preceding_vertex: usize,
    pub distance_squared: i64,
}

/// Finds the closest boundary point on a single polygon to `p`.
pub fn find_closest_on_polygon(p: Point, polygon: &Polygon) -> Result<ClosestPoint, GeometryError> {
    if polygon.points.is_empty() {
        return Err(GeometryError::Empty);
    }
    let n = polygon.points.len();
    let mut best: Option<ClosestPoint> = None;
    for i in 0..n {
        let a = polygon.points[i];
        let b = polygon.points[(i + 1) % n];
        let (candidate, dist2) = closest_point_on_segment(p, a, b);
        if best.map_or(true, |b| dist2 < b.distance_squared) {
            best = Some(ClosestPoint {
                point: candidate,
                preceding_vertex: i,
                distance_squared: dist2,
            });
        }
    }
    best.ok_or(GeometryError::Empty)
}

/// `findClosest(point, polygons)`: closest point across every
/// polygon, with the index of the owning polygon.
pub fn find_closest(p: Point, polygons: &Polygons) -> Result<(usize, ClosestPoint), GeometryError> {
    if polygons.is_empty() {
        return Err(GeometryError::Empty);
    }
    let mut best: Option<(usize, ClosestPoint)> = None;
    for (idx, poly) in polygons.polygons.iter().enumerate() {
        if let Ok(cp) = find_closest_on_polygon(p, poly) {
            if best.as_ref().map_or(true, |(_, b)| cp.distance_squared < b.distance_squared) {
                best = Some((idx, cp));
            }
        }
    }
    best.ok_or(GeometryError::Empty)
}

fn closest_point_on_segment(p: Point, a: Point, b: Point) -> (Point, i64) {
    let ab = b - a;
    let ap = p - a;
    let ab_len2 = ab.x * ab.x + ab.y * ab.y;
    let candidate = if ab_len2 == 0 {
        a
    } else {
        let t = (ap.dot(ab) as f64 / ab_len2 as f64).clamp(0.0, 1.0);
        Point::new(
            a.x + (ab.x as f64 * t).round() as i64,
            a.y + (ab.y as f64 * t).round() as i64,
        )
    };
    (candidate, candidate.distance_squared(p))
}

/// True if `p` lies strictly inside the area covered by `polygons`
/// (even-odd winding).
pub fn is_inside_any(p: Point, polygons: &Polygons) -> bool {
    let mp = polygons_to_geo(polygons);
    mp.coordinate_position(&Coord::from(p)) == CoordPos::Inside
}

fn polygons_to_geo(polygons: &Polygons) -> geo::MultiPolygon<f64> {
    geo::MultiPolygon(
        polygons
            .polygons
            .iter()
            .map(|p| {
                let ring: geo::LineString<f64> = p.points.iter().map(|&pt| Coord::from(pt)).collect();
                geo::Polygon::new(ring, vec![])
            })
            .collect(),
    )
}

/// `moveInside(polygons, point, distance, max_attempt_squared)`:
/// finds the polygon nearest `point` and mutates `point` in place so it
/// lies at orthogonal `distance` on the inside. Fails with `NoFit` if
/// nothing is within `sqrt(max_attempt_squared)`.
pub fn move_inside(
    polygons: &Polygons,
    point: &mut Point,
    distance: i64,
    max_attempt_squared: i64,
) -> Result<usize, GeometryError> {
    let (idx, closest) = find_closest(*point, polygons)?;
    if closest.distance_squared > max_attempt_squared {
        return Err(GeometryError::NoFit);
    }
    let poly = &polygons.polygons[idx];
    let n = poly.points.len();
    let a = poly.points[closest.preceding_vertex];
    let b = poly.points[(closest.preceding_vertex + 1) % n];
    let edge = b - a;
    let edge_len = (edge.x as f64).hypot(edge.y as f64);
    if edge_len == 0.0 {
        return Ok(idx);
    }
    // Inward normal: rotate the edge direction -90 degrees for a
    // counter-clockwise (outer) ring.
    let nx = -(edge.y as f64) / edge_len;
    let ny = (edge.x as f64) / edge_len;
    *point = Point::new(
        closest.point.x + (nx * distance as f64).round() as i64,
        closest.point.y + (ny * distance as f64).round() as i64,
    );
    Ok(idx)
}

/// `ensureInsideOrOutside`: displaces `point` the minimum amount so
/// it lies strictly inside (`preferred_dist > 0`) or outside (`< 0`), then
/// if possible pushes it `preferred_dist` further.
pub fn ensure_inside_or_outside(
    polygons: &Polygons,
    point: &mut Point,
    preferred_dist: i64,
) -> Result<(), GeometryError> {
    let want_inside = preferred_dist > 0;
    let currently_inside = is_inside_any(*point, polygons);
    if currently_inside == want_inside {
        // Already on the correct side; still try to reach preferred_dist.
        let max_attempt = (preferred_dist.unsigned_abs() as i64).pow(2) * 4;
        let _ = move_inside(polygons, point, preferred_dist, max_attempt.max(1));
        return Ok(());
    }

    let max_attempt = (preferred_dist.unsigned_abs() as i64).pow(2) * 4;
    move_inside(polygons, point, preferred_dist, max_attempt.max(1))?;
    Ok(())
}

#[test]
fn move_inside_lands_on_the_inside_of_the_nearest_edge() {
    use super::Polygon;
    let square = Polygons::new(vec![Polygon::new(vec![
        Point::new(0, 0),
        Point::new(10_000, 0),
        Point::new(10_000, 10_000),
        Point::new(0, 10_000),
    ])]);
    let mut p = Point::new(5_000, -50);
    let idx = move_inside(&square, &mut p, 200, 1_000_000).unwrap();
    assert_eq!(idx, 0);
    assert!(is_inside_any(p, &square));
}

#[test]
fn move_inside_fails_when_nothing_is_within_range() {
    use super::Polygon;
    let square = Polygons::new(vec![Polygon::new(vec![
        Point::new(0, 0),
        Point::new(1_000, 0),
        Point::new(1_000, 1_000),
        Point::new(0, 1_000),
    ])]);
    let mut p = Point::new(1_000_000, 1_000_000);
    let result = move_inside(&square, &mut p, 200, 100);
    assert_eq!(result, Err(GeometryError::NoFit));
}

#[test]
fn find_closest_on_empty_polygon_is_empty_error() {
    let poly = Polygon::new(vec![]);
    assert_eq!(find_closest_on_polygon(Point::new(0, 0), &poly), Err(GeometryError::Empty));
}
