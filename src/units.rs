//! Numeric conventions shared by every component: integer micrometres for
//! length, radians for angle, seconds for time, mm3 for material.

use geo::Coord;
use serde::{Deserialize, Serialize};

/// A length or coordinate in micrometres. One unit is one internal length unit.
pub type Coord64 = i64;

/// A 2D point in micrometres. No ownership; copied freely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: Coord64,
    pub y: Coord64,
}

impl Point {
    pub const fn new(x: Coord64, y: Coord64) -> Self {
        Self { x, y }
    }

    pub fn dot(self, other: Point) -> i64 {
        self.x * other.x + self.y * other.y
    }

    pub fn cross(self, other: Point) -> i64 {
        self.x * other.y - self.y * other.x
    }

    pub fn distance_squared(self, other: Point) -> i64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    pub fn distance(self, other: Point) -> f64 {
        (self.distance_squared(other) as f64).sqrt()
    }

    /// Angle of the vector `self -> other`, radians, in (-pi, pi].
    pub fn angle_to(self, other: Point) -> f64 {
        let dx = (other.x - self.x) as f64;
        let dy = (other.y - self.y) as f64;
        dy.atan2(dx)
    }
}

impl std::ops::Sub for Point {
    type Output = Point;
    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl std::ops::Add for Point {
    type Output = Point;
    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl From<Point> for Coord<f64> {
    fn from(p: Point) -> Self {
        Coord {
            x: p.x as f64,
            y: p.y as f64,
        }
    }
}

impl From<Coord<f64>> for Point {
    /// Geometry kernel operations (offset/boolean) run through `geo`'s f64
    /// coordinate space; clipper's internal representation is integral at
    /// the scale we feed it (see `geometry::CLIPPER_SCALE`), so results land
    /// back on whole micrometres. We round rather than truncate to stay
    /// bit-exact with the integer inputs.
    fn from(c: Coord<f64>) -> Self {
        Point::new(c.x.round() as i64, c.y.round() as i64)
    }
}

/// Time in seconds.
pub type Seconds = f64;
/// Material volume in mm^3.
pub type Volume = f64;
/// Speed in mm/s.
pub type Speed = f64;
/// Acceleration in mm/s^2.
pub type Acceleration = f64;
/// Temperature in degrees Celsius.
pub type Temperature = f64;
/// A dimensionless flow ratio, nominally around 1.0.
pub type Flow = f64;

#[test]
fn point_distance_is_pythagorean() {
    let a = Point::new(0, 0);
    let b = Point::new(3000, 4000);
    assert_eq!(a.distance_squared(b), 25_000_000);
    assert!((a.distance(b) - 5000.0).abs() < 1e-9);
}
