//! Prime tower / ooze-shield planner: component I. At an extruder switch,
//! plans a purge visit to the prime-tower region with a wipe point that
//! rotates around the tower so consecutive layers don't reuse the same
//! spot, plus the peripheral ooze-shield outline.

use crate::geometry::{JoinStyle, Polygons};
use crate::layer_plan::LayerPlan;
use crate::storage::GCodePathConfig;
use crate::units::{Coord64, Flow, Point};

/// Consecutive Fibonacci numbers driving the wipe-location rotation: a
/// skip of 8 out of 13 positions so repeated extruder switches spread
/// their wipe points around the tower instead of reusing one spot.
const WIPE_LOCATION_SKIP: usize = 8;
const WIPE_LOCATION_COUNT: usize = 13;

#[derive(Debug, Clone, Copy)]
pub struct PrimeTowerConfig {
    pub enabled: bool,
    pub center: Point,
    pub radius: Coord64,
    pub ooze_shield_distance: Coord64,
}

impl Default for PrimeTowerConfig {
    fn default() -> Self {
        Self { enabled: false, center: Point::new(0, 0), radius: 5_000, ooze_shield_distance: 2_000 }
    }
}

/// Plans prime-tower purge visits across a whole slice; one instance is
/// shared across layers so the wipe-location cadence keeps advancing.
#[derive(Debug, Clone)]
pub struct PrimeTowerPlanner {
    config: PrimeTowerConfig,
    next_wipe_index: usize,
}

impl PrimeTowerPlanner {
    pub fn new(config: PrimeTowerConfig) -> Self {
        Self { config, next_wipe_index: 0 }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// The tower's printable region on one layer: concentric rings at
    /// `ring_width` spacing out to `config.radius`, in the teacher's
    /// repeated-offset brim style.
    pub fn rings_for_layer(&self, ring_width: Coord64) -> Vec<Polygons> {
        if !self.config.enabled || ring_width <= 0 {
            return Vec::new();
        }
        let outer = circle_polygon(self.config.center, self.config.radius, 24);
        let ring_count = (self.config.radius / ring_width).max(1) as usize;
        (0..ring_count)
            .map(|i| {
                let distance = -(i as f64) * ring_width as f64 - (ring_width as f64 / 2.0);
                outer.offset(distance, JoinStyle::Round)
            })
            .filter(|p| !p.is_empty())
            .collect()
    }

    /// Advances the wipe-location cursor by the Fibonacci-skip cadence
    /// and returns the next point on the tower's perimeter to wipe at.
    pub fn next_wipe_point(&mut self) -> Point {
        let idx = self.next_wipe_index % WIPE_LOCATION_COUNT;
        self.next_wipe_index = (self.next_wipe_index + WIPE_LOCATION_SKIP) % WIPE_LOCATION_COUNT;
        point_on_circle(self.config.center, self.config.radius, idx, WIPE_LOCATION_COUNT)
    }

    /// Emits a purge visit to the tower for the upcoming extruder switch:
    /// prints the outermost ring(s) with `config`/`flow`, then travels to
    /// the next rotating wipe point.
    pub fn plan_purge(&mut self, layer_plan: &mut LayerPlan<'_>, ring_width: Coord64, config: &GCodePathConfig, flow: Flow) {
        if !self.config.enabled {
            return;
        }
        for ring in self.rings_for_layer(ring_width) {
            for poly in &ring.polygons {
                if poly.points.len() >= 3 {
                    layer_plan.add_polygon(&poly.points, 0, config, 0.0, 0, false, flow, true);
                }
            }
        }
        let wipe = self.next_wipe_point();
        layer_plan.add_travel_simple(wipe);
    }

    /// The peripheral shield outline surrounding every part on a layer,
    /// offset outward by `ooze_shield_distance`.
    pub fn ooze_shield_outline(&self, combined_parts: &Polygons) -> Polygons {
        if combined_parts.is_empty() {
            return Polygons::empty();
        }
        combined_parts.offset(self.config.ooze_shield_distance as f64, JoinStyle::Round)
    }
}

fn circle_polygon(center: Point, radius: Coord64, segments: usize) -> Polygons {
    use crate::geometry::Polygon;
    let points: Vec<Point> = (0..segments).map(|i| point_on_circle(center, radius, i, segments)).collect();
    Polygons::new(vec![Polygon::new(points)])
}

fn point_on_circle(center: Point, radius: Coord64, index: usize, count: usize) -> Point {
    let angle = 2.0 * std::f64::consts::PI * (index as f64) / (count.max(1) as f64);
    Point::new(center.x + (radius as f64 * angle.cos()).round() as i64, center.y + (radius as f64 * angle.sin()).round() as i64)
}

#[test]
fn wipe_location_cadence_skips_eight_of_thirteen() {
    let mut planner = PrimeTowerPlanner::new(PrimeTowerConfig { enabled: true, ..PrimeTowerConfig::default() });
    let first = planner.next_wipe_index;
    planner.next_wipe_point();
    assert_eq!(planner.next_wipe_index, (first + WIPE_LOCATION_SKIP) % WIPE_LOCATION_COUNT);
}

#[test]
fn disabled_tower_yields_no_rings() {
    let planner = PrimeTowerPlanner::new(PrimeTowerConfig::default());
    assert!(planner.rings_for_layer(400).is_empty());
}

#[test]
fn ooze_shield_expands_outward_from_the_combined_outline() {
    use crate::geometry::Polygon;
    let square = Polygons::new(vec![Polygon::new(vec![Point::new(0, 0), Point::new(10_000, 0), Point::new(10_000, 10_000), Point::new(0, 10_000)])]);
    let planner = PrimeTowerPlanner::new(PrimeTowerConfig { enabled: true, ooze_shield_distance: 1_000, ..PrimeTowerConfig::default() });
    let shield = planner.ooze_shield_outline(&square);
    assert!(shield.area() > square.area());
}
