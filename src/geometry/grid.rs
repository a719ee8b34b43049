//! Uniform-cell spatial index over a `Polygons`' set of segments. Built
//! once per target and reused for many closest-point / crossing queries
//! so callers aren't scanning every segment on every lookup.

use std::collections::HashMap;

use super::Polygons;
use crate::units::Point;

/// Default cell size used when the caller doesn't override it: 2 mm in
/// object-space micrometres.
pub const DEFAULT_CELL_SIZE: i64 = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Cell(i64, i64);

/// A reference to one segment of one polygon in the indexed `Polygons`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentRef {
    pub polygon_index: usize,
    pub segment_index: usize,
}

pub struct LocToLineGrid {
    cell_size: i64,
    buckets: HashMap<Cell, Vec<SegmentRef>>,
}

impl LocToLineGrid {
    pub fn build(polygons: &Polygons, cell_size: i64) -> Self {
        let mut buckets: HashMap<Cell, Vec<SegmentRef>> = HashMap::new();
        for (polygon_index, polygon) in polygons.polygons.iter().enumerate() {
            let n = polygon.points.len();
            if n < 2 {
                continue;
            }
            for segment_index in 0..n {
                let a = polygon.points[segment_index];
                let b = polygon.points[(segment_index + 1) % n];
                for cell in cells_touched(a, b, cell_size) {
                    buckets.entry(cell).or_default().push(SegmentRef {
                        polygon_index,
                        segment_index,
                    });
                }
            }
        }
        Self { cell_size, buckets }
    }

    /// All segments whose bounding cell is within `radius_cells` of the
    /// cell containing `p` — a coarse candidate set for closest-point or
    /// crossing queries, narrowed further by the caller's exact test.
    pub fn nearby(&self, p: Point, radius_cells: i64) -> Vec<SegmentRef> {
        let center = cell_of(p, self.cell_size);
        let mut out = Vec::new();
        for dx in -radius_cells..=radius_cells {
            for dy in -radius_cells..=radius_cells {
                if let Some(segs) = self.buckets.get(&Cell(center.0 + dx, center.1 + dy)) {
                    out.extend_from_slice(segs);
                }
            }
        }
        out
    }

    pub fn cell_size(&self) -> i64 {
        self.cell_size
    }
}

fn cell_of(p: Point, cell_size: i64) -> Cell {
    Cell(p.x.div_euclid(cell_size), p.y.div_euclid(cell_size))
}

fn cells_touched(a: Point, b: Point, cell_size: i64) -> Vec<Cell> {
    // Conservative: every cell whose bounding box overlaps the segment's
    // own bounding box. Precise enough for a candidate-gathering index.
    let min_cell = cell_of(
        Point::new(a.x.min(b.x), a.y.min(b.y)),
        cell_size,
    );
    let max_cell = cell_of(
        Point::new(a.x.max(b.x), a.y.max(b.y)),
        cell_size,
    );
    let mut cells = Vec::new();
    for cx in min_cell.0..=max_cell.0 {
        for cy in min_cell.1..=max_cell.1 {
            cells.push(Cell(cx, cy));
        }
    }
    cells
}

#[test]
fn grid_finds_segments_near_a_point() {
    use super::Polygon;
    let square = Polygons::new(vec![Polygon::new(vec![
        Point::new(0, 0),
        Point::new(10_000, 0),
        Point::new(10_000, 10_000),
        Point::new(0, 10_000),
    ])]);
    let grid = LocToLineGrid::build(&square, DEFAULT_CELL_SIZE);
    let near_bottom_edge = grid.nearby(Point::new(5_000, 50), 1);
    assert!(!near_bottom_edge.is_empty());
}
