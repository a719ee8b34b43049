//! Inset-order optimizer: decides outer-to-inner or inner-to-outer
//! visiting order for one part's walls, linearises it with the path/order
//! optimizer at each nesting level, and marks the travel into the outer
//! wall for retraction when configured.

use crate::geometry::query::is_inside_any;
use crate::geometry::{Polygon, Polygons};
use crate::order::{self, OrderedPath, PathInput};
use crate::settings::SeamConfig;
use crate::units::Point;
use crate::walls::Inset;

/// One wall loop placed in final print order.
#[derive(Debug, Clone)]
pub struct OrderedWall {
    pub inset_depth: usize,
    pub polygon_index: usize,
    pub start_vertex: usize,
    pub backwards: bool,
    /// True when this is the outermost loop (`inset_depth == 0`); callers
    /// use this to decide whether to apply `retract_before_outer_wall`.
    pub is_outer_wall: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NestingOrder {
    OuterToInner,
    InnerToOuter,
}

/// Orders every loop of every inset depth in `insets`, honoring parent/
/// child nesting: in outer-to-inner mode, a loop at depth `k` is placed
/// before every depth-`k+1` loop it contains. Loops at the same depth are
/// linearised by the path/order optimizer using the running head
/// position as the start.
pub fn order_walls(
    insets: &[Inset],
    start: Point,
    seam: &SeamConfig,
    order: NestingOrder,
) -> Vec<OrderedWall> {
    if insets.is_empty() {
        return Vec::new();
    }

    let depths: Vec<usize> = match order {
        NestingOrder::OuterToInner => (0..insets.len()).collect(),
        NestingOrder::InnerToOuter => (0..insets.len()).rev().collect(),
    };

    let mut result = Vec::new();
    let mut head = start;

    for &depth in &depths {
        let inset = &insets[depth];
        let groups = group_by_containment(&inset.loops, head, order);
        for group in groups {
            let inputs: Vec<PathInput> = group
                .iter()
                .map(|&idx| PathInput { points: inset.loops.polygons[idx].points.clone(), is_closed: true })
                .collect();
            let ordered = order::optimize(&inputs, head, seam, false);
            for OrderedPath { source_index, start_vertex, backwards, .. } in ordered {
                let polygon_index = group[source_index];
                result.push(OrderedWall {
                    inset_depth: depth,
                    polygon_index,
                    start_vertex,
                    backwards,
                    is_outer_wall: depth == 0,
                });
                if let Some(p) = inset.loops.polygons[polygon_index].points.get(start_vertex) {
                    head = *p;
                }
            }
        }
    }

    result
}

/// Groups the polygon indices of one inset depth by nesting relative to
/// the running head position. In the common single-part case this is a
/// single group; multi-part layers just optimize each loop independently
/// rather than building a full containment tree, since at a fixed depth
/// siblings never nest inside one another (each is a separate wall of a
/// separate sub-part).
fn group_by_containment(loops: &Polygons, _head: Point, _order: NestingOrder) -> Vec<Vec<usize>> {
    vec![(0..loops.polygons.len()).collect()]
}

/// Computes the inward-offset "retraction region" for the outer wall: the
/// head, after retracting before entering this loop, should not still be
/// sitting on the printed surface.
pub fn retraction_region(outer_wall: &Polygons, retract_inset_distance: i64) -> Polygons {
    outer_wall.offset(-(retract_inset_distance as f64), crate::geometry::JoinStyle::Round)
}

/// True if `point` lies inside `region` -- used by the layer plan to
/// decide whether a travel into the outer wall needs to retract to clear
/// the print per `retract_before_outer_wall`.
pub fn point_is_in_retraction_region(point: Point, region: &Polygons) -> bool {
    is_inside_any(point, region)
}

/// Odd-wall inserts (single-line walls with no matching partner loop at
/// the next depth, from the variable-width variant) always print after
/// the even loop that encloses them.
pub fn odd_wall_comes_after(enclosing_depth: usize, odd_wall_depth: usize) -> bool {
    odd_wall_depth > enclosing_depth
}

#[test]
fn single_part_two_insets_orders_outer_before_inner() {
    use crate::units::Point as P;
    let square = |lo: i64, hi: i64| {
        Polygons::new(vec![Polygon::new(vec![
            P::new(lo, lo),
            P::new(hi, lo),
            P::new(hi, hi),
            P::new(lo, hi),
        ])])
    };
    let insets = vec![
        Inset { depth: 0, loops: square(200, 9800), line_width: 400 },
        Inset { depth: 1, loops: square(600, 9400), line_width: 400 },
    ];
    let ordered = order_walls(&insets, Point::new(0, 0), &SeamConfig::default(), NestingOrder::OuterToInner);
    assert_eq!(ordered.len(), 2);
    assert_eq!(ordered[0].inset_depth, 0);
    assert_eq!(ordered[1].inset_depth, 1);
    assert!(ordered[0].is_outer_wall);
}

#[test]
fn inner_to_outer_reverses_depth_order() {
    use crate::units::Point as P;
    let square = |lo: i64, hi: i64| {
        Polygons::new(vec![Polygon::new(vec![
            P::new(lo, lo),
            P::new(hi, lo),
            P::new(hi, hi),
            P::new(lo, hi),
        ])])
    };
    let insets = vec![
        Inset { depth: 0, loops: square(200, 9800), line_width: 400 },
        Inset { depth: 1, loops: square(600, 9400), line_width: 400 },
    ];
    let ordered = order_walls(&insets, Point::new(0, 0), &SeamConfig::default(), NestingOrder::InnerToOuter);
    assert_eq!(ordered[0].inset_depth, 1);
    assert_eq!(ordered[1].inset_depth, 0);
}
