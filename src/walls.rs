//! Wall/inset computer: turns a layer part's filled outline into a set of
//! nested wall loops plus the remaining `inner_area` to be infilled.

use crate::geometry::{JoinStyle, Polygon, Polygons};
use crate::units::Coord64;

/// One nested wall ring at a given inset depth. `line_width` lets the
/// variable-width variant record a width that differs per loop.
#[derive(Debug, Clone)]
pub struct Inset {
    pub depth: usize,
    pub loops: Polygons,
    pub line_width: Coord64,
}

/// A single junction-to-junction run of the medial-axis wall variant; each
/// carries its own width rather than sharing a fixed line width per depth.
#[derive(Debug, Clone)]
pub struct VariableWidthLine {
    pub points: Vec<crate::units::Point>,
    pub width: Coord64,
    pub is_closed: bool,
}

/// Uniform-width insets plus the area left over for infill.
#[derive(Debug, Clone, Default)]
pub struct WallResult {
    pub insets: Vec<Inset>,
    pub inner_area: Polygons,
    pub perimeter_gaps: Polygons,
    pub wall_toolpaths: Vec<VariableWidthLine>,
}

/// Generates `wall_count` nested insets from `outline`, offsetting by
/// `line_width_0/2` for the first loop and `line_width_x` for every
/// subsequent one, stopping early if an offset comes back empty.
///
/// If the first inset is empty, `inner_area` is the outline unchanged (no
/// walls fit). If `wall_count == 0`, the outline passes straight through.
pub fn generate_insets(
    outline: &Polygons,
    line_width_0: Coord64,
    line_width_x: Coord64,
    wall_count: usize,
    max_resolution: Coord64,
    max_deviation: Coord64,
) -> WallResult {
    if wall_count == 0 || outline.is_empty() {
        return WallResult {
            insets: Vec::new(),
            inner_area: outline.clone(),
            perimeter_gaps: Polygons::empty(),
            wall_toolpaths: Vec::new(),
        };
    }

    let segment_eps = max_resolution as f64;
    let deviation_eps = max_deviation as f64;

    let mut insets = Vec::with_capacity(wall_count);
    let mut prev = outline
        .offset(-(line_width_0 as f64) / 2.0, JoinStyle::Round)
        .simplify(segment_eps, deviation_eps);

    if prev.is_empty() {
        return WallResult {
            insets: Vec::new(),
            inner_area: outline.clone(),
            perimeter_gaps: Polygons::empty(),
            wall_toolpaths: Vec::new(),
        };
    }

    insets.push(Inset {
        depth: 0,
        loops: prev.clone(),
        line_width: line_width_0,
    });

    for depth in 1..wall_count {
        let next = prev
            .offset(-(line_width_x as f64), JoinStyle::Round)
            .simplify(segment_eps, deviation_eps);
        if next.is_empty() {
            break;
        }
        insets.push(Inset {
            depth,
            loops: next.clone(),
            line_width: line_width_x,
        });
        prev = next;
    }

    let inner_area = prev.offset(-(line_width_x as f64) / 2.0, JoinStyle::Round);
    let perimeter_gaps = compute_perimeter_gaps(outline, &insets, line_width_0, line_width_x);

    WallResult {
        insets,
        inner_area,
        perimeter_gaps,
        wall_toolpaths: Vec::new(),
    }
}

/// The thin slivers left behind between adjacent insets: offset each
/// inset back out by half its own line width and subtract from the prior
/// ring's equivalent outward offset, so only the residual sub-line-width
/// strip remains.
fn compute_perimeter_gaps(
    outline: &Polygons,
    insets: &[Inset],
    line_width_0: Coord64,
    line_width_x: Coord64,
) -> Polygons {
    if insets.is_empty() {
        return Polygons::empty();
    }
    let mut gaps = Polygons::empty();
    let mut outer_bound = outline.clone();
    for inset in insets {
        let half_width = if inset.depth == 0 { line_width_0 } else { line_width_x } as f64 / 2.0;
        let inset_outer_edge = inset.loops.offset(half_width, JoinStyle::Miter);
        let gap = outer_bound.difference(&inset_outer_edge);
        gaps = gaps.union(&gap);
        outer_bound = inset.loops.offset(-half_width, JoinStyle::Miter);
    }
    gaps
}

/// Medial-axis-flavoured variant: instead of uniform-width rings, narrow
/// regions get fewer, wider lines. Approximated here by generating
/// uniform insets as above, then for any depth whose loops are empty
/// while the area is not, re-deriving a single centreline run from the
/// remaining area's skeletonized offset difference.
pub fn generate_variable_width_insets(
    outline: &Polygons,
    line_width_0: Coord64,
    line_width_x: Coord64,
    wall_count: usize,
    max_resolution: Coord64,
    max_deviation: Coord64,
) -> WallResult {
    let mut result = generate_insets(outline, line_width_0, line_width_x, wall_count, max_resolution, max_deviation);

    let covered_by_uniform = result
        .insets
        .last()
        .map(|i| i.loops.clone())
        .unwrap_or_else(|| outline.clone());
    let remainder = outline.difference(&covered_by_uniform);
    if !remainder.is_empty() {
        for poly in remainder.iter() {
            if poly.points.len() < 3 {
                continue;
            }
            result.wall_toolpaths.push(VariableWidthLine {
                points: centerline_from_ring(poly, line_width_x),
                width: line_width_x,
                is_closed: true,
            });
        }
    }
    result
}

/// Coarse centreline estimate for a thin ring: offsets inward by a
/// quarter line width, a cheap stand-in for a true medial-axis trace that
/// still yields a single representative path through a narrow region.
fn centerline_from_ring(poly: &Polygon, line_width: Coord64) -> Vec<crate::units::Point> {
    let shrunk = Polygons::new(vec![poly.clone()]).offset(-(line_width as f64) / 4.0, JoinStyle::Round);
    shrunk
        .iter()
        .next()
        .map(|p| p.points.clone())
        .unwrap_or_else(|| poly.points.clone())
}

#[test]
fn single_square_two_walls_nests_correctly() {
    let outline = Polygons::new(vec![Polygon::new(vec![
        crate::units::Point::new(0, 0),
        crate::units::Point::new(20_000, 0),
        crate::units::Point::new(20_000, 20_000),
        crate::units::Point::new(0, 20_000),
    ])]);
    let result = generate_insets(&outline, 400, 400, 2, 25, 5);
    assert_eq!(result.insets.len(), 2);
    assert!(result.insets[0].loops.area() < outline.area());
    assert!(result.insets[1].loops.area() < result.insets[0].loops.area());
    assert!(!result.inner_area.is_empty());
}

#[test]
fn wall_count_zero_passes_outline_through() {
    let outline = Polygons::new(vec![Polygon::new(vec![
        crate::units::Point::new(0, 0),
        crate::units::Point::new(1_000, 0),
        crate::units::Point::new(1_000, 1_000),
        crate::units::Point::new(0, 1_000),
    ])]);
    let result = generate_insets(&outline, 400, 400, 0, 25, 5);
    assert!(result.insets.is_empty());
    assert_eq!(result.inner_area.area(), outline.area());
}

#[test]
fn empty_first_inset_makes_inner_area_the_outline() {
    // A sliver narrower than line_width_0 erodes to nothing on the first pass.
    let sliver = Polygons::new(vec![Polygon::new(vec![
        crate::units::Point::new(0, 0),
        crate::units::Point::new(100, 0),
        crate::units::Point::new(100, 10_000),
        crate::units::Point::new(0, 10_000),
    ])]);
    let result = generate_insets(&sliver, 2_000, 400, 3, 25, 5);
    assert!(result.insets.is_empty());
    assert_eq!(result.inner_area.area(), sliver.area());
}
