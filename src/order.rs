//! Path/order optimizer: visit order and seam placement for a bag of
//! closed loops and open polylines. Picks the nearest unvisited start
//! point greedily, and for closed loops scores every vertex as a seam
//! candidate by distance, corner sharpness, or a user-chosen target.

use crate::geometry::Polygon;
use crate::settings::{SeamConfig, SeamType};
use crate::units::Point;

/// Corner bias for seam placement: whether concave (inner) or convex
/// (outer) corners are preferred for the seam, or neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CornerPreference {
    None,
    Inner,
    Outer,
    Any,
}

/// Endpoints closer than this are treated as coincident when detecting
/// which open polylines are secretly closed loops.
const CHAIN_DETECT_EPS: i64 = 5;

const SHARPEST_CORNER_WEIGHT: f64 = 10_000.0;
const USER_SPECIFIED_MISMATCH_PENALTY: f64 = 1_000_000.0;

/// One input to the optimizer: either a closed loop or an open polyline.
#[derive(Debug, Clone)]
pub struct PathInput {
    pub points: Vec<Point>,
    pub is_closed: bool,
}

/// One ordered output record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderedPath {
    pub source_index: usize,
    pub start_vertex: usize,
    pub is_closed: bool,
    pub backwards: bool,
}

/// Orders `inputs` starting from `start`, choosing a seam vertex for every
/// closed path per `seam`.
pub fn optimize(inputs: &[PathInput], start: Point, seam: &SeamConfig, detect_chains: bool) -> Vec<OrderedPath> {
    let mut inputs = inputs.to_vec();
    if detect_chains {
        for input in inputs.iter_mut() {
            if !input.is_closed && input.points.len() >= 2 {
                let a = input.points[0];
                let b = *input.points.last().unwrap();
                if a.distance_squared(b) <= CHAIN_DETECT_EPS * CHAIN_DETECT_EPS {
                    input.is_closed = true;
                }
            }
        }
    }

    let seam_vertex: Vec<Option<usize>> = inputs
        .iter()
        .map(|input| {
            if input.is_closed && input.points.len() >= 3 {
                Some(seam_start_vertex(&input.points, start, seam))
            } else {
                None
            }
        })
        .collect();

    let mut remaining: Vec<usize> = (0..inputs.len()).collect();
    let mut ordered = Vec::with_capacity(inputs.len());
    let mut current = start;

    while !remaining.is_empty() {
        // When all candidates are empty/degenerate, candidate 0 is picked
        // rather than filtering upstream.
        let (pick_pos, start_idx, backwards, end_point) = remaining
            .iter()
            .enumerate()
            .map(|(pos, &idx)| {
                let input = &inputs[idx];
                if input.points.is_empty() {
                    return (pos, 0usize, false, current, 0i64);
                }
                if input.is_closed {
                    let sv = seam_vertex[idx].unwrap_or(0);
                    let sp = input.points[sv % input.points.len()];
                    (pos, sv, false, sp, current.distance_squared(sp))
                } else {
                    let first = input.points[0];
                    let last = *input.points.last().unwrap();
                    let d_first = current.distance_squared(first);
                    let d_last = current.distance_squared(last);
                    if d_last < d_first {
                        let last_idx = input.points.len() - 1;
                        (pos, last_idx, true, first, d_last)
                    } else {
                        (pos, 0, false, last, d_first)
                    }
                }
            })
            .min_by_key(|&(_, _, _, _, dist)| dist)
            .map(|(pos, si, back, end, _)| (pos, si, back, end))
            .unwrap_or((0, 0, false, current));

        let idx = remaining.remove(pick_pos);
        let input = &inputs[idx];
        ordered.push(OrderedPath {
            source_index: idx,
            start_vertex: start_idx,
            is_closed: input.is_closed,
            backwards,
        });
        current = end_point;
    }

    ordered
}

/// Seam-scoring rule: iterate every vertex, score by distance or
/// corner sharpness depending on `seam.seam_type`, return the minimum-score
/// vertex (ties go to the first one encountered).
fn seam_start_vertex(points: &[Point], target: Point, seam: &SeamConfig) -> usize {
    if let SeamType::UserSpecified = seam.seam_type {
        if let Some(user_point) = seam.user_specified_point {
            return seam_start_vertex(points, user_point, &SeamConfig {
                seam_type: SeamType::Shortest,
                ..*seam
            });
        }
    }
    if let SeamType::Random = seam.seam_type {
        return rand::random::<usize>() % points.len();
    }

    let n = points.len();
    let mut best_score = f64::INFINITY;
    let mut best_idx = 0;

    for i in 0..n {
        let prev = points[(i + n - 1) % n];
        let cur = points[i];
        let next = points[(i + 1) % n];
        let angle = signed_corner_angle(prev, cur, next);
        let concave = angle > 0.0;

        let score = match seam.seam_type {
            SeamType::Shortest => cur.distance(target) / 1_000_000.0,
            SeamType::SharpestCorner => {
                let mut s = -angle.abs() * SHARPEST_CORNER_WEIGHT;
                s += corner_preference_bias(seam.corner_preference, concave);
                s
            }
            SeamType::UserSpecified => {
                // Reached only if no user point was supplied: degrades to
                // `Shortest` plus the mismatch penalty.
                let mut s = cur.distance(target) / 1_000_000.0;
                if corner_mismatches(seam.corner_preference, concave) {
                    s += USER_SPECIFIED_MISMATCH_PENALTY;
                }
                s
            }
            SeamType::Random => unreachable!(),
        };

        if score < best_score {
            best_score = score;
            best_idx = i;
        }
    }
    best_idx
}

fn corner_preference_bias(pref: CornerPreference, concave: bool) -> f64 {
    match pref {
        CornerPreference::None | CornerPreference::Any => 0.0,
        CornerPreference::Inner => {
            if concave {
                -SHARPEST_CORNER_WEIGHT
            } else {
                0.0
            }
        }
        CornerPreference::Outer => {
            if concave {
                0.0
            } else {
                -SHARPEST_CORNER_WEIGHT
            }
        }
    }
}

fn corner_mismatches(pref: CornerPreference, concave: bool) -> bool {
    match pref {
        CornerPreference::None | CornerPreference::Any => false,
        CornerPreference::Inner => !concave,
        CornerPreference::Outer => concave,
    }
}

/// Angle at `cur` mapped to roughly [-1, 1]-scaled radians; positive means
/// concave (interior angle < pi, i.e. the turn bends inward).
fn signed_corner_angle(prev: Point, cur: Point, next: Point) -> f64 {
    let in_dir = ((cur.x - prev.x) as f64, (cur.y - prev.y) as f64);
    let out_dir = ((next.x - cur.x) as f64, (next.y - cur.y) as f64);
    let cross = in_dir.0 * out_dir.1 - in_dir.1 * out_dir.0;
    let dot = in_dir.0 * out_dir.0 + in_dir.1 * out_dir.1;
    let angle = cross.atan2(dot);
    angle / std::f64::consts::PI
}

/// Convenience: the ordered indices into `polygons` grouped the way
/// `inset_order.rs` wants them, for closed-loop-only callers.
pub fn polygons_to_inputs(polygons: &[Polygon]) -> Vec<PathInput> {
    polygons
        .iter()
        .map(|p| PathInput {
            points: p.points.clone(),
            is_closed: true,
        })
        .collect()
}

#[test]
fn picks_sharpest_corner_for_a_square() {
    // A square has four equally sharp corners; the first one scanned wins
    // the tie, since the first vertex encountered wins.
    let square = vec![
        Point::new(0, 0),
        Point::new(10_000, 0),
        Point::new(10_000, 10_000),
        Point::new(0, 10_000),
    ];
    let seam = SeamConfig {
        seam_type: SeamType::SharpestCorner,
        corner_preference: CornerPreference::Any,
        user_specified_point: None,
    };
    let idx = seam_start_vertex(&square, Point::new(0, 0), &seam);
    assert_eq!(idx, 0);
}

#[test]
fn shortest_seam_picks_the_nearest_vertex() {
    let square = vec![
        Point::new(0, 0),
        Point::new(10_000, 0),
        Point::new(10_000, 10_000),
        Point::new(0, 10_000),
    ];
    let seam = SeamConfig {
        seam_type: SeamType::Shortest,
        corner_preference: CornerPreference::Any,
        user_specified_point: None,
    };
    let idx = seam_start_vertex(&square, Point::new(10_100, 10_100), &seam);
    assert_eq!(idx, 2);
}

#[test]
fn optimizer_visits_every_input_exactly_once() {
    let inputs = vec![
        PathInput { points: vec![Point::new(0, 0), Point::new(1000, 0), Point::new(1000, 1000)], is_closed: true },
        PathInput { points: vec![Point::new(5000, 5000), Point::new(6000, 5000)], is_closed: false },
        PathInput { points: vec![Point::new(-5000, -5000), Point::new(-4000, -5000), Point::new(-4000, -4000)], is_closed: true },
    ];
    let seam = SeamConfig::default();
    let ordered = optimize(&inputs, Point::new(0, 0), &seam, true);
    let visited: std::collections::HashSet<usize> = ordered.iter().map(|p| p.source_index).collect();
    assert_eq!(visited.len(), inputs.len());
}

#[test]
fn open_polyline_chooses_nearer_endpoint() {
    let inputs = vec![PathInput {
        points: vec![Point::new(10_000, 0), Point::new(0, 0)],
        is_closed: false,
    }];
    let ordered = optimize(&inputs, Point::new(0, -10), &SeamConfig::default(), false);
    assert_eq!(ordered.len(), 1);
    assert!(ordered[0].backwards);
    assert_eq!(ordered[0].start_vertex, 1);
}
