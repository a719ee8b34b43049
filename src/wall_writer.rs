//! Wall writer: component G. Splits one inset loop into printable
//! segments, switching to `bridge_cfg` over unsupported air, coasting the
//! tail of a non-bridge run that leads into a bridge, and perturbing the
//! outer wall for fuzzy skin.

use ordered_float::OrderedFloat;

use crate::geometry::Polygons;
use crate::layer_plan::LayerPlan;
use crate::settings::LayerSettings;
use crate::storage::GCodePathConfig;
use crate::units::{Coord64, Flow, Point};

/// One contiguous run of a wall loop classified as over solid material or
/// over air (a bridge candidate).
#[derive(Debug, Clone, Copy)]
struct Segment {
    a: Point,
    b: Point,
    is_bridge: bool,
}

impl Segment {
    fn length(&self) -> f64 {
        self.a.distance(self.b)
    }
}

/// Emits one closed wall loop, advancing `start_idx` forward if it sits
/// over air so the loop begins on supported material, then walking every
/// edge and switching config as it crosses the bridge mask.
pub fn add_wall(
    layer_plan: &mut LayerPlan<'_>,
    wall: &[Point],
    start_idx: usize,
    non_bridge_cfg: &GCodePathConfig,
    bridge_cfg: &GCodePathConfig,
    bridge_wall_mask: &Polygons,
    settings: &LayerSettings,
    wipe_dist: Coord64,
    flow: Flow,
    always_retract: bool,
    is_outer_wall: bool,
) {
    if wall.len() < 3 {
        crate::error::warn(crate::error::SlicerWarnings::DegeneratePolygon { vertex_count: wall.len(), layer: layer_plan.layer.0 });
        return;
    }

    let has_bridge_mask = !bridge_wall_mask.is_empty();
    let adjusted_start = if has_bridge_mask {
        advance_past_air(wall, start_idx, bridge_wall_mask)
    } else {
        start_idx
    };
    let n = wall.len();
    let rotated_original: Vec<Point> = (0..n).map(|i| wall[(adjusted_start + i) % n]).collect();

    let rotated = if is_outer_wall && settings.fuzzy_skin_enabled {
        apply_fuzzy_skin(&rotated_original, settings.fuzzy_skin_point_distance, settings.fuzzy_skin_amplitude)
    } else {
        rotated_original
    };

    layer_plan.add_travel(rotated[0], always_retract);

    let segments = if has_bridge_mask {
        build_segments(&rotated, bridge_wall_mask, settings.bridge_wall_min_length)
    } else {
        ring_as_solid_segments(&rotated)
    };

    emit_segments(layer_plan, &segments, non_bridge_cfg, bridge_cfg, settings, flow);

    if wipe_dist > 0 {
        let wipe_end = walk_distance(&rotated, wipe_dist);
        layer_plan.add_travel_simple(wipe_end);
    }
}

fn ring_as_solid_segments(points: &[Point]) -> Vec<Segment> {
    let n = points.len();
    (0..n).map(|i| Segment { a: points[i], b: points[(i + 1) % n], is_bridge: false }).collect()
}

/// Walks forward from `start_idx` until it lands on a vertex not covered
/// by `mask`, so the wall doesn't start mid-bridge.
fn advance_past_air(wall: &[Point], start_idx: usize, mask: &Polygons) -> usize {
    let n = wall.len();
    for offset in 0..n {
        let idx = (start_idx + offset) % n;
        if !crate::geometry::query::is_inside_any(wall[idx], mask) {
            return idx;
        }
    }
    start_idx
}

/// Classifies every edge of the (already-rotated) wall against `mask`,
/// drops air runs shorter than `min_air_len` back to solid, and merges
/// adjacent same-class runs across edge boundaries.
fn build_segments(points: &[Point], mask: &Polygons, min_air_len: Coord64) -> Vec<Segment> {
    let n = points.len();
    let mut raw = Vec::new();
    for i in 0..n {
        let a = points[i];
        let b = points[(i + 1) % n];
        raw.extend(split_edge_by_mask(mask, a, b, min_air_len));
    }
    merge_adjacent(raw)
}

fn split_edge_by_mask(mask: &Polygons, a: Point, b: Point, min_air_len: Coord64) -> Vec<Segment> {
    let full_len = a.distance(b);
    if full_len == 0.0 {
        return Vec::new();
    }
    let air_pieces = mask.intersect_polylines(&[vec![a, b]]);
    let mut intervals: Vec<(f64, f64)> = air_pieces
        .iter()
        .filter_map(|piece| {
            let first = *piece.first()?;
            let last = *piece.last()?;
            let t0 = parametrize(a, b, first);
            let t1 = parametrize(a, b, last);
            Some((t0.min(t1), t0.max(t1)))
        })
        .collect();
    intervals.sort_by_key(|&(t0, _)| OrderedFloat(t0));
    intervals.retain(|&(t0, t1)| (t1 - t0) * full_len >= min_air_len as f64);

    let mut segs = Vec::new();
    let mut cursor = 0.0;
    for &(t0, t1) in &intervals {
        if t0 > cursor + 1e-9 {
            segs.push(Segment { a: lerp(a, b, cursor), b: lerp(a, b, t0), is_bridge: false });
        }
        segs.push(Segment { a: lerp(a, b, t0.max(cursor)), b: lerp(a, b, t1), is_bridge: true });
        cursor = t1;
    }
    if cursor < 1.0 - 1e-9 {
        segs.push(Segment { a: lerp(a, b, cursor), b: lerp(a, b, 1.0), is_bridge: false });
    }
    segs
}

fn merge_adjacent(segs: Vec<Segment>) -> Vec<Segment> {
    let mut out: Vec<Segment> = Vec::new();
    for seg in segs {
        if seg.length() < 1e-6 {
            continue;
        }
        if let Some(last) = out.last_mut() {
            if last.is_bridge == seg.is_bridge {
                last.b = seg.b;
                continue;
            }
        }
        out.push(seg);
    }
    out
}

fn parametrize(a: Point, b: Point, p: Point) -> f64 {
    let ab = b - a;
    let ap = p - a;
    let denom = (ab.x * ab.x + ab.y * ab.y) as f64;
    if denom == 0.0 {
        0.0
    } else {
        (ap.dot(ab) as f64 / denom).clamp(0.0, 1.0)
    }
}

fn lerp(a: Point, b: Point, t: f64) -> Point {
    Point::new(a.x + ((b.x - a.x) as f64 * t).round() as i64, a.y + ((b.y - a.y) as f64 * t).round() as i64)
}

/// Walks the classified segment list, switching between `non_bridge_cfg`
/// and `bridge_cfg`, coasting the tail of a solid run that leads directly
/// into a bridge, and ramping the post-bridge speed factor back to 1.0.
fn emit_segments(
    layer_plan: &mut LayerPlan<'_>,
    segments: &[Segment],
    non_bridge_cfg: &GCodePathConfig,
    bridge_cfg: &GCodePathConfig,
    settings: &LayerSettings,
    flow: Flow,
) {
    let mut non_bridge_line_volume = 0.0_f64;
    let mut speed_factor = 1.0_f64;
    let bridge_ratio = if settings.bridge_flow > 0.0 && non_bridge_cfg.speed > 0.0 {
        (bridge_cfg.speed * settings.bridge_flow) / (non_bridge_cfg.speed * settings.flow.outer_wall.max(1.0))
    } else {
        1.0
    };

    for (i, seg) in segments.iter().enumerate() {
        if seg.is_bridge {
            layer_plan.add_extrusion_move(seg.a, bridge_cfg, settings.bridge_flow, false, 1.0, None);
            layer_plan.add_extrusion_move(seg.b, bridge_cfg, settings.bridge_flow, false, 1.0, None);
            non_bridge_line_volume = 0.0;
            speed_factor = (bridge_cfg.speed / non_bridge_cfg.speed.max(1e-6)).min(1.0);
            continue;
        }

        let next_is_bridge = segments.get(i + 1).map(|s| s.is_bridge).unwrap_or(false);
        let seg_len = seg.length();

        if next_is_bridge {
            let coast_dist = coast_distance(non_bridge_line_volume, settings, bridge_ratio);
            if coast_dist > 0.0 && coast_dist < seg_len {
                let t_split = 1.0 - coast_dist / seg_len;
                let split_point = lerp(seg.a, seg.b, t_split);
                emit_non_bridge_point(layer_plan, seg.a, non_bridge_cfg, flow, speed_factor, &mut non_bridge_line_volume, seg.a.distance(split_point), settings);
                layer_plan.add_extrusion_move(split_point, non_bridge_cfg, flow, false, speed_factor, None);
                // Coast: zero-flow tail bleeds pressure before the bridge.
                layer_plan.add_extrusion_move(seg.b, non_bridge_cfg, 0.0, false, speed_factor, None);
                speed_factor = recover_speed_factor(speed_factor, settings, coast_dist);
                continue;
            }
        }

        if speed_factor < 1.0 {
            speed_factor = ramp_over_segment(layer_plan, seg, non_bridge_cfg, flow, speed_factor, settings);
        } else {
            emit_non_bridge_point(layer_plan, seg.a, non_bridge_cfg, flow, speed_factor, &mut non_bridge_line_volume, 0.0, settings);
            layer_plan.add_extrusion_move(seg.b, non_bridge_cfg, flow, false, speed_factor, None);
        }
        non_bridge_line_volume = (non_bridge_line_volume + seg_len / 1000.0 * flow * speed_factor * non_bridge_cfg.speed).min(settings.max_non_bridge_line_volume);
    }
}

fn emit_non_bridge_point(
    layer_plan: &mut LayerPlan<'_>,
    a: Point,
    cfg: &GCodePathConfig,
    flow: Flow,
    speed_factor: f64,
    _volume_acc: &mut f64,
    _partial_len: f64,
    _settings: &LayerSettings,
) {
    layer_plan.add_extrusion_move(a, cfg, flow, false, speed_factor, None);
}

/// Emits one segment in equal `acceleration_segment_len` steps, ramping
/// `speed_factor` back toward 1.0 by `acceleration_factor` per step.
fn ramp_over_segment(layer_plan: &mut LayerPlan<'_>, seg: &Segment, cfg: &GCodePathConfig, flow: Flow, mut speed_factor: f64, settings: &LayerSettings) -> f64 {
    let step_len = (settings.coast_acceleration_segment_len.max(1)) as f64;
    let total = seg.length();
    let mut traveled = 0.0;
    layer_plan.add_extrusion_move(seg.a, cfg, flow, false, speed_factor, None);
    while traveled < total {
        traveled = (traveled + step_len).min(total);
        let t = traveled / total;
        let pt = lerp(seg.a, seg.b, t);
        speed_factor = (speed_factor + settings.coast_acceleration_factor).min(1.0);
        layer_plan.add_extrusion_move(pt, cfg, flow, false, speed_factor, None);
    }
    speed_factor
}

fn recover_speed_factor(current: f64, settings: &LayerSettings, _coast_dist: f64) -> f64 {
    (current + settings.coast_acceleration_factor).min(1.0)
}

/// `coast_dist = min(volume, max_volume) * (1 - bridge_ratio) * coast% / 40`.
fn coast_distance(non_bridge_line_volume: f64, settings: &LayerSettings, bridge_ratio: f64) -> f64 {
    let capped = non_bridge_line_volume.min(settings.max_non_bridge_line_volume);
    (capped * (1.0 - bridge_ratio) * settings.bridge_wall_coast / 40.0).max(0.0)
}

fn walk_distance(points: &[Point], distance: Coord64) -> Point {
    let n = points.len();
    let mut remaining = distance as f64;
    let mut current = points[0];
    let mut i = 0;
    loop {
        let next = points[(i + 1) % n];
        let seg_len = current.distance(next);
        if seg_len >= remaining {
            let t = if seg_len > 0.0 { remaining / seg_len } else { 0.0 };
            return lerp(current, next, t);
        }
        remaining -= seg_len;
        current = next;
        i = (i + 1) % n;
        if i == 0 {
            return current;
        }
    }
}

/// Inserts vertices at roughly `point_distance` spacing and perturbs each
/// along its outward normal by a uniform random offset within
/// `amplitude`.
fn apply_fuzzy_skin(wall: &[Point], point_distance: Coord64, amplitude: Coord64) -> Vec<Point> {
    if point_distance <= 0 || wall.len() < 3 {
        return wall.to_vec();
    }
    let n = wall.len();
    let mut out = Vec::new();
    for i in 0..n {
        let a = wall[i];
        let b = wall[(i + 1) % n];
        let seg_len = a.distance(b);
        let steps = (seg_len / point_distance as f64).floor().max(1.0) as usize;
        for step in 0..steps {
            let t = step as f64 / steps as f64;
            let base = lerp(a, b, t);
            let prev = wall[(i + n - 1) % n];
            let normal = outward_normal(prev, a, b);
            let offset = (rand::random::<f64>() * 2.0 - 1.0) * amplitude as f64;
            out.push(Point::new(base.x + (normal.0 * offset).round() as i64, base.y + (normal.1 * offset).round() as i64));
        }
    }
    out
}

fn outward_normal(prev: Point, cur: Point, next: Point) -> (f64, f64) {
    let d1 = cur - prev;
    let d2 = next - cur;
    let nx = (d1.y + d2.y) as f64;
    let ny = -(d1.x + d2.x) as f64;
    let len = nx.hypot(ny);
    if len == 0.0 {
        (0.0, 0.0)
    } else {
        (nx / len, ny / len)
    }
}

#[test]
fn bridge_segment_is_emitted_with_bridge_config() {
    use crate::geometry::Polygon;
    use crate::settings::RetractionConfig;
    use crate::storage::{ExtruderIndex, LayerIndex, PathKind, SliceDataStorage};

    let wall = vec![Point::new(0, 0), Point::new(10_000, 0), Point::new(10_000, 10_000), Point::new(0, 10_000)];
    let mask = Polygons::new(vec![Polygon::new(vec![Point::new(2_000, -100), Point::new(6_000, -100), Point::new(6_000, 100), Point::new(2_000, 100)])]);

    let non_bridge_cfg = GCodePathConfig { kind: PathKind::OuterWall, speed: 60.0, acceleration: 1000.0, jerk: 10.0, line_width: 400, layer_height: 200, flow: 1.0, label: "wall" };
    let bridge_cfg = GCodePathConfig { kind: PathKind::bridge_of(PathKind::OuterWall), speed: 20.0, acceleration: 1000.0, jerk: 10.0, line_width: 400, layer_height: 200, flow: 0.8, label: "bridge" };

    let mut settings = LayerSettings::default();
    settings.bridge_wall_min_length = 1000;
    settings.bridge_wall_coast = 100.0;
    settings.max_non_bridge_line_volume = 100.0;
    settings.coast_acceleration_segment_len = 1000;
    settings.coast_acceleration_factor = 0.1;
    settings.bridge_flow = 0.8;
    settings.flow.outer_wall = 1.0;

    let storage = SliceDataStorage { retraction_config: vec![RetractionConfig::default()], ..Default::default() };
    let mut plan = LayerPlan::new(&storage, LayerIndex(0), 200, 200, settings.clone(), None, Polygons::empty());
    plan.set_extruder(ExtruderIndex(0), true).unwrap();

    add_wall(&mut plan, &wall, 0, &non_bridge_cfg, &bridge_cfg, &mask, &settings, 0, 1.0, false, true);

    let bridge_paths: Vec<_> = plan.extruder_plans[0].paths.iter().filter(|p| p.config.is_bridge()).collect();
    assert!(!bridge_paths.is_empty());
}
