//! Layer plan: component F. Accumulates, for one layer, an ordered
//! sequence of per-extruder sub-plans of paths, tracking head position so
//! travels can be combed and retraction decided per §7.

use std::collections::VecDeque;

use crate::comb::{self, CombPolicy, CombState};
use crate::error::SlicerErrors;
use crate::geometry::Polygons;
use crate::order::{self, PathInput};
use crate::settings::{LayerSettings, RetractionConfig, SeamConfig};
use crate::storage::{ExtruderIndex, GCodePathConfig, LayerIndex, SliceDataStorage};
use crate::units::{Coord64, Flow, Point, Seconds, Temperature};

/// Whether a path is a closed polygon, a set of unordered line segments
/// (infill), or bare travel with no fill semantics at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaceFillKind {
    Polygon,
    Lines,
    None,
}

/// One emitted segment group: a reference to its config (cloned; configs
/// are small value types, see `storage::GCodePathConfig`), flags, and an
/// ordered sequence of target points.
#[derive(Debug, Clone)]
pub struct GCodePath {
    pub config: GCodePathConfig,
    pub space_fill_kind: SpaceFillKind,
    pub flow: Flow,
    pub spiralize: bool,
    pub fan_speed: Option<f64>,
    pub speed_factor: f64,
    pub retract: bool,
    pub perform_z_hop: bool,
    pub perform_prime: bool,
    pub points: Vec<Point>,
    pub done: bool,
}

impl GCodePath {
    fn new(config: GCodePathConfig, space_fill_kind: SpaceFillKind, flow: Flow, spiralize: bool, fan_speed: Option<f64>) -> Self {
        Self {
            config,
            space_fill_kind,
            flow,
            spiralize,
            fan_speed,
            speed_factor: 1.0,
            retract: false,
            perform_z_hop: false,
            perform_prime: false,
            points: Vec::new(),
            done: false,
        }
    }

    /// Length of the path's polyline, in micrometres.
    pub fn length(&self) -> f64 {
        self.points.windows(2).map(|w| w[0].distance(w[1])).sum()
    }

    /// `true` if this path and `other` share a config/flow/speed-factor
    /// combination a caller may keep appending to.
    fn matches(&self, config: &GCodePathConfig, flow: Flow, speed_factor: f64) -> bool {
        !self.done && self.config == *config && (self.flow - flow).abs() < 1e-9 && (self.speed_factor - speed_factor).abs() < 1e-9
    }
}

/// A pending temperature command, to be inserted at a specific point in
/// time before this plan executes — see `layer_plan_buffer::schedule_preheat`.
#[derive(Debug, Clone, Copy)]
pub struct TemperatureInsert {
    /// Seconds of this plan's own execution time remaining when the
    /// command should fire, counting backward from its end.
    pub time_before_end: Seconds,
    pub temperature: Temperature,
    pub wait: bool,
}

/// All paths executed by one extruder on one layer in one contiguous
/// block.
#[derive(Debug, Clone)]
pub struct ExtruderPlan {
    pub extruder: ExtruderIndex,
    pub layer: LayerIndex,
    pub is_initial_layer: bool,
    pub is_raft: bool,
    pub required_start_temperature: Option<Temperature>,
    pub prev_extruder_standby_temperature: Option<Temperature>,
    pub fan_speed: f64,
    pub paths: Vec<GCodePath>,
    pub pending_temperature_inserts: Vec<TemperatureInsert>,
    pub retraction_config: RetractionConfig,
    pub time_estimate: Option<Seconds>,
    pub material_estimate: Option<crate::units::Volume>,
    pub time_correction_factor: f64,
    retraction_history: VecDeque<Seconds>,
}

impl ExtruderPlan {
    fn new(extruder: ExtruderIndex, layer: LayerIndex, retraction_config: RetractionConfig, is_initial_layer: bool) -> Self {
        Self {
            extruder,
            layer,
            is_initial_layer,
            is_raft: false,
            required_start_temperature: None,
            prev_extruder_standby_temperature: None,
            fan_speed: 100.0,
            paths: Vec::new(),
            pending_temperature_inserts: Vec::new(),
            retraction_config,
            time_estimate: None,
            material_estimate: None,
            time_correction_factor: 1.0,
            retraction_history: VecDeque::new(),
        }
    }

    /// Extrusion time (travel excluded) plus travel time, at the paths'
    /// current `speed_factor`. Round-trips with the testable property in
    /// §8: total extruded mm3 equals Σ(segment_length · mm3_per_mm).
    pub fn estimate_time(&self) -> (Seconds, Seconds) {
        let mut extrude_time = 0.0;
        let mut travel_time = 0.0;
        for path in &self.paths {
            let length_mm = path.length() / 1000.0;
            let speed = path.config.speed * path.speed_factor.max(0.0);
            if speed <= 0.0 {
                continue;
            }
            let t = length_mm / speed;
            if path.config.is_travel() {
                travel_time += t;
            } else {
                extrude_time += t;
            }
        }
        (extrude_time, travel_time)
    }

    pub fn estimate_material_mm3(&self) -> f64 {
        self.paths
            .iter()
            .filter(|p| !p.config.is_travel())
            .map(|p| (p.length() / 1000.0) * p.flow * (p.config.line_width as f64 / 1000.0) * (p.config.layer_height as f64 / 1000.0))
            .sum()
    }

    /// Records a retraction event at `time_offset` seconds into this
    /// plan's execution and reports whether it should be suppressed: more
    /// than `retraction_count_max` retractions within the trailing
    /// `retraction_extrusion_window` seconds are dropped (§8 "Boundary
    /// behaviours").
    fn should_suppress_retraction(&mut self, time_offset: Seconds) -> bool {
        let window = self.retraction_config.retraction_extrusion_window;
        while let Some(&front) = self.retraction_history.front() {
            if time_offset - front > window {
                self.retraction_history.pop_front();
            } else {
                break;
            }
        }
        if self.retraction_history.len() as u32 >= self.retraction_config.retraction_count_max {
            true
        } else {
            self.retraction_history.push_back(time_offset);
            false
        }
    }
}

/// One layer's plan: an ordered list of extruder plans plus the state
/// needed to keep travels inside the print. Owns its `CombState`
/// exclusively; reads `SliceDataStorage` but never mutates it.
pub struct LayerPlan<'a> {
    pub storage: &'a SliceDataStorage,
    pub layer: LayerIndex,
    pub z: Coord64,
    pub layer_thickness: Coord64,
    pub extruder_plans: Vec<ExtruderPlan>,
    pub last_planned_position: Option<Point>,
    pub last_planned_extruder: Option<ExtruderIndex>,
    pub was_inside: bool,
    pub is_inside: bool,
    pub comb: Option<CombState>,
    pub bridge_wall_mask: Polygons,
    settings: LayerSettings,
}

impl<'a> LayerPlan<'a> {
    pub fn new(
        storage: &'a SliceDataStorage,
        layer: LayerIndex,
        z: Coord64,
        layer_thickness: Coord64,
        settings: LayerSettings,
        comb: Option<CombState>,
        bridge_wall_mask: Polygons,
    ) -> Self {
        Self {
            storage,
            layer,
            z,
            layer_thickness,
            extruder_plans: Vec::new(),
            last_planned_position: None,
            last_planned_extruder: None,
            was_inside: false,
            is_inside: false,
            comb,
            bridge_wall_mask,
            settings,
        }
    }

    fn current_plan_mut(&mut self) -> &mut ExtruderPlan {
        self.extruder_plans.last_mut().expect("setExtruder must be called before any path is added")
    }

    /// `setExtruder(n)`: switches to extruder `n`, asserting it hasn't
    /// already been used this layer (the inset-order-optimizer invariant
    /// of §3: "no extruder is used twice in one layer").
    pub fn set_extruder(&mut self, extruder: ExtruderIndex, is_initial_layer: bool) -> Result<(), SlicerErrors> {
        if self.last_planned_extruder == Some(extruder) {
            return Ok(());
        }
        if self.extruder_plans.iter().any(|p| p.extruder == extruder) {
            return Err(SlicerErrors::ExtruderReused { layer: self.layer.0, extruder: extruder.0 });
        }
        let retraction_config = self.storage.retraction_config_for(extruder).clone();
        self.extruder_plans.push(ExtruderPlan::new(extruder, self.layer, retraction_config, is_initial_layer));
        self.last_planned_extruder = Some(extruder);
        Ok(())
    }

    /// `addTravel_simple(p)`: unconditional travel with no retraction
    /// logic at all.
    pub fn add_travel_simple(&mut self, p: Point) {
        let config = travel_config();
        let need_new = !self
            .current_plan_mut()
            .paths
            .last()
            .map(|last| last.matches(&config, 1.0, 1.0))
            .unwrap_or(false);
        if need_new {
            self.current_plan_mut().paths.push(GCodePath::new(config, SpaceFillKind::None, 1.0, false, None));
        }
        self.current_plan_mut().paths.last_mut().unwrap().points.push(p);
        self.last_planned_position = Some(p);
    }

    /// `addTravel(p, force_retract)`: combs if enabled, falls back to
    /// straight travel with forced retraction otherwise, per §4.F.
    pub fn add_travel(&mut self, p: Point, force_retract: bool) {
        let start = match self.last_planned_position {
            Some(pos) => pos,
            None => {
                // "Not yet known": the first travel of the layer is a
                // teleport the buffer resolves at flush time.
                self.last_planned_position = Some(p);
                self.add_travel_simple(p);
                return;
            }
        };

        // Retraction config is `Copy`; pull it out up front so the rest of
        // this function never needs to reborrow `self.extruder_plans`
        // while `self.comb` is also borrowed.
        let retraction_config = self.extruder_plans.last().expect("setExtruder must be called first").retraction_config;

        let wall_line_width = self.settings.wall_line_width_x.max(1);
        let combing_enabled = self.settings.combing_enabled && self.comb.is_some();

        let mut retract = force_retract;
        let mut perform_z_hop = false;
        let mut points = Vec::new();
        let mut combed = false;

        if combing_enabled {
            let comb_state = self.comb.as_ref().unwrap();
            let policy = CombPolicy::default();
            if let Ok(result) = comb::comb(&comb_state.inside1, &comb_state.inside2, || comb_state.outside().clone(), start, p, &policy) {
                combed = true;
                let min_gap_sq = (self.settings.max_travel_resolution * self.settings.max_travel_resolution) as f64;
                let mut last = start;
                for sub in &result.paths {
                    for &pt in &sub.points {
                        if pt.distance_squared(last) as f64 >= min_gap_sq || points.is_empty() {
                            points.push(pt);
                            last = pt;
                        }
                    }
                }
                let crosses_boundary = result.crosses_boundary();
                let too_far = result.total_distance() > retraction_config.retraction_combing_max_distance as f64;
                if crosses_boundary || too_far || force_retract {
                    retract = true;
                    perform_z_hop = retraction_config.z_hop_enabled;
                }
            }
        }

        if !combed {
            if self.was_inside {
                // Move inside by one wall line width first, to avoid an
                // ooze scar on the surface before retracting off of it.
                if let Some(comb_state) = &self.comb {
                    let mut nudged = start;
                    let _ = crate::geometry::query::move_inside(&comb_state.inside2, &mut nudged, wall_line_width, (wall_line_width * 4).pow(2));
                    if nudged != start {
                        points.push(nudged);
                    }
                }
            }
            points.push(p);
            retract = true;
            perform_z_hop = retraction_config.z_hop_enabled;
        }

        if points.last() != Some(&p) {
            points.push(p);
        }

        let min_travel_sq = (retraction_config.retraction_min_travel as f64).powi(2);
        let travel_len_sq = start.distance_squared(p) as f64;
        if retract && !force_retract && travel_len_sq < min_travel_sq {
            retract = false;
            perform_z_hop = false;
        }

        if retract {
            let plan = self.extruder_plans.last_mut().expect("setExtruder must be called first");
            let (_, travel_time) = plan.estimate_time();
            let suppressed = plan.should_suppress_retraction(travel_time);
            if suppressed {
                retract = false;
                perform_z_hop = false;
            }
        }

        let config = travel_config();
        let mut path = GCodePath::new(config, SpaceFillKind::None, 1.0, false, None);
        path.retract = retract;
        path.perform_z_hop = perform_z_hop;
        path.points = points;
        self.extruder_plans.last_mut().expect("setExtruder must be called first").paths.push(path);

        self.last_planned_position = Some(p);
        self.was_inside = self.is_inside;
    }

    /// `addExtrusionMove`: appends to the latest path if its config/flow/
    /// speed-factor matches, otherwise opens a new one.
    pub fn add_extrusion_move(&mut self, p: Point, config: &GCodePathConfig, flow: Flow, spiralize: bool, speed_factor: f64, fan_speed: Option<f64>) {
        let plan = self.current_plan_mut();
        let open_new = match plan.paths.last() {
            Some(last) => !last.matches(config, flow, speed_factor) || last.spiralize != spiralize,
            None => true,
        };
        if open_new {
            let mut new_path = GCodePath::new(config.clone(), SpaceFillKind::Lines, flow, spiralize, fan_speed);
            new_path.speed_factor = speed_factor;
            plan.paths.push(new_path);
        }
        plan.paths.last_mut().unwrap().points.push(p);
        self.last_planned_position = Some(p);
    }

    /// `addPolygon`: travels to `poly[start_idx]`, extrudes the loop in
    /// order, closes it, then optionally wipes `wipe_dist` further along
    /// the polygon to hide the seam.
    ///
    /// `wall_overlap` (0 = no compensation, 1 = full) reduces flow on any
    /// edge whose midpoint runs close to another, non-adjacent edge of
    /// the same loop — the case a thin wall doubles back on itself and
    /// would otherwise over-extrude where the two passes overlap, per
    /// the original engine's `WallOverlapComputation`.
    pub fn add_polygon(
        &mut self,
        poly: &[Point],
        start_idx: usize,
        config: &GCodePathConfig,
        wall_overlap: f64,
        wipe_dist: Coord64,
        spiralize: bool,
        flow: Flow,
        always_retract: bool,
    ) {
        if poly.len() < 3 {
            crate::error::warn(crate::error::SlicerWarnings::DegeneratePolygon { vertex_count: poly.len(), layer: self.layer.0 });
            return;
        }
        let n = poly.len();
        let start = poly[start_idx % n];
        self.add_travel(start, always_retract);

        if wall_overlap <= 0.0 || config.line_width <= 0 {
            let mut path = GCodePath::new(config.clone(), SpaceFillKind::Polygon, flow, spiralize, None);
            for i in 1..=n {
                path.points.push(poly[(start_idx + i) % n]);
            }
            self.current_plan_mut().paths.push(path);
        } else {
            for i in 1..=n {
                let edge_start = (start_idx + i - 1) % n;
                let factor = wall_overlap_factor(poly, edge_start, config.line_width, wall_overlap);
                self.add_extrusion_move(poly[(start_idx + i) % n], config, flow * factor, spiralize, 1.0, None);
            }
        }
        self.last_planned_position = Some(start);

        if wipe_dist > 0 {
            let wipe_end = walk_distance_along_ring(poly, start_idx, wipe_dist);
            self.add_travel_simple(wipe_end);
        }
    }

    /// `addPolygonsByOptimizer`: orders the given closed loops with the
    /// path/order optimizer, then dispatches each to `add_polygon`.
    pub fn add_polygons_by_optimizer(
        &mut self,
        polys: &[Vec<Point>],
        config: &GCodePathConfig,
        seam: &SeamConfig,
        wall_overlap: f64,
        wipe_dist: Coord64,
        flow: Flow,
    ) {
        let start = self.last_planned_position.unwrap_or_else(|| polys.first().and_then(|p| p.first().copied()).unwrap_or(Point::new(0, 0)));
        let inputs: Vec<PathInput> = polys.iter().map(|p| PathInput { points: p.clone(), is_closed: true }).collect();
        let ordered = order::optimize(&inputs, start, seam, false);
        for op in ordered {
            let poly = &polys[op.source_index];
            self.add_polygon(poly, op.start_vertex, config, wall_overlap, wipe_dist, false, flow, false);
        }
    }

    /// `addLinesByOptimizer`: runs the optimizer in "lines" mode (open
    /// polylines, no seam) and inserts an end-of-line wipe travel unless
    /// the next line starts within `2 * line_width` of where this one
    /// ends.
    pub fn add_lines_by_optimizer(&mut self, lines: &[Vec<Point>], config: &GCodePathConfig, flow: Flow, wipe_dist: Coord64) {
        let start = self.last_planned_position.unwrap_or(Point::new(0, 0));
        let inputs: Vec<PathInput> = lines.iter().map(|p| PathInput { points: p.clone(), is_closed: false }).collect();
        let ordered = order::optimize(&inputs, start, &SeamConfig::default(), true);
        let near_threshold = (2 * config.line_width) as f64;

        for (i, op) in ordered.iter().enumerate() {
            let line = &lines[op.source_index];
            if line.len() < 2 {
                continue;
            }
            let (a, b) = if op.backwards {
                (*line.last().unwrap(), line[0])
            } else {
                (line[0], *line.last().unwrap())
            };
            self.add_travel(a, false);
            let mut path = GCodePath::new(config.clone(), SpaceFillKind::Lines, flow, false, None);
            let iter: Box<dyn Iterator<Item = &Point>> = if op.backwards { Box::new(line.iter().rev()) } else { Box::new(line.iter()) };
            path.points = iter.copied().collect();
            self.current_plan_mut().paths.push(path);
            self.last_planned_position = Some(b);

            if wipe_dist > 0 {
                if let Some(next) = ordered.get(i + 1) {
                    let next_line = &lines[next.source_index];
                    let next_start = if next.backwards { *next_line.last().unwrap() } else { next_line[0] };
                    if b.distance(next_start) > near_threshold {
                        let dir = next_start - b;
                        let len = (dir.x as f64).hypot(dir.y as f64);
                        if len > 0.0 {
                            let wipe_end = Point::new(
                                b.x + (dir.x as f64 / len * wipe_dist as f64).round() as i64,
                                b.y + (dir.y as f64 / len * wipe_dist as f64).round() as i64,
                            );
                            self.add_travel_simple(wipe_end);
                        }
                    }
                }
            }
        }
    }

    /// Emits `wall` as one continuous extrusion while linearly
    /// interpolating z from `prev_wall`'s top to this layer's top. With
    /// `smooth`, each point is blended toward the closest point on
    /// `prev_wall` weighted by how far along the wall we've travelled.
    pub fn spiralize_wall_slice(
        &mut self,
        config: &GCodePathConfig,
        wall: &[Point],
        prev_wall: Option<&[Point]>,
        seam_vertex: usize,
        smooth: bool,
    ) -> Result<(), SlicerErrors> {
        if wall.len() < 3 {
            return Ok(());
        }
        {
            let plan = self.current_plan_mut();
            if let Some(last) = plan.paths.last() {
                if last.spiralize && !last.done {
                    return Err(SlicerErrors::SpiralizeBroken { layer: self.layer.0, started_at_path: plan.paths.len() - 1 });
                }
            }
        }
        let n = wall.len();
        let start = wall[seam_vertex % n];
        self.add_travel(start, false);

        let total_len: f64 = (0..n).map(|i| wall[(seam_vertex + i) % n].distance(wall[(seam_vertex + i + 1) % n])).sum();
        let mut traveled = 0.0;
        let mut path = GCodePath::new(config.clone(), SpaceFillKind::Polygon, 1.0, true, None);

        for i in 1..=n {
            let idx = (seam_vertex + i) % n;
            let mut pt = wall[idx];
            if smooth {
                if let Some(prev) = prev_wall {
                    let t = (traveled / total_len.max(1.0)).clamp(0.0, 1.0);
                    if let Ok(cp) = crate::geometry::query::find_closest_on_polygon(pt, &crate::geometry::Polygon::new(prev.to_vec())) {
                        pt = Point::new(
                            (pt.x as f64 * t + cp.point.x as f64 * (1.0 - t)).round() as i64,
                            (pt.y as f64 * t + cp.point.y as f64 * (1.0 - t)).round() as i64,
                        );
                    }
                }
            }
            path.points.push(pt);
            traveled += wall[(idx + n - 1) % n].distance(pt);
        }
        self.current_plan_mut().paths.push(path);
        self.last_planned_position = Some(start);
        Ok(())
    }

    /// `processFanSpeedAndMinimalLayerTime`: estimates each extruder
    /// plan's time, slows the last plan down to meet `cool_min_layer_time`
    /// (extrusion speed only, clamped to `cool_min_speed`), then maps
    /// total layer time to a fan speed.
    pub fn process_fan_speed_and_minimal_layer_time(&mut self) -> Seconds {
        let min_layer_time = self.settings.cool_min_layer_time;
        let min_speed = self.settings.cool_min_speed;

        let mut total_extrude = 0.0;
        let mut total_travel = 0.0;
        for plan in &self.extruder_plans {
            let (e, t) = plan.estimate_time();
            total_extrude += e;
            total_travel += t;
        }

        let mut extra_time = 0.0;
        if let Some(last) = self.extruder_plans.last_mut() {
            let (last_extrude, last_travel) = last.estimate_time();
            let total = total_extrude + total_travel;
            if total < min_layer_time && last_extrude > 0.0 {
                let needed_extrude_time = (min_layer_time - (total_extrude - last_extrude) - total_travel).max(0.0);
                // Extrusion time is inversely proportional to speed_factor
                // (time = length / (speed * factor)), so stretching
                // `last_extrude` seconds of work up to `needed_extrude_time`
                // takes factor = last_extrude / needed_extrude_time, not its
                // reciprocal.
                let naive_factor = if needed_extrude_time > 0.0 {
                    (last_extrude / needed_extrude_time).min(1.0)
                } else {
                    1.0
                };
                let min_speed_factor = {
                    let slowest_speed = last
                        .paths
                        .iter()
                        .filter(|p| !p.config.is_travel())
                        .map(|p| p.config.speed)
                        .fold(f64::INFINITY, f64::min);
                    if slowest_speed.is_finite() && slowest_speed > 0.0 {
                        (min_speed / slowest_speed).min(1.0)
                    } else {
                        0.0
                    }
                };
                let factor = naive_factor.max(min_speed_factor);
                for path in last.paths.iter_mut() {
                    if !path.config.is_travel() {
                        path.speed_factor *= factor;
                    }
                }
                last.time_correction_factor = factor;
                let (new_extrude, _) = last.estimate_time();
                let new_total = (total_extrude - last_extrude) + new_extrude + last_travel;
                extra_time = (min_layer_time - new_total).max(0.0);
            }
        }

        let total_time = total_extrude + total_travel + extra_time;
        let fan_speed = fan_speed_for_layer_time(total_time, &self.settings, self.layer.0, self.z, self.layer_thickness);
        for plan in self.extruder_plans.iter_mut() {
            plan.fan_speed = fan_speed;
        }
        extra_time
    }
}

fn travel_config() -> GCodePathConfig {
    GCodePathConfig {
        kind: crate::storage::PathKind::Travel,
        speed: 150.0,
        acceleration: 3000.0,
        jerk: 10.0,
        line_width: 0,
        layer_height: 0,
        flow: 0.0,
        label: "travel",
    }
}

fn walk_distance_along_ring(poly: &[Point], start_idx: usize, distance: Coord64) -> Point {
    let n = poly.len();
    let mut remaining = distance as f64;
    let mut current = poly[start_idx % n];
    let mut i = start_idx % n;
    loop {
        let next = poly[(i + 1) % n];
        let seg_len = current.distance(next);
        if seg_len >= remaining {
            let t = if seg_len > 0.0 { remaining / seg_len } else { 0.0 };
            return Point::new(
                current.x + ((next.x - current.x) as f64 * t).round() as i64,
                current.y + ((next.y - current.y) as f64 * t).round() as i64,
            );
        }
        remaining -= seg_len;
        current = next;
        i = (i + 1) % n;
        if i == start_idx % n {
            return current;
        }
    }
}

/// Flow multiplier for the edge starting at `poly[edge_start]`: reduced
/// below 1.0 when that edge's midpoint lies closer than `line_width` to
/// some other, non-adjacent edge of the same loop, scaled by
/// `wall_overlap`. A loop with no close self-approach returns 1.0.
fn wall_overlap_factor(poly: &[Point], edge_start: usize, line_width: Coord64, wall_overlap: f64) -> f64 {
    let n = poly.len();
    if n < 4 {
        return 1.0;
    }
    let a = poly[edge_start];
    let b = poly[(edge_start + 1) % n];
    let mid = Point::new((a.x + b.x) / 2, (a.y + b.y) / 2);

    let mut closest = f64::INFINITY;
    for j in 0..n {
        if j == edge_start || j == (edge_start + 1) % n || (j + 1) % n == edge_start {
            continue;
        }
        let c = poly[j];
        let d = poly[(j + 1) % n];
        let dist = crate::geometry::point_to_segment_distance(mid, c, d);
        if dist < closest {
            closest = dist;
        }
    }

    if closest.is_finite() && closest < line_width as f64 {
        let overlap_fraction = 1.0 - closest / line_width as f64;
        (1.0 - wall_overlap * overlap_fraction).max(0.0)
    } else {
        1.0
    }
}

/// Piecewise-linear mapping from total layer print time to fan speed
/// between the configured min/max bounds, with a separate (slower) ramp
/// during the first few layers so bridging fans don't kick in before the
/// part has any height.
fn fan_speed_for_layer_time(total_time: Seconds, settings: &LayerSettings, layer_nr: usize, _z: Coord64, _thickness: Coord64) -> f64 {
    const FIRST_LAYERS_RAMP: usize = 3;
    let (min_time, max_time) = (10.0_f64, 60.0_f64);
    let t = ((total_time - min_time) / (max_time - min_time)).clamp(0.0, 1.0);
    let mut speed = settings.fan_speed_max - t * (settings.fan_speed_max - settings.fan_speed_min);
    if layer_nr < FIRST_LAYERS_RAMP {
        let ramp = layer_nr as f64 / FIRST_LAYERS_RAMP as f64;
        speed *= ramp;
    }
    speed.clamp(0.0, 100.0)
}

#[test]
fn set_extruder_rejects_reuse_within_one_layer() {
    let storage = SliceDataStorage { retraction_config: vec![RetractionConfig::default()], ..Default::default() };
    let mut plan = LayerPlan::new(&storage, LayerIndex(0), 200, 200, LayerSettings::default(), None, Polygons::empty());
    plan.set_extruder(ExtruderIndex(0), true).unwrap();
    plan.set_extruder(ExtruderIndex(1), true).ok();
    let err = plan.set_extruder(ExtruderIndex(0), true);
    assert!(err.is_err());
}

#[test]
fn add_travel_without_prior_position_is_a_teleport() {
    let storage = SliceDataStorage { retraction_config: vec![RetractionConfig::default()], ..Default::default() };
    let mut plan = LayerPlan::new(&storage, LayerIndex(0), 200, 200, LayerSettings::default(), None, Polygons::empty());
    plan.set_extruder(ExtruderIndex(0), true).unwrap();
    assert!(plan.last_planned_position.is_none());
    plan.add_travel(Point::new(1000, 1000), false);
    assert_eq!(plan.last_planned_position, Some(Point::new(1000, 1000)));
}

#[test]
fn minimal_layer_time_slows_extrusion_not_travel() {
    // Scenario 5 (§8): extrude=3s, travel=1s, cool_min_layer_time=10s,
    // cool_min_speed=10mm/s, all paths originally at 60mm/s. Expected
    // factor ≈ 0.333 and total layer time ≈ 10s with ~0 residual delay.
    let mut settings = LayerSettings::default();
    settings.cool_min_layer_time = 10.0;
    settings.cool_min_speed = 10.0;
    settings.fan_speed_min = 0.0;
    settings.fan_speed_max = 100.0;

    let storage = SliceDataStorage { retraction_config: vec![RetractionConfig::default()], ..Default::default() };
    let mut plan = LayerPlan::new(&storage, LayerIndex(0), 200, 200, settings, None, Polygons::empty());
    plan.set_extruder(ExtruderIndex(0), true).unwrap();

    let cfg = crate::storage::GCodePathConfig {
        kind: crate::storage::PathKind::OuterWall,
        speed: 60.0,
        acceleration: 1000.0,
        jerk: 10.0,
        line_width: 400,
        layer_height: 200,
        flow: 1.0,
        label: "wall",
    };
    // 180 mm of extrusion at 60 mm/s = 3 s.
    plan.add_extrusion_move(Point::new(0, 0), &cfg, 1.0, false, 1.0, None);
    plan.add_extrusion_move(Point::new(180_000, 0), &cfg, 1.0, false, 1.0, None);
    // 150 mm of travel at the fixed 150 mm/s travel speed = 1 s.
    plan.add_travel_simple(Point::new(180_000, 0));
    plan.add_travel_simple(Point::new(330_000, 0));

    let extra_time = plan.process_fan_speed_and_minimal_layer_time();

    let last = plan.extruder_plans.last().unwrap();
    assert!((last.time_correction_factor - 1.0 / 3.0).abs() < 1e-6, "factor was {}", last.time_correction_factor);
    let (new_extrude, new_travel) = last.estimate_time();
    assert!((new_extrude + new_travel - 10.0).abs() < 1e-6);
    assert!(extra_time.abs() < 1e-6);
}

#[test]
fn wall_overlap_reduces_flow_where_a_thin_loop_folds_back_on_itself() {
    // A 10mm x 0.1mm sliver: the top and bottom edges sit 100um apart,
    // well inside a 400um line width, so they should overlap-compensate;
    // the short left/right edges sit 10mm apart and should not.
    let storage = SliceDataStorage { retraction_config: vec![RetractionConfig::default()], ..Default::default() };
    let mut plan = LayerPlan::new(&storage, LayerIndex(0), 200, 200, LayerSettings::default(), None, Polygons::empty());
    plan.set_extruder(ExtruderIndex(0), true).unwrap();

    let cfg = crate::storage::GCodePathConfig {
        kind: crate::storage::PathKind::OuterWall,
        speed: 60.0,
        acceleration: 1000.0,
        jerk: 10.0,
        line_width: 400,
        layer_height: 200,
        flow: 1.0,
        label: "wall",
    };
    let poly = vec![Point::new(0, 0), Point::new(10_000, 0), Point::new(10_000, 100), Point::new(0, 100)];
    plan.add_polygon(&poly, 0, &cfg, 1.0, 0, false, 1.0, false);

    let flows: Vec<f64> = plan.extruder_plans[0]
        .paths
        .iter()
        .filter(|p| p.space_fill_kind == SpaceFillKind::Lines)
        .map(|p| p.flow)
        .collect();
    assert_eq!(flows.len(), 4);
    assert!((flows[0] - 0.25).abs() < 1e-6, "bottom edge flow was {}", flows[0]);
    assert!((flows[1] - 1.0).abs() < 1e-6, "right edge flow was {}", flows[1]);
    assert!((flows[2] - 0.25).abs() < 1e-6, "top edge flow was {}", flows[2]);
    assert!((flows[3] - 1.0).abs() < 1e-6, "left edge flow was {}", flows[3]);
}

#[test]
fn wall_overlap_disabled_emits_a_single_path() {
    let storage = SliceDataStorage { retraction_config: vec![RetractionConfig::default()], ..Default::default() };
    let mut plan = LayerPlan::new(&storage, LayerIndex(0), 200, 200, LayerSettings::default(), None, Polygons::empty());
    plan.set_extruder(ExtruderIndex(0), true).unwrap();

    let cfg = crate::storage::GCodePathConfig {
        kind: crate::storage::PathKind::OuterWall,
        speed: 60.0,
        acceleration: 1000.0,
        jerk: 10.0,
        line_width: 400,
        layer_height: 200,
        flow: 1.0,
        label: "wall",
    };
    let poly = vec![Point::new(0, 0), Point::new(10_000, 0), Point::new(10_000, 100), Point::new(0, 100)];
    plan.add_polygon(&poly, 0, &cfg, 0.0, 0, false, 1.0, false);

    let extrusion_paths: Vec<_> = plan.extruder_plans[0].paths.iter().filter(|p| p.space_fill_kind == SpaceFillKind::Polygon).collect();
    assert_eq!(extrusion_paths.len(), 1);
    assert_eq!(extrusion_paths[0].points.len(), 4);
}

#[test]
fn short_travel_is_not_retracted_unless_forced() {
    let mut settings = LayerSettings::default();
    settings.max_travel_resolution = 10;
    let storage = SliceDataStorage {
        retraction_config: vec![RetractionConfig { retraction_min_travel: 5_000, ..RetractionConfig::default() }],
        ..Default::default()
    };
    let mut plan = LayerPlan::new(&storage, LayerIndex(0), 200, 200, settings, None, Polygons::empty());
    plan.set_extruder(ExtruderIndex(0), true).unwrap();
    plan.add_travel(Point::new(0, 0), false);
    plan.add_travel(Point::new(100, 0), false);
    let last = plan.extruder_plans[0].paths.last().unwrap();
    assert!(!last.retract);
}
