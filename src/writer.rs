//! The external-interface contracts of §6: a `Writer` trait for the
//! g-code-writer collaborator and a `MessageBusObserver` trait for the
//! optional host-UI observer. Only the contract and the per-layer driving
//! order are defined here; no implementation emits machine control text
//! (out of scope).

use crate::layer_plan::LayerPlan;
use crate::settings::RetractionConfig;
use crate::storage::{ExtruderIndex, GCodePathConfig, PathKind};
use crate::units::{Coord64, Point, Seconds, Speed, Temperature};

/// Per-layer g-code-writer contract. Every method has a no-op default so
/// an implementor only overrides the primitives it cares about;
/// `write_layer`'s default implements the ordering §5 guarantees (one
/// extruder switch per change, paths in insertion order, points in
/// insertion order) by calling the others through `emit_layer`.
pub trait Writer {
    fn set_bed_temperature(&mut self, _temperature: Temperature) {}
    fn set_extruder_temperature(&mut self, _extruder: ExtruderIndex, _temperature: Temperature, _wait: bool) {}
    fn switch_extruder(&mut self, _extruder: ExtruderIndex, _retraction: &RetractionConfig) {}
    fn write_max_z_feedrate(&mut self, _feedrate: Speed) {}
    fn retract(&mut self, _config: &RetractionConfig) {}
    fn z_hop_start(&mut self, _height: Coord64) {}
    fn z_hop_end(&mut self) {}
    fn set_acceleration(&mut self, _acceleration: f64) {}
    fn set_jerk(&mut self, _jerk: f64) {}
    fn travel(&mut self, _point: Point, _speed: Speed) {}
    fn extrude(&mut self, _point: Point, _speed: Speed, _mm3_per_mm: f64, _kind: &PathKind, _update_offset: bool) {}
    /// A short pause ("lift head") when an extruder plan fell short of
    /// the minimum layer time even after slowdown.
    fn delay(&mut self, _seconds: Seconds) {}

    fn write_layer(&mut self, plan: &LayerPlan) {
        emit_layer(plan, self);
    }
}

/// Optional per-layer/per-path observer for a host UI message bus.
pub trait MessageBusObserver {
    fn layer_started(&mut self, _layer_nr: usize, _z: Coord64, _thickness: Coord64) {}
    fn line(&mut self, _kind: &PathKind, _to: Point, _line_width: Coord64, _layer_height: Coord64, _speed: Speed) {}
    fn layer_complete(&mut self) {}
}

/// Drives `writer` through one finished layer plan's paths in §6's order:
/// per `ExtruderPlan`, optional temperature commands, `switch_extruder` on
/// change, then per path retract/z-hop/accel-jerk followed by travels or
/// extrusions in insertion order.
///
/// `update_offset` latches `true` across a run of extrusion points that
/// share one config and resets to `false` whenever a travel intervenes
/// (§9 open question: preserve observed behaviour rather than carrying
/// the latch across a skipped travel).
pub fn emit_layer<W: Writer + ?Sized>(plan: &LayerPlan, writer: &mut W) {
    let mut last_extruder: Option<ExtruderIndex> = None;

    for ep in &plan.extruder_plans {
        if last_extruder != Some(ep.extruder) {
            writer.switch_extruder(ep.extruder, &ep.retraction_config);
            last_extruder = Some(ep.extruder);
        }
        if let Some(temp) = ep.required_start_temperature {
            writer.set_extruder_temperature(ep.extruder, temp, false);
        }
        for insert in &ep.pending_temperature_inserts {
            writer.set_extruder_temperature(ep.extruder, insert.temperature, insert.wait);
        }

        let mut update_offset = true;
        let mut last_config: Option<&GCodePathConfig> = None;

        for path in &ep.paths {
            if path.retract {
                writer.retract(&ep.retraction_config);
            }
            if path.perform_z_hop {
                writer.z_hop_start(ep.retraction_config.z_hop_height);
            }

            let speed = path.config.speed * path.speed_factor.max(0.0);
            if path.config.is_travel() {
                for &p in &path.points {
                    writer.travel(p, speed);
                }
                update_offset = false;
            } else {
                let config_changed = last_config.map_or(true, |c| c != &path.config);
                if config_changed {
                    writer.set_acceleration(path.config.acceleration);
                    writer.set_jerk(path.config.jerk);
                    update_offset = true;
                }
                let mm3_per_mm = path.flow * (path.config.line_width as f64 / 1000.0) * (path.config.layer_height as f64 / 1000.0);
                for &p in &path.points {
                    writer.extrude(p, speed, mm3_per_mm, &path.config.kind, update_offset);
                    update_offset = false;
                }
            }

            if path.perform_z_hop {
                writer.z_hop_end();
            }
            last_config = Some(&path.config);
        }

        if let Some(standby) = ep.prev_extruder_standby_temperature {
            writer.set_extruder_temperature(ep.extruder, standby, false);
        }
    }
}

#[test]
fn emit_layer_switches_extruder_once_per_change() {
    use crate::geometry::Polygons;
    use crate::settings::LayerSettings;
    use crate::storage::{LayerIndex, SliceDataStorage};

    struct Recorder {
        switches: Vec<ExtruderIndex>,
        extrudes: usize,
    }
    impl Writer for Recorder {
        fn switch_extruder(&mut self, extruder: ExtruderIndex, _retraction: &RetractionConfig) {
            self.switches.push(extruder);
        }
        fn extrude(&mut self, _point: Point, _speed: Speed, _mm3_per_mm: f64, _kind: &PathKind, _update_offset: bool) {
            self.extrudes += 1;
        }
    }

    let storage = SliceDataStorage { retraction_config: vec![RetractionConfig::default()], ..Default::default() };
    let mut plan = LayerPlan::new(&storage, LayerIndex(0), 200, 200, LayerSettings::default(), None, Polygons::empty());
    plan.set_extruder(ExtruderIndex(0), true).unwrap();
    let cfg = GCodePathConfig { kind: PathKind::OuterWall, speed: 50.0, acceleration: 1000.0, jerk: 10.0, line_width: 400, layer_height: 200, flow: 1.0, label: "wall" };
    plan.add_extrusion_move(Point::new(1000, 0), &cfg, 1.0, false, 1.0, None);
    plan.add_extrusion_move(Point::new(2000, 0), &cfg, 1.0, false, 1.0, None);

    let mut recorder = Recorder { switches: Vec::new(), extrudes: 0 };
    emit_layer(&plan, &mut recorder);
    assert_eq!(recorder.switches, vec![ExtruderIndex(0)]);
    assert_eq!(recorder.extrudes, 2);
}
