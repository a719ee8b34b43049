//! Layer plan buffer: component H. Holds a FIFO of `LayerPlan`s, flushing
//! the oldest to the writer once more than `preheat_horizon` are buffered,
//! and schedules preheat commands by walking backward through prior
//! extruder plans — see §4.H and supplemented-feature note on `Preheat`.

use std::collections::VecDeque;

use crate::layer_plan::{ExtruderPlan, LayerPlan, TemperatureInsert};
use crate::storage::ExtruderIndex;
use crate::units::{Flow, Seconds, Temperature};
use crate::writer::Writer;

/// One extruder's thermal behaviour: the temperature it idles at between
/// uses and how fast it heats/cools, per CuraEngine's `Preheat` table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Preheat {
    pub target_temperature: Temperature,
    pub standby_temperature: Temperature,
    pub time_to_heat_1_degree: Seconds,
    pub time_to_cool_1_degree: Seconds,
}

impl Default for Preheat {
    fn default() -> Self {
        Self { target_temperature: 200.0, standby_temperature: 150.0, time_to_heat_1_degree: 0.5, time_to_cool_1_degree: 0.8 }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PreheatTable {
    per_extruder: Vec<Preheat>,
}

impl PreheatTable {
    pub fn new(per_extruder: Vec<Preheat>) -> Self {
        Self { per_extruder }
    }

    fn get(&self, extruder: ExtruderIndex) -> Preheat {
        self.per_extruder.get(extruder.0).copied().unwrap_or_default()
    }

    /// Required printing temperature for `extruder`. The distilled spec
    /// keys this on "(extruder, average flow)"; flow only gates whether an
    /// extruder is active at all here, since nominal print temperature is
    /// a material property rather than flow-scaled (see DESIGN.md).
    pub fn required_temperature(&self, extruder: ExtruderIndex, _average_flow: Flow) -> Temperature {
        self.get(extruder).target_temperature
    }

    fn heatup_seconds(&self, extruder: ExtruderIndex, from: Temperature, to: Temperature) -> Seconds {
        let p = self.get(extruder);
        (to - from).max(0.0) * p.time_to_heat_1_degree
    }
}

fn plan_duration(ep: &ExtruderPlan) -> Seconds {
    let (extrude, travel) = ep.estimate_time();
    extrude + travel
}

/// A FIFO of `LayerPlan`s awaiting emission, bounded by a preheat-planning
/// horizon. Borrows the same `SliceDataStorage` lifetime as the plans it
/// holds.
pub struct LayerPlanBuffer<'a> {
    preheat_horizon: usize,
    preheat_table: PreheatTable,
    buffer: VecDeque<LayerPlan<'a>>,
}

impl<'a> LayerPlanBuffer<'a> {
    pub fn new(preheat_horizon: usize, preheat_table: PreheatTable) -> Self {
        Self { preheat_horizon: preheat_horizon.max(2), preheat_table, buffer: VecDeque::new() }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Pushes a finished layer plan, schedules its preheat commands
    /// against the buffered history, then flushes the oldest layer to
    /// `writer` if the buffer now exceeds `preheat_horizon`.
    pub fn push(&mut self, plan: LayerPlan<'a>, writer: &mut dyn Writer) {
        self.buffer.push_back(plan);
        let layer_pos = self.buffer.len() - 1;
        let plan_count = self.buffer[layer_pos].extruder_plans.len();
        for plan_idx in 0..plan_count {
            self.schedule_preheat(layer_pos, plan_idx);
        }

        if self.buffer.len() > self.preheat_horizon {
            self.flush_oldest(writer);
        }
    }

    /// Flushes every remaining buffered layer, in FIFO order. Call once
    /// slicing is finished so the preheat horizon doesn't hold layers back
    /// forever.
    pub fn finish(&mut self, writer: &mut dyn Writer) {
        while !self.buffer.is_empty() {
            self.flush_oldest(writer);
        }
    }

    fn flush_oldest(&mut self, writer: &mut dyn Writer) {
        if let Some(mut plan) = self.buffer.pop_front() {
            let extra_time = plan.process_fan_speed_and_minimal_layer_time();
            writer.write_layer(&plan);
            if extra_time > 0.0 {
                writer.delay(extra_time);
            }
        }
    }

    fn prev_position(&self, layer_pos: usize, plan_idx: usize) -> Option<(usize, usize)> {
        if plan_idx > 0 {
            return Some((layer_pos, plan_idx - 1));
        }
        let mut lp = layer_pos;
        while lp > 0 {
            lp -= 1;
            let n = self.buffer[lp].extruder_plans.len();
            if n > 0 {
                return Some((lp, n - 1));
            }
        }
        None
    }

    /// Computes and records the required temperature for extruder plan
    /// `(layer_pos, plan_idx)`, then places a `TemperatureInsert` in
    /// whichever earlier plan gives the heater just enough lead time,
    /// per §4.H.
    fn schedule_preheat(&mut self, layer_pos: usize, plan_idx: usize) {
        let (extruder, avg_flow) = {
            let ep = &self.buffer[layer_pos].extruder_plans[plan_idx];
            let material = ep.estimate_material_mm3();
            if material <= 0.0 {
                return;
            }
            let (extrude_time, _) = ep.estimate_time();
            (ep.extruder, if extrude_time > 0.0 { material / extrude_time } else { 0.0 })
        };
        let target_temp = self.preheat_table.required_temperature(extruder, avg_flow);
        self.buffer[layer_pos].extruder_plans[plan_idx].required_start_temperature = Some(target_temp);

        let Some((pl, pi)) = self.prev_position(layer_pos, plan_idx) else {
            return;
        };
        let prev_extruder = self.buffer[pl].extruder_plans[pi].extruder;

        if prev_extruder == extruder {
            let prev_duration = plan_duration(&self.buffer[pl].extruder_plans[pi]);
            self.buffer[pl].extruder_plans[pi].pending_temperature_inserts.push(TemperatureInsert {
                time_before_end: prev_duration / 2.0,
                temperature: target_temp,
                wait: false,
            });
            return;
        }

        let standby = self.preheat_table.get(extruder).standby_temperature;
        let heat_time = self.preheat_table.heatup_seconds(extruder, standby, target_temp);

        let mut cumulative = 0.0;
        let mut cursor = Some((pl, pi));
        let mut placed = false;
        while let Some((cl, ci)) = cursor {
            let duration = plan_duration(&self.buffer[cl].extruder_plans[ci]);
            if cumulative + duration >= heat_time {
                let time_before_end = (heat_time - cumulative).max(0.0);
                self.buffer[cl].extruder_plans[ci].pending_temperature_inserts.push(TemperatureInsert {
                    time_before_end,
                    temperature: target_temp,
                    wait: true,
                });
                placed = true;
                break;
            }
            cumulative += duration;
            cursor = self.prev_position(cl, ci);
        }
        if !placed {
            if let Some(first_layer) = self.buffer.front_mut() {
                if let Some(first_plan) = first_layer.extruder_plans.first_mut() {
                    let duration = plan_duration(first_plan);
                    first_plan.pending_temperature_inserts.push(TemperatureInsert { time_before_end: duration, temperature: target_temp, wait: true });
                }
            }
        }

        let outgoing_standby = self.preheat_table.get(prev_extruder).standby_temperature;
        self.buffer[pl].extruder_plans[pi].prev_extruder_standby_temperature = Some(outgoing_standby);
    }
}

#[cfg(test)]
struct RecordingWriter {
    layers_written: usize,
}

#[cfg(test)]
impl Writer for RecordingWriter {
    fn write_layer(&mut self, _plan: &LayerPlan) {
        self.layers_written += 1;
    }
}

#[cfg(test)]
fn test_wall_cfg() -> crate::storage::GCodePathConfig {
    use crate::storage::PathKind;
    crate::storage::GCodePathConfig { kind: PathKind::OuterWall, speed: 60.0, acceleration: 1000.0, jerk: 10.0, line_width: 400, layer_height: 200, flow: 1.0, label: "wall" }
}

#[test]
fn flush_happens_only_past_the_preheat_horizon() {
    use crate::geometry::Polygons;
    use crate::settings::{LayerSettings, RetractionConfig};
    use crate::storage::{LayerIndex, SliceDataStorage};
    use crate::units::Point;

    let storage = SliceDataStorage { retraction_config: vec![RetractionConfig::default()], ..Default::default() };
    let mut buffer = LayerPlanBuffer::new(2, PreheatTable::new(vec![Preheat::default()]));
    let mut writer = RecordingWriter { layers_written: 0 };

    for i in 0..3 {
        let mut plan = LayerPlan::new(&storage, LayerIndex(i), 200 * (i as i64 + 1), 200, LayerSettings::default(), None, Polygons::empty());
        plan.set_extruder(ExtruderIndex(0), i == 0).unwrap();
        plan.add_extrusion_move(Point::new(1000, 0), &test_wall_cfg(), 1.0, false, 1.0, None);
        buffer.push(plan, &mut writer);
    }
    assert_eq!(writer.layers_written, 1);
    buffer.finish(&mut writer);
    assert_eq!(writer.layers_written, 3);
}

#[test]
fn same_extruder_reuse_splits_the_preceding_plan_in_half() {
    use crate::geometry::Polygons;
    use crate::settings::{LayerSettings, RetractionConfig};
    use crate::storage::{LayerIndex, SliceDataStorage};
    use crate::units::Point;

    let storage = SliceDataStorage { retraction_config: vec![RetractionConfig::default()], ..Default::default() };
    let mut buffer = LayerPlanBuffer::new(3, PreheatTable::new(vec![Preheat::default()]));
    let mut writer = RecordingWriter { layers_written: 0 };

    let mut first = LayerPlan::new(&storage, LayerIndex(0), 200, 200, LayerSettings::default(), None, Polygons::empty());
    first.set_extruder(ExtruderIndex(0), true).unwrap();
    first.add_extrusion_move(Point::new(1000, 0), &test_wall_cfg(), 1.0, false, 1.0, None);
    buffer.push(first, &mut writer);

    let mut second = LayerPlan::new(&storage, LayerIndex(1), 400, 200, LayerSettings::default(), None, Polygons::empty());
    second.set_extruder(ExtruderIndex(0), false).unwrap();
    second.add_extrusion_move(Point::new(1000, 0), &test_wall_cfg(), 1.0, false, 1.0, None);
    buffer.push(second, &mut writer);

    let first_plan = &buffer.buffer[0].extruder_plans[0];
    assert_eq!(first_plan.pending_temperature_inserts.len(), 1);
    assert!(!first_plan.pending_temperature_inserts[0].wait);
}
