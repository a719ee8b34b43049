//! Settings: a string-keyed `get<T>(key) -> T` view for loosely-typed
//! mesh overrides, plus the strongly-typed `LayerSettings` table each
//! planning component actually reads from. Validation rejects
//! non-physical values before any planning component sees them.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};

use strum_macros::{EnumCount, EnumIter, EnumString};

use crate::error::SlicerErrors;
use crate::order::CornerPreference;
use crate::units::{Coord64, Flow, Speed};

macro_rules! setting_less_than_or_equal_to_zero {
    ($value:expr, $name:literal) => {{
        if ($value as f64) <= 0.0 {
            return Err(SlicerErrors::SettingLessThanOrEqualToZero {
                setting: $name.to_string(),
                value: $value as f64,
            });
        }
    }};
}

macro_rules! setting_less_than_zero {
    ($value:expr, $name:literal) => {{
        if ($value as f64) < 0.0 {
            return Err(SlicerErrors::SettingLessThanZero {
                setting: $name.to_string(),
                value: $value as f64,
            });
        }
    }};
}

/// A setting that may be disabled entirely (e.g. `retraction_wipe`,
/// `layer_shrink_amount`). Derefs to the inner value so call sites read
/// `settings.retraction_wipe.distance` regardless of whether it is enabled;
/// `is_enabled()` gates whether it should apply at all.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct OptionalSetting<T> {
    value: T,
    enabled: bool,
}

impl<T: Default> Default for OptionalSetting<T> {
    fn default() -> Self {
        OptionalSetting {
            value: T::default(),
            enabled: false,
        }
    }
}

impl<T> OptionalSetting<T> {
    pub fn enabled(value: T) -> Self {
        Self { value, enabled: true }
    }

    pub fn disabled(value: T) -> Self {
        Self { value, enabled: false }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl<T> Deref for OptionalSetting<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for OptionalSetting<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

/// Per print-feature values, indexed the way `MoveType`/`PathKind` indexes
/// a `GCodePathConfig` table ("dynamic dispatch on print-feature type"
/// redesign flag: a flat table instead of virtual dispatch).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct MovementParameter {
    pub outer_wall: f64,
    pub inner_wall: f64,
    pub infill: f64,
    pub solid_infill: f64,
    pub top_solid_infill: f64,
    pub bridge: f64,
    pub support: f64,
    pub travel: f64,
}

/// Retraction behaviour for one extruder.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct RetractionConfig {
    pub retract_length: f64,
    pub retract_speed: Speed,
    pub retraction_min_travel: Coord64,
    pub retraction_combing_max_distance: Coord64,
    pub retraction_count_max: u32,
    pub retraction_extrusion_window: f64,
    pub z_hop_height: Coord64,
    pub z_hop_enabled: bool,
}

impl Default for RetractionConfig {
    fn default() -> Self {
        Self {
            retract_length: 1.0,
            retract_speed: 40.0,
            retraction_min_travel: 1_500,
            retraction_combing_max_distance: 0,
            retraction_count_max: 20,
            retraction_extrusion_window: 10.0,
            z_hop_height: 0,
            z_hop_enabled: false,
        }
    }
}

/// Seam placement policy. `corner_preference` governs z-seam corner bias.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, EnumIter, EnumString, EnumCount)]
pub enum SeamType {
    Shortest,
    SharpestCorner,
    UserSpecified,
    Random,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct SeamConfig {
    pub seam_type: SeamType,
    pub corner_preference: CornerPreference,
    pub user_specified_point: Option<crate::units::Point>,
}

impl Default for SeamConfig {
    fn default() -> Self {
        Self {
            seam_type: SeamType::SharpestCorner,
            corner_preference: CornerPreference::Any,
            user_specified_point: None,
        }
    }
}

/// Settings effective for one layer after layer-range overrides are folded
/// in — the struct every planning component actually reads from.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct LayerSettings {
    pub layer_height: Coord64,
    pub extrusion_width: MovementParameter,
    pub speed: MovementParameter,
    pub acceleration: MovementParameter,
    pub flow: MovementParameter,

    pub wall_line_width_0: Coord64,
    pub wall_line_width_x: Coord64,
    pub wall_count: usize,
    pub inner_perimeters_first: bool,

    pub bridge_wall_min_length: Coord64,
    pub bridge_wall_coast: f64,
    pub bridge_speed: Speed,
    pub bridge_flow: Flow,

    pub coast_acceleration_segment_len: Coord64,
    pub coast_acceleration_factor: f64,
    pub max_non_bridge_line_volume: f64,

    pub retract_before_outer_wall: bool,
    pub wall_0_wipe_dist: Coord64,
    pub wall_x_wipe_dist: Coord64,

    pub fuzzy_skin_enabled: bool,
    pub fuzzy_skin_amplitude: Coord64,
    pub fuzzy_skin_point_distance: Coord64,

    pub max_resolution: Coord64,
    pub max_deviation: Coord64,
    pub max_travel_resolution: Coord64,

    pub combing_enabled: bool,
    pub travel_avoid_distance: Coord64,

    pub cool_min_layer_time: f64,
    pub cool_min_speed: Speed,
    pub fan_speed_min: f64,
    pub fan_speed_max: f64,
    pub fan_full_at_height: Coord64,
}

/// A key/value settings tree keyed by string names. Exists alongside
/// `LayerSettings` for the mesh-level overrides the typed struct doesn't
/// enumerate (arbitrary per-mesh extras passed through from the slicer
/// front end).
#[derive(Debug, Clone, Default)]
pub struct SettingsView {
    values: HashMap<String, serde_json::Value>,
}

pub trait FromSettingValue: Sized {
    const TYPE_NAME: &'static str;
    fn from_json(value: &serde_json::Value) -> Option<Self>;
}

impl FromSettingValue for bool {
    const TYPE_NAME: &'static str = "bool";
    fn from_json(value: &serde_json::Value) -> Option<Self> {
        value.as_bool()
    }
}

impl FromSettingValue for i64 {
    const TYPE_NAME: &'static str = "coord";
    fn from_json(value: &serde_json::Value) -> Option<Self> {
        value.as_i64()
    }
}

impl FromSettingValue for f64 {
    const TYPE_NAME: &'static str = "ratio";
    fn from_json(value: &serde_json::Value) -> Option<Self> {
        value.as_f64()
    }
}

impl FromSettingValue for String {
    const TYPE_NAME: &'static str = "string";
    fn from_json(value: &serde_json::Value) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl SettingsView {
    pub fn new(values: HashMap<String, serde_json::Value>) -> Self {
        Self { values }
    }

    /// Parses an hjson-formatted settings blob into the backing map, the
    /// same way the teacher's `Settings::load` reads its on-disk format
    /// with `deser_hjson::from_str`. Loading the file itself (path
    /// resolution, inheritance chains) is the slicer front end's job; this
    /// is only the text-to-map step the typed `get<T>` accessor sits on.
    pub fn from_hjson(text: &str) -> Result<Self, SlicerErrors> {
        let values: HashMap<String, serde_json::Value> =
            deser_hjson::from_str(text).map_err(|_| SlicerErrors::BadSettingType {
                key: "<settings document>".to_string(),
                expected: "hjson object",
            })?;
        Ok(Self::new(values))
    }

    /// Reads and type-checks one setting. `MissingSetting`/`BadSettingType`
    /// abort the slice; callers propagate with `?` rather than recovering.
    pub fn get<T: FromSettingValue>(&self, key: &str) -> Result<T, SlicerErrors> {
        let raw = self
            .values
            .get(key)
            .ok_or_else(|| SlicerErrors::MissingSetting { key: key.to_string() })?;
        T::from_json(raw).ok_or_else(|| SlicerErrors::BadSettingType {
            key: key.to_string(),
            expected: T::TYPE_NAME,
        })
    }
}

/// Rejects non-physical values before they reach any planning component.
pub fn validate_layer_settings(s: &LayerSettings) -> Result<(), SlicerErrors> {
    setting_less_than_or_equal_to_zero!(s.layer_height, "layer_height");
    setting_less_than_or_equal_to_zero!(s.wall_line_width_0, "wall_line_width_0");
    setting_less_than_or_equal_to_zero!(s.wall_line_width_x, "wall_line_width_x");
    setting_less_than_zero!(s.bridge_wall_coast, "bridge_wall_coast");
    setting_less_than_or_equal_to_zero!(s.cool_min_speed, "cool_min_speed");
    Ok(())
}

#[test]
fn rejects_nonpositive_layer_height() {
    let mut s = LayerSettings {
        wall_line_width_0: 400,
        wall_line_width_x: 400,
        cool_min_speed: 10.0,
        ..Default::default()
    };
    s.layer_height = 0;
    assert!(validate_layer_settings(&s).is_err());
}

#[test]
fn settings_view_type_mismatch_is_reported() {
    let mut map = HashMap::new();
    map.insert("wall_count".to_string(), serde_json::json!("three"));
    let view = SettingsView::new(map);
    let result: Result<i64, _> = view.get("wall_count");
    assert!(matches!(result, Err(SlicerErrors::BadSettingType { .. })));
}

#[test]
fn settings_view_missing_key_is_reported() {
    let view = SettingsView::new(HashMap::new());
    let result: Result<i64, _> = view.get("wall_count");
    assert!(matches!(result, Err(SlicerErrors::MissingSetting { .. })));
}

#[test]
fn settings_view_loads_from_hjson_text() {
    let view = SettingsView::from_hjson(
        r#"{
            wall_count: 3
            combing_enabled: true
        }"#,
    )
    .unwrap();
    let wall_count: i64 = view.get("wall_count").unwrap();
    let combing: bool = view.get("combing_enabled").unwrap();
    assert_eq!(wall_count, 3);
    assert!(combing);
}

#[test]
fn seam_type_round_trips_through_its_string_name() {
    use std::str::FromStr;
    assert!(matches!(SeamType::from_str("SharpestCorner"), Ok(SeamType::SharpestCorner)));
}
