//! Error and warning kinds. Pure-geometry conditions (`Empty`, `NoFit`,
//! `CombFail`) are recovered locally by the component that raises them —
//! they are ordinary `Result` values threaded through the call, not part of
//! the fatal-error path. `SlicerErrors` is reserved for conditions that
//! abort the whole slice: bad configuration, or a logic invariant broken
//! badly enough that continuing would silently corrupt the plan.

use thiserror::Error;

use crate::units::Coord64;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SlicerErrors {
    #[error("missing setting `{key}`")]
    MissingSetting { key: String },

    #[error("setting `{key}` has the wrong type: expected {expected}")]
    BadSettingType { key: String, expected: &'static str },

    #[error("setting `{setting}` must be greater than zero, was {value}")]
    SettingLessThanOrEqualToZero { setting: String, value: f64 },

    #[error("setting `{setting}` must not be negative, was {value}")]
    SettingLessThanZero { setting: String, value: f64 },

    #[error(
        "extruder {extruder} was already used in layer {layer}: inset-order optimization bug"
    )]
    ExtruderReused { layer: usize, extruder: usize },

    #[error(
        "spiralize run straddles an extruder-plan boundary on layer {layer} (started at path {started_at_path})"
    )]
    SpiralizeBroken { layer: usize, started_at_path: usize },
}

/// Pure-geometry failure: the operation is well-defined but this particular
/// input can't satisfy it. Recovered locally; never surfaced to a
/// caller outside the owning component.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryError {
    #[error("polygon operation received an empty polygon where one was required")]
    Empty,
    #[error("no polygon within the search radius to move the point inside of")]
    NoFit,
}

/// The comber could not find an in-material path under the active policy.
/// Callers fall back to straight travel with forced retraction.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("combing failed: no in-material route from ({from_x},{from_y}) to ({to_x},{to_y})")]
pub struct CombFail {
    pub from_x: Coord64,
    pub from_y: Coord64,
    pub to_x: Coord64,
    pub to_y: Coord64,
}

/// Non-fatal conditions: logged, with the offending geometry dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum SlicerWarnings {
    DegeneratePolygon { vertex_count: usize, layer: usize },
    InsetEmptyAfterOffset { layer: usize, part: usize, inset_index: usize },
}

impl std::fmt::Display for SlicerWarnings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SlicerWarnings::DegeneratePolygon { vertex_count, layer } => write!(
                f,
                "dropped a polygon with only {vertex_count} vertices on layer {layer}"
            ),
            SlicerWarnings::InsetEmptyAfterOffset { layer, part, inset_index } => write!(
                f,
                "inset {inset_index} of part {part} on layer {layer} vanished after offsetting"
            ),
        }
    }
}

/// Logs a warning identifying the layer, then drops the geometry and
/// moves on.
pub fn warn(warning: SlicerWarnings) {
    log::warn!("{warning}");
}

/// Logs a structured message before a fatal error unwinds the slice.
pub fn log_fatal(err: &SlicerErrors) {
    log::error!("fatal slicer error, discarding slice: {err}");
}
