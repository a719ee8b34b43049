//! Per-layer planning and motion-scheduling core of an FFF slicer.
//!
//! Converts a watertight mesh's per-layer outlines into an ordered sequence
//! of toolhead moves: wall/inset computation (component C), path/order and
//! seam optimization (component B), inset ordering (component D), combed
//! travel (component E), the per-layer plan of extrusion and travel paths
//! with retraction/coasting/bridging (components F and G), the sliding
//! buffer that schedules preheat and minimum-layer-time slowdown
//! (component H), and the prime-tower/ooze-shield planner (component I).
//!
//! Mesh I/O and triangle slicing, infill/support generation, g-code text
//! emission, settings *loading*, and skirt/brim/raft generation are named
//! collaborators, not implemented here (see `writer` for the contracts
//! this crate drives).

pub mod comb;
pub mod error;
pub mod geometry;
pub mod inset_order;
pub mod layer_plan;
pub mod layer_plan_buffer;
pub mod order;
pub mod pipeline;
pub mod prime_tower;
pub mod settings;
pub mod storage;
pub mod units;
pub mod wall_writer;
pub mod walls;
pub mod writer;

pub use error::{CombFail, GeometryError, SlicerErrors, SlicerWarnings};
pub use layer_plan::{ExtruderPlan, GCodePath, LayerPlan};
pub use layer_plan_buffer::{LayerPlanBuffer, Preheat, PreheatTable};
pub use storage::{ExtruderIndex, GCodePathConfig, LayerIndex, PathKind, SliceDataStorage, SliceLayerPart};
