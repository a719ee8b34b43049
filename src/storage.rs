//! The data model of the core that is shared state rather than behaviour:
//! `SliceLayerPart`, `SliceMeshStorage`, `SliceDataStorage`,
//! `GCodePathConfig`, and the arena index types that replace the aliased
//! mutable references the teacher's `Slice`/`Object` pair relies on (see
//! the REDESIGN FLAGS in `spec.md` §9). `LayerPlan` borrows from
//! `SliceDataStorage` read-only; nothing here is mutated once wall
//! computation for a layer has finished.

use serde::{Deserialize, Serialize};

use crate::geometry::Polygons;
use crate::settings::{LayerSettings, RetractionConfig};
use crate::units::{Coord64, Flow, Speed};
use crate::walls::{Inset, VariableWidthLine};

/// Index into `SliceDataStorage::meshes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MeshIndex(pub usize);

/// Index into `SliceMeshStorage::layers`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LayerIndex(pub usize);

/// Index into `SliceLayer::parts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartIndex(pub usize);

/// Index of a physical extruder, shared across every mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct ExtruderIndex(pub usize);

/// Tagged print-feature kind, replacing virtual dispatch on a config base
/// class with a flat enum indexing a configuration table ("dynamic
/// dispatch on print-feature type" redesign flag).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathKind {
    OuterWall,
    InnerWall,
    Skin,
    Infill,
    Support,
    Travel,
    Bridge(Box<PathKind>),
}

impl PathKind {
    pub fn is_travel(&self) -> bool {
        matches!(self, PathKind::Travel)
    }

    pub fn is_bridge(&self) -> bool {
        matches!(self, PathKind::Bridge(_))
    }

    pub fn bridge_of(inner: PathKind) -> PathKind {
        PathKind::Bridge(Box::new(inner))
    }
}

/// Printing parameters for one kind of path. Looked up by `PathKind`
/// rather than owned per-path, so many paths of the same kind share one
/// `GCodePathConfig` by reference.
#[derive(Debug, Clone, PartialEq)]
pub struct GCodePathConfig {
    pub kind: PathKind,
    pub speed: Speed,
    pub acceleration: f64,
    pub jerk: f64,
    pub line_width: Coord64,
    pub layer_height: Coord64,
    pub flow: Flow,
    pub label: &'static str,
}

impl GCodePathConfig {
    pub fn is_travel(&self) -> bool {
        self.kind.is_travel()
    }

    pub fn is_bridge(&self) -> bool {
        self.kind.is_bridge()
    }
}

/// A flat table of configs indexed by the print-feature kinds a layer
/// actually uses. Mirrors the teacher's per-`TraceType` settings lookup
/// (`update_state` in `move.rs`) but as data rather than a match arm tied
/// to emission.
#[derive(Debug, Clone, Default)]
pub struct PathConfigTable {
    configs: Vec<GCodePathConfig>,
}

impl PathConfigTable {
    pub fn new() -> Self {
        Self { configs: Vec::new() }
    }

    pub fn insert(&mut self, config: GCodePathConfig) -> usize {
        self.configs.push(config);
        self.configs.len() - 1
    }

    pub fn get(&self, handle: usize) -> &GCodePathConfig {
        &self.configs[handle]
    }
}

/// One connected filled region of a layer: an outer loop plus its holes,
/// the walls computed from it, and the area left for infill.
///
/// Invariant: `outline.polygons[0]` is the sole outer loop; every
/// subsequent polygon is a hole with opposite winding. For `insets[i]`
/// with `i > 0`, every loop lies inside the union of `insets[i-1]`
/// offset by exactly that depth's line width (enforced by
/// `walls::generate_insets`, not re-checked here).
#[derive(Debug, Clone, Default)]
pub struct SliceLayerPart {
    pub outline: Polygons,
    pub insets: Vec<Inset>,
    pub inner_area: Polygons,
    pub perimeter_gaps: Polygons,
    pub skin_parts: Polygons,
    pub infill_area: Polygons,
    pub wall_toolpaths: Vec<VariableWidthLine>,
}

impl SliceLayerPart {
    pub fn outer_wall(&self) -> Option<&Inset> {
        self.insets.first()
    }
}

/// One layer of one mesh: a z-height, a thickness, and the parts the
/// slicer front end produced plus the walls this core computed for them.
#[derive(Debug, Clone, Default)]
pub struct SliceLayer {
    pub z: Coord64,
    pub thickness: Coord64,
    pub parts: Vec<SliceLayerPart>,
}

/// All layers of one mesh plus the settings effective for it. Destroyed
/// at the end of the slice along with its layers.
#[derive(Debug, Clone, Default)]
pub struct SliceMeshStorage {
    pub layers: Vec<SliceLayer>,
    pub settings: LayerSettings,
    pub extruder: ExtruderIndex,
}

/// A set of mesh storages plus the cross-mesh state the layer plan reads:
/// support areas, the raft outline, the prime-tower region, and per-
/// extruder retraction/travel configuration. Read-only during wall
/// writing and layer planning; only the wall computer (component C)
/// mutates the `SliceLayerPart`s it owns before that point.
#[derive(Debug, Clone, Default)]
pub struct SliceDataStorage {
    pub meshes: Vec<SliceMeshStorage>,
    pub support_areas: Vec<Polygons>,
    pub raft_outline: Polygons,
    pub prime_tower_region: Polygons,
    pub retraction_config: Vec<RetractionConfig>,
}

impl SliceDataStorage {
    pub fn layer_count(&self) -> usize {
        self.meshes.iter().map(|m| m.layers.len()).max().unwrap_or(0)
    }

    pub fn retraction_config_for(&self, extruder: ExtruderIndex) -> &RetractionConfig {
        self.retraction_config
            .get(extruder.0)
            .unwrap_or_else(|| &self.retraction_config[0])
    }

    /// Union of every mesh part's outline on `layer`, used to build the
    /// comber's "outside" boundary.
    pub fn combined_outline_at(&self, layer: LayerIndex) -> Polygons {
        let mut combined = Polygons::empty();
        for mesh in &self.meshes {
            if let Some(l) = mesh.layers.get(layer.0) {
                for part in &l.parts {
                    combined = combined.union(&part.outline);
                }
            }
        }
        combined
    }
}

#[test]
fn path_kind_bridge_wraps_the_kind_it_replaces() {
    let bridge = PathKind::bridge_of(PathKind::OuterWall);
    assert!(bridge.is_bridge());
    assert!(!bridge.is_travel());
}

#[test]
fn combined_outline_unions_every_part_on_a_layer() {
    use crate::geometry::Polygon;
    use crate::units::Point;
    let square = |x0: i64, y0: i64, x1: i64, y1: i64| {
        Polygons::new(vec![Polygon::new(vec![
            Point::new(x0, y0),
            Point::new(x1, y0),
            Point::new(x1, y1),
            Point::new(x0, y1),
        ])])
    };
    let mut storage = SliceDataStorage::default();
    let mut mesh = SliceMeshStorage::default();
    mesh.layers.push(SliceLayer {
        z: 200,
        thickness: 200,
        parts: vec![
            SliceLayerPart { outline: square(0, 0, 1000, 1000), ..Default::default() },
            SliceLayerPart { outline: square(5000, 0, 6000, 1000), ..Default::default() },
        ],
    });
    storage.meshes.push(mesh);
    let combined = storage.combined_outline_at(LayerIndex(0));
    assert_eq!(combined.polygons.len(), 2);
}
