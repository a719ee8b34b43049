//! Top-level per-slice driving function. Ties components A–I together the
//! way the teacher's `pub fn slice` in `lib.rs` drove its tower/slicing/
//! plotter passes: a parallel phase across meshes and layers (component C,
//! wall generation — pure per-part geometry with no shared mutable state),
//! then the strictly single-threaded per-layer planning pass of §5.
//!
//! Mesh slicing into outlines (the slicer front end) has already happened
//! by the time `compute_walls` runs — `SliceDataStorage` arrives with
//! `SliceLayerPart::outline` populated and every other field default.

use rayon::iter::{IntoParallelRefMutIterator, ParallelIterator};

use crate::settings::LayerSettings;
use crate::storage::SliceDataStorage;
use crate::walls;

/// Runs component C over every part of every layer of every mesh in
/// `storage`, in parallel across meshes (mirrors the teacher's
/// `slicing::slice`, which slices each tower's layers with `par_iter()`).
/// Each part's wall computation reads only its own outline and writes only
/// its own fields, so no synchronization is needed beyond the barrier at
/// the end of this phase — layer planning (component F) afterward is
/// strictly sequential per §5.
pub fn compute_walls(storage: &mut SliceDataStorage) {
    storage.meshes.par_iter_mut().for_each(|mesh| {
        let settings = mesh.settings.clone();
        mesh.layers.par_iter_mut().for_each(|layer| {
            for part in &mut layer.parts {
                let result = generate_walls_for_part(&part.outline, &settings);
                part.insets = result.insets;
                part.inner_area = result.inner_area;
                part.perimeter_gaps = result.perimeter_gaps;
                part.wall_toolpaths = result.wall_toolpaths;
            }
        });
    });
}

fn generate_walls_for_part(outline: &crate::geometry::Polygons, settings: &LayerSettings) -> walls::WallResult {
    walls::generate_insets(
        outline,
        settings.wall_line_width_0,
        settings.wall_line_width_x,
        settings.wall_count,
        settings.max_resolution,
        settings.max_deviation,
    )
}

#[test]
fn compute_walls_populates_every_part_in_parallel() {
    use crate::geometry::{Polygon, Polygons};
    use crate::storage::{SliceLayer, SliceLayerPart, SliceMeshStorage};
    use crate::units::Point;

    let square = Polygons::new(vec![Polygon::new(vec![
        Point::new(0, 0),
        Point::new(20_000, 0),
        Point::new(20_000, 20_000),
        Point::new(0, 20_000),
    ])]);

    let mut settings = LayerSettings::default();
    settings.wall_line_width_0 = 400;
    settings.wall_line_width_x = 400;
    settings.wall_count = 2;
    settings.max_resolution = 25;
    settings.max_deviation = 5;

    let mut storage = SliceDataStorage::default();
    let mut mesh = SliceMeshStorage { settings, ..Default::default() };
    mesh.layers.push(SliceLayer {
        z: 200,
        thickness: 200,
        parts: vec![SliceLayerPart { outline: square, ..Default::default() }],
    });
    storage.meshes.push(mesh);

    compute_walls(&mut storage);

    let part = &storage.meshes[0].layers[0].parts[0];
    assert_eq!(part.insets.len(), 2);
    assert!(!part.inner_area.is_empty());
}
