//! Visibility and LOD
//!
//! Visibility normally arrives from the host through
//! [`InstanceRegistry::set_visible`]. Hosts without their own culling can
//! hand a [`CameraView`] with a frustum to [`cull_instances`] instead.
//! LOD levels are chosen from the camera distance for visible instances only.

use glam::{Mat4, Vec3};
use horde_core::bounds::Frustum;

use crate::registry::InstanceRegistry;

/// Camera state used for culling and LOD selection.
#[derive(Debug, Clone, Copy, Default)]
pub struct CameraView {
    pub position: Vec3,
    pub frustum: Option<Frustum>,
}

impl CameraView {
    #[must_use]
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            frustum: None,
        }
    }

    /// Camera at `position` culling against `view_projection`.
    #[must_use]
    pub fn with_view_projection(position: Vec3, view_projection: Mat4) -> Self {
        Self {
            position,
            frustum: Some(Frustum::from_matrix(view_projection)),
        }
    }
}

/// Highest level whose start distance is `<= distance`.
#[must_use]
pub fn select_lod(start_distances: impl IntoIterator<Item = f32>, distance: f32) -> usize {
    let mut chosen = 0;
    for (i, d) in start_distances.into_iter().enumerate() {
        if distance >= d {
            chosen = i;
        } else {
            break;
        }
    }
    chosen
}

/// Updates every instance's visible flag from the view frustum.
///
/// Does nothing when the view carries no frustum.
pub fn cull_instances(registry: &mut InstanceRegistry, view: &CameraView) {
    let Some(frustum) = view.frustum else {
        return;
    };

    let verdicts: Vec<_> = registry
        .iter()
        .map(|(id, instance)| (id, frustum.intersects_sphere(instance.bounding_sphere())))
        .collect();

    for (id, visible) in verdicts {
        registry.set_visible(id, visible);
    }
}

/// Picks the LOD level of every visible instance.
pub fn update_lods(registry: &mut InstanceRegistry, camera_position: Vec3) {
    for (_, instance) in registry.iter_mut() {
        if !instance.visible {
            continue;
        }
        let distance = instance.sphere.distance_to(camera_position);
        instance.lod = select_lod(instance.prototype.lod_distances(), distance);
    }
}
