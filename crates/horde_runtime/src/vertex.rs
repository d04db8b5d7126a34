//! Skinning vertex attributes.
//!
//! The instancing shader reads four bone slots and four weights per vertex.
//! Unused weights carry [`UNUSED_WEIGHT`] so the shader can stop early.

use glam::{Mat4, Vec3, Vec4};

/// Weight marking an unused influence.
pub const UNUSED_WEIGHT: f32 = -0.1;

/// Up to four bone influences of one vertex, as authored.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoneWeight {
    pub indices: [u32; 4],
    pub weights: [f32; 4],
}

/// Per-vertex attributes in merged skeleton slot space.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SkinVertexData {
    pub bone_indices: Vec<Vec4>,
    pub weights: Vec<Vec4>,
}

impl SkinVertexData {
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

/// Maps a sub-mesh's own bone list onto merged skeleton slots by name.
///
/// Returns `None` when the lists are identical and no remap is needed.
/// Unmatched bones fall back to slot 0.
#[must_use]
pub fn bone_remap(mesh_bones: &[String], skeleton: &[String]) -> Option<Vec<u32>> {
    if mesh_bones == skeleton {
        return None;
    }

    let remap = mesh_bones
        .iter()
        .map(|name| {
            skeleton.iter().position(|s| s == name).map_or_else(
                || {
                    log::warn!("Bone '{name}' is not part of the merged skeleton");
                    0
                },
                |slot| slot as u32,
            )
        })
        .collect();
    Some(remap)
}

/// Builds shader attributes from authored weights.
///
/// With fewer than four `bones_per_vertex`, the leading weights are
/// renormalized to sum to one and the rest are marked unused.
#[must_use]
pub fn build_skin_vertices(
    weights: &[BoneWeight],
    remap: Option<&[u32]>,
    bones_per_vertex: usize,
) -> SkinVertexData {
    let used = bones_per_vertex.clamp(1, 4);
    let mut data = SkinVertexData {
        bone_indices: Vec::with_capacity(weights.len()),
        weights: Vec::with_capacity(weights.len()),
    };

    for bw in weights {
        debug_assert!(bw.weights[0] > 0.0, "vertex without a primary bone weight");

        let slots = bw.indices.map(|i| match remap {
            Some(remap) => remap.get(i as usize).copied().unwrap_or(0),
            None => i,
        });

        let mut w = bw.weights;
        if used < 4 {
            let sum: f32 = w[..used].iter().sum();
            let rate = if sum > 0.0 { 1.0 / sum } else { 0.0 };
            for (k, weight) in w.iter_mut().enumerate() {
                *weight = if k < used { *weight * rate } else { UNUSED_WEIGHT };
            }
            if used == 1 {
                w[0] = 1.0;
            }
        }

        data.bone_indices
            .push(Vec4::from_array(slots.map(|s| s as f32)));
        data.weights.push(Vec4::from_array(w));
    }

    data
}

/// Rigidly binds an attachment mesh to one bone slot.
///
/// Vertices are moved from the bone's space into mesh space through the
/// inverse bind pose (rotation and translation only) and fully weighted to
/// `bone_slot`.
pub fn bind_rigid_attachment(
    positions: &mut [Vec3],
    bind_pose: Mat4,
    bone_slot: u32,
) -> SkinVertexData {
    let (_, rotation, translation) = bind_pose.inverse().to_scale_rotation_translation();
    for p in positions.iter_mut() {
        *p = rotation * *p + translation;
    }

    let count = positions.len();
    SkinVertexData {
        bone_indices: vec![Vec4::new(bone_slot as f32, 0.0, 0.0, 0.0); count],
        weights: vec![Vec4::new(1.0, UNUSED_WEIGHT, UNUSED_WEIGHT, UNUSED_WEIGHT); count],
    }
}
