//! Bone Merger
//!
//! Collapses the bone lists of an actor's skinned sub-meshes into one
//! canonical skeleton. Bone slots are assigned in first-seen order; a bone
//! shared by several sub-meshes keeps its first slot but takes the bind pose
//! of the last sub-mesh that lists it.

use glam::Mat4;
use horde_assets::clip::ExtraBones;
use horde_core::errors::{HordeError, Result};
use horde_core::scene::{NodeHandle, SceneGraph};
use rustc_hash::FxHashMap;

use crate::rig::SkinnedMeshSource;

/// The merged skeleton: bone slots and their bind poses, index-aligned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedSkeleton {
    pub bones: Vec<NodeHandle>,
    pub bind_poses: Vec<Mat4>,
}

impl MergedSkeleton {
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bones.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    /// Reports the first bind pose that cannot be inverted.
    pub fn validate(&self) -> Result<()> {
        match self.bind_poses.iter().position(|m| m.determinant() == 0.0) {
            Some(slot) => Err(HordeError::DegenerateBindPose { slot }),
            None => Ok(()),
        }
    }
}

/// Merges the sub-meshes' bones and disables their direct rendering.
pub fn merge_bones(meshes: &mut [SkinnedMeshSource]) -> MergedSkeleton {
    let mut merged = MergedSkeleton::default();
    let mut slots: FxHashMap<NodeHandle, usize> = FxHashMap::default();

    for mesh in meshes.iter_mut() {
        for (&bone, &bind_pose) in mesh.bones.iter().zip(&mesh.bind_poses) {
            debug_assert!(bind_pose.determinant() != 0.0, "The bind pose can't be a zero matrix");

            if let Some(&slot) = slots.get(&bone) {
                merged.bind_poses[slot] = bind_pose;
            } else {
                slots.insert(bone, merged.bones.len());
                merged.bones.push(bone);
                merged.bind_poses.push(bind_pose);
            }
        }
        if mesh.bones.len() != mesh.bind_poses.len() {
            log::warn!(
                "Sub-mesh '{}' has {} bones but {} bind poses",
                mesh.name,
                mesh.bones.len(),
                mesh.bind_poses.len()
            );
        }
        mesh.enabled = false;
    }

    merged
}

/// Appends named non-skeleton nodes as extra bone slots.
///
/// Each node's reference world matrix becomes its bind pose. Names not found
/// under `root` are skipped. Returns `None` when nothing was appended.
pub fn append_extra_bones(
    scene: &SceneGraph,
    root: NodeHandle,
    names: &[String],
    skeleton: &mut MergedSkeleton,
) -> Option<ExtraBones> {
    let mut extra = ExtraBones::default();

    for name in names {
        let Some(node) = scene.find_by_name(root, name) else {
            log::warn!("Attachment bone '{name}' not found, skipped");
            continue;
        };
        let Some(world) = scene.compose_world_matrix(node) else {
            continue;
        };
        let bind_pose = Mat4::from(world);

        skeleton.bones.push(node);
        skeleton.bind_poses.push(bind_pose);
        extra.names.push(name.clone());
        extra.bind_poses.push(bind_pose);
    }

    (!extra.is_empty()).then_some(extra)
}
