use glam::{Affine3A, Mat4};
use horde_core::scene::{NodeHandle, SceneGraph};

/// Computes the skin matrix of every bone slot for the current pose.
///
/// Each matrix maps mesh space into the space of the skeleton's topmost
/// ancestor: `inverse(root world) * bone world * bind pose`. World matrices
/// are composed from the live local transforms, so the animator does not
/// need to flush the scene first.
///
/// Returns `None` for an empty skeleton or when a bone node is missing.
#[must_use]
pub fn calculate_skin_matrices(
    scene: &SceneGraph,
    bones: &[NodeHandle],
    bind_poses: &[Mat4],
) -> Option<Vec<Mat4>> {
    let &first = bones.first()?;
    let root = scene.root_ancestor(first)?;
    let root_inv = scene.compose_world_matrix(root)?.inverse();

    bones
        .iter()
        .zip(bind_poses)
        .map(|(&bone, bind_pose)| {
            let world: Affine3A = scene.compose_world_matrix(bone)?;
            Some(Mat4::from(root_inv * world) * *bind_pose)
        })
        .collect()
}
