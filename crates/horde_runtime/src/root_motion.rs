//! Root motion integration.
//!
//! Baked clips carry per-frame root velocity (units/s) and angular velocity
//! (degrees/s). Every tick the two samples around the current fractional
//! frame are blended and integrated over `dt`. The rotation is applied
//! first; the displacement is then expressed in the new local rotation.

use glam::{EulerRot, Quat, Vec3};
use horde_assets::clip::AnimationClipInfo;
use horde_core::scene::{NodeHandle, SceneGraph};

/// Position and rotation after one root motion step.
///
/// Returns `None` when the clip has no root motion or `frame` sits on the
/// last recorded frame.
#[must_use]
pub fn root_motion_step(
    clip: &AnimationClipInfo,
    frame: f32,
    dt: f32,
    position: Vec3,
    rotation: Quat,
) -> Option<(Vec3, Quat)> {
    if !clip.root_motion || frame < 0.0 {
        return None;
    }

    let pre = frame.floor();
    let pre_index = pre as usize;
    let next_index = pre_index + 1;
    if next_index >= clip.total_frames as usize {
        return None;
    }

    let t = frame - pre;
    let (v0, w0) = clip.root_motion_at(pre_index)?;
    let (v1, w1) = clip.root_motion_at(next_index)?;
    let velocity = v0.lerp(v1, t);
    let angular = (w0.lerp(w1, t) * dt).map(f32::to_radians);

    let rotation = rotation * Quat::from_euler(EulerRot::YXZ, angular.y, angular.x, angular.z);
    let position = position + rotation * (velocity * dt);

    Some((position, rotation))
}

/// Moves `node` by one root motion step. Returns `true` if it moved.
pub fn apply_root_motion(
    scene: &mut SceneGraph,
    node: NodeHandle,
    clip: &AnimationClipInfo,
    frame: f32,
    dt: f32,
) -> bool {
    let Some(n) = scene.get(node) else {
        return false;
    };
    let (position, rotation) = (n.transform.position, n.transform.rotation);

    match root_motion_step(clip, frame, dt, position, rotation) {
        Some((position, rotation)) => {
            scene.set_local_position_rotation(node, position, rotation);
            true
        }
        None => false,
    }
}
