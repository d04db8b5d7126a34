//! Host seam for baking.
//!
//! Horde does not evaluate animation itself. The host engine provides an
//! [`ActorPrefab`] that can spawn a private baking copy of the actor, and an
//! [`Animator`] that poses that copy's bones in its own [`SceneGraph`].

use glam::{Mat4, Vec3};
use horde_core::Result;
use horde_core::scene::{NodeHandle, SceneGraph};

use crate::graph::StateMachine;

/// Drives the pose of a baking instance.
pub trait Animator {
    /// The scene holding the instance's bone nodes.
    fn scene(&self) -> &SceneGraph;

    fn set_active(&mut self, active: bool);

    /// Jumps to the state with the given name hash.
    fn play(&mut self, state_hash: i32);

    /// Advances playback by `dt` seconds and writes the new bone poses.
    fn update(&mut self, dt: f32);

    /// Root velocity of the current pose, units per second.
    fn velocity(&self) -> Vec3;

    /// Root angular velocity of the current pose, radians per second.
    fn angular_velocity(&self) -> Vec3;

    /// Puts the instance root back at the origin with identity rotation.
    fn reset_root(&mut self);
}

/// One skinned sub-mesh of an actor: its bone list and matching bind poses.
#[derive(Debug, Clone)]
pub struct SkinnedMeshSource {
    pub name: String,
    pub bones: Vec<NodeHandle>,
    pub bind_poses: Vec<Mat4>,
    /// Whether the host still renders this sub-mesh with its own skinning.
    pub enabled: bool,
}

/// A private, fully instantiated copy of an actor used only for baking.
pub struct BakeRig<A: Animator> {
    pub animator: A,
    /// Root node of the instance inside `animator.scene()`.
    pub root: NodeHandle,
    pub skinned_meshes: Vec<SkinnedMeshSource>,
}

/// An authored actor the baker can walk and instantiate.
pub trait ActorPrefab {
    type Animator: Animator;

    fn name(&self) -> &str;

    fn has_instancing_component(&self) -> bool;

    fn state_machine(&self) -> Option<&StateMachine>;

    fn state_machine_mut(&mut self) -> Option<&mut StateMachine>;

    /// Spawns a baking copy in its reference pose.
    fn instantiate(&self) -> Result<BakeRig<Self::Animator>>;
}
