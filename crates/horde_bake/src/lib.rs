//! Offline animation baking.
//!
//! Turns an actor's skeletal animation into an [`AnimationAsset`]:
//!
//! 1. [`bone_merger`] collapses the sub-mesh skeletons into one bone array
//! 2. [`graph`] flattens the animation state machine into a clip queue
//! 3. [`session`] samples every clip one frame per tick, using [`skin`]
//! 4. [`packer`] sizes the bone textures and places every clip
//!
//! The host engine plugs in through the traits in [`rig`].
//!
//! [`AnimationAsset`]: horde_assets::AnimationAsset

pub mod bone_merger;
pub mod graph;
pub mod packer;
pub mod rig;
pub mod session;
pub mod skin;

pub use bone_merger::{MergedSkeleton, append_extra_bones, merge_bones};
pub use graph::{
    AnimState, BakeJob, ClipSelection, ClipSummary, Motion, SourceClip, StateMachine, StatePath,
    Transition, available_clips, flatten, total_frames,
};
pub use packer::{AtlasPlan, ClipPlacement, block_capacity, place, plan};
pub use rig::{ActorPrefab, Animator, BakeRig, SkinnedMeshSource};
pub use session::{BakeSession, BakeState, BakeStep, bake_to_file};
pub use skin::calculate_skin_matrices;
