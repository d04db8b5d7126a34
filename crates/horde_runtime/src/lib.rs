//! Horde runtime.
//!
//! Plays baked animation assets on large numbers of actors and batches them
//! into capacity-bounded instanced draws.
//!
//! # Frame flow
//!
//! ```text
//! InstanceRegistry::tick      root motion, playback, events, culling spheres
//!        │
//! culling                     frustum / host visibility, LOD selection
//!        │
//! BatchManager::append        world matrix + frame scalars per visible actor
//!        │
//! submit                      one draw per sub-mesh per package, reset fills
//! ```
//!
//! [`InstancingContext`] wires these together; every stage is also usable on
//! its own.

pub mod batch;
pub mod context;
pub mod culling;
pub mod playback;
pub mod prototype;
pub mod registry;
pub mod root_motion;
pub mod submit;
pub mod vertex;

slotmap::new_key_type! {
    /// A registered runtime instance.
    pub struct InstanceId;
    /// A loaded animation asset.
    pub struct AnimationId;
}

pub use batch::{
    BatchKey, BatchManager, BoneTextureUniforms, InstanceData, InstancingPackage, PackageArena,
    PackageIndex, PackageMaterial,
};
pub use context::InstancingContext;
pub use culling::{CameraView, cull_instances, select_lod, update_lods};
pub use playback::{FrameScalars, Playback};
pub use prototype::{ActorPrototype, LodLevel, MaterialId, MaterialSet, MeshId, MeshRenderer};
pub use registry::{FiredEvent, InstanceRegistry, RuntimeInstance};
pub use root_motion::{apply_root_motion, root_motion_step};
pub use submit::{DrawBackend, SubmitStats, submit};
pub use vertex::{BoneWeight, SkinVertexData, bind_rigid_attachment, bone_remap, build_skin_vertices};
