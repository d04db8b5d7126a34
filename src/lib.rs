//! # Horde
//!
//! Baked GPU animation textures and batched instanced rendering for large
//! crowds of skinned actors.
//!
//! Skeletal animation is sampled offline into textures of bone matrices.
//! At runtime every actor only supplies a world matrix and three frame
//! scalars, so thousands of them can share a handful of instanced draws.
//!
//! | Crate | Role |
//! |-------|------|
//! | [`core`] | errors, settings, scene graph, culling volumes |
//! | [`assets`] | clip metadata, the bone texture atlas, the binary format |
//! | [`bake`] | bone merging, skin matrices, atlas packing, the bake session |
//! | [`runtime`] | playback, root motion, culling, batching, draw submission |
//!
//! ```rust,ignore
//! use horde::prelude::*;
//!
//! // Offline
//! let asset = bake_to_file(&mut prefab, &ClipSelection::all(&machine), &BakeSettings::default(), "soldier.anim")?;
//!
//! // Runtime
//! let mut ctx = InstancingContext::new(InstancingSettings::default());
//! ctx.load_animation("soldier", asset);
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub use horde_assets as assets;
pub use horde_bake as bake;
pub use horde_core as core;
pub use horde_runtime as runtime;

pub use horde_core::errors::{ErrorCategory, HordeError, Result};

/// The types most hosts need.
pub mod prelude {
    pub use horde_assets::{AnimationAsset, AnimationClipInfo, AnimationEvent, WrapMode};
    pub use horde_bake::{
        ActorPrefab, Animator, BakeRig, BakeSession, BakeStep, ClipSelection, StateMachine,
        bake_to_file,
    };
    pub use horde_core::{
        BakeSettings, HordeError, InstancingComponent, InstancingSettings, NodeHandle, Result,
        SceneGraph,
    };
    pub use horde_runtime::{
        ActorPrototype, CameraView, DrawBackend, InstanceId, InstancingContext, MaterialId, MeshId,
        MeshRenderer,
    };
}
