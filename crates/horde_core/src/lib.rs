//! Horde core types.
//!
//! Shared by the baker and the runtime: the error type, settings, the minimal
//! scene graph both sides operate on, and culling volumes.

pub mod bounds;
pub mod errors;
pub mod scene;
pub mod settings;

pub use bounds::{BoundingSphere, Frustum};
pub use errors::{ErrorCategory, HordeError, Result};
pub use scene::{InstancingComponent, Node, NodeHandle, SceneGraph, Transform};
pub use settings::{BakeSettings, InstancingSettings};
