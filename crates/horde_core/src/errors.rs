//! Error Types
//!
//! This module defines the error types used throughout Horde.
//!
//! # Overview
//!
//! The main error type [`HordeError`] covers all failure modes including:
//! - Authoring problems found while preparing a bake (missing components,
//!   empty skeletons, degenerate bind poses)
//! - Atlas capacity failures
//! - Asset decoding and I/O errors
//! - Runtime instance initialization failures
//!
//! # Usage
//!
//! All public APIs return [`Result<T>`] which is an alias for `std::result::Result<T, HordeError>`.
//!
//! ```rust,ignore
//! use horde_core::errors::{HordeError, Result};
//!
//! fn load_asset() -> Result<()> {
//!     // Operations that may fail return Result
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Coarse classification of a [`HordeError`].
///
/// Hosts use this to decide how to report a failure: authoring and capacity
/// errors are shown to the artist, format errors point at a broken file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authoring,
    Capacity,
    Format,
    Initialization,
}

/// The main error type for Horde.
#[derive(Error, Debug)]
pub enum HordeError {
    // ========================================================================
    // Authoring Errors
    // ========================================================================
    /// The actor has no animation state machine to walk.
    #[error("Actor '{0}' has no animation state machine")]
    MissingStateMachine(String),

    /// The actor has no instancing component attached.
    #[error("Actor '{0}' has no instancing component")]
    MissingInstancingComponent(String),

    /// The merged skeleton contains no bones.
    #[error("Actor '{0}' has no skinned bones to bake")]
    EmptySkeleton(String),

    /// A bind pose matrix cannot be inverted.
    #[error("Bind pose of bone slot {slot} has a zero determinant")]
    DegenerateBindPose {
        /// Bone slot owning the bad matrix
        slot: usize,
    },

    /// No clip survived selection.
    #[error("No animation clip is selected for baking")]
    NothingToBake,

    /// An attachment referenced a bone the asset does not expose.
    #[error("Attachment bone '{0}' is not an exposed extra bone")]
    UnknownAttachmentBone(String),

    // ========================================================================
    // Capacity Errors
    // ========================================================================
    /// A single clip does not fit into one maximal atlas texture.
    #[error(
        "Clip #{clip} needs {frames} frames but a {texture_size}x{texture_size} texture holds only {capacity}"
    )]
    ClipExceedsTexture {
        /// Index of the clip in packing order
        clip: usize,
        /// Frames requested by the clip
        frames: u32,
        /// Edge length of the largest texture
        texture_size: u32,
        /// Frame blocks that fit into that texture
        capacity: u32,
    },

    // ========================================================================
    // Format & I/O Errors
    // ========================================================================
    /// File I/O error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// The animation asset bytes are malformed.
    #[error("Invalid animation asset: {0}")]
    InvalidAsset(String),

    /// JSON parsing error (settings files).
    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    // ========================================================================
    // Runtime Errors
    // ========================================================================
    /// An instance could not be brought up.
    #[error("Instance initialization failed: {0}")]
    InstanceInit(String),

    /// No animation asset was registered under this name.
    #[error("Animation asset not found: {0}")]
    AssetNotFound(String),

    /// The requested clip does not exist in the asset.
    #[error("Animation clip not found: {0}")]
    ClipNotFound(String),
}

impl HordeError {
    /// Returns the coarse category of this error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::MissingStateMachine(_)
            | Self::MissingInstancingComponent(_)
            | Self::EmptySkeleton(_)
            | Self::DegenerateBindPose { .. }
            | Self::NothingToBake
            | Self::UnknownAttachmentBone(_) => ErrorCategory::Authoring,
            Self::ClipExceedsTexture { .. } => ErrorCategory::Capacity,
            Self::IoError(_) | Self::InvalidAsset(_) | Self::JsonError(_) => ErrorCategory::Format,
            Self::InstanceInit(_) | Self::AssetNotFound(_) | Self::ClipNotFound(_) => {
                ErrorCategory::Initialization
            }
        }
    }
}

/// Alias for `Result<T, HordeError>`.
pub type Result<T> = std::result::Result<T, HordeError>;
