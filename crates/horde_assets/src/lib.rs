//! Baked animation assets.
//!
//! - [`clip`]: per-clip metadata, events, wrap modes and extra bones
//! - [`atlas`]: the RGBA16F bone-matrix texture atlas
//! - [`format`]: the binary asset reader and writer

pub mod atlas;
pub mod clip;
pub mod format;

pub use atlas::{AnimationTextureAtlas, BLOCK_WIDTH, BoneTexture, TEXEL_BYTES, frame_pixel_coords};
pub use clip::{AnimationClipInfo, AnimationEvent, ExtraBones, WrapMode, clip_name_hash};
pub use format::{AnimationAsset, AssetReader, AssetWriter};
