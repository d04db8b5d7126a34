//! Bake & Instancing Settings
//!
//! Configuration for the two halves of Horde:
//!
//! - [`BakeSettings`] controls how clips are sampled and which texture sizes
//!   the atlas packer may choose from.
//! - [`InstancingSettings`] controls the runtime batch packages and whether
//!   hardware instancing is used at all.
//!
//! Both are plain data with sensible defaults and can be loaded from JSON.
//! Missing fields fall back to their defaults; out-of-range values are clamped.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use horde_core::settings::{BakeSettings, InstancingSettings};
//!
//! // Default: 15 fps sampling, 64..1024 texture ladder
//! let bake = BakeSettings::default();
//!
//! // Devices without instancing support draw every actor on its own
//! let runtime = InstancingSettings {
//!     use_instancing: false,
//!     ..Default::default()
//! };
//!
//! let from_disk = BakeSettings::from_json_str(r#"{ "fps": 30 }"#)?;
//! ```

use log::warn;
use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// Lowest accepted sampling rate.
pub const MIN_BAKE_FPS: u32 = 1;
/// Highest accepted sampling rate.
pub const MAX_BAKE_FPS: u32 = 120;

/// Power-of-two texture edge lengths the atlas packer may use, smallest first.
pub const DEFAULT_TEXTURE_SIZES: [u32; 5] = [64, 128, 256, 512, 1024];

/// Number of instances one instanced draw can carry.
pub const DEFAULT_PACKAGE_CAPACITY: usize = 200;

// ---------------------------------------------------------------------------
// BakeSettings
// ---------------------------------------------------------------------------

/// Offline bake configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BakeSettings {
    /// Sampling rate in frames per second.
    pub fps: u32,
    /// Texture size ladder, ascending. The last entry is the maximal size.
    pub texture_sizes: Vec<u32>,
    /// Records per-frame velocity / angular velocity for every clip.
    pub record_root_motion: bool,
}

impl Default for BakeSettings {
    fn default() -> Self {
        Self {
            fps: 15,
            texture_sizes: DEFAULT_TEXTURE_SIZES.to_vec(),
            record_root_motion: true,
        }
    }
}

impl BakeSettings {
    /// Parses settings from JSON and sanitizes them.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let mut settings: Self = serde_json::from_str(json)?;
        settings.sanitize();
        Ok(settings)
    }

    /// Clamps values into their valid ranges.
    ///
    /// An empty or unsorted ladder is replaced/sorted; zero sizes are dropped.
    pub fn sanitize(&mut self) {
        let clamped = self.fps.clamp(MIN_BAKE_FPS, MAX_BAKE_FPS);
        if clamped != self.fps {
            warn!("Bake fps {} out of range, clamped to {clamped}", self.fps);
            self.fps = clamped;
        }

        self.texture_sizes.retain(|&s| s > 0);
        if self.texture_sizes.is_empty() {
            warn!("Empty texture size ladder, using the default ladder");
            self.texture_sizes = DEFAULT_TEXTURE_SIZES.to_vec();
        }
        self.texture_sizes.sort_unstable();
        self.texture_sizes.dedup();
    }

    /// The largest texture edge length in the ladder.
    #[inline]
    #[must_use]
    pub fn max_texture_size(&self) -> u32 {
        self.texture_sizes
            .last()
            .copied()
            .unwrap_or(DEFAULT_TEXTURE_SIZES[DEFAULT_TEXTURE_SIZES.len() - 1])
    }
}

// ---------------------------------------------------------------------------
// InstancingSettings
// ---------------------------------------------------------------------------

/// Runtime instancing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstancingSettings {
    /// Maximum number of instances per package (one instanced draw).
    pub package_capacity: usize,
    /// When `false`, every actor is drawn on its own with a private material.
    pub use_instancing: bool,
    /// Expected instance count, used to pre-size internal arrays.
    pub max_instances_hint: usize,
}

impl Default for InstancingSettings {
    fn default() -> Self {
        Self {
            package_capacity: DEFAULT_PACKAGE_CAPACITY,
            use_instancing: true,
            max_instances_hint: 1000,
        }
    }
}

impl InstancingSettings {
    /// Parses settings from JSON and sanitizes them.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let mut settings: Self = serde_json::from_str(json)?;
        settings.sanitize();
        Ok(settings)
    }

    pub fn sanitize(&mut self) {
        if self.package_capacity == 0 {
            warn!("Package capacity of 0 is invalid, using {DEFAULT_PACKAGE_CAPACITY}");
            self.package_capacity = DEFAULT_PACKAGE_CAPACITY;
        }
    }

    /// Capacity actually used for packages.
    ///
    /// Without instancing every package holds exactly one actor.
    #[inline]
    #[must_use]
    pub fn effective_capacity(&self) -> usize {
        if self.use_instancing {
            self.package_capacity
        } else {
            1
        }
    }
}
