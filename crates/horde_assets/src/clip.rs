//! Clip metadata produced by the baker and consumed by the runtime.

use glam::{Mat4, Vec3};
use xxhash_rust::xxh3::xxh3_64;

/// Stable 32-bit hash of a clip name.
///
/// The hash is not stored in asset files; it is recomputed on load.
#[inline]
#[must_use]
pub fn clip_name_hash(name: &str) -> i32 {
    xxh3_64(name.as_bytes()) as i32
}

/// How playback behaves when it reaches the end of a clip.
///
/// Discriminants are the on-disk values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum WrapMode {
    #[default]
    Default = 0,
    Once = 1,
    Loop = 2,
    PingPong = 4,
    ClampForever = 8,
}

impl WrapMode {
    #[must_use]
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Default),
            1 => Some(Self::Once),
            2 => Some(Self::Loop),
            4 => Some(Self::PingPong),
            8 => Some(Self::ClampForever),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

/// A script callback keyed to a point in a clip.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnimationEvent {
    pub function: String,
    pub float_parameter: f32,
    pub int_parameter: i32,
    pub string_parameter: String,
    /// Seconds from the start of the clip.
    pub time: f32,
    pub object_parameter_name: String,
}

impl AnimationEvent {
    #[must_use]
    pub fn new(function: impl Into<String>, time: f32) -> Self {
        Self {
            function: function.into(),
            time,
            ..Default::default()
        }
    }

    /// The fractional frame at which this event fires.
    #[inline]
    #[must_use]
    pub fn frame(&self, fps: u32) -> f32 {
        self.time * fps as f32
    }
}

/// Everything the runtime needs to know about one baked clip.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationClipInfo {
    pub name: String,
    pub name_hash: i32,
    /// First frame block of the clip inside its texture.
    pub animation_index: u32,
    pub texture_index: u32,
    pub total_frames: u32,
    pub fps: u32,
    pub root_motion: bool,
    pub wrap_mode: WrapMode,
    /// Per-frame root velocity (units/s). Empty unless `root_motion`.
    pub velocity: Vec<Vec3>,
    /// Per-frame root angular velocity (degrees/s). Empty unless `root_motion`.
    pub angular_velocity: Vec<Vec3>,
    pub events: Vec<AnimationEvent>,
}

impl AnimationClipInfo {
    #[must_use]
    pub fn new(name: impl Into<String>, total_frames: u32, fps: u32) -> Self {
        let name = name.into();
        Self {
            name_hash: clip_name_hash(&name),
            name,
            animation_index: 0,
            texture_index: 0,
            total_frames,
            fps,
            root_motion: false,
            wrap_mode: WrapMode::Default,
            velocity: Vec::new(),
            angular_velocity: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Clip length in seconds as sampled.
    #[must_use]
    pub fn length(&self) -> f32 {
        if self.fps == 0 || self.total_frames <= 1 {
            0.0
        } else {
            (self.total_frames - 1) as f32 / self.fps as f32
        }
    }

    #[inline]
    #[must_use]
    pub fn last_frame(&self) -> f32 {
        self.total_frames.saturating_sub(1) as f32
    }

    /// Velocity and angular velocity at frame `index`, if recorded.
    #[must_use]
    pub fn root_motion_at(&self, index: usize) -> Option<(Vec3, Vec3)> {
        if !self.root_motion {
            return None;
        }
        Some((
            *self.velocity.get(index)?,
            *self.angular_velocity.get(index)?,
        ))
    }
}

/// Named non-skeleton bone slots appended after the merged skeleton.
///
/// Attachments (weapons, props) bind to these by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtraBones {
    pub names: Vec<String>,
    pub bind_poses: Vec<Mat4>,
}

impl ExtraBones {
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Index of the named extra bone within this list.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}
