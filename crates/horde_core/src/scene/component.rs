use serde::{Deserialize, Serialize};

/// Marks a scene node as an instanced actor.
///
/// Prefabs carry this component so the baker can find them and the runtime
/// knows which prototype and animation asset to bind on spawn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstancingComponent {
    /// Name of the registered actor prototype (mesh + material LODs).
    pub prototype: String,
    /// Name of the animation asset produced for this actor.
    pub animation: String,
    /// Playback speed multiplier.
    pub speed: f32,
    /// Drive the node transform from the baked root motion.
    pub apply_root_motion: bool,
    /// Clip started on spawn. `None` picks the first clip of the asset.
    pub default_clip: Option<String>,
    /// Culling sphere radius around the node's world position.
    pub bounding_radius: f32,
}

impl Default for InstancingComponent {
    fn default() -> Self {
        Self {
            prototype: String::new(),
            animation: String::new(),
            speed: 1.0,
            apply_root_motion: false,
            default_clip: None,
            bounding_radius: 1.0,
        }
    }
}

impl InstancingComponent {
    #[must_use]
    pub fn new(prototype: impl Into<String>, animation: impl Into<String>) -> Self {
        Self {
            prototype: prototype.into(),
            animation: animation.into(),
            ..Default::default()
        }
    }
}
