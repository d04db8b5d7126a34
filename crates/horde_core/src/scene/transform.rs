use glam::{Affine3A, Quat, Vec3};

/// Local TRS of a scene node.
///
/// World matrices are never cached; [`SceneGraph::compose_world_matrix`]
/// walks the parent chain on demand, so edits are visible immediately.
///
/// [`SceneGraph::compose_world_matrix`]: super::SceneGraph::compose_world_matrix
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    #[must_use]
    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation,
            scale: Vec3::ONE,
        }
    }

    /// Root motion writes both at once.
    pub fn set_position_and_rotation(&mut self, position: Vec3, rotation: Quat) {
        self.position = position;
        self.rotation = rotation;
    }

    #[inline]
    #[must_use]
    pub fn local_matrix(&self) -> Affine3A {
        Affine3A::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}
