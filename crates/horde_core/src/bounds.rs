//! Culling volumes: bounding spheres and view frustums.

use glam::{Mat4, Vec3, Vec4};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl BoundingSphere {
    #[must_use]
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Distance from the sphere's center to `point`.
    #[inline]
    #[must_use]
    pub fn distance_to(&self, point: Vec3) -> f32 {
        self.center.distance(point)
    }
}

/// Six clip planes extracted from a view-projection matrix.
#[derive(Debug, Clone, Copy, Default)]
pub struct Frustum {
    planes: [Vec4; 6], // Left, Right, Bottom, Top, Near, Far
}

impl Frustum {
    /// Gribb-Hartmann plane extraction for a `[0, 1]` depth range.
    #[must_use]
    pub fn from_matrix(m: Mat4) -> Self {
        let rows = [m.row(0), m.row(1), m.row(2), m.row(3)];

        let mut planes = [
            rows[3] + rows[0],
            rows[3] - rows[0],
            rows[3] + rows[1],
            rows[3] - rows[1],
            rows[2],
            rows[3] - rows[2],
        ];

        for plane in &mut planes {
            let length = plane.truncate().length();
            if length > f32::EPSILON {
                *plane /= length;
            }
        }

        Self { planes }
    }

    #[must_use]
    pub fn intersects_sphere(&self, sphere: &BoundingSphere) -> bool {
        let center = sphere.center.extend(1.0);
        self.planes
            .iter()
            .all(|plane| plane.dot(center) >= -sphere.radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera_frustum() -> Frustum {
        let proj = Mat4::perspective_rh(60f32.to_radians(), 1.0, 0.1, 100.0);
        let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        Frustum::from_matrix(proj * view)
    }

    #[test]
    fn sphere_in_front_is_visible() {
        let f = camera_frustum();
        assert!(f.intersects_sphere(&BoundingSphere::new(Vec3::new(0.0, 0.0, -10.0), 1.0)));
    }

    #[test]
    fn sphere_behind_is_culled() {
        let f = camera_frustum();
        assert!(!f.intersects_sphere(&BoundingSphere::new(Vec3::new(0.0, 0.0, 10.0), 1.0)));
        assert!(!f.intersects_sphere(&BoundingSphere::new(Vec3::new(0.0, 0.0, -200.0), 1.0)));
    }

    #[test]
    fn sphere_straddling_plane_is_visible() {
        let f = camera_frustum();
        // Just outside the left plane at z = -10 but the radius reaches in.
        let half_width = 10.0 * 30f32.to_radians().tan();
        let s = BoundingSphere::new(Vec3::new(-half_width - 0.5, 0.0, -10.0), 1.0);
        assert!(f.intersects_sphere(&s));
    }
}
