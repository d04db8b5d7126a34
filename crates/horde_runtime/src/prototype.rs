//! Actor prototypes: what an instanced actor draws at each level of detail.

use smallvec::SmallVec;

/// Host-side mesh identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub u32);

/// Host-side material identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub u32);

/// One material per sub-mesh, in sub-mesh order.
pub type MaterialSet = SmallVec<[MaterialId; 4]>;

/// A mesh together with the materials of its sub-meshes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshRenderer {
    pub mesh: MeshId,
    pub materials: MaterialSet,
}

impl MeshRenderer {
    #[must_use]
    pub fn new(mesh: MeshId, materials: impl IntoIterator<Item = MaterialId>) -> Self {
        Self {
            mesh,
            materials: materials.into_iter().collect(),
        }
    }

    #[inline]
    #[must_use]
    pub fn sub_mesh_count(&self) -> usize {
        self.materials.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LodLevel {
    /// Camera distance from which this level is used.
    pub start_distance: f32,
    pub renderers: Vec<MeshRenderer>,
}

/// The renderable description shared by every instance of an actor type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActorPrototype {
    pub name: String,
    /// Ordered by ascending `start_distance`; only `with_lod` inserts.
    lods: Vec<LodLevel>,
}

impl ActorPrototype {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lods: Vec::new(),
        }
    }

    /// Adds a level of detail, keeping levels sorted by start distance.
    #[must_use]
    pub fn with_lod(mut self, start_distance: f32, renderers: Vec<MeshRenderer>) -> Self {
        let at = self
            .lods
            .partition_point(|l| l.start_distance <= start_distance);
        self.lods.insert(
            at,
            LodLevel {
                start_distance,
                renderers,
            },
        );
        self
    }

    /// The requested level, or the coarsest one when `level` is out of range.
    #[must_use]
    pub fn lod(&self, level: usize) -> Option<&LodLevel> {
        self.lods.get(level).or_else(|| self.lods.last())
    }

    #[inline]
    #[must_use]
    pub fn lods(&self) -> &[LodLevel] {
        &self.lods
    }

    pub fn lod_distances(&self) -> impl Iterator<Item = f32> + '_ {
        self.lods.iter().map(|l| l.start_distance)
    }

    /// Every mesh drawn at any level.
    pub fn meshes(&self) -> impl Iterator<Item = MeshId> + '_ {
        self.lods.iter().flat_map(|l| &l.renderers).map(|r| r.mesh)
    }

    /// `true` if any level draws `mesh`.
    #[must_use]
    pub fn uses_mesh(&self, mesh: MeshId) -> bool {
        self.meshes().any(|m| m == mesh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lods_stay_sorted() {
        let body = MeshRenderer::new(MeshId(1), [MaterialId(10), MaterialId(11)]);
        let proxy = MeshRenderer::new(MeshId(2), [MaterialId(10)]);
        let p = ActorPrototype::new("soldier")
            .with_lod(30.0, vec![proxy.clone()])
            .with_lod(0.0, vec![body.clone()]);

        assert_eq!(p.lod_distances().collect::<Vec<_>>(), vec![0.0, 30.0]);
        assert_eq!(p.lod(0).unwrap().renderers[0], body);
        assert_eq!(p.lod(7).unwrap().renderers[0], proxy);
        assert_eq!(body.sub_mesh_count(), 2);
        assert!(p.uses_mesh(MeshId(2)));
        assert!(!p.uses_mesh(MeshId(3)));
        assert_eq!(p.meshes().collect::<Vec<_>>(), vec![MeshId(1), MeshId(2)]);
        assert_eq!(p.lods().len(), 2);
    }
}
