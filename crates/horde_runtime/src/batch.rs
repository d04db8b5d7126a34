//! Batch Manager
//!
//! Groups visible instances that share a mesh, a material set and a bone
//! texture into fixed-capacity [`InstancingPackage`]s. Each non-empty package
//! becomes one instanced draw per sub-mesh.
//!
//! # Package lifetime
//!
//! Packages live in a [`PackageArena`] of slabs. For every [`BatchKey`] the
//! manager keeps an ordered chain of packages and a cursor into it:
//!
//! ```text
//! key ──► [pkg 0: 200/200] [pkg 1: 200/200] [pkg 2: 37/200]
//!                                              ▲ cursor
//! ```
//!
//! A full package moves the cursor on; the next package is created lazily
//! the first time it is needed. After submission every fill count goes back
//! to zero and the cursor to the first package, so steady-state frames
//! allocate nothing. Released keys hand their slabs to a free list.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::AnimationId;
use crate::playback::FrameScalars;
use crate::prototype::{MaterialId, MaterialSet, MeshId};

/// Per-instance record uploaded to the GPU.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InstanceData {
    /// Column-major world matrix.
    pub world_matrix: [[f32; 4]; 4],
    pub frame_index: f32,
    pub prev_frame_index: f32,
    pub transition_progress: f32,
    pub _padding: f32,
}

impl InstanceData {
    #[must_use]
    pub fn new(world_matrix: glam::Mat4, scalars: FrameScalars) -> Self {
        Self {
            world_matrix: world_matrix.to_cols_array_2d(),
            frame_index: scalars.frame_index,
            prev_frame_index: scalars.prev_frame_index,
            transition_progress: scalars.transition_progress,
            _padding: 0.0,
        }
    }
}

/// Bone texture parameters every package material carries.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BoneTextureUniforms {
    pub texture_width: u32,
    pub texture_height: u32,
    pub block_width: u32,
    pub block_height: u32,
}

/// A per-package copy of one sub-mesh material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageMaterial {
    /// The material this copy was made from.
    pub source: MaterialId,
    /// Animation asset whose atlas is bound.
    pub animation: AnimationId,
    /// Texture within that atlas.
    pub texture_index: u32,
    pub uniforms: BoneTextureUniforms,
    /// Instancing variant of the shader.
    pub instancing: bool,
}

/// Instances sharing this key can be drawn together.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BatchKey {
    pub mesh: MeshId,
    pub materials: MaterialSet,
    pub animation: AnimationId,
    pub texture_index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageIndex(pub u32);

/// A capacity-bounded batch: one instanced draw per sub-mesh.
#[derive(Debug, Clone)]
pub struct InstancingPackage {
    key: BatchKey,
    materials: SmallVec<[PackageMaterial; 4]>,
    instances: Vec<InstanceData>,
    fill: usize,
}

impl InstancingPackage {
    fn new(key: BatchKey, capacity: usize, uniforms: BoneTextureUniforms, instancing: bool) -> Self {
        let materials = key
            .materials
            .iter()
            .map(|&source| PackageMaterial {
                source,
                animation: key.animation,
                texture_index: key.texture_index,
                uniforms,
                instancing,
            })
            .collect();

        Self {
            key,
            materials,
            instances: vec![bytemuck::Zeroable::zeroed(); capacity],
            fill: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn key(&self) -> &BatchKey {
        &self.key
    }

    #[inline]
    #[must_use]
    pub fn materials(&self) -> &[PackageMaterial] {
        &self.materials
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.instances.len()
    }

    #[inline]
    #[must_use]
    pub fn fill(&self) -> usize {
        self.fill
    }

    #[inline]
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.fill >= self.instances.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fill == 0
    }

    /// Filled slots only.
    #[inline]
    #[must_use]
    pub fn instances(&self) -> &[InstanceData] {
        &self.instances[..self.fill]
    }

    /// Filled slots as raw bytes, ready for a vertex buffer upload.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.instances())
    }

    fn push(&mut self, data: InstanceData) -> bool {
        match self.instances.get_mut(self.fill) {
            Some(slot) => {
                *slot = data;
                self.fill += 1;
                true
            }
            None => false,
        }
    }

    fn reset(&mut self) {
        self.fill = 0;
    }
}

/// Slab storage for packages with index recycling.
#[derive(Debug, Default)]
pub struct PackageArena {
    slabs: Vec<Option<InstancingPackage>>,
    free: Vec<u32>,
}

impl PackageArena {
    pub fn insert(&mut self, package: InstancingPackage) -> PackageIndex {
        if let Some(index) = self.free.pop() {
            self.slabs[index as usize] = Some(package);
            PackageIndex(index)
        } else {
            self.slabs.push(Some(package));
            PackageIndex(self.slabs.len() as u32 - 1)
        }
    }

    pub fn release(&mut self, index: PackageIndex) -> Option<InstancingPackage> {
        let package = self.slabs.get_mut(index.0 as usize)?.take()?;
        self.free.push(index.0);
        Some(package)
    }

    #[must_use]
    pub fn get(&self, index: PackageIndex) -> Option<&InstancingPackage> {
        let package = self.slabs.get(index.0 as usize);
        debug_assert!(package.is_some(), "package index {} out of bounds", index.0);
        package?.as_ref()
    }

    pub fn get_mut(&mut self, index: PackageIndex) -> Option<&mut InstancingPackage> {
        let package = self.slabs.get_mut(index.0 as usize);
        debug_assert!(package.is_some(), "package index {} out of bounds", index.0);
        package?.as_mut()
    }

    /// Live packages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slabs.len() - self.free.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Allocated slabs, live or free.
    #[must_use]
    pub fn slab_count(&self) -> usize {
        self.slabs.len()
    }
}

#[derive(Debug, Default)]
struct PackageChain {
    packages: SmallVec<[PackageIndex; 4]>,
    cursor: usize,
}

#[derive(Debug)]
pub struct BatchManager {
    capacity: usize,
    instancing: bool,
    arena: PackageArena,
    chains: FxHashMap<BatchKey, PackageChain>,
}

impl BatchManager {
    /// `capacity` instances per package; `instancing` selects the shader
    /// variant of package materials.
    #[must_use]
    pub fn new(capacity: usize, instancing: bool) -> Self {
        Self {
            capacity: capacity.max(1),
            instancing,
            arena: PackageArena::default(),
            chains: FxHashMap::default(),
        }
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    #[must_use]
    pub fn uses_instancing(&self) -> bool {
        self.instancing
    }

    /// Switches package capacity and shader variant.
    ///
    /// Existing packages were built for the old mode, so all of them are
    /// released. Returns the number released.
    pub fn reconfigure(&mut self, capacity: usize, instancing: bool) -> usize {
        let capacity = capacity.max(1);
        if capacity == self.capacity && instancing == self.instancing {
            return 0;
        }
        self.capacity = capacity;
        self.instancing = instancing;
        let released = self.release_where(|_| true);
        log::info!(
            "Batch mode changed (capacity {capacity}, instancing {instancing}), released {released} package(s)"
        );
        released
    }

    /// Appends one instance to the current package of `key`.
    pub fn append(&mut self, key: &BatchKey, uniforms: BoneTextureUniforms, data: InstanceData) {
        let Self {
            capacity,
            instancing,
            arena,
            chains,
        } = self;

        if !chains.contains_key(key) {
            chains.insert(key.clone(), PackageChain::default());
        }
        let Some(chain) = chains.get_mut(key) else {
            return;
        };

        let current_full = chain
            .packages
            .get(chain.cursor)
            .and_then(|&index| arena.get(index))
            .is_some_and(InstancingPackage::is_full);
        if current_full {
            chain.cursor += 1;
        }

        let index = if let Some(&index) = chain.packages.get(chain.cursor) {
            index
        } else {
            let package = InstancingPackage::new(key.clone(), *capacity, uniforms, *instancing);
            let index = arena.insert(package);
            chain.packages.push(index);
            chain.cursor = chain.packages.len() - 1;
            log::debug!(
                "New instancing package #{} for mesh {:?} (texture {})",
                chain.packages.len(),
                key.mesh,
                key.texture_index
            );
            index
        };

        if let Some(package) = arena.get_mut(index) {
            let pushed = package.push(data);
            debug_assert!(pushed, "package {} overflowed", index.0);
        }
    }

    /// Non-empty packages in key chain order.
    pub fn filled_packages(&self) -> impl Iterator<Item = &InstancingPackage> {
        self.chains
            .values()
            .flat_map(|chain| chain.packages.iter())
            .filter_map(|&index| self.arena.get(index))
            .filter(|p| !p.is_empty())
    }

    /// Every package of `key`, filled or not, in chain order.
    #[must_use]
    pub fn packages_for(&self, key: &BatchKey) -> Vec<&InstancingPackage> {
        self.chains.get(key).map_or_else(Vec::new, |chain| {
            chain
                .packages
                .iter()
                .filter_map(|&index| self.arena.get(index))
                .collect()
        })
    }

    /// Resets fill counts and cursors after submission.
    pub fn finish_frame(&mut self) {
        for chain in self.chains.values_mut() {
            for &index in &chain.packages {
                if let Some(package) = self.arena.get_mut(index) {
                    package.reset();
                }
            }
            chain.cursor = 0;
        }
    }

    /// Drops every package of `key`, returning its slabs to the free list.
    pub fn release_key(&mut self, key: &BatchKey) -> usize {
        let Some(chain) = self.chains.remove(key) else {
            return 0;
        };
        for &index in &chain.packages {
            self.arena.release(index);
        }
        chain.packages.len()
    }

    /// Releases every key matching `predicate`.
    pub fn release_where(&mut self, mut predicate: impl FnMut(&BatchKey) -> bool) -> usize {
        let keys: Vec<BatchKey> = self.chains.keys().filter(|k| predicate(k)).cloned().collect();
        keys.iter().map(|k| self.release_key(k)).sum()
    }

    /// Live packages across all keys.
    #[must_use]
    pub fn package_count(&self) -> usize {
        self.arena.len()
    }

    #[must_use]
    pub fn arena(&self) -> &PackageArena {
        &self.arena
    }
}
