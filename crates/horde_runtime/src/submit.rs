//! Draw Submitter
//!
//! Turns the frame's filled packages into draw calls on a host
//! [`DrawBackend`]: one instanced draw per sub-mesh per package, or one
//! direct draw per actor when the backend cannot instance. Direct draws get
//! a private, non-instancing copy of the package material.

use crate::batch::{BatchManager, InstanceData, PackageMaterial};
use crate::prototype::MeshId;

/// The host renderer.
pub trait DrawBackend {
    /// Whether [`draw_instanced`](Self::draw_instanced) is available.
    fn supports_instancing(&self) -> bool {
        true
    }

    /// Draws `instances.len()` copies of one sub-mesh.
    fn draw_instanced(
        &mut self,
        mesh: MeshId,
        sub_mesh: usize,
        material: &PackageMaterial,
        instances: &[InstanceData],
    );

    /// Draws a single actor with its own frame scalars.
    fn draw_direct(
        &mut self,
        mesh: MeshId,
        sub_mesh: usize,
        material: &PackageMaterial,
        instance: &InstanceData,
    );
}

/// What one submission produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmitStats {
    pub draw_calls: usize,
    pub packages: usize,
    pub instances: usize,
}

/// Submits every filled package, then resets the packages for the next frame.
pub fn submit(batches: &mut BatchManager, backend: &mut dyn DrawBackend) -> SubmitStats {
    let instanced = batches.uses_instancing() && backend.supports_instancing();
    let mut stats = SubmitStats::default();

    for package in batches.filled_packages() {
        let mesh = package.key().mesh;
        let instances = package.instances();
        stats.packages += 1;
        stats.instances += instances.len();

        for (sub_mesh, material) in package.materials().iter().enumerate() {
            if instanced {
                backend.draw_instanced(mesh, sub_mesh, material, instances);
                stats.draw_calls += 1;
            } else {
                for instance in instances {
                    let private = PackageMaterial {
                        instancing: false,
                        ..*material
                    };
                    backend.draw_direct(mesh, sub_mesh, &private, instance);
                    stats.draw_calls += 1;
                }
            }
        }
    }

    batches.finish_frame();
    log::trace!(
        "Submitted {} instances in {} packages with {} draw calls",
        stats.instances,
        stats.packages,
        stats.draw_calls
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AnimationId;
    use crate::batch::{BatchKey, BoneTextureUniforms};
    use crate::playback::FrameScalars;
    use crate::prototype::MaterialId;
    use glam::Mat4;
    use slotmap::SlotMap;

    #[derive(Default)]
    struct Recorder {
        no_instancing: bool,
        instanced: Vec<(MeshId, usize, usize)>,
        direct: Vec<(MeshId, usize, f32)>,
        direct_instancing_flags: Vec<bool>,
    }

    impl DrawBackend for Recorder {
        fn supports_instancing(&self) -> bool {
            !self.no_instancing
        }

        fn draw_instanced(
            &mut self,
            mesh: MeshId,
            sub_mesh: usize,
            _material: &PackageMaterial,
            instances: &[InstanceData],
        ) {
            self.instanced.push((mesh, sub_mesh, instances.len()));
        }

        fn draw_direct(
            &mut self,
            mesh: MeshId,
            sub_mesh: usize,
            material: &PackageMaterial,
            instance: &InstanceData,
        ) {
            self.direct.push((mesh, sub_mesh, instance.frame_index));
            self.direct_instancing_flags.push(material.instancing);
        }
    }

    fn fill(batches: &mut BatchManager, count: usize) {
        let mut animations: SlotMap<AnimationId, ()> = SlotMap::with_key();
        let key = BatchKey {
            mesh: MeshId(7),
            materials: [MaterialId(1), MaterialId(2)].into_iter().collect(),
            animation: animations.insert(()),
            texture_index: 0,
        };
        for i in 0..count {
            let scalars = FrameScalars {
                frame_index: i as f32,
                prev_frame_index: -1.0,
                transition_progress: 0.0,
            };
            batches.append(
                &key,
                BoneTextureUniforms::default(),
                InstanceData::new(Mat4::IDENTITY, scalars),
            );
        }
    }

    #[test]
    fn one_instanced_draw_per_sub_mesh_per_package() {
        let mut batches = BatchManager::new(200, true);
        fill(&mut batches, 250);

        let mut backend = Recorder::default();
        let stats = submit(&mut batches, &mut backend);

        assert_eq!(stats.packages, 2);
        assert_eq!(stats.instances, 250);
        assert_eq!(stats.draw_calls, 4);
        let mut counts: Vec<_> = backend.instanced.iter().map(|d| d.2).collect();
        counts.sort_unstable();
        assert_eq!(counts, vec![50, 50, 200, 200]);

        // Fills were reset.
        let stats = submit(&mut batches, &mut backend);
        assert_eq!(stats, SubmitStats::default());
    }

    #[test]
    fn direct_draws_without_instancing() {
        let mut batches = BatchManager::new(1, false);
        fill(&mut batches, 3);

        let mut backend = Recorder {
            no_instancing: true,
            ..Default::default()
        };
        let stats = submit(&mut batches, &mut backend);

        assert_eq!(stats.draw_calls, 6);
        assert!(backend.instanced.is_empty());
        assert_eq!(backend.direct.len(), 6);
    }

    #[test]
    fn instanced_packages_fall_back_to_private_direct_draws() {
        let mut batches = BatchManager::new(200, true);
        fill(&mut batches, 3);

        let mut backend = Recorder {
            no_instancing: true,
            ..Default::default()
        };
        let stats = submit(&mut batches, &mut backend);

        assert_eq!(stats.draw_calls, 6);
        assert!(backend.instanced.is_empty());
        let frames: Vec<f32> = backend.direct.iter().map(|d| d.2).collect();
        assert_eq!(frames, vec![0.0, 1.0, 2.0, 0.0, 1.0, 2.0]);
        assert!(backend.direct_instancing_flags.iter().all(|&f| !f));
    }
}
