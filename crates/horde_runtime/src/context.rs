//! Instancing Context
//!
//! [`InstancingContext`] owns the whole runtime: loaded animation assets,
//! actor prototypes, the instance registry and the batch packages. Hosts
//! create one and drive it once per frame:
//!
//! ```rust,ignore
//! let mut ctx = InstancingContext::new(InstancingSettings::default());
//! ctx.load_animation_file("soldier", "assets/soldier.anim")?;
//! ctx.register_prototype(soldier_prototype);
//!
//! let id = ctx.add_instance(&mut scene, spawned_node);
//!
//! // every frame
//! ctx.set_camera(CameraView::with_view_projection(eye, view_proj));
//! ctx.update(&mut scene, dt, &mut renderer);
//! for event in ctx.drain_events() { /* ... */ }
//! ```

use std::path::Path;
use std::sync::Arc;

use glam::Vec3;
use horde_assets::format::AnimationAsset;
use horde_core::bounds::BoundingSphere;
use horde_core::errors::{HordeError, Result};
use horde_core::scene::{InstancingComponent, NodeHandle, SceneGraph};
use horde_core::settings::InstancingSettings;
use log::{debug, error, info};
use rustc_hash::{FxHashMap, FxHashSet};
use slotmap::SlotMap;

use crate::batch::{BatchKey, BatchManager, BoneTextureUniforms, InstanceData};
use crate::culling::{self, CameraView};
use crate::playback::Playback;
use crate::prototype::ActorPrototype;
use crate::registry::{FiredEvent, InstanceRegistry, RuntimeInstance};
use crate::submit::{self, DrawBackend, SubmitStats};
use crate::{AnimationId, InstanceId};

pub struct InstancingContext {
    settings: InstancingSettings,
    animations: SlotMap<AnimationId, Arc<AnimationAsset>>,
    animation_names: FxHashMap<String, AnimationId>,
    prototypes: FxHashMap<String, Arc<ActorPrototype>>,
    registry: InstanceRegistry,
    batches: BatchManager,
    camera: CameraView,
}

impl InstancingContext {
    #[must_use]
    pub fn new(mut settings: InstancingSettings) -> Self {
        settings.sanitize();
        let batches = BatchManager::new(settings.effective_capacity(), settings.use_instancing);
        let registry = InstanceRegistry::with_capacity(settings.max_instances_hint);
        Self {
            settings,
            animations: SlotMap::with_key(),
            animation_names: FxHashMap::default(),
            prototypes: FxHashMap::default(),
            registry,
            batches,
            camera: CameraView::default(),
        }
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &InstancingSettings {
        &self.settings
    }

    // ========================================================================
    // Assets & prototypes
    // ========================================================================

    /// Registers a baked asset under `name`.
    ///
    /// An asset already loaded under that name is kept.
    pub fn load_animation(&mut self, name: impl Into<String>, asset: AnimationAsset) -> AnimationId {
        let name = name.into();
        if let Some(&id) = self.animation_names.get(&name) {
            debug!("Animation '{name}' is already loaded");
            return id;
        }
        let id = self.animations.insert(Arc::new(asset));
        self.animation_names.insert(name, id);
        id
    }

    /// Reads an asset file and registers it under `name`.
    pub fn load_animation_file(
        &mut self,
        name: impl Into<String>,
        path: impl AsRef<Path>,
    ) -> Result<AnimationId> {
        let name = name.into();
        if let Some(&id) = self.animation_names.get(&name) {
            return Ok(id);
        }
        let asset = AnimationAsset::load(path)?;
        Ok(self.load_animation(name, asset))
    }

    #[must_use]
    pub fn animation_id(&self, name: &str) -> Option<AnimationId> {
        self.animation_names.get(name).copied()
    }

    #[must_use]
    pub fn animation(&self, id: AnimationId) -> Option<&Arc<AnimationAsset>> {
        self.animations.get(id)
    }

    /// Registers (or replaces) an actor prototype.
    pub fn register_prototype(&mut self, prototype: ActorPrototype) {
        self.prototypes
            .insert(prototype.name.clone(), Arc::new(prototype));
    }

    #[must_use]
    pub fn prototype(&self, name: &str) -> Option<&ActorPrototype> {
        self.prototypes.get(name).map(|p| &**p)
    }

    /// Removes a prototype, its instances, and the packages of meshes no
    /// other prototype draws.
    pub fn remove_prototype(&mut self, name: &str) -> bool {
        let Some(removed) = self.prototypes.remove(name) else {
            return false;
        };

        let doomed: Vec<InstanceId> = self
            .registry
            .iter()
            .filter(|(_, i)| i.prototype.name == removed.name)
            .map(|(id, _)| id)
            .collect();
        for id in doomed {
            self.remove_instance(id);
        }

        let still_used: FxHashSet<_> = self
            .prototypes
            .values()
            .flat_map(|p| p.meshes())
            .collect();
        let released = self
            .batches
            .release_where(|key| removed.uses_mesh(key.mesh) && !still_used.contains(&key.mesh));
        debug!("Removed prototype '{name}', released {released} package(s)");
        true
    }

    // ========================================================================
    // Instances
    // ========================================================================

    /// Brings up the instanced actor on `node`.
    ///
    /// A node without an [`InstancingComponent`] is destroyed. Any other
    /// failure is logged and leaves the node in place. Either way `None` is
    /// returned and nothing propagates.
    pub fn add_instance(&mut self, scene: &mut SceneGraph, node: NodeHandle) -> Option<InstanceId> {
        let name = scene.get(node).map(|n| n.name.clone()).unwrap_or_default();

        let Some(component) = scene.instancing_component(node).cloned() else {
            error!("Node '{name}' doesn't have an instancing component, destroying it");
            scene.remove_node(node);
            return None;
        };

        match self.init_instance(scene, node, &component) {
            Ok(id) => Some(id),
            Err(e) => {
                error!("{e}");
                error!(
                    "Initializing animation of '{name}' failed. Check the baked animation and regenerate it."
                );
                None
            }
        }
    }

    fn init_instance(
        &mut self,
        scene: &SceneGraph,
        node: NodeHandle,
        component: &InstancingComponent,
    ) -> Result<InstanceId> {
        let prototype = self.find_prototype(&component.prototype)?;
        let animation = self
            .animation_id(&component.animation)
            .ok_or_else(|| HordeError::AssetNotFound(component.animation.clone()))?;
        let asset = self
            .animations
            .get(animation)
            .cloned()
            .ok_or_else(|| HordeError::AssetNotFound(component.animation.clone()))?;

        let mut playback = Playback::new(component.speed);
        match &component.default_clip {
            Some(clip) => {
                let index = asset
                    .clip_index(clip)
                    .ok_or_else(|| HordeError::ClipNotFound(clip.clone()))?;
                playback.play(index);
            }
            None if !asset.clips.is_empty() => playback.play(0),
            None => {}
        }

        let mut instance = RuntimeInstance::new(node, prototype, animation, asset, playback);
        instance.apply_root_motion = component.apply_root_motion;
        instance.sphere = BoundingSphere::new(world_position(scene, node), component.bounding_radius);
        Ok(self.registry.insert(instance))
    }

    /// Registers `node` as an attachment following `parent`.
    ///
    /// When `bone` is given it must name an extra bone of the parent's asset;
    /// the resolved slot is available from [`RuntimeInstance::bone_slot`].
    pub fn attach(
        &mut self,
        scene: &SceneGraph,
        parent: InstanceId,
        node: NodeHandle,
        bone: Option<&str>,
    ) -> Result<InstanceId> {
        let component = scene
            .instancing_component(node)
            .ok_or_else(|| {
                let name = scene.get(node).map(|n| n.name.clone()).unwrap_or_default();
                HordeError::MissingInstancingComponent(name)
            })?
            .clone();
        let prototype = self.find_prototype(&component.prototype)?;

        let host = self
            .registry
            .get(parent)
            .ok_or_else(|| HordeError::InstanceInit("attachment parent is not registered".into()))?;

        let bone_slot = match bone {
            Some(name) => Some(
                host.asset
                    .extra_bone_slot(name)
                    .ok_or_else(|| HordeError::UnknownAttachmentBone(name.to_string()))?,
            ),
            None => None,
        };

        let mut instance = RuntimeInstance::new(
            node,
            prototype,
            host.animation,
            Arc::clone(&host.asset),
            Playback::default(),
        );
        instance.parent = Some(parent);
        instance.bone_slot = bone_slot;
        instance.sphere = BoundingSphere::new(
            world_position(scene, host.node),
            component.bounding_radius,
        );
        Ok(self.registry.insert(instance))
    }

    /// Removes an instance together with everything attached to it.
    pub fn remove_instance(&mut self, id: InstanceId) -> bool {
        if self.registry.remove(id).is_none() {
            return false;
        }
        let mut orphans: Vec<InstanceId> = vec![id];
        while let Some(parent) = orphans.pop() {
            let attached: Vec<InstanceId> = self
                .registry
                .iter()
                .filter(|(_, i)| i.parent == Some(parent))
                .map(|(child, _)| child)
                .collect();
            for child in attached {
                self.registry.remove(child);
                orphans.push(child);
            }
        }
        true
    }

    /// Removes every instance and releases every package.
    pub fn clear(&mut self) {
        self.registry.clear();
        let released = self.batches.release_where(|_| true);
        info!("Instancing context cleared ({released} package(s) released)");
    }

    #[must_use]
    pub fn instance(&self, id: InstanceId) -> Option<&RuntimeInstance> {
        self.registry.get(id)
    }

    pub fn instance_mut(&mut self, id: InstanceId) -> Option<&mut RuntimeInstance> {
        self.registry.get_mut(id)
    }

    #[must_use]
    pub fn registry(&self) -> &InstanceRegistry {
        &self.registry
    }

    #[must_use]
    pub fn batches(&self) -> &BatchManager {
        &self.batches
    }

    // ========================================================================
    // Playback control
    // ========================================================================

    /// Starts the named clip on an instance.
    pub fn play(&mut self, id: InstanceId, clip: &str) -> Result<()> {
        let (instance, index) = self.resolve_clip(id, clip)?;
        instance.playback.play(index);
        Ok(())
    }

    /// Blends into the named clip over `duration` seconds.
    pub fn cross_fade(&mut self, id: InstanceId, clip: &str, duration: f32) -> Result<()> {
        let (instance, index) = self.resolve_clip(id, clip)?;
        instance.playback.cross_fade(index, duration);
        Ok(())
    }

    fn resolve_clip(&mut self, id: InstanceId, clip: &str) -> Result<(&mut RuntimeInstance, usize)> {
        let instance = self
            .registry
            .get_mut(id)
            .ok_or_else(|| HordeError::InstanceInit("instance is not registered".into()))?;
        let index = instance
            .asset
            .clip_index(clip)
            .ok_or_else(|| HordeError::ClipNotFound(clip.to_string()))?;
        Ok((instance, index))
    }

    // ========================================================================
    // Frame
    // ========================================================================

    pub fn set_camera(&mut self, camera: CameraView) {
        self.camera = camera;
    }

    /// Visibility callback for host-side culling.
    pub fn set_visible(&mut self, id: InstanceId, visible: bool) {
        self.registry.set_visible(id, visible);
    }

    /// Advances playback and root motion, then culls and picks LODs.
    pub fn tick(&mut self, scene: &mut SceneGraph, dt: f32) {
        self.registry.tick(scene, dt);
        culling::cull_instances(&mut self.registry, &self.camera);
        culling::update_lods(&mut self.registry, self.camera.position);
    }

    /// Appends every visible playing instance to its packages.
    pub fn build_batches(&mut self, scene: &SceneGraph) {
        for (id, instance) in self.registry.iter() {
            if !instance.visible {
                continue;
            }
            let Some(source) = self.registry.frame_source(id) else {
                continue;
            };
            let (Some(scalars), Some(clip)) = (source.frame_scalars(), source.current_clip()) else {
                continue;
            };
            let Some(world) = self.registry.draw_matrix(scene, id) else {
                continue;
            };
            let Some(lod) = instance.prototype.lod(instance.lod) else {
                continue;
            };

            let texture_index = clip.texture_index;
            let uniforms = source
                .asset
                .atlas
                .texture(texture_index as usize)
                .map(|t| BoneTextureUniforms {
                    texture_width: t.width,
                    texture_height: t.height,
                    block_width: source.asset.atlas.block_width,
                    block_height: source.asset.atlas.block_height,
                })
                .unwrap_or_default();
            let data = InstanceData::new(world, scalars);

            for renderer in &lod.renderers {
                let key = BatchKey {
                    mesh: renderer.mesh,
                    materials: renderer.materials.clone(),
                    animation: source.animation,
                    texture_index,
                };
                self.batches.append(&key, uniforms, data);
            }
        }
    }

    /// Matches package capacity and shader variant to what `backend` can
    /// draw. Call before [`build_batches`](Self::build_batches) when driving
    /// the frame step by step; [`update`](Self::update) does it already.
    pub fn sync_draw_mode(&mut self, backend: &dyn DrawBackend) {
        let instancing = self.settings.use_instancing && backend.supports_instancing();
        let capacity = if instancing {
            self.settings.effective_capacity()
        } else {
            1
        };
        self.batches.reconfigure(capacity, instancing);
    }

    /// Draws the frame's packages and resets them.
    pub fn submit(&mut self, backend: &mut dyn DrawBackend) -> SubmitStats {
        submit::submit(&mut self.batches, backend)
    }

    /// One full frame: tick, batch, submit.
    pub fn update(
        &mut self,
        scene: &mut SceneGraph,
        dt: f32,
        backend: &mut dyn DrawBackend,
    ) -> SubmitStats {
        self.tick(scene, dt);
        self.sync_draw_mode(backend);
        self.build_batches(scene);
        self.submit(backend)
    }

    /// Clip events fired since the last call.
    pub fn drain_events(&mut self) -> Vec<FiredEvent> {
        self.registry.drain_events()
    }

    fn find_prototype(&self, name: &str) -> Result<Arc<ActorPrototype>> {
        self.prototypes
            .get(name)
            .cloned()
            .ok_or_else(|| HordeError::InstanceInit(format!("unknown prototype '{name}'")))
    }
}

fn world_position(scene: &SceneGraph, node: NodeHandle) -> Vec3 {
    scene
        .compose_world_matrix(node)
        .map_or(Vec3::ZERO, |m| Vec3::from(m.translation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Mat4;
    use horde_assets::atlas::AnimationTextureAtlas;
    use horde_assets::clip::{AnimationClipInfo, ExtraBones, WrapMode};

    use crate::batch::PackageMaterial;
    use crate::prototype::{MaterialId, MeshId, MeshRenderer};

    #[derive(Default)]
    struct CountingBackend {
        no_instancing: bool,
        instanced: usize,
        instances: usize,
        direct: Vec<(f32, bool)>,
    }

    impl DrawBackend for CountingBackend {
        fn supports_instancing(&self) -> bool {
            !self.no_instancing
        }

        fn draw_instanced(
            &mut self,
            _mesh: MeshId,
            _sub_mesh: usize,
            _material: &PackageMaterial,
            instances: &[InstanceData],
        ) {
            self.instanced += 1;
            self.instances += instances.len();
        }

        fn draw_direct(
            &mut self,
            _mesh: MeshId,
            _sub_mesh: usize,
            material: &PackageMaterial,
            instance: &InstanceData,
        ) {
            self.direct.push((instance.frame_index, material.instancing));
        }
    }

    fn asset() -> AnimationAsset {
        let mut idle = AnimationClipInfo::new("idle", 16, 15);
        idle.wrap_mode = WrapMode::Loop;
        let mut wave = AnimationClipInfo::new("wave", 8, 15);
        wave.animation_index = 16;
        AnimationAsset {
            clips: vec![idle, wave],
            extra_bones: Some(ExtraBones {
                names: vec!["weapon".into()],
                bind_poses: vec![Mat4::IDENTITY],
            }),
            atlas: AnimationTextureAtlas::with_sizes(&[64], 3),
        }
    }

    fn context() -> InstancingContext {
        let mut ctx = InstancingContext::new(InstancingSettings::default());
        ctx.load_animation("peasant", asset());
        ctx.register_prototype(ActorPrototype::new("peasant").with_lod(
            0.0,
            vec![MeshRenderer::new(MeshId(1), [MaterialId(1)])],
        ));
        ctx.register_prototype(ActorPrototype::new("pitchfork").with_lod(
            0.0,
            vec![MeshRenderer::new(MeshId(2), [MaterialId(2)])],
        ));
        ctx
    }

    fn spawn(scene: &mut SceneGraph, prototype: &str) -> NodeHandle {
        let node = scene.create_node(prototype);
        scene.set_instancing_component(node, InstancingComponent::new(prototype, "peasant"));
        node
    }

    #[test]
    fn missing_component_destroys_node() {
        let mut ctx = context();
        let mut scene = SceneGraph::new();
        let node = scene.create_node("bare");

        assert!(ctx.add_instance(&mut scene, node).is_none());
        assert!(!scene.contains(node));
    }

    #[test]
    fn unknown_asset_keeps_node() {
        let mut ctx = context();
        let mut scene = SceneGraph::new();
        let node = scene.create_node("ghost");
        scene.set_instancing_component(node, InstancingComponent::new("peasant", "nope"));

        assert!(ctx.add_instance(&mut scene, node).is_none());
        assert!(scene.contains(node));
        assert!(ctx.registry().is_empty());
    }

    #[test]
    fn instance_starts_default_clip() {
        let mut ctx = context();
        let mut scene = SceneGraph::new();
        let node = spawn(&mut scene, "peasant");
        let id = ctx.add_instance(&mut scene, node).unwrap();

        assert_eq!(ctx.instance(id).unwrap().current_clip().unwrap().name, "idle");
        ctx.play(id, "wave").unwrap();
        assert_eq!(ctx.instance(id).unwrap().current_clip().unwrap().name, "wave");
        assert!(matches!(
            ctx.play(id, "dance"),
            Err(HordeError::ClipNotFound(_))
        ));
    }

    #[test]
    fn frame_batches_and_submits() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut ctx = context();
        let mut scene = SceneGraph::new();
        for _ in 0..250 {
            let node = spawn(&mut scene, "peasant");
            ctx.add_instance(&mut scene, node).unwrap();
        }

        let mut backend = CountingBackend::default();
        let stats = ctx.update(&mut scene, 1.0 / 30.0, &mut backend);
        assert_eq!(stats.packages, 2);
        assert_eq!(backend.instanced, 2);
        assert_eq!(backend.instances, 250);

        // Second frame reuses the same packages.
        ctx.update(&mut scene, 1.0 / 30.0, &mut backend);
        assert_eq!(ctx.batches().package_count(), 2);
    }

    #[test]
    fn backend_without_instancing_draws_each_actor_on_its_own() {
        let mut ctx = context();
        let mut scene = SceneGraph::new();
        for _ in 0..3 {
            let node = spawn(&mut scene, "peasant");
            ctx.add_instance(&mut scene, node).unwrap();
        }

        let mut backend = CountingBackend {
            no_instancing: true,
            ..Default::default()
        };
        let stats = ctx.update(&mut scene, 0.1, &mut backend);

        assert_eq!(stats.packages, 3);
        assert_eq!(stats.draw_calls, 3);
        assert_eq!(backend.instanced, 0);
        assert_eq!(backend.direct.len(), 3);
        assert!(backend.direct.iter().all(|&(_, instancing)| !instancing));
        assert_eq!(ctx.batches().capacity(), 1);

        // An instancing backend switches the packages back.
        let mut gpu = CountingBackend::default();
        let stats = ctx.update(&mut scene, 0.1, &mut gpu);
        assert_eq!(stats.packages, 1);
        assert_eq!(gpu.instances, 3);
        assert_eq!(ctx.batches().capacity(), 200);
    }

    #[test]
    fn removing_parent_removes_attachments() {
        let mut ctx = context();
        let mut scene = SceneGraph::new();
        let body = spawn(&mut scene, "peasant");
        let parent = ctx.add_instance(&mut scene, body).unwrap();
        let fork = spawn(&mut scene, "pitchfork");
        let attached = ctx.attach(&scene, parent, fork, Some("weapon")).unwrap();
        let bystander = spawn(&mut scene, "peasant");
        let other = ctx.add_instance(&mut scene, bystander).unwrap();

        assert!(ctx.remove_instance(parent));
        ctx.tick(&mut scene, 0.1);

        assert!(ctx.instance(attached).is_none());
        assert!(ctx.instance(other).is_some());
        assert_eq!(ctx.registry().len(), 1);
        assert!(!ctx.remove_instance(parent));
    }

    #[test]
    fn attachments_follow_parent_frames() {
        let mut ctx = context();
        let mut scene = SceneGraph::new();
        let body = spawn(&mut scene, "peasant");
        let parent = ctx.add_instance(&mut scene, body).unwrap();
        ctx.play(parent, "wave").unwrap();

        let fork = spawn(&mut scene, "pitchfork");
        assert!(matches!(
            ctx.attach(&scene, parent, fork, Some("hat")),
            Err(HordeError::UnknownAttachmentBone(_))
        ));
        let id = ctx.attach(&scene, parent, fork, Some("weapon")).unwrap();
        assert_eq!(ctx.instance(id).unwrap().bone_slot(), Some(2));

        ctx.tick(&mut scene, 0.0);
        ctx.build_batches(&scene);
        let frames: Vec<f32> = ctx
            .batches()
            .filled_packages()
            .map(|p| p.instances()[0].frame_index)
            .collect();
        assert_eq!(frames, vec![16.0, 16.0]);
    }

    #[test]
    fn removing_prototype_releases_its_packages() {
        let mut ctx = context();
        let mut scene = SceneGraph::new();
        let node = spawn(&mut scene, "peasant");
        ctx.add_instance(&mut scene, node).unwrap();
        ctx.update(&mut scene, 0.1, &mut CountingBackend::default());
        assert_eq!(ctx.batches().package_count(), 1);

        assert!(ctx.remove_prototype("peasant"));
        assert!(ctx.registry().is_empty());
        assert_eq!(ctx.batches().package_count(), 0);
        assert!(!ctx.remove_prototype("peasant"));
    }

    #[test]
    fn removing_prototype_covers_instances_of_replaced_versions() {
        let mut ctx = context();
        let mut scene = SceneGraph::new();
        let old = spawn(&mut scene, "peasant");
        ctx.add_instance(&mut scene, old).unwrap();

        ctx.register_prototype(ActorPrototype::new("peasant").with_lod(
            0.0,
            vec![MeshRenderer::new(MeshId(3), [MaterialId(1)])],
        ));
        let new = spawn(&mut scene, "peasant");
        ctx.add_instance(&mut scene, new).unwrap();
        assert_eq!(ctx.registry().len(), 2);

        assert!(ctx.remove_prototype("peasant"));
        assert!(ctx.registry().is_empty());
    }
}
