//! Runtime Instance Registry
//!
//! Owns every live [`RuntimeInstance`] and advances them once per tick:
//!
//! 1. Instances without a clip and without a parent are skipped.
//! 2. Root motion is applied from the frame reached last tick.
//! 3. Playback advances; crossed clip events are queued.
//! 4. The culling sphere follows the node.

use std::sync::Arc;

use glam::{Mat4, Vec3};
use horde_assets::clip::{AnimationClipInfo, AnimationEvent};
use horde_assets::format::AnimationAsset;
use horde_core::bounds::BoundingSphere;
use horde_core::scene::{NodeHandle, SceneGraph};
use slotmap::SlotMap;

use crate::playback::{FrameScalars, Playback};
use crate::prototype::ActorPrototype;
use crate::root_motion;
use crate::{AnimationId, InstanceId};

/// A clip event reached by an instance during a tick.
#[derive(Debug, Clone, PartialEq)]
pub struct FiredEvent {
    pub instance: InstanceId,
    pub clip: String,
    pub event: AnimationEvent,
}

#[derive(Debug, Clone)]
pub struct RuntimeInstance {
    pub(crate) node: NodeHandle,
    pub(crate) prototype: Arc<ActorPrototype>,
    pub(crate) animation: AnimationId,
    pub(crate) asset: Arc<AnimationAsset>,
    pub playback: Playback,
    pub apply_root_motion: bool,
    pub(crate) visible: bool,
    pub(crate) lod: usize,
    pub(crate) sphere: BoundingSphere,
    pub(crate) parent: Option<InstanceId>,
    pub(crate) bone_slot: Option<u32>,
}

impl RuntimeInstance {
    #[must_use]
    pub fn new(
        node: NodeHandle,
        prototype: Arc<ActorPrototype>,
        animation: AnimationId,
        asset: Arc<AnimationAsset>,
        playback: Playback,
    ) -> Self {
        Self {
            node,
            prototype,
            animation,
            asset,
            playback,
            apply_root_motion: false,
            visible: true,
            lod: 0,
            sphere: BoundingSphere::default(),
            parent: None,
            bone_slot: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn node(&self) -> NodeHandle {
        self.node
    }

    #[inline]
    #[must_use]
    pub fn prototype(&self) -> &ActorPrototype {
        &self.prototype
    }

    #[inline]
    #[must_use]
    pub fn animation(&self) -> AnimationId {
        self.animation
    }

    #[inline]
    #[must_use]
    pub fn asset(&self) -> &Arc<AnimationAsset> {
        &self.asset
    }

    #[inline]
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    #[inline]
    #[must_use]
    pub fn lod_level(&self) -> usize {
        self.lod
    }

    #[inline]
    #[must_use]
    pub fn bounding_sphere(&self) -> &BoundingSphere {
        &self.sphere
    }

    /// The instance this attachment follows.
    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<InstanceId> {
        self.parent
    }

    /// Extra bone slot an attachment is bound to.
    #[inline]
    #[must_use]
    pub fn bone_slot(&self) -> Option<u32> {
        self.bone_slot
    }

    #[must_use]
    pub fn current_clip(&self) -> Option<&AnimationClipInfo> {
        self.asset.clips.get(self.playback.clip()?)
    }

    #[must_use]
    pub fn frame_scalars(&self) -> Option<FrameScalars> {
        self.playback.frame_scalars(&self.asset.clips)
    }
}

#[derive(Debug, Default)]
pub struct InstanceRegistry {
    instances: SlotMap<InstanceId, RuntimeInstance>,
    events: Vec<FiredEvent>,
    scratch: Vec<usize>,
    visible_count: usize,
}

impl InstanceRegistry {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            instances: SlotMap::with_capacity_and_key(capacity),
            ..Default::default()
        }
    }

    pub fn insert(&mut self, instance: RuntimeInstance) -> InstanceId {
        if instance.visible {
            self.visible_count += 1;
        }
        self.instances.insert(instance)
    }

    pub fn remove(&mut self, id: InstanceId) -> Option<RuntimeInstance> {
        let instance = self.instances.remove(id)?;
        if instance.visible {
            debug_assert!(self.visible_count > 0, "visible instance count underflow");
            self.visible_count = self.visible_count.saturating_sub(1);
        }
        Some(instance)
    }

    #[inline]
    #[must_use]
    pub fn get(&self, id: InstanceId) -> Option<&RuntimeInstance> {
        self.instances.get(id)
    }

    #[inline]
    pub fn get_mut(&mut self, id: InstanceId) -> Option<&mut RuntimeInstance> {
        self.instances.get_mut(id)
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, id: InstanceId) -> bool {
        self.instances.contains_key(id)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (InstanceId, &RuntimeInstance)> {
        self.instances.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (InstanceId, &mut RuntimeInstance)> {
        self.instances.iter_mut()
    }

    /// Removes every instance.
    pub fn clear(&mut self) {
        self.instances.clear();
        self.events.clear();
        self.visible_count = 0;
    }

    // ========================================================================
    // Visibility
    // ========================================================================

    /// Visibility callback for the host's culling system.
    pub fn set_visible(&mut self, id: InstanceId, visible: bool) {
        let Some(instance) = self.instances.get_mut(id) else {
            return;
        };
        if instance.visible == visible {
            return;
        }
        instance.visible = visible;
        if visible {
            self.visible_count += 1;
        } else {
            debug_assert!(self.visible_count > 0, "visible instance count underflow");
            self.visible_count = self.visible_count.saturating_sub(1);
        }
    }

    #[inline]
    #[must_use]
    pub fn visible_count(&self) -> usize {
        self.visible_count
    }

    /// The instance whose playback drives `id`: its parent for attachments,
    /// itself otherwise.
    #[must_use]
    pub fn frame_source(&self, id: InstanceId) -> Option<&RuntimeInstance> {
        let instance = self.instances.get(id)?;
        match instance.parent {
            Some(parent) => self.instances.get(parent),
            None => Some(instance),
        }
    }

    // ========================================================================
    // Tick
    // ========================================================================

    /// Advances every instance by `dt` seconds.
    pub fn tick(&mut self, scene: &mut SceneGraph, dt: f32) {
        for (id, instance) in &mut self.instances {
            if instance.playback.clip().is_none() && instance.parent.is_none() {
                continue;
            }

            if let Some(clip) = instance
                .playback
                .clip()
                .and_then(|c| instance.asset.clips.get(c))
            {
                if instance.apply_root_motion {
                    root_motion::apply_root_motion(
                        scene,
                        instance.node,
                        clip,
                        instance.playback.frame(),
                        dt,
                    );
                }

                self.scratch.clear();
                instance.playback.advance(clip, dt, &mut self.scratch);
                for &event in &self.scratch {
                    self.events.push(FiredEvent {
                        instance: id,
                        clip: clip.name.clone(),
                        event: clip.events[event].clone(),
                    });
                }
            }

            if let Some(world) = scene.compose_world_matrix(instance.node) {
                instance.sphere.center = Vec3::from(world.translation);
            }
        }
    }

    /// Events fired since the last call.
    pub fn drain_events(&mut self) -> Vec<FiredEvent> {
        std::mem::take(&mut self.events)
    }

    /// World matrix an instance is drawn with.
    ///
    /// Attachments are skinned to a bone slot of their parent, so they take
    /// the parent's matrix.
    #[must_use]
    pub fn draw_matrix(&self, scene: &SceneGraph, id: InstanceId) -> Option<Mat4> {
        let source = self.frame_source(id)?;
        scene.compose_world_matrix(source.node).map(Mat4::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use horde_assets::atlas::AnimationTextureAtlas;
    use horde_assets::clip::WrapMode;

    fn asset() -> Arc<AnimationAsset> {
        let mut walk = AnimationClipInfo::new("walk", 11, 10);
        walk.wrap_mode = WrapMode::Loop;
        walk.root_motion = true;
        walk.velocity = vec![Vec3::new(0.0, 0.0, 1.0); 11];
        walk.angular_velocity = vec![Vec3::ZERO; 11];
        walk.events = vec![AnimationEvent::new("footstep", 0.5)];
        Arc::new(AnimationAsset {
            clips: vec![walk],
            extra_bones: None,
            atlas: AnimationTextureAtlas::with_sizes(&[64], 2),
        })
    }

    fn setup() -> (SceneGraph, InstanceRegistry, NodeHandle, InstanceId) {
        let mut scene = SceneGraph::new();
        let node = scene.create_node("walker");
        let mut animations: SlotMap<AnimationId, ()> = SlotMap::with_key();
        let mut instance = RuntimeInstance::new(
            node,
            Arc::new(ActorPrototype::new("walker")),
            animations.insert(()),
            asset(),
            Playback::new(1.0),
        );
        instance.playback.play(0);
        let mut registry = InstanceRegistry::default();
        let id = registry.insert(instance);
        (scene, registry, node, id)
    }

    #[test]
    fn tick_advances_and_fires_events() {
        let (mut scene, mut registry, _, id) = setup();
        registry.tick(&mut scene, 0.6);
        assert!((registry.get(id).unwrap().playback.frame() - 6.0).abs() < 1e-5);

        let events = registry.drain_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].instance, id);
        assert_eq!(events[0].event.function, "footstep");
        assert!(registry.drain_events().is_empty());
    }

    #[test]
    fn root_motion_off_leaves_node_alone() {
        let (mut scene, mut registry, node, _) = setup();
        for _ in 0..10 {
            registry.tick(&mut scene, 0.1);
        }
        let t = &scene.get(node).unwrap().transform;
        assert_eq!(t.position, Vec3::ZERO);
        assert_eq!(t.rotation, glam::Quat::IDENTITY);
    }

    #[test]
    fn root_motion_on_moves_node_and_sphere() {
        let (mut scene, mut registry, node, id) = setup();
        registry.get_mut(id).unwrap().apply_root_motion = true;
        registry.tick(&mut scene, 0.1);

        let position = scene.get(node).unwrap().transform.position;
        assert!(position.abs_diff_eq(Vec3::new(0.0, 0.0, 0.1), 1e-5));
        let sphere = registry.get(id).unwrap().bounding_sphere();
        assert!(sphere.center.abs_diff_eq(position, 1e-5));
    }

    #[test]
    fn stopped_instances_are_skipped() {
        let (mut scene, mut registry, _, id) = setup();
        registry.get_mut(id).unwrap().playback.stop();
        registry.tick(&mut scene, 0.5);
        assert_eq!(registry.get(id).unwrap().playback.frame(), 0.0);
        assert!(registry.get(id).unwrap().frame_scalars().is_none());
    }

    #[test]
    fn visible_count_tracks_callbacks() {
        let (_, mut registry, _, id) = setup();
        assert_eq!(registry.visible_count(), 1);
        registry.set_visible(id, false);
        registry.set_visible(id, false);
        assert_eq!(registry.visible_count(), 0);
        registry.set_visible(id, true);
        assert!(registry.remove(id).is_some());
        assert_eq!(registry.visible_count(), 0);
        assert!(registry.is_empty());
    }
}
