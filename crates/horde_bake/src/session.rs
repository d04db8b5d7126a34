//! Bake Session
//!
//! A tick-driven state machine that samples every selected clip of an actor
//! into an [`AnimationAsset`]. Each call to [`BakeSession::tick`] advances
//! exactly one step of the single clip in flight, so the host can drive it
//! from its editor update loop and show progress in between.
//!
//! ```text
//! Priming ──> Sampling (one frame per tick) ──> Finalizing ──┬──> Priming
//!                                                            └──> Idle (asset ready)
//! ```
//!
//! Nothing is written to disk by the session itself; the asset is handed
//! back in [`BakeStep::Completed`] once the queue is drained.

use std::collections::VecDeque;
use std::path::Path;

use glam::Mat4;
use horde_assets::atlas::AnimationTextureAtlas;
use horde_assets::clip::{AnimationClipInfo, ExtraBones};
use horde_assets::format::AnimationAsset;
use horde_core::errors::{HordeError, Result};
use horde_core::settings::BakeSettings;
use log::{debug, info, warn};

use crate::bone_merger::{MergedSkeleton, append_extra_bones, merge_bones};
use crate::graph::{self, BakeJob, ClipSelection, StrippedState};
use crate::packer;
use crate::rig::{ActorPrefab, Animator, BakeRig};
use crate::skin::calculate_skin_matrices;

/// What the next [`BakeSession::tick`] will do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BakeState {
    /// Nothing left to do.
    Idle,
    /// Start the next queued clip.
    Priming,
    /// Sample one frame of the clip in flight.
    Sampling,
    /// Store the finished clip and move on.
    Finalizing,
}

/// Outcome of one tick.
#[derive(Debug)]
pub enum BakeStep {
    Idle,
    Primed {
        clip: String,
    },
    Sampled {
        clip: String,
        frame: u32,
        total: u32,
    },
    Finalized {
        clip: String,
    },
    Completed(Box<AnimationAsset>),
}

struct ClipInFlight {
    job: BakeJob,
    info: AnimationClipInfo,
    frames: Vec<Vec<Mat4>>,
    frame: u32,
}

/// One bake of one actor.
pub struct BakeSession<P: ActorPrefab> {
    actor: String,
    settings: BakeSettings,
    rig: Option<BakeRig<P::Animator>>,
    skeleton: MergedSkeleton,
    extra_bones: Option<ExtraBones>,

    queue: VecDeque<BakeJob>,
    current: Option<ClipInFlight>,
    finished: Vec<(AnimationClipInfo, Vec<Vec<Mat4>>)>,
    stripped: Vec<StrippedState>,

    state: BakeState,
    total_clips: usize,
}

impl<P: ActorPrefab> BakeSession<P> {
    /// Validates the actor, prepares the skeleton and queues the clips.
    ///
    /// Events and transitions of the queued states are stripped from the
    /// prefab's state machine until the session completes or is aborted.
    pub fn start(
        prefab: &mut P,
        selection: &ClipSelection,
        settings: &BakeSettings,
    ) -> Result<Self> {
        let mut settings = settings.clone();
        settings.sanitize();

        let actor = prefab.name().to_string();
        if !prefab.has_instancing_component() {
            return Err(HordeError::MissingInstancingComponent(actor));
        }
        let machine = prefab
            .state_machine()
            .ok_or_else(|| HordeError::MissingStateMachine(actor.clone()))?;

        let jobs = graph::flatten(machine, selection, settings.fps);
        if jobs.is_empty() {
            return Err(HordeError::NothingToBake);
        }

        let mut rig = prefab.instantiate()?;
        let mut skeleton = merge_bones(&mut rig.skinned_meshes);
        if skeleton.is_empty() {
            return Err(HordeError::EmptySkeleton(actor));
        }
        skeleton.validate()?;

        let extra_bones = append_extra_bones(
            rig.animator.scene(),
            rig.root,
            &selection.attachment_bones,
            &mut skeleton,
        );

        // Fail before sampling anything if a clip can never fit.
        let frames: Vec<u32> = jobs.iter().map(|j| j.total_frames).collect();
        packer::plan(&frames, skeleton.len() as u32, &settings.texture_sizes)?;

        let stripped = match prefab.state_machine_mut() {
            Some(machine) => graph::strip(machine, &jobs),
            None => Vec::new(),
        };

        info!(
            "Baking {} clip(s) of '{actor}' at {} fps, {} bone slot(s)",
            jobs.len(),
            settings.fps,
            skeleton.len()
        );

        Ok(Self {
            actor,
            settings,
            rig: Some(rig),
            skeleton,
            extra_bones,
            total_clips: jobs.len(),
            queue: jobs.into(),
            current: None,
            finished: Vec::new(),
            stripped,
            state: BakeState::Priming,
        })
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> BakeState {
        self.state
    }

    /// `(finished clips, total clips)`.
    #[must_use]
    pub fn progress(&self) -> (usize, usize) {
        (self.finished.len(), self.total_clips)
    }

    /// Name of the clip in flight.
    #[must_use]
    pub fn current_clip(&self) -> Option<&str> {
        self.current.as_ref().map(|c| c.job.clip_name.as_str())
    }

    #[must_use]
    pub fn bone_count(&self) -> usize {
        self.skeleton.len()
    }

    /// Advances the bake by one step.
    pub fn tick(&mut self, prefab: &mut P) -> Result<BakeStep> {
        match self.state {
            BakeState::Idle => Ok(BakeStep::Idle),
            BakeState::Priming => self.prime(),
            BakeState::Sampling => self.sample(),
            BakeState::Finalizing => self.finalize(prefab),
        }
    }

    /// Stops the bake and puts the prefab's events and transitions back.
    pub fn abort(mut self, prefab: &mut P) {
        self.restore_prefab(prefab);
        if let Some(mut rig) = self.rig.take() {
            rig.animator.set_active(false);
        }
        warn!("Bake of '{}' aborted", self.actor);
    }

    fn rig_mut(&mut self) -> Result<&mut BakeRig<P::Animator>> {
        self.rig
            .as_mut()
            .ok_or_else(|| HordeError::InstanceInit(format!("bake rig of '{}' released", self.actor)))
    }

    fn prime(&mut self) -> Result<BakeStep> {
        let Some(job) = self.queue.pop_front() else {
            self.state = BakeState::Idle;
            return Ok(BakeStep::Idle);
        };

        let animator = &mut self.rig_mut()?.animator;
        animator.set_active(true);
        animator.update(0.0);
        animator.play(job.state_hash);
        animator.update(0.0);

        let mut info =
            AnimationClipInfo::new(job.clip_name.clone(), job.total_frames, self.settings.fps);
        info.wrap_mode = job.wrap_mode;
        info.events.clone_from(&job.events);
        info.root_motion = self.settings.record_root_motion;
        if info.root_motion {
            info.velocity = Vec::with_capacity(job.total_frames as usize);
            info.angular_velocity = Vec::with_capacity(job.total_frames as usize);
        }

        debug!("Priming clip '{}' ({} frames)", job.clip_name, job.total_frames);
        let clip = job.clip_name.clone();
        self.current = Some(ClipInFlight {
            frames: Vec::with_capacity(job.total_frames as usize),
            job,
            info,
            frame: 0,
        });
        self.state = BakeState::Sampling;

        Ok(BakeStep::Primed { clip })
    }

    fn sample(&mut self) -> Result<BakeStep> {
        let Some(mut current) = self.current.take() else {
            self.state = BakeState::Priming;
            return Ok(BakeStep::Idle);
        };
        let bones = &self.skeleton.bones;
        let bind_poses = &self.skeleton.bind_poses;
        let Some(rig) = self.rig.as_mut() else {
            return Err(HordeError::InstanceInit(format!(
                "bake rig of '{}' released",
                self.actor
            )));
        };

        let matrices = calculate_skin_matrices(rig.animator.scene(), bones, bind_poses)
            .ok_or_else(|| HordeError::EmptySkeleton(self.actor.clone()))?;
        current.frames.push(matrices);

        if current.info.root_motion {
            current.info.velocity.push(rig.animator.velocity());
            current
                .info
                .angular_velocity
                .push(rig.animator.angular_velocity().map(f32::to_degrees));
        }

        current.frame += 1;
        let total = current.job.total_frames;
        let step = BakeStep::Sampled {
            clip: current.job.clip_name.clone(),
            frame: current.frame - 1,
            total,
        };

        if current.frame >= total {
            self.state = BakeState::Finalizing;
        } else {
            let dt = current.job.length / (total - 1) as f32;
            rig.animator.update(dt);
        }

        self.current = Some(current);
        Ok(step)
    }

    fn finalize(&mut self, prefab: &mut P) -> Result<BakeStep> {
        let Some(current) = self.current.take() else {
            self.state = BakeState::Priming;
            return Ok(BakeStep::Idle);
        };

        let clip = current.job.clip_name;
        debug!("Finished clip '{clip}'");
        self.finished.push((current.info, current.frames));

        let rig = self.rig_mut()?;
        rig.animator.reset_root();

        if self.queue.is_empty() {
            let asset = self.complete(prefab)?;
            return Ok(BakeStep::Completed(Box::new(asset)));
        }

        self.state = BakeState::Priming;
        Ok(BakeStep::Finalized { clip })
    }

    fn complete(&mut self, prefab: &mut P) -> Result<AnimationAsset> {
        self.restore_prefab(prefab);
        self.state = BakeState::Idle;

        let block_height = self.skeleton.len() as u32;
        let frames: Vec<u32> = self.finished.iter().map(|(i, _)| i.total_frames).collect();
        let plan = packer::plan(&frames, block_height, &self.settings.texture_sizes)?;
        let placements = packer::place(&frames, &plan);

        let mut atlas = AnimationTextureAtlas::with_sizes(&plan.texture_sizes(), block_height);
        let mut clips = Vec::with_capacity(self.finished.len());

        for ((mut info, baked), placement) in self.finished.drain(..).zip(placements) {
            info.texture_index = placement.texture_index;
            info.animation_index = placement.animation_index;
            for (f, matrices) in baked.iter().enumerate() {
                atlas.write_frame(
                    placement.texture_index as usize,
                    placement.animation_index + f as u32,
                    matrices,
                );
            }
            clips.push(info);
        }

        if let Some(mut rig) = self.rig.take() {
            rig.animator.set_active(false);
        }

        info!(
            "Baked '{}': {} clip(s) into {} texture(s), last {}x{}",
            self.actor,
            clips.len(),
            plan.texture_count,
            plan.texture_size,
            plan.texture_size
        );

        Ok(AnimationAsset {
            clips,
            extra_bones: self.extra_bones.take(),
            atlas,
        })
    }

    fn restore_prefab(&mut self, prefab: &mut P) {
        let stripped = std::mem::take(&mut self.stripped);
        if stripped.is_empty() {
            return;
        }
        match prefab.state_machine_mut() {
            Some(machine) => graph::restore(machine, stripped),
            None => warn!("State machine of '{}' disappeared during the bake", self.actor),
        }
    }
}

/// Runs a whole bake and writes the asset to `path`.
///
/// The file is only created after every clip has been sampled.
pub fn bake_to_file<P: ActorPrefab>(
    prefab: &mut P,
    selection: &ClipSelection,
    settings: &BakeSettings,
    path: impl AsRef<Path>,
) -> Result<AnimationAsset> {
    let mut session = BakeSession::start(prefab, selection, settings)?;
    loop {
        match session.tick(prefab) {
            Ok(BakeStep::Completed(asset)) => {
                asset.save(path)?;
                return Ok(*asset);
            }
            Ok(BakeStep::Idle) => return Err(HordeError::NothingToBake),
            Ok(_) => {}
            Err(e) => {
                session.abort(prefab);
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{AnimState, Motion, SourceClip, StateMachine};
    use crate::rig::SkinnedMeshSource;
    use glam::Vec3;
    use horde_assets::clip::{AnimationEvent, WrapMode};
    use horde_core::scene::{Node, NodeHandle, SceneGraph};
    use std::f32::consts::FRAC_PI_2;

    struct MockAnimator {
        scene: SceneGraph,
        hips: NodeHandle,
        time: f32,
        playing: Option<i32>,
    }

    impl Animator for MockAnimator {
        fn scene(&self) -> &SceneGraph {
            &self.scene
        }
        fn set_active(&mut self, _active: bool) {}
        fn play(&mut self, state_hash: i32) {
            self.playing = Some(state_hash);
            self.time = 0.0;
            self.update(0.0);
        }
        fn update(&mut self, dt: f32) {
            self.time += dt;
            if let Some(hips) = self.scene.get_mut(self.hips) {
                hips.transform.position = Vec3::new(0.0, self.time, 0.0);
            }
        }
        fn velocity(&self) -> Vec3 {
            if self.playing.is_some() {
                Vec3::new(0.0, 0.0, 2.0)
            } else {
                Vec3::ZERO
            }
        }
        fn angular_velocity(&self) -> Vec3 {
            Vec3::new(0.0, FRAC_PI_2, 0.0)
        }
        fn reset_root(&mut self) {}
    }

    struct MockPrefab {
        machine: Option<StateMachine>,
        instancing: bool,
    }

    impl ActorPrefab for MockPrefab {
        type Animator = MockAnimator;

        fn name(&self) -> &str {
            "soldier"
        }
        fn has_instancing_component(&self) -> bool {
            self.instancing
        }
        fn state_machine(&self) -> Option<&StateMachine> {
            self.machine.as_ref()
        }
        fn state_machine_mut(&mut self) -> Option<&mut StateMachine> {
            self.machine.as_mut()
        }
        fn instantiate(&self) -> Result<BakeRig<MockAnimator>> {
            let mut scene = SceneGraph::new();
            let root = scene.create_node("soldier");
            let hips = scene.add_to_parent(Node::new("hips"), root);
            let spine = scene.add_to_parent(Node::new("spine"), hips);
            let hand = scene.add_to_parent(Node::new("hand"), spine);
            Ok(BakeRig {
                animator: MockAnimator {
                    scene,
                    hips,
                    time: 0.0,
                    playing: None,
                },
                root,
                skinned_meshes: vec![SkinnedMeshSource {
                    name: "body".into(),
                    bones: vec![hips, spine, hand],
                    bind_poses: vec![Mat4::IDENTITY; 3],
                    enabled: true,
                }],
            })
        }
    }

    fn prefab() -> MockPrefab {
        let mut idle = SourceClip::new("Idle", 1.0).looping();
        idle.events.push(AnimationEvent::new("Breathe", 0.5));
        let mut machine = StateMachine::new("Base");
        machine.states.push(AnimState::with_clip("Idle", 11, idle));
        machine.states.push(AnimState::with_clip("Run", 22, SourceClip::new("Run", 0.5)));
        MockPrefab {
            machine: Some(machine),
            instancing: true,
        }
    }

    fn run_to_end(
        session: &mut BakeSession<MockPrefab>,
        prefab: &mut MockPrefab,
    ) -> (usize, AnimationAsset) {
        for ticks in 1..10_000 {
            if let BakeStep::Completed(asset) = session.tick(prefab).unwrap() {
                return (ticks, *asset);
            }
        }
        panic!("bake never completed");
    }

    #[test]
    fn full_bake_steps_one_frame_per_tick() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut prefab = prefab();
        let selection = ClipSelection::all(prefab.machine.as_ref().unwrap());
        let mut session = BakeSession::start(&mut prefab, &selection, &BakeSettings::default()).unwrap();
        assert_eq!(session.state(), BakeState::Priming);
        assert_eq!(session.bone_count(), 3);

        assert!(matches!(session.tick(&mut prefab).unwrap(), BakeStep::Primed { .. }));
        assert_eq!(session.current_clip(), Some("Idle"));
        assert!(matches!(
            session.tick(&mut prefab).unwrap(),
            BakeStep::Sampled { frame: 0, total: 16, .. }
        ));

        let (ticks, asset) = run_to_end(&mut session, &mut prefab);
        // Idle: prime + 16 + finalize, Run: prime + 9 + finalize, two ticks done above
        assert_eq!(ticks + 2, 18 + 11);
        assert_eq!(session.state(), BakeState::Idle);
        assert!(matches!(session.tick(&mut prefab).unwrap(), BakeStep::Idle));

        assert_eq!(asset.clips.len(), 2);
        let idle = &asset.clips[0];
        let run = &asset.clips[1];
        assert_eq!(idle.total_frames, 16);
        assert_eq!(idle.wrap_mode, WrapMode::Loop);
        assert_eq!(idle.events.len(), 1);
        assert_eq!(run.total_frames, 9);
        assert_eq!(run.animation_index, 16);
        assert_eq!(run.texture_index, 0);
        assert_eq!(asset.atlas.texture_count(), 1);
        assert_eq!(asset.atlas.textures[0].width, 64);
        assert_eq!(asset.atlas.block_height, 3);

        assert!(idle.root_motion);
        assert_eq!(idle.velocity.len(), 16);
        assert!((idle.angular_velocity[3].y - 90.0).abs() < 1e-3);

        // Last Idle frame: hips raised by the full clip length.
        let last = asset.atlas.read_frame(0, 15).unwrap();
        assert!((last[0].w_axis.y - 1.0).abs() < 1e-2);
        let first = asset.atlas.read_frame(0, 0).unwrap();
        assert!(first[0].w_axis.y.abs() < 1e-3);
    }

    #[test]
    fn prefab_is_restored_after_bake() {
        let mut prefab = prefab();
        let before = prefab.machine.clone();
        let selection = ClipSelection::all(prefab.machine.as_ref().unwrap());
        let mut session = BakeSession::start(&mut prefab, &selection, &BakeSettings::default()).unwrap();

        let Some(Motion::Clip(idle)) =
            &prefab.machine.as_ref().unwrap().states[0].motion
        else {
            panic!("Idle is a clip state");
        };
        assert!(idle.events.is_empty());

        run_to_end(&mut session, &mut prefab);
        assert_eq!(prefab.machine, before);
    }

    #[test]
    fn abort_restores_prefab() {
        let mut prefab = prefab();
        let before = prefab.machine.clone();
        let selection = ClipSelection::all(prefab.machine.as_ref().unwrap());
        let mut session = BakeSession::start(&mut prefab, &selection, &BakeSettings::default()).unwrap();
        session.tick(&mut prefab).unwrap();
        session.abort(&mut prefab);
        assert_eq!(prefab.machine, before);
    }

    #[test]
    fn authoring_errors() {
        let mut no_component = prefab();
        no_component.instancing = false;
        let err = BakeSession::start(&mut no_component, &ClipSelection::new(), &BakeSettings::default())
            .err()
            .unwrap();
        assert!(matches!(err, HordeError::MissingInstancingComponent(_)));

        let mut no_machine = prefab();
        no_machine.machine = None;
        let err = BakeSession::start(&mut no_machine, &ClipSelection::new(), &BakeSettings::default())
            .err()
            .unwrap();
        assert!(matches!(err, HordeError::MissingStateMachine(_)));

        let mut nothing = prefab();
        let err = BakeSession::start(&mut nothing, &ClipSelection::new(), &BakeSettings::default())
            .err()
            .unwrap();
        assert!(matches!(err, HordeError::NothingToBake));
    }

    #[test]
    fn capacity_is_checked_before_sampling() {
        let mut prefab = prefab();
        prefab
            .machine
            .as_mut()
            .unwrap()
            .states
            .push(AnimState::with_clip("Cutscene", 33, SourceClip::new("Cutscene", 1000.0)));
        let before = prefab.machine.clone();
        let selection = ClipSelection::all(prefab.machine.as_ref().unwrap());
        let settings = BakeSettings {
            fps: 120,
            ..Default::default()
        };

        let err = BakeSession::start(&mut prefab, &selection, &settings).err().unwrap();
        assert!(matches!(err, HordeError::ClipExceedsTexture { clip: 2, .. }));
        assert_eq!(prefab.machine, before);
    }

    #[test]
    fn bake_to_file_writes_loadable_asset() {
        let mut prefab = prefab();
        let selection = ClipSelection::all(prefab.machine.as_ref().unwrap());
        let path = std::env::temp_dir().join(format!("horde_bake_{}.bytes", std::process::id()));

        let asset = bake_to_file(&mut prefab, &selection, &BakeSettings::default(), &path).unwrap();
        let loaded = AnimationAsset::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded, asset);
    }
}
