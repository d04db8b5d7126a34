//! Animation State Graph
//!
//! A data mirror of the host's animation state machine: states, their
//! motions, transitions and nested sub-machines. The baker walks it to find
//! clips and temporarily strips events and transitions while sampling.

use horde_assets::clip::{AnimationEvent, WrapMode};
use rustc_hash::{FxHashMap, FxHashSet};

/// An authored clip as the host describes it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceClip {
    pub name: String,
    /// Seconds.
    pub length: f32,
    pub looping: bool,
    pub wrap_mode: WrapMode,
    pub events: Vec<AnimationEvent>,
}

impl SourceClip {
    #[must_use]
    pub fn new(name: impl Into<String>, length: f32) -> Self {
        Self {
            name: name.into(),
            length,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn looping(mut self) -> Self {
        self.looping = true;
        self
    }

    /// Looping clips are always baked as [`WrapMode::Loop`].
    #[must_use]
    pub fn baked_wrap_mode(&self) -> WrapMode {
        if self.looping {
            WrapMode::Loop
        } else {
            self.wrap_mode
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Motion {
    Clip(SourceClip),
    /// Blend trees are never baked directly.
    BlendTree(Vec<SourceClip>),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transition {
    pub destination: String,
    pub duration: f32,
    pub exit_time: Option<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnimState {
    pub name: String,
    pub name_hash: i32,
    pub motion: Option<Motion>,
    pub transitions: Vec<Transition>,
}

impl AnimState {
    #[must_use]
    pub fn with_clip(name: impl Into<String>, name_hash: i32, clip: SourceClip) -> Self {
        Self {
            name: name.into(),
            name_hash,
            motion: Some(Motion::Clip(clip)),
            transitions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateMachine {
    pub name: String,
    pub states: Vec<AnimState>,
    pub sub_machines: Vec<StateMachine>,
}

/// Location of a state: sub-machine indices from the root, then the state index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatePath {
    pub machines: Vec<usize>,
    pub state: usize,
}

impl StateMachine {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    fn machine_mut(&mut self, path: &[usize]) -> Option<&mut StateMachine> {
        let mut m = self;
        for &i in path {
            m = m.sub_machines.get_mut(i)?;
        }
        Some(m)
    }

    pub fn state_mut(&mut self, path: &StatePath) -> Option<&mut AnimState> {
        self.machine_mut(&path.machines)?.states.get_mut(path.state)
    }

    /// Visits every state depth-first: a machine's own states before its
    /// sub-machines, sub-machines in declaration order.
    pub fn visit_states<'a>(&'a self, mut visit: impl FnMut(StatePath, &'a AnimState)) {
        let mut stack: Vec<(Vec<usize>, &StateMachine)> = vec![(Vec::new(), self)];

        while let Some((path, machine)) = stack.pop() {
            for (i, state) in machine.states.iter().enumerate() {
                visit(
                    StatePath {
                        machines: path.clone(),
                        state: i,
                    },
                    state,
                );
            }
            for (i, sub) in machine.sub_machines.iter().enumerate().rev() {
                let mut sub_path = path.clone();
                sub_path.push(i);
                stack.push((sub_path, sub));
            }
        }
    }
}

/// Which clips the user asked to bake, plus the attachment bones to expose.
///
/// Clips missing from the selection are not baked.
#[derive(Debug, Clone, Default)]
pub struct ClipSelection {
    clips: FxHashMap<String, bool>,
    pub attachment_bones: Vec<String>,
}

impl ClipSelection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects every single-clip state in the machine.
    #[must_use]
    pub fn all(machine: &StateMachine) -> Self {
        let mut selection = Self::new();
        machine.visit_states(|_, state| {
            if let Some(Motion::Clip(clip)) = &state.motion {
                selection.clips.insert(clip.name.clone(), true);
            }
        });
        selection
    }

    pub fn set(&mut self, clip: impl Into<String>, selected: bool) -> &mut Self {
        self.clips.insert(clip.into(), selected);
        self
    }

    #[must_use]
    pub fn with_attachment_bone(mut self, bone: impl Into<String>) -> Self {
        self.attachment_bones.push(bone.into());
        self
    }

    #[must_use]
    pub fn is_selected(&self, clip: &str) -> bool {
        self.clips.get(clip).copied().unwrap_or(false)
    }
}

/// Number of frames sampled for a clip: `round(length * fps) + 1`, at least 1.
#[must_use]
pub fn total_frames(length: f32, fps: u32) -> u32 {
    // Float-to-int casts saturate; negative and NaN lengths land on 0.
    let rounded = (f64::from(length) * f64::from(fps) + 0.5) as u64;
    u32::try_from(rounded.saturating_add(1)).unwrap_or(u32::MAX)
}

/// One clip queued for sampling.
#[derive(Debug, Clone, PartialEq)]
pub struct BakeJob {
    pub clip_name: String,
    pub state_hash: i32,
    pub length: f32,
    pub wrap_mode: WrapMode,
    pub events: Vec<AnimationEvent>,
    pub total_frames: u32,
    pub path: StatePath,
}

/// Flattens the graph into an ordered list of clips to sample.
///
/// Skips states without a single-clip motion, deselected clips, and clips
/// already queued under the same name.
#[must_use]
pub fn flatten(machine: &StateMachine, selection: &ClipSelection, fps: u32) -> Vec<BakeJob> {
    let mut jobs = Vec::new();
    let mut queued: FxHashSet<&str> = FxHashSet::default();

    machine.visit_states(|path, state| {
        let Some(Motion::Clip(clip)) = &state.motion else {
            return;
        };
        if !selection.is_selected(&clip.name) || !queued.insert(clip.name.as_str()) {
            return;
        }
        jobs.push(BakeJob {
            clip_name: clip.name.clone(),
            state_hash: state.name_hash,
            length: clip.length,
            wrap_mode: clip.baked_wrap_mode(),
            events: clip.events.clone(),
            total_frames: total_frames(clip.length, fps),
            path,
        });
    });

    jobs
}

/// A clip reachable from the graph, for selection UIs.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipSummary {
    pub name: String,
    pub total_frames: u32,
    /// Only reachable through a blend tree, so selecting it bakes nothing.
    pub blend_tree_only: bool,
}

/// Lists every clip in the graph once, including blend-tree children.
#[must_use]
pub fn available_clips(machine: &StateMachine, fps: u32) -> Vec<ClipSummary> {
    let mut out: Vec<ClipSummary> = Vec::new();
    let mut index: FxHashMap<String, usize> = FxHashMap::default();

    let mut add = |clip: &SourceClip, in_blend_tree: bool| {
        if let Some(&i) = index.get(&clip.name) {
            out[i].blend_tree_only &= in_blend_tree;
            return;
        }
        index.insert(clip.name.clone(), out.len());
        out.push(ClipSummary {
            name: clip.name.clone(),
            total_frames: total_frames(clip.length, fps),
            blend_tree_only: in_blend_tree,
        });
    };

    machine.visit_states(|_, state| match &state.motion {
        Some(Motion::Clip(clip)) => add(clip, false),
        Some(Motion::BlendTree(children)) => children.iter().for_each(|c| add(c, true)),
        None => {}
    });

    out
}

/// Events and transitions removed from a state while it is being sampled.
#[derive(Debug, Clone)]
pub(crate) struct StrippedState {
    path: StatePath,
    events: Vec<AnimationEvent>,
    transitions: Vec<Transition>,
}

/// Removes events and transitions from the states of `jobs`.
pub(crate) fn strip(machine: &mut StateMachine, jobs: &[BakeJob]) -> Vec<StrippedState> {
    let mut stripped = Vec::with_capacity(jobs.len());
    for job in jobs {
        let Some(state) = machine.state_mut(&job.path) else {
            continue;
        };
        let events = match &mut state.motion {
            Some(Motion::Clip(clip)) => std::mem::take(&mut clip.events),
            _ => Vec::new(),
        };
        stripped.push(StrippedState {
            path: job.path.clone(),
            events,
            transitions: std::mem::take(&mut state.transitions),
        });
    }
    stripped
}

/// Puts back what [`strip`] removed.
pub(crate) fn restore(machine: &mut StateMachine, stripped: Vec<StrippedState>) {
    for s in stripped {
        let Some(state) = machine.state_mut(&s.path) else {
            log::warn!("State {:?} vanished while baking", s.path);
            continue;
        };
        if let Some(Motion::Clip(clip)) = &mut state.motion {
            clip.events = s.events;
        }
        state.transitions = s.transitions;
    }
}
