//! Per-instance playback state.
//!
//! The position inside a clip is a fractional frame. It advances by
//! `dt * fps * speed` each tick and is wrapped according to the clip's
//! [`WrapMode`]:
//!
//! | Mode | End of clip |
//! |------|-------------|
//! | `Loop` | wraps to the start |
//! | `PingPong` | reflects and plays backwards |
//! | `Once` / `Default` | clamps to the last frame and pauses |
//! | `ClampForever` | clamps to the last frame and keeps playing |

use horde_assets::clip::{AnimationClipInfo, WrapMode};

/// The three per-instance values the skinning shader reads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameScalars {
    /// Absolute frame block: clip start block + local frame.
    pub frame_index: f32,
    /// Absolute frame block of the clip being faded out, or `-1`.
    pub prev_frame_index: f32,
    /// Blend weight of the current clip, `0..=1`.
    pub transition_progress: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Playback {
    clip: Option<usize>,
    frame: f32,
    pub speed: f32,
    paused: bool,
    reverse: bool,
    /// Events sitting exactly on the start frame fire on the first advance.
    fresh: bool,
    previous: Option<(usize, f32)>,
    transition_duration: f32,
    transition_elapsed: f32,
}

impl Default for Playback {
    fn default() -> Self {
        Self {
            clip: None,
            frame: 0.0,
            speed: 1.0,
            paused: false,
            reverse: false,
            fresh: false,
            previous: None,
            transition_duration: 0.0,
            transition_elapsed: 0.0,
        }
    }
}

impl Playback {
    #[must_use]
    pub fn new(speed: f32) -> Self {
        Self {
            speed,
            ..Default::default()
        }
    }

    /// Index of the clip being played.
    #[inline]
    #[must_use]
    pub fn clip(&self) -> Option<usize> {
        self.clip
    }

    #[inline]
    #[must_use]
    pub fn frame(&self) -> f32 {
        self.frame
    }

    #[inline]
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    #[inline]
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.clip.is_some()
    }

    /// The clip being faded out and its frozen frame.
    #[inline]
    #[must_use]
    pub fn previous(&self) -> Option<(usize, f32)> {
        self.previous
    }

    /// Switches to `clip` immediately, dropping any running transition.
    pub fn play(&mut self, clip: usize) {
        self.previous = None;
        self.transition_elapsed = 0.0;
        self.start(clip);
    }

    /// Blends from the current clip into `clip` over `duration` seconds.
    ///
    /// Falls back to [`play`](Self::play) when nothing is playing or the
    /// duration is not positive.
    pub fn cross_fade(&mut self, clip: usize, duration: f32) {
        match self.clip {
            Some(current) if duration > 0.0 => {
                self.previous = Some((current, self.frame));
                self.transition_duration = duration;
                self.transition_elapsed = 0.0;
                self.start(clip);
            }
            _ => self.play(clip),
        }
    }

    fn start(&mut self, clip: usize) {
        self.clip = Some(clip);
        self.frame = 0.0;
        self.paused = false;
        self.reverse = false;
        self.fresh = true;
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Stops playback. A stopped instance is not drawn.
    pub fn stop(&mut self) {
        self.clip = None;
        self.previous = None;
        self.paused = false;
        self.frame = 0.0;
    }

    /// Blend weight of the current clip. `0` when no transition runs.
    #[must_use]
    pub fn transition_progress(&self) -> f32 {
        if self.previous.is_none() || self.transition_duration <= 0.0 {
            return 0.0;
        }
        (self.transition_elapsed / self.transition_duration).clamp(0.0, 1.0)
    }

    /// Shader inputs for the current state, `None` when stopped.
    #[must_use]
    pub fn frame_scalars(&self, clips: &[AnimationClipInfo]) -> Option<FrameScalars> {
        let current = clips.get(self.clip?)?;
        let prev_frame_index = self
            .previous
            .and_then(|(i, f)| clips.get(i).map(|c| c.animation_index as f32 + f))
            .unwrap_or(-1.0);

        Some(FrameScalars {
            frame_index: current.animation_index as f32 + self.frame,
            prev_frame_index,
            transition_progress: self.transition_progress(),
        })
    }

    /// Advances by `dt` seconds through `clip`.
    ///
    /// Indices of the clip events crossed on the way are pushed to `fired`.
    pub fn advance(&mut self, clip: &AnimationClipInfo, dt: f32, fired: &mut Vec<usize>) {
        self.advance_transition(dt);

        if self.paused || self.clip.is_none() {
            return;
        }

        let last = clip.last_frame();
        let direction = if self.reverse { -1.0 } else { 1.0 };
        let step = dt * clip.fps as f32 * self.speed * direction;
        let from = self.frame;
        let to = from + step;

        if last <= 0.0 {
            self.frame = 0.0;
            self.collect(clip, from, from, fired);
            return;
        }

        match clip.wrap_mode {
            WrapMode::Loop => {
                if to >= last {
                    self.collect(clip, from, last, fired);
                    self.frame = to.rem_euclid(last);
                    self.fresh = true;
                    self.collect(clip, 0.0, self.frame, fired);
                } else if to < 0.0 {
                    self.collect(clip, from, 0.0, fired);
                    self.frame = to.rem_euclid(last);
                    self.collect(clip, last, self.frame, fired);
                } else {
                    self.frame = to;
                    self.collect(clip, from, to, fired);
                }
            }
            WrapMode::PingPong => {
                if to > last {
                    self.collect(clip, from, last, fired);
                    self.frame = (2.0 * last - to).clamp(0.0, last);
                    self.reverse = !self.reverse;
                    self.collect(clip, last, self.frame, fired);
                } else if to < 0.0 {
                    self.collect(clip, from, 0.0, fired);
                    self.frame = (-to).clamp(0.0, last);
                    self.reverse = !self.reverse;
                    self.collect(clip, 0.0, self.frame, fired);
                } else {
                    self.frame = to;
                    self.collect(clip, from, to, fired);
                }
            }
            WrapMode::Once | WrapMode::Default => {
                self.frame = to.clamp(0.0, last);
                self.collect(clip, from, self.frame, fired);
                if to >= last || (step < 0.0 && to <= 0.0) {
                    self.paused = true;
                }
            }
            WrapMode::ClampForever => {
                self.frame = to.clamp(0.0, last);
                self.collect(clip, from, self.frame, fired);
            }
        }
    }

    fn advance_transition(&mut self, dt: f32) {
        if self.previous.is_none() {
            return;
        }
        self.transition_elapsed += dt;
        if self.transition_elapsed >= self.transition_duration {
            self.previous = None;
            self.transition_elapsed = 0.0;
        }
    }

    /// Pushes events whose frame lies in `(from, to]` going forward or
    /// `[to, from)` going backward. A fresh start includes `from` itself.
    fn collect(&mut self, clip: &AnimationClipInfo, from: f32, to: f32, fired: &mut Vec<usize>) {
        let include_start = std::mem::take(&mut self.fresh);

        for (i, event) in clip.events.iter().enumerate() {
            let f = event.frame(clip.fps);
            let hit = if to >= from {
                let past_start = if include_start { f >= from } else { f > from };
                past_start && f <= to
            } else {
                let before_start = if include_start { f <= from } else { f < from };
                before_start && f >= to
            };
            if hit {
                fired.push(i);
            }
        }
    }
}
