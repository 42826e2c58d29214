//! Avatar animation selection (idle / walk / jump) with two-clip crossfades.
#![forbid(unsafe_code)]

use rapier3d::math::Real;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AnimationState {
    Idle,
    Walk,
    Jump,
}

impl AnimationState {
    pub const ALL: [AnimationState; 3] = [Self::Idle, Self::Walk, Self::Jump];

    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Walk => "walk",
            Self::Jump => "jump",
        }
    }

    /// Airborne always jumps; on the ground any movement input walks.
    pub fn select(grounded: bool, moving: bool) -> Self {
        match (grounded, moving) {
            (false, _) => Self::Jump,
            (true, true) => Self::Walk,
            (true, false) => Self::Idle,
        }
    }

    fn index(self) -> usize {
        match self {
            Self::Idle => 0,
            Self::Walk => 1,
            Self::Jump => 2,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClipInfo {
    pub name: String,
    /// Loop length in seconds; zero-length clips hold their first frame.
    pub duration: Real,
}

impl ClipInfo {
    pub fn new(name: impl Into<String>, duration: Real) -> Self {
        Self {
            name: name.into(),
            duration,
        }
    }
}

/// The three clips delivered with the avatar model.
#[derive(Clone, Debug, PartialEq)]
pub struct AnimationClips {
    pub idle: ClipInfo,
    pub walk: ClipInfo,
    pub jump: ClipInfo,
}

impl AnimationClips {
    pub fn get(&self, state: AnimationState) -> &ClipInfo {
        match state {
            AnimationState::Idle => &self.idle,
            AnimationState::Walk => &self.walk,
            AnimationState::Jump => &self.jump,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        for state in AnimationState::ALL {
            let clip = self.get(state);
            if clip.name.trim().is_empty() {
                return Err(format!("{} clip has no name", state.name()));
            }
            if !clip.duration.is_finite() || clip.duration < 0.0 {
                return Err(format!(
                    "{} clip '{}' has invalid duration {}",
                    state.name(),
                    clip.name,
                    clip.duration
                ));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct FadeTimer {
    from: Real,
    to: Real,
    elapsed: Real,
    duration: Real,
}

/// Playback handle for one clip: loop time, blend weight and an optional fade.
#[derive(Clone, Debug, PartialEq)]
pub struct ClipTrack {
    clip: ClipInfo,
    weight: Real,
    time: Real,
    playing: bool,
    fade: Option<FadeTimer>,
}

impl ClipTrack {
    fn new(clip: ClipInfo) -> Self {
        Self {
            clip,
            weight: 0.0,
            time: 0.0,
            playing: false,
            fade: None,
        }
    }

    pub fn clip(&self) -> &ClipInfo {
        &self.clip
    }

    pub fn weight(&self) -> Real {
        self.weight
    }

    pub fn time(&self) -> Real {
        self.time
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_fading(&self) -> bool {
        self.fade.is_some()
    }

    fn start(&mut self) {
        self.time = 0.0;
        self.weight = 1.0;
        self.playing = true;
        self.fade = None;
    }

    fn stop(&mut self) {
        self.time = 0.0;
        self.weight = 0.0;
        self.playing = false;
        self.fade = None;
    }

    fn fade_to(&mut self, target: Real, duration: Real) {
        if target > 0.0 {
            // Incoming clips restart from their first frame.
            self.time = 0.0;
            self.playing = true;
        }
        if duration <= 0.0 {
            self.weight = target;
            self.fade = None;
            self.playing = target > 0.0;
            return;
        }
        self.fade = Some(FadeTimer {
            from: self.weight,
            to: target,
            elapsed: 0.0,
            duration,
        });
    }

    fn advance(&mut self, dt: Real) {
        if !self.playing {
            return;
        }
        self.time += dt;
        if self.clip.duration > 0.0 {
            self.time %= self.clip.duration;
        } else {
            self.time = 0.0;
        }
        if let Some(mut fade) = self.fade {
            fade.elapsed = (fade.elapsed + dt).min(fade.duration);
            let t = fade.elapsed / fade.duration;
            self.weight = fade.from + (fade.to - fade.from) * t;
            if fade.elapsed >= fade.duration {
                self.weight = fade.to;
                self.fade = None;
                if fade.to <= 0.0 {
                    self.playing = false;
                }
            } else {
                self.fade = Some(fade);
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub from: AnimationState,
    pub to: AnimationState,
}

pub struct AnimationStateMachine {
    tracks: [ClipTrack; 3],
    current: AnimationState,
    fade_duration: Real,
}

impl AnimationStateMachine {
    /// Starts in idle at full weight.
    pub fn new(clips: AnimationClips, fade_duration: Real) -> Self {
        let AnimationClips { idle, walk, jump } = clips;
        let mut machine = Self {
            tracks: [ClipTrack::new(idle), ClipTrack::new(walk), ClipTrack::new(jump)],
            current: AnimationState::Idle,
            fade_duration: fade_duration.max(0.0),
        };
        machine.tracks[AnimationState::Idle.index()].start();
        machine
    }

    pub fn current(&self) -> AnimationState {
        self.current
    }

    pub fn fade_duration(&self) -> Real {
        self.fade_duration
    }

    pub fn track(&self, state: AnimationState) -> &ClipTrack {
        &self.tracks[state.index()]
    }

    pub fn weight(&self, state: AnimationState) -> Real {
        self.track(state).weight()
    }

    /// Advances playback by `dt`, then applies the state rule. Returns the
    /// transition when the selected state differs from the current one.
    pub fn update(&mut self, dt: Real, grounded: bool, moving: bool) -> Option<Transition> {
        for track in &mut self.tracks {
            track.advance(dt);
        }
        let next = AnimationState::select(grounded, moving);
        if next == self.current {
            return None;
        }
        let from = self.current;
        self.tracks[from.index()].fade_to(0.0, self.fade_duration);
        self.tracks[next.index()].fade_to(1.0, self.fade_duration);
        self.current = next;
        Some(Transition { from, to: next })
    }

    /// Snaps back to idle without a fade.
    pub fn reset(&mut self) {
        for track in &mut self.tracks {
            track.stop();
        }
        self.tracks[AnimationState::Idle.index()].start();
        self.current = AnimationState::Idle;
    }
}
