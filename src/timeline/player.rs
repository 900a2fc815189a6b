//! Frame-accurate skill playback.
//!
//! Per elapsed frame the player broadcasts the frame, runs `Execute` for
//! actions starting on it, runs `ProcessLifecycle` for every action whose
//! window covers it (exiting actions on their last window frame), then
//! advances. Faults from one action are logged and reported as events; they
//! never stop siblings or the clock.

use std::sync::Arc;

use crate::entity::{EntityId, World};
use crate::error::SkillError;

use super::action::{ActionContext, ActionRuntime, ExitReason, LifecyclePhase, LifecycleState};
use super::clock::FrameClock;
use super::command::{CommandQueue, CommandSender, PlayerCommand};
use super::events::{PlaybackEvent, PlaybackListener, TraceCollector, TraceEntry, TraceMode};
use super::skill::SkillData;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Playing,
    Paused,
    Finished,
    Stopped,
}

impl PlayerState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Finished => "finished",
            Self::Stopped => "stopped",
        }
    }

    pub const fn is_running(self) -> bool {
        matches!(self, Self::Playing | Self::Paused)
    }
}

#[derive(Debug, Clone, Copy)]
enum Call {
    Initialize,
    Execute,
    Process(u32),
    Exit(ExitReason),
}

pub struct SkillPlayer {
    caster: EntityId,
    targets: Vec<EntityId>,
    skill: Option<Arc<SkillData>>,
    state: PlayerState,
    clock: FrameClock,
    current_frame: u32,
    total_frames: u32,
    looping: bool,
    speed: f64,
    loop_count: u32,
    runtimes: Vec<ActionRuntime>,
    commands: CommandQueue,
    listeners: Vec<Box<dyn PlaybackListener + Send>>,
    trace: TraceCollector,
}

impl SkillPlayer {
    pub fn new(caster: EntityId) -> Self {
        Self {
            caster,
            targets: Vec::new(),
            skill: None,
            state: PlayerState::Idle,
            clock: FrameClock::new(1.0),
            current_frame: 0,
            total_frames: 0,
            looping: false,
            speed: 1.0,
            loop_count: 0,
            runtimes: Vec::new(),
            commands: CommandQueue::new(),
            listeners: Vec::new(),
            trace: TraceCollector::default(),
        }
    }

    pub fn with_targets(mut self, targets: Vec<EntityId>) -> Self {
        self.targets = targets;
        self
    }

    pub fn set_targets(&mut self, targets: Vec<EntityId>) {
        self.targets = targets;
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    /// Playback speed multiplier applied to every `update` delta.
    pub fn set_speed(&mut self, speed: f64) {
        if speed.is_finite() && speed >= 0.0 {
            self.speed = speed;
        } else {
            tracing::debug!(speed, "ignoring invalid playback speed");
        }
    }

    pub fn set_trace_mode(&mut self, mode: TraceMode) {
        self.trace.set_mode(mode);
    }

    pub fn add_listener<L>(&mut self, listener: L)
    where
        L: PlaybackListener + Send + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    pub fn command_sender(&self) -> CommandSender {
        self.commands.sender()
    }

    pub fn caster(&self) -> EntityId {
        self.caster
    }

    pub fn targets(&self) -> &[EntityId] {
        &self.targets
    }

    pub fn skill(&self) -> Option<&Arc<SkillData>> {
        self.skill.as_ref()
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn current_frame(&self) -> u32 {
        self.current_frame
    }

    pub fn total_frames(&self) -> u32 {
        self.total_frames
    }

    pub fn loop_count(&self) -> u32 {
        self.loop_count
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn runtimes(&self) -> &[ActionRuntime] {
        &self.runtimes
    }

    pub fn runtime(&self, track: usize, action: usize) -> Option<&ActionRuntime> {
        self.runtimes
            .iter()
            .find(|runtime| runtime.track == track && runtime.action == action)
    }

    pub fn trace(&self) -> &TraceCollector {
        &self.trace
    }

    pub fn take_trace(&mut self) -> Vec<TraceEntry> {
        self.trace.take()
    }

    /// Binds `skill` to this player. Only valid while nothing is playing.
    pub fn load(&mut self, skill: Arc<SkillData>) -> Result<(), SkillError> {
        if self.state.is_running() {
            return Err(SkillError::InvalidState(self.state.as_str()));
        }
        skill.validate_frame_rate()?;
        let total = skill.effective_duration();
        if total == 0 {
            return Err(SkillError::EmptyTimeline {
                skill: skill.id.clone(),
            });
        }
        if skill.total_duration < total {
            tracing::warn!(
                skill = %skill.id,
                authored = skill.total_duration,
                required = total,
                "total duration shorter than action windows, extending"
            );
        }

        self.runtimes = skill
            .enabled_actions()
            .map(|(track, action, _)| ActionRuntime::new(track, action))
            .collect();
        self.clock = FrameClock::new(skill.frame_rate);
        self.current_frame = 0;
        self.total_frames = total;
        self.loop_count = 0;
        self.state = PlayerState::Idle;
        tracing::debug!(skill = %skill.id, frames = total, actions = self.runtimes.len(), "skill loaded");
        self.skill = Some(skill);
        Ok(())
    }

    /// Starts a fresh pass from frame 0. Ignored while already playing or paused.
    pub fn play(&mut self, world: &mut dyn World) -> bool {
        if self.state.is_running() {
            tracing::debug!(state = self.state.as_str(), "play ignored");
            return false;
        }
        let Some(skill) = self.skill.clone() else {
            tracing::debug!("play ignored, no skill loaded");
            return false;
        };
        self.current_frame = 0;
        self.loop_count = 0;
        self.clock.reset();
        self.initialize_all(&skill, world);
        self.state = PlayerState::Playing;
        self.emit(PlaybackEvent::SkillStarted {
            skill: skill.id.clone(),
        });
        true
    }

    /// Advances playback by `delta` seconds. Returns the number of frames processed.
    pub fn update(&mut self, delta: f64, world: &mut dyn World) -> u32 {
        self.apply_commands(world);
        if self.state != PlayerState::Playing {
            return 0;
        }
        let Some(skill) = self.skill.clone() else {
            return 0;
        };
        let frames = self.clock.advance(delta * self.speed);
        let mut processed = 0;
        for _ in 0..frames {
            if self.state != PlayerState::Playing {
                break;
            }
            self.step_frame(&skill, world);
            processed += 1;
        }
        processed
    }

    /// Force-exits every tracked action and stops. Ignored when not playing or paused.
    pub fn stop(&mut self, world: &mut dyn World) -> bool {
        if !self.state.is_running() {
            tracing::debug!(state = self.state.as_str(), "stop ignored");
            return false;
        }
        let Some(skill) = self.skill.clone() else {
            return false;
        };
        self.exit_all(&skill, ExitReason::Stopped, world);
        self.state = PlayerState::Stopped;
        self.emit(PlaybackEvent::SkillStopped {
            skill: skill.id.clone(),
            frame: self.current_frame,
        });
        true
    }

    pub fn pause(&mut self) -> bool {
        if self.state != PlayerState::Playing {
            tracing::debug!(state = self.state.as_str(), "pause ignored");
            return false;
        }
        self.state = PlayerState::Paused;
        self.emit(PlaybackEvent::SkillPaused {
            frame: self.current_frame,
        });
        true
    }

    pub fn resume(&mut self) -> bool {
        if self.state != PlayerState::Paused {
            tracing::debug!(state = self.state.as_str(), "resume ignored");
            return false;
        }
        self.state = PlayerState::Playing;
        self.emit(PlaybackEvent::SkillResumed {
            frame: self.current_frame,
        });
        true
    }

    /// Moves the playhead to `frame`, clamped to the timeline.
    ///
    /// Actions whose start frame already passed are processed at the new
    /// frame without `Execute`; actions left behind are force-exited and stay
    /// exited for the rest of the pass. Actions starting exactly on `frame`
    /// are left to the next `update`.
    pub fn set_frame(&mut self, frame: u32, world: &mut dyn World) -> bool {
        if !self.state.is_running() {
            tracing::debug!(state = self.state.as_str(), frame, "seek ignored");
            return false;
        }
        let Some(skill) = self.skill.clone() else {
            return false;
        };
        let target = frame.min(self.total_frames.saturating_sub(1));
        if target != frame {
            tracing::debug!(requested = frame, clamped = target, "seek clamped");
        }
        let from = self.current_frame;

        for idx in 0..self.runtimes.len() {
            let runtime = &self.runtimes[idx];
            if !runtime.is_tracked() {
                continue;
            }
            let Some(action) = skill.action(runtime.track, runtime.action) else {
                continue;
            };
            if action.is_active_at(target) {
                if action.frame < target {
                    self.runtimes[idx].skip_execute();
                    self.invoke(&skill, idx, Call::Process(target), world);
                }
            } else if target >= action.window_end()
                || runtime.state() == LifecycleState::Active
                || runtime.executed()
            {
                self.invoke(&skill, idx, Call::Exit(ExitReason::Seek), world);
            }
        }

        self.current_frame = target;
        self.clock.reset();
        self.emit(PlaybackEvent::Seeked { from, to: target });
        true
    }

    fn apply_commands(&mut self, world: &mut dyn World) {
        for command in self.commands.drain() {
            match command {
                PlayerCommand::RequestFrameJump(frame) => {
                    self.set_frame(frame, world);
                }
                PlayerCommand::RequestStop => {
                    self.stop(world);
                }
                PlayerCommand::RequestPause => {
                    self.pause();
                }
                PlayerCommand::RequestResume => {
                    self.resume();
                }
            }
        }
    }

    fn step_frame(&mut self, skill: &Arc<SkillData>, world: &mut dyn World) {
        let frame = self.current_frame;
        self.emit(PlaybackEvent::FrameChanged { frame });

        for idx in 0..self.runtimes.len() {
            let runtime = &self.runtimes[idx];
            let due = skill
                .action(runtime.track, runtime.action)
                .is_some_and(|action| action.frame == frame);
            if due && runtime.is_tracked() && !runtime.executed() {
                self.invoke(skill, idx, Call::Execute, world);
            }
        }

        for idx in 0..self.runtimes.len() {
            let runtime = &self.runtimes[idx];
            if !runtime.is_tracked() {
                continue;
            }
            let Some(action) = skill.action(runtime.track, runtime.action) else {
                continue;
            };
            if action.is_active_at(frame) {
                self.invoke(skill, idx, Call::Process(frame), world);
                if frame + 1 >= action.window_end() {
                    self.invoke(skill, idx, Call::Exit(ExitReason::Completed), world);
                }
            } else if frame >= action.window_end() {
                self.invoke(skill, idx, Call::Exit(ExitReason::Completed), world);
            }
        }

        self.current_frame += 1;
        if self.current_frame >= self.total_frames {
            self.finish_pass(skill, world);
        }
    }

    fn finish_pass(&mut self, skill: &Arc<SkillData>, world: &mut dyn World) {
        if self.looping {
            self.exit_all(skill, ExitReason::Looped, world);
            self.loop_count += 1;
            self.emit(PlaybackEvent::SkillLooped {
                skill: skill.id.clone(),
                loop_count: self.loop_count,
            });
            self.current_frame = 0;
            self.initialize_all(skill, world);
        } else {
            self.exit_all(skill, ExitReason::Finished, world);
            self.state = PlayerState::Finished;
            self.emit(PlaybackEvent::SkillFinished {
                skill: skill.id.clone(),
            });
        }
    }

    fn initialize_all(&mut self, skill: &Arc<SkillData>, world: &mut dyn World) {
        for idx in 0..self.runtimes.len() {
            self.invoke(skill, idx, Call::Initialize, world);
        }
    }

    fn exit_all(&mut self, skill: &Arc<SkillData>, reason: ExitReason, world: &mut dyn World) {
        for idx in 0..self.runtimes.len() {
            if self.runtimes[idx].is_tracked() {
                self.invoke(skill, idx, Call::Exit(reason), world);
            }
        }
    }

    /// Runs one lifecycle callback, capturing any fault at this boundary.
    fn invoke(&mut self, skill: &SkillData, idx: usize, call: Call, world: &mut dyn World) {
        let runtime = &mut self.runtimes[idx];
        let (track, action_index) = (runtime.track, runtime.action);
        let Some(action) = skill.action(track, action_index) else {
            tracing::warn!(skill = %skill.id, track, action = action_index, "action missing from skill data, skipping");
            return;
        };
        if let Call::Process(frame) = call {
            if runtime.last_processed() == Some(frame) {
                return;
            }
        }

        let mut ctx = ActionContext {
            caster: self.caster,
            targets: &self.targets,
            world,
        };
        let (phase, result) = match call {
            Call::Initialize => (LifecyclePhase::Initialize, runtime.initialize(action)),
            Call::Execute => (LifecyclePhase::Execute, runtime.execute(action, &mut ctx)),
            Call::Process(frame) => (
                LifecyclePhase::Process,
                runtime.process(action, frame, &mut ctx),
            ),
            Call::Exit(_) => (LifecyclePhase::Exit, runtime.exit(action, &mut ctx)),
        };

        let event = match call {
            Call::Initialize => PlaybackEvent::ActionInitialized {
                track,
                action: action_index,
            },
            Call::Execute => PlaybackEvent::ActionExecuted {
                track,
                action: action_index,
                name: action.name.clone(),
                kind: action.kind.kind_name(),
                frame: self.current_frame,
            },
            Call::Process(frame) => PlaybackEvent::ActionTicked {
                track,
                action: action_index,
                relative_frame: frame.saturating_sub(action.frame),
            },
            Call::Exit(reason) => PlaybackEvent::ActionExited {
                track,
                action: action_index,
                reason,
            },
        };
        let fault = result.err().map(|error| {
            tracing::warn!(
                skill = %skill.id,
                track,
                action = action_index,
                name = %action.name,
                phase = ?phase,
                error = %error,
                "action callback failed"
            );
            PlaybackEvent::ActionFault {
                track,
                action: action_index,
                phase,
                message: error.to_string(),
            }
        });

        self.emit(event);
        if let Some(fault) = fault {
            self.emit(fault);
        }
    }

    fn emit(&mut self, event: PlaybackEvent) {
        self.trace.record(self.current_frame, &event);
        for listener in &mut self.listeners {
            listener.on_event(&event);
        }
    }
}
