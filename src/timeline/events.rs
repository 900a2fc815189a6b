//! Playback notifications for external listeners, plus an optional in-memory trace.

use serde::Serialize;

use super::action::{ExitReason, LifecyclePhase};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlaybackEvent {
    SkillStarted {
        skill: String,
    },
    SkillFinished {
        skill: String,
    },
    SkillStopped {
        skill: String,
        frame: u32,
    },
    SkillLooped {
        skill: String,
        loop_count: u32,
    },
    SkillPaused {
        frame: u32,
    },
    SkillResumed {
        frame: u32,
    },
    FrameChanged {
        frame: u32,
    },
    Seeked {
        from: u32,
        to: u32,
    },
    ActionInitialized {
        track: usize,
        action: usize,
    },
    ActionExecuted {
        track: usize,
        action: usize,
        name: String,
        kind: &'static str,
        frame: u32,
    },
    ActionTicked {
        track: usize,
        action: usize,
        relative_frame: u32,
    },
    ActionExited {
        track: usize,
        action: usize,
        reason: ExitReason,
    },
    ActionFault {
        track: usize,
        action: usize,
        phase: LifecyclePhase,
        message: String,
    },
}

impl PlaybackEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SkillStarted { .. } => "skill_started",
            Self::SkillFinished { .. } => "skill_finished",
            Self::SkillStopped { .. } => "skill_stopped",
            Self::SkillLooped { .. } => "skill_looped",
            Self::SkillPaused { .. } => "skill_paused",
            Self::SkillResumed { .. } => "skill_resumed",
            Self::FrameChanged { .. } => "frame_changed",
            Self::Seeked { .. } => "seeked",
            Self::ActionInitialized { .. } => "action_initialized",
            Self::ActionExecuted { .. } => "action_executed",
            Self::ActionTicked { .. } => "action_ticked",
            Self::ActionExited { .. } => "action_exited",
            Self::ActionFault { .. } => "action_fault",
        }
    }

    /// `(track, action)` for action-scoped events.
    pub fn action_ref(&self) -> Option<(usize, usize)> {
        match self {
            Self::ActionInitialized { track, action }
            | Self::ActionExecuted { track, action, .. }
            | Self::ActionTicked { track, action, .. }
            | Self::ActionExited { track, action, .. }
            | Self::ActionFault { track, action, .. } => Some((*track, *action)),
            _ => None,
        }
    }
}

/// Fire-and-forget sink. Listeners observe playback; they never steer it
/// directly (post to the player's command queue instead).
pub trait PlaybackListener {
    fn on_event(&mut self, event: &PlaybackEvent);
}

impl<F> PlaybackListener for F
where
    F: FnMut(&PlaybackEvent),
{
    fn on_event(&mut self, event: &PlaybackEvent) {
        self(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceMode {
    #[default]
    Off,
    Events,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceEntry {
    /// Playhead at the time the event was emitted.
    pub frame: u32,
    #[serde(flatten)]
    pub event: PlaybackEvent,
}

#[derive(Debug, Clone, Default)]
pub struct TraceCollector {
    mode: TraceMode,
    entries: Vec<TraceEntry>,
}

impl TraceCollector {
    pub fn new(mode: TraceMode) -> Self {
        Self {
            mode,
            entries: Vec::new(),
        }
    }

    pub fn mode(&self) -> TraceMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: TraceMode) {
        self.mode = mode;
    }

    pub fn record(&mut self, frame: u32, event: &PlaybackEvent) {
        if self.mode == TraceMode::Events {
            self.entries.push(TraceEntry {
                frame,
                event: event.clone(),
            });
        }
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    pub fn take(&mut self) -> Vec<TraceEntry> {
        std::mem::take(&mut self.entries)
    }

    pub fn count(&self, name: &str) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.event.name() == name)
            .count()
    }
}
