//! Skill timeline: authored data, the fixed-step clock, per-playback action
//! state and the player that drives them.

pub mod action;
pub mod clock;
pub mod command;
pub mod events;
pub mod player;
pub mod skill;

pub use action::{ActionContext, ActionRuntime, ExitReason, LifecyclePhase, LifecycleState};
pub use clock::{interval_reached, FrameClock, TIME_EPSILON};
pub use command::{CommandQueue, CommandSender, PlayerCommand};
pub use events::{PlaybackEvent, PlaybackListener, TraceCollector, TraceEntry, TraceMode};
pub use player::{PlayerState, SkillPlayer};
pub use skill::{
    Action, ActionKind, ActionTarget, AreaAction, BuffAction, CameraAction, DamageAction, Easing,
    HealAction, MovementAction, ProjectileAction, ShieldAction, SkillData, Track,
};
