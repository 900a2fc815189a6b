//! Buff engine: templates, live instances, effect and trigger modules, and
//! the per-target collection that resolves stacking and duration.

pub mod collection;
pub mod effects;
pub mod instance;
pub mod state_flags;
pub mod template;
pub mod triggers;

pub use collection::{ApplyOutcome, BuffCollection, BuffEvent, BuffSnapshot, RemoveReason};
pub use effects::{
    AttributeModifierEffect, EffectModule, EffectState, EffectTick, PeriodicEffect, PeriodicKind,
    ShieldEffect, ShieldType, SpecialStateEffect,
};
pub use instance::{BuffInstance, BuffInstanceId};
pub use state_flags::{StateFlag, StateFlags, StateRegistry};
pub use template::{
    BuffCategory, BuffLibrary, BuffTemplate, DispelType, DurationType, StackingType,
};
pub use triggers::{
    Comparator, Condition, ConditionMode, ConditionSubject, ConditionalTrigger, EventTrigger,
    PeriodicTrigger, ResourceKind, ThresholdDirection, ThresholdTrigger, TriggerEvent,
    TriggerEventKind, TriggerModule, TriggerState,
};
