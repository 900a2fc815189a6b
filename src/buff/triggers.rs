//! Trigger modules: conditions that re-invoke a buff's effects outside its
//! regular tick.
//!
//! Every trigger follows the same three steps: `initialize` when the
//! instance is created, `should_trigger` for each dispatched event, and
//! `execute` to commit a firing. The collection then pulses the selected
//! effects.

use serde::{Deserialize, Serialize};

use crate::entity::BuffTarget;
use crate::rng::Rng;
use crate::timeline::clock::{interval_reached, TIME_EPSILON};

use super::state_flags::StateFlag;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerEventKind {
    OnApply,
    OnTick,
    OnRemove,
    OnStackChange,
    OnDamageTaken,
    OnDamageDealt,
    OnHeal,
    OnHealthChange,
    OnShieldBroken,
    OnDispel,
}

/// One dispatched event: a single kind tag plus a numeric payload
/// (delta time for `OnTick`, amount for damage/heal, stacks for stack changes).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerEvent {
    pub kind: TriggerEventKind,
    pub value: f64,
}

impl TriggerEvent {
    pub fn new(kind: TriggerEventKind, value: f64) -> Self {
        Self { kind, value }
    }

    pub fn tick(delta: f64) -> Self {
        Self::new(TriggerEventKind::OnTick, delta)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerModule {
    Periodic(PeriodicTrigger),
    Conditional(ConditionalTrigger),
    Threshold(ThresholdTrigger),
    Event(EventTrigger),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodicTrigger {
    /// Seconds between firings.
    pub interval: f64,
    /// Seconds before the first firing. Zero means the first firing comes after one interval.
    #[serde(default)]
    pub initial_delay: f64,
    #[serde(default)]
    pub trigger_on_apply: bool,
    /// Effect indices to pulse. Empty pulses every effect.
    #[serde(default)]
    pub effects: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionMode {
    #[default]
    All,
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionSubject {
    HealthPercent,
    ShieldPercent,
    ResourcePercent,
    StackCount,
    RemainingDuration,
    /// 1.0 when the holder currently has the flag, otherwise 0.0.
    HasState(StateFlag),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    #[serde(rename = "<")]
    Less,
    #[serde(rename = "<=")]
    LessOrEqual,
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "==")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
}

impl Comparator {
    pub fn compare(self, actual: f64, expected: f64) -> bool {
        match self {
            Self::Less => actual < expected,
            Self::LessOrEqual => actual <= expected + TIME_EPSILON,
            Self::Greater => actual > expected,
            Self::GreaterOrEqual => actual + TIME_EPSILON >= expected,
            Self::Equal => (actual - expected).abs() <= TIME_EPSILON,
            Self::NotEqual => (actual - expected).abs() > TIME_EPSILON,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub subject: ConditionSubject,
    pub comparator: Comparator,
    #[serde(default)]
    pub value: f64,
    #[serde(default)]
    pub negate: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalTrigger {
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub mode: ConditionMode,
    /// Seconds between evaluations. Zero evaluates on every tick.
    #[serde(default)]
    pub check_interval: f64,
    #[serde(default)]
    pub effects: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Health,
    Shield,
    Resource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdDirection {
    Below,
    Above,
    Cross,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdTrigger {
    pub resource: ResourceKind,
    /// Fraction in `[0, 1]`.
    pub threshold: f64,
    pub direction: ThresholdDirection,
    /// After firing, ignore further crossings until the value recrosses in the opposite direction.
    #[serde(default)]
    pub only_once: bool,
    #[serde(default)]
    pub effects: Vec<usize>,
}

fn default_chance() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventTrigger {
    pub event: TriggerEventKind,
    /// Inclusive lower bound on the event value. Zero means unbounded.
    #[serde(default)]
    pub min_value: f64,
    /// Inclusive upper bound on the event value. Zero means unbounded.
    #[serde(default)]
    pub max_value: f64,
    #[serde(default = "default_chance")]
    pub chance: f64,
    /// Seconds after a firing during which the trigger stays quiet.
    #[serde(default)]
    pub cooldown: f64,
    #[serde(default)]
    pub effects: Vec<usize>,
}

/// Per-instance mutable state for one trigger module.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TriggerState {
    pub timer: f64,
    pub poll_timer: f64,
    pub was_above: Option<bool>,
    pub latched: bool,
    pub latched_downward: bool,
    pub cooldown: f64,
    pub fire_count: u32,
}

/// Read-only view a trigger evaluates against.
pub struct TriggerContext<'a> {
    pub stacks: u32,
    /// `None` for buffs that never decay.
    pub remaining: Option<f64>,
    pub target: &'a dyn BuffTarget,
    pub rng: &'a mut Rng,
}

impl TriggerModule {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Periodic(_) => "periodic",
            Self::Conditional(_) => "conditional",
            Self::Threshold(_) => "threshold",
            Self::Event(_) => "event",
        }
    }

    pub fn effect_indices(&self) -> &[usize] {
        match self {
            Self::Periodic(trigger) => &trigger.effects,
            Self::Conditional(trigger) => &trigger.effects,
            Self::Threshold(trigger) => &trigger.effects,
            Self::Event(trigger) => &trigger.effects,
        }
    }

    pub fn initialize(&self, state: &mut TriggerState) {
        *state = TriggerState::default();
        if let Self::Periodic(trigger) = self {
            if trigger.initial_delay > 0.0 {
                // First firing lands exactly `initial_delay` seconds in.
                state.timer = trigger.interval - trigger.initial_delay;
            }
        }
    }

    pub fn should_trigger(
        &self,
        state: &mut TriggerState,
        ctx: &mut TriggerContext<'_>,
        event: TriggerEvent,
    ) -> bool {
        match self {
            Self::Periodic(trigger) => trigger.should_trigger(state, event),
            Self::Conditional(trigger) => trigger.should_trigger(state, ctx, event),
            Self::Threshold(trigger) => trigger.should_trigger(state, ctx, event),
            Self::Event(trigger) => trigger.should_trigger(state, ctx, event),
        }
    }

    /// Commits a firing decided by [should_trigger](Self::should_trigger).
    pub fn execute(&self, state: &mut TriggerState, _event: TriggerEvent) {
        state.fire_count += 1;
        if let Self::Event(trigger) = self {
            state.cooldown = trigger.cooldown.max(0.0);
        }
    }
}

impl PeriodicTrigger {
    fn should_trigger(&self, state: &mut TriggerState, event: TriggerEvent) -> bool {
        match event.kind {
            TriggerEventKind::OnApply => self.trigger_on_apply,
            TriggerEventKind::OnTick => {
                if !(self.interval > 0.0) {
                    return false;
                }
                state.timer += event.value.max(0.0);
                if interval_reached(state.timer, self.interval) {
                    state.timer -= self.interval;
                    true
                } else {
                    false
                }
            }
            _ => false,
        }
    }
}

impl ConditionalTrigger {
    fn should_trigger(
        &self,
        state: &mut TriggerState,
        ctx: &TriggerContext<'_>,
        event: TriggerEvent,
    ) -> bool {
        if event.kind != TriggerEventKind::OnTick {
            return false;
        }
        if self.check_interval > 0.0 {
            state.poll_timer += event.value.max(0.0);
            if !interval_reached(state.poll_timer, self.check_interval) {
                return false;
            }
            state.poll_timer -= self.check_interval;
        }
        self.evaluate(ctx)
    }

    pub fn evaluate(&self, ctx: &TriggerContext<'_>) -> bool {
        let mut results = self.conditions.iter().map(|c| c.evaluate(ctx));
        match self.mode {
            ConditionMode::All => results.all(|r| r),
            ConditionMode::Any => results.any(|r| r),
        }
    }
}

impl Condition {
    fn evaluate(&self, ctx: &TriggerContext<'_>) -> bool {
        let actual = match self.subject {
            ConditionSubject::HealthPercent => ctx.target.health_percent(),
            ConditionSubject::ShieldPercent => ctx.target.shield_percent(),
            ConditionSubject::ResourcePercent => ctx.target.resource_percent(),
            ConditionSubject::StackCount => f64::from(ctx.stacks),
            ConditionSubject::RemainingDuration => ctx.remaining.unwrap_or(f64::INFINITY),
            ConditionSubject::HasState(flag) => {
                if ctx.target.state_flags().contains(flag.into()) {
                    1.0
                } else {
                    0.0
                }
            }
        };
        self.comparator.compare(actual, self.value) != self.negate
    }
}

impl ThresholdTrigger {
    fn sample(&self, target: &dyn BuffTarget) -> f64 {
        match self.resource {
            ResourceKind::Health => target.health_percent(),
            ResourceKind::Shield => target.shield_percent(),
            ResourceKind::Resource => target.resource_percent(),
        }
    }

    fn should_trigger(
        &self,
        state: &mut TriggerState,
        ctx: &TriggerContext<'_>,
        event: TriggerEvent,
    ) -> bool {
        if !matches!(
            event.kind,
            TriggerEventKind::OnTick | TriggerEventKind::OnHealthChange | TriggerEventKind::OnApply
        ) {
            return false;
        }
        self.observe(state, self.sample(ctx.target))
    }

    /// Feeds one sample. Only a change of side relative to the previous sample counts.
    pub fn observe(&self, state: &mut TriggerState, value: f64) -> bool {
        let above = value > self.threshold;
        let Some(previous) = state.was_above.replace(above) else {
            return false;
        };
        let crossed_down = previous && !above;
        let crossed_up = !previous && above;

        if self.only_once && state.latched {
            let rearmed = if state.latched_downward { crossed_up } else { crossed_down };
            if rearmed {
                state.latched = false;
            }
            return false;
        }

        let fires = match self.direction {
            ThresholdDirection::Below => crossed_down,
            ThresholdDirection::Above => crossed_up,
            ThresholdDirection::Cross => crossed_down || crossed_up,
        };
        if fires && self.only_once {
            state.latched = true;
            state.latched_downward = crossed_down;
        }
        fires
    }
}

impl EventTrigger {
    fn should_trigger(
        &self,
        state: &mut TriggerState,
        ctx: &mut TriggerContext<'_>,
        event: TriggerEvent,
    ) -> bool {
        // Cooldown runs on every tick regardless of which event this trigger listens for.
        if event.kind == TriggerEventKind::OnTick {
            state.cooldown = (state.cooldown - event.value.max(0.0)).max(0.0);
        }
        if event.kind != self.event || state.cooldown > TIME_EPSILON {
            return false;
        }
        if self.min_value != 0.0 && event.value < self.min_value {
            return false;
        }
        if self.max_value != 0.0 && event.value > self.max_value {
            return false;
        }
        ctx.rng.roll(self.chance)
    }
}
