//! Effect modules: the behavior a buff instance runs on apply, remove,
//! stack change and tick.
//!
//! Templates are shared, so every mutable value (tick timers, shield pools,
//! install markers) lives in an [EffectState] owned by the instance.

use serde::{Deserialize, Serialize};

use crate::attributes::{AttributeModifier, ModifierSource};
use crate::entity::{BuffTarget, DamageType, EntityId};
use crate::error::EffectError;
use crate::timeline::clock::interval_reached;

use super::instance::BuffInstanceId;
use super::state_flags::StateFlags;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EffectModule {
    AttributeModifier(AttributeModifierEffect),
    Periodic(PeriodicEffect),
    Shield(ShieldEffect),
    SpecialState(SpecialStateEffect),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeModifierEffect {
    pub modifiers: Vec<AttributeModifier>,
    #[serde(default)]
    pub scale_with_stacks: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodicKind {
    Damage,
    Heal,
}

/// Damage or heal over time. The tick timer is independent of the buff's duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodicEffect {
    pub kind: PeriodicKind,
    pub amount_per_tick: f64,
    /// Seconds between ticks.
    pub tick_interval: f64,
    #[serde(default)]
    pub damage_type: DamageType,
    #[serde(default)]
    pub scale_with_stacks: bool,
    #[serde(default)]
    pub tick_on_apply: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShieldType {
    #[default]
    All,
    Physical,
    Magical,
}

impl ShieldType {
    pub fn absorbs(self, damage_type: DamageType) -> bool {
        match self {
            Self::All => true,
            Self::Physical => damage_type == DamageType::Physical,
            Self::Magical => damage_type == DamageType::Magical,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShieldEffect {
    pub amount: f64,
    #[serde(default)]
    pub shield_type: ShieldType,
    #[serde(default)]
    pub scale_with_stacks: bool,
    /// Remove the whole buff instance when the shield breaks.
    #[serde(default)]
    pub remove_on_break: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialStateEffect {
    pub flags: StateFlags,
}

/// How an effect is being ticked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EffectTick {
    /// Regular per-frame advance of the owning buff.
    Frame(f64),
    /// Zero-duration invocation from a trigger. Never advances timers.
    Pulse,
}

/// Per-instance mutable state for one effect module.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EffectState {
    pub timer: f64,
    pub installed: bool,
    pub shield: f64,
    pub shield_capacity: f64,
    pub broken: bool,
    pub ticks_fired: u32,
}

/// Damage produced by an effect; routed through the collection's shields before it lands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingDamage {
    pub amount: f64,
    pub damage_type: DamageType,
    pub source: EntityId,
}

pub struct EffectContext<'a> {
    pub instance: BuffInstanceId,
    pub effect_index: usize,
    pub source: EntityId,
    pub stacks: u32,
    pub target: &'a mut dyn BuffTarget,
    pub pending: &'a mut Vec<PendingDamage>,
}

impl EffectContext<'_> {
    fn modifier_source(&self) -> ModifierSource {
        ModifierSource {
            instance: self.instance,
            effect_index: self.effect_index,
        }
    }

    fn stack_factor(&self, scale_with_stacks: bool) -> f64 {
        if scale_with_stacks {
            f64::from(self.stacks.max(1))
        } else {
            1.0
        }
    }
}

/// Outcome of routing damage through one shield.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Absorption {
    pub remainder: f64,
    pub absorbed: f64,
    pub broke: bool,
}

impl EffectModule {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::AttributeModifier(_) => "attribute_modifier",
            Self::Periodic(_) => "periodic",
            Self::Shield(_) => "shield",
            Self::SpecialState(_) => "special_state",
        }
    }

    pub fn on_apply(
        &self,
        state: &mut EffectState,
        ctx: &mut EffectContext<'_>,
    ) -> Result<(), EffectError> {
        match self {
            Self::AttributeModifier(effect) => {
                effect.install(state, ctx);
                Ok(())
            }
            Self::Periodic(effect) => {
                effect.validate()?;
                state.timer = 0.0;
                if effect.tick_on_apply {
                    effect.fire(state, ctx);
                }
                Ok(())
            }
            Self::Shield(effect) => effect.fill(state, ctx),
            Self::SpecialState(effect) => {
                ctx.target.add_state_flags(ctx.modifier_source(), effect.flags);
                state.installed = true;
                Ok(())
            }
        }
    }

    pub fn on_remove(
        &self,
        state: &mut EffectState,
        ctx: &mut EffectContext<'_>,
    ) -> Result<(), EffectError> {
        match self {
            Self::AttributeModifier(_) => {
                if state.installed {
                    ctx.target.retract_modifiers(ctx.modifier_source());
                    state.installed = false;
                }
            }
            Self::Periodic(_) => {
                state.timer = 0.0;
            }
            Self::Shield(_) => {
                state.shield = 0.0;
            }
            Self::SpecialState(_) => {
                if state.installed {
                    ctx.target.remove_state_flags(ctx.modifier_source());
                    state.installed = false;
                }
            }
        }
        Ok(())
    }

    /// Called with the context already carrying `new` stacks.
    pub fn on_stack_change(
        &self,
        state: &mut EffectState,
        ctx: &mut EffectContext<'_>,
        old: u32,
        new: u32,
    ) -> Result<(), EffectError> {
        if old == new {
            return Ok(());
        }
        match self {
            Self::AttributeModifier(effect) => {
                // Full retraction first so additive modifiers never accumulate drift.
                if state.installed {
                    ctx.target.retract_modifiers(ctx.modifier_source());
                    state.installed = false;
                }
                effect.install(state, ctx);
                Ok(())
            }
            // Magnitude is read from the current stack count at fire time.
            Self::Periodic(_) => Ok(()),
            Self::Shield(effect) if effect.scale_with_stacks => effect.fill(state, ctx),
            Self::Shield(_) | Self::SpecialState(_) => Ok(()),
        }
    }

    pub fn on_tick(
        &self,
        state: &mut EffectState,
        ctx: &mut EffectContext<'_>,
        tick: EffectTick,
    ) -> Result<(), EffectError> {
        match self {
            Self::AttributeModifier(effect) => {
                if !state.installed {
                    effect.install(state, ctx);
                }
                Ok(())
            }
            Self::Periodic(effect) => {
                effect.validate()?;
                match tick {
                    EffectTick::Frame(delta) => {
                        state.timer += delta.max(0.0);
                        while interval_reached(state.timer, effect.tick_interval) {
                            state.timer -= effect.tick_interval;
                            effect.fire(state, ctx);
                        }
                    }
                    EffectTick::Pulse => effect.fire(state, ctx),
                }
                Ok(())
            }
            Self::Shield(effect) => match tick {
                EffectTick::Pulse => effect.fill(state, ctx),
                EffectTick::Frame(_) => Ok(()),
            },
            Self::SpecialState(effect) => {
                if matches!(tick, EffectTick::Pulse) || !state.installed {
                    ctx.target.add_state_flags(ctx.modifier_source(), effect.flags);
                    state.installed = true;
                }
                Ok(())
            }
        }
    }
}

impl AttributeModifierEffect {
    fn install(&self, state: &mut EffectState, ctx: &mut EffectContext<'_>) {
        let factor = ctx.stack_factor(self.scale_with_stacks);
        let scaled: Vec<AttributeModifier> = self
            .modifiers
            .iter()
            .map(|modifier| modifier.scaled(factor))
            .collect();
        ctx.target.apply_modifiers(ctx.modifier_source(), &scaled);
        state.installed = true;
    }
}

impl PeriodicEffect {
    fn validate(&self) -> Result<(), EffectError> {
        if !(self.tick_interval > 0.0) || !self.tick_interval.is_finite() {
            return Err(EffectError::InvalidInterval(self.tick_interval));
        }
        if self.amount_per_tick < 0.0 || !self.amount_per_tick.is_finite() {
            return Err(EffectError::InvalidMagnitude(self.amount_per_tick));
        }
        Ok(())
    }

    pub fn magnitude(&self, stacks: u32) -> f64 {
        if self.scale_with_stacks {
            self.amount_per_tick * f64::from(stacks.max(1))
        } else {
            self.amount_per_tick
        }
    }

    fn fire(&self, state: &mut EffectState, ctx: &mut EffectContext<'_>) {
        let amount = self.magnitude(ctx.stacks);
        match self.kind {
            PeriodicKind::Damage => ctx.pending.push(PendingDamage {
                amount,
                damage_type: self.damage_type,
                source: ctx.source,
            }),
            PeriodicKind::Heal => {
                ctx.target.apply_heal(amount, ctx.source);
            }
        }
        state.ticks_fired += 1;
    }
}

impl ShieldEffect {
    fn fill(&self, state: &mut EffectState, ctx: &EffectContext<'_>) -> Result<(), EffectError> {
        if self.amount < 0.0 || !self.amount.is_finite() {
            return Err(EffectError::InvalidMagnitude(self.amount));
        }
        let capacity = self.amount * ctx.stack_factor(self.scale_with_stacks);
        state.shield_capacity = capacity;
        state.shield = capacity;
        state.broken = false;
        Ok(())
    }

    /// Soaks up to the remaining pool. Breaking is reported once per fill.
    pub fn absorb(&self, state: &mut EffectState, damage: f64, damage_type: DamageType) -> Absorption {
        if state.broken || damage <= 0.0 || !self.shield_type.absorbs(damage_type) {
            return Absorption {
                remainder: damage.max(0.0),
                absorbed: 0.0,
                broke: false,
            };
        }
        let absorbed = damage.min(state.shield);
        state.shield -= absorbed;
        let broke = state.shield <= 0.0;
        if broke {
            state.shield = 0.0;
            state.broken = true;
        }
        Absorption {
            remainder: damage - absorbed,
            absorbed,
            broke,
        }
    }
}
