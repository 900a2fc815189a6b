use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::entity::{BuffTarget, EntityId};
use crate::error::EffectError;
use crate::rng::Rng;

use super::effects::{EffectContext, EffectState, EffectTick, PendingDamage};
use super::template::{BuffTemplate, DurationType};
use super::triggers::{TriggerContext, TriggerEvent, TriggerState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuffInstanceId(pub u64);

/// Which effect callback to run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum EffectPhase {
    Apply,
    Remove,
    StackChange { old: u32, new: u32 },
    Tick(EffectTick),
}

#[derive(Debug)]
pub(crate) struct EffectFault {
    pub effect_index: usize,
    pub error: EffectError,
}

/// A live occurrence of a template on one target.
#[derive(Debug, Clone)]
pub struct BuffInstance {
    id: BuffInstanceId,
    template: Arc<BuffTemplate>,
    target: EntityId,
    source: EntityId,
    stacks: u32,
    remaining: Option<f64>,
    elapsed: f64,
    removed: bool,
    pub(crate) effect_states: Vec<EffectState>,
    pub(crate) trigger_states: Vec<TriggerState>,
}

impl BuffInstance {
    pub(crate) fn new(
        id: BuffInstanceId,
        template: Arc<BuffTemplate>,
        target: EntityId,
        source: EntityId,
    ) -> Self {
        let remaining = template.initial_remaining();
        let effect_states = vec![EffectState::default(); template.effects.len()];
        let mut trigger_states = vec![TriggerState::default(); template.triggers.len()];
        for (trigger, state) in template.triggers.iter().zip(trigger_states.iter_mut()) {
            trigger.initialize(state);
        }
        Self {
            id,
            template,
            target,
            source,
            stacks: 1,
            remaining,
            elapsed: 0.0,
            removed: false,
            effect_states,
            trigger_states,
        }
    }

    pub fn id(&self) -> BuffInstanceId {
        self.id
    }

    pub fn template(&self) -> &Arc<BuffTemplate> {
        &self.template
    }

    pub fn template_id(&self) -> &str {
        &self.template.id
    }

    pub fn target(&self) -> EntityId {
        self.target
    }

    pub fn source(&self) -> EntityId {
        self.source
    }

    pub fn stacks(&self) -> u32 {
        self.stacks
    }

    /// `None` for templates that never decay.
    pub fn remaining(&self) -> Option<f64> {
        self.remaining
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn effect_state(&self, index: usize) -> Option<&EffectState> {
        self.effect_states.get(index)
    }

    pub fn trigger_state(&self, index: usize) -> Option<&TriggerState> {
        self.trigger_states.get(index)
    }

    pub fn is_expired(&self) -> bool {
        self.template.duration_type == DurationType::Timed
            && self.remaining.is_some_and(|left| left <= 0.0)
    }

    pub(crate) fn is_removed(&self) -> bool {
        self.removed
    }

    pub(crate) fn mark_removed(&mut self) -> bool {
        !std::mem::replace(&mut self.removed, true)
    }

    pub(crate) fn refresh_duration(&mut self) {
        self.remaining = self.template.initial_remaining();
    }

    pub(crate) fn set_stacks(&mut self, stacks: u32) -> u32 {
        std::mem::replace(&mut self.stacks, stacks)
    }

    pub(crate) fn advance_clock(&mut self, delta: f64) {
        self.elapsed += delta;
        if let Some(left) = self.remaining.as_mut() {
            *left -= delta;
        }
    }

    /// Runs `phase` on the selected effects (all when `only` is `None`), in template order.
    /// A failing effect is reported and does not stop its siblings.
    pub(crate) fn run_effects(
        &mut self,
        phase: EffectPhase,
        only: Option<&[usize]>,
        target: &mut dyn BuffTarget,
        pending: &mut Vec<PendingDamage>,
    ) -> Vec<EffectFault> {
        let mut faults = Vec::new();
        let indices: Vec<usize> = match only {
            Some(selected) if !selected.is_empty() => selected.to_vec(),
            _ => (0..self.template.effects.len()).collect(),
        };
        let len = self.template.effects.len();

        for effect_index in indices {
            let (Some(effect), Some(state)) = (
                self.template.effects.get(effect_index),
                self.effect_states.get_mut(effect_index),
            ) else {
                faults.push(EffectFault {
                    effect_index,
                    error: EffectError::EffectIndexOutOfRange {
                        index: effect_index,
                        len,
                    },
                });
                continue;
            };
            let mut ctx = EffectContext {
                instance: self.id,
                effect_index,
                source: self.source,
                stacks: self.stacks,
                target: &mut *target,
                pending: &mut *pending,
            };
            let result = match phase {
                EffectPhase::Apply => effect.on_apply(state, &mut ctx),
                EffectPhase::Remove => effect.on_remove(state, &mut ctx),
                EffectPhase::StackChange { old, new } => {
                    effect.on_stack_change(state, &mut ctx, old, new)
                }
                EffectPhase::Tick(tick) => effect.on_tick(state, &mut ctx, tick),
            };
            if let Err(error) = result {
                faults.push(EffectFault {
                    effect_index,
                    error,
                });
            }
        }
        faults
    }

    /// Evaluates every trigger against `event` in template order.
    /// Returns indices of triggers that fired; their effects have already been pulsed.
    pub(crate) fn dispatch(
        &mut self,
        event: TriggerEvent,
        target: &mut dyn BuffTarget,
        rng: &mut Rng,
        pending: &mut Vec<PendingDamage>,
        faults: &mut Vec<EffectFault>,
    ) -> Vec<usize> {
        let mut fired = Vec::new();
        let template = Arc::clone(&self.template);
        for (trigger_index, trigger) in template.triggers.iter().enumerate() {
            let should = {
                let mut ctx = TriggerContext {
                    stacks: self.stacks,
                    remaining: self.remaining,
                    target: &*target,
                    rng: &mut *rng,
                };
                trigger.should_trigger(&mut self.trigger_states[trigger_index], &mut ctx, event)
            };
            if !should {
                continue;
            }
            trigger.execute(&mut self.trigger_states[trigger_index], event);
            faults.extend(self.run_effects(
                EffectPhase::Tick(EffectTick::Pulse),
                Some(trigger.effect_indices()),
                target,
                pending,
            ));
            fired.push(trigger_index);
        }
        fired
    }
}
