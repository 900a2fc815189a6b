//! Per-target buff collection: the stacking/duration resolver plus the
//! tick, trigger dispatch, shield absorption and removal paths.
//!
//! Removal is the only cancellation primitive and always runs `on_remove`
//! on every effect of the instance exactly once before returning.

use std::sync::Arc;

use serde::Serialize;

use crate::entity::{BuffTarget, DamageType, EntityId};
use crate::rng::Rng;

use super::effects::{EffectModule, EffectTick, PendingDamage};
use super::instance::{BuffInstance, BuffInstanceId, EffectFault, EffectPhase};
use super::template::{BuffCategory, BuffTemplate, DispelType, StackingType};
use super::triggers::{TriggerEvent, TriggerEventKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ApplyOutcome {
    Created(BuffInstanceId),
    Refreshed(BuffInstanceId),
    Stacked {
        instance: BuffInstanceId,
        old: u32,
        new: u32,
    },
    Ignored(BuffInstanceId),
}

impl ApplyOutcome {
    pub fn instance(self) -> BuffInstanceId {
        match self {
            Self::Created(id) | Self::Refreshed(id) | Self::Ignored(id) => id,
            Self::Stacked { instance, .. } => instance,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoveReason {
    Expired,
    Dispelled,
    Removed,
    Cleared,
    ShieldBroken,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BuffEvent {
    Applied {
        instance: BuffInstanceId,
        template: String,
    },
    Refreshed {
        instance: BuffInstanceId,
        template: String,
    },
    StackChanged {
        instance: BuffInstanceId,
        template: String,
        old: u32,
        new: u32,
    },
    Removed {
        instance: BuffInstanceId,
        template: String,
        reason: RemoveReason,
    },
    TriggerFired {
        instance: BuffInstanceId,
        template: String,
        trigger_index: usize,
        event: TriggerEventKind,
    },
    ShieldBroken {
        instance: BuffInstanceId,
        template: String,
        effect_index: usize,
    },
    Fault {
        instance: BuffInstanceId,
        template: String,
        effect_index: usize,
        message: String,
    },
}

/// Read-only view of one live instance, as returned by `GetActiveBuffs`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuffSnapshot {
    pub instance: BuffInstanceId,
    pub template_id: String,
    pub name: String,
    pub category: BuffCategory,
    pub source: EntityId,
    pub stacks: u32,
    pub remaining: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct BuffCollection {
    owner: EntityId,
    instances: Vec<BuffInstance>,
    next_id: u64,
    rng: Rng,
    events: Vec<BuffEvent>,
}

impl BuffCollection {
    pub fn new(owner: EntityId) -> Self {
        Self::with_seed(owner, 7)
    }

    pub fn with_seed(owner: EntityId, seed: u64) -> Self {
        Self {
            owner,
            instances: Vec::new(),
            next_id: 1,
            rng: Rng::new(seed),
            events: Vec::new(),
        }
    }

    pub fn owner(&self) -> EntityId {
        self.owner
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn instances(&self) -> impl Iterator<Item = &BuffInstance> {
        self.instances.iter()
    }

    pub fn get(&self, id: BuffInstanceId) -> Option<&BuffInstance> {
        self.instances.iter().find(|instance| instance.id() == id)
    }

    /// Stack count of the first live instance of `template_id`.
    pub fn stacks_of(&self, template_id: &str) -> Option<u32> {
        self.instances
            .iter()
            .find(|instance| instance.template_id() == template_id)
            .map(BuffInstance::stacks)
    }

    pub fn count_of(&self, template_id: &str) -> usize {
        self.instances
            .iter()
            .filter(|instance| instance.template_id() == template_id)
            .count()
    }

    pub fn snapshots(&self) -> Vec<BuffSnapshot> {
        self.instances
            .iter()
            .map(|instance| BuffSnapshot {
                instance: instance.id(),
                template_id: instance.template().id.clone(),
                name: instance.template().name.clone(),
                category: instance.template().category,
                source: instance.source(),
                stacks: instance.stacks(),
                remaining: instance.remaining(),
            })
            .collect()
    }

    pub fn drain_events(&mut self) -> Vec<BuffEvent> {
        std::mem::take(&mut self.events)
    }

    /// Applies `template` to the owner, reconciling with an existing instance per its stacking type.
    pub fn apply(
        &mut self,
        template: Arc<BuffTemplate>,
        source: EntityId,
        target: &mut dyn BuffTarget,
    ) -> ApplyOutcome {
        let existing = match template.stacking {
            StackingType::Independent => None,
            _ => self
                .instances
                .iter()
                .position(|instance| instance.template_id() == template.id),
        };
        let Some(idx) = existing else {
            return self.create(template, source, target);
        };

        let template_id = template.id.clone();
        match template.stacking {
            StackingType::Refresh => {
                let instance = &mut self.instances[idx];
                instance.refresh_duration();
                let id = instance.id();
                self.events.push(BuffEvent::Refreshed {
                    instance: id,
                    template: template_id,
                });
                ApplyOutcome::Refreshed(id)
            }
            StackingType::Stack => {
                let old = self.instances[idx].stacks();
                let new = (old + 1).min(template.effective_max_stacks());
                self.instances[idx].refresh_duration();
                let id = self.set_stack_count(idx, new, target);
                ApplyOutcome::Stacked {
                    instance: id,
                    old,
                    new,
                }
            }
            StackingType::None => {
                let instance = &mut self.instances[idx];
                if template.refresh_on_reapply {
                    instance.refresh_duration();
                }
                ApplyOutcome::Ignored(instance.id())
            }
            StackingType::Independent => self.create(template, source, target),
        }
    }

    fn create(
        &mut self,
        template: Arc<BuffTemplate>,
        source: EntityId,
        target: &mut dyn BuffTarget,
    ) -> ApplyOutcome {
        let id = BuffInstanceId(self.next_id);
        self.next_id += 1;
        let template_id = template.id.clone();
        self.instances
            .push(BuffInstance::new(id, template, self.owner, source));

        let mut pending = Vec::new();
        let faults = {
            let idx = self.instances.len() - 1;
            let instance = &mut self.instances[idx];
            let mut faults = instance.run_effects(EffectPhase::Apply, None, target, &mut pending);
            let fired = instance.dispatch(
                TriggerEvent::new(TriggerEventKind::OnApply, 1.0),
                target,
                &mut self.rng,
                &mut pending,
                &mut faults,
            );
            record_fired(&mut self.events, instance, &fired, TriggerEventKind::OnApply);
            faults
        };
        self.report_faults(id, &template_id, faults);
        self.events.push(BuffEvent::Applied {
            instance: id,
            template: template_id,
        });
        tracing::debug!(owner = %self.owner, instance = id.0, "buff applied");
        self.flush(pending, target);
        ApplyOutcome::Created(id)
    }

    /// Advances every instance by `delta` seconds: duration decay, effect ticks,
    /// `OnTick` trigger dispatch, then expiry.
    pub fn tick(&mut self, delta: f64, target: &mut dyn BuffTarget) {
        if !delta.is_finite() || delta < 0.0 {
            tracing::debug!(owner = %self.owner, delta, "ignoring invalid buff tick delta");
            return;
        }
        let event = TriggerEvent::tick(delta);
        // A shield breaking inside `flush` can remove an instance mid-loop.
        let ids: Vec<BuffInstanceId> = self.instances.iter().map(BuffInstance::id).collect();
        for id in ids {
            let Some(idx) = self.index_of(id) else {
                continue;
            };
            let mut pending = Vec::new();
            let (template_id, faults) = {
                let instance = &mut self.instances[idx];
                instance.advance_clock(delta);
                let mut faults = instance.run_effects(
                    EffectPhase::Tick(EffectTick::Frame(delta)),
                    None,
                    target,
                    &mut pending,
                );
                let fired =
                    instance.dispatch(event, target, &mut self.rng, &mut pending, &mut faults);
                record_fired(&mut self.events, instance, &fired, TriggerEventKind::OnTick);
                (instance.template_id().to_string(), faults)
            };
            self.report_faults(id, &template_id, faults);
            self.flush(pending, target);
        }

        let expired: Vec<BuffInstanceId> = self
            .instances
            .iter()
            .filter(|instance| instance.is_expired())
            .map(BuffInstance::id)
            .collect();
        for id in expired {
            self.remove(id, RemoveReason::Expired, target);
        }
    }

    /// Dispatches a game-state event (damage taken, health change, ...) to every trigger.
    pub fn notify(&mut self, event: TriggerEvent, target: &mut dyn BuffTarget) {
        let ids: Vec<BuffInstanceId> = self.instances.iter().map(BuffInstance::id).collect();
        for id in ids {
            let Some(idx) = self.index_of(id) else {
                continue;
            };
            let mut pending = Vec::new();
            let (template_id, faults) = {
                let instance = &mut self.instances[idx];
                let mut faults = Vec::new();
                let fired =
                    instance.dispatch(event, target, &mut self.rng, &mut pending, &mut faults);
                record_fired(&mut self.events, instance, &fired, event.kind);
                (instance.template_id().to_string(), faults)
            };
            self.report_faults(id, &template_id, faults);
            self.flush(pending, target);
        }
    }

    /// Routes incoming damage through shield effects in application order.
    /// Returns the unabsorbed remainder.
    pub fn absorb_damage(
        &mut self,
        amount: f64,
        damage_type: DamageType,
        target: &mut dyn BuffTarget,
    ) -> f64 {
        let mut remainder = amount.max(0.0);
        let mut broken = Vec::new();
        for instance in self.instances.iter_mut().filter(|i| !i.is_removed()) {
            if remainder <= 0.0 {
                break;
            }
            let template = Arc::clone(instance.template());
            for (effect_index, effect) in template.effects.iter().enumerate() {
                let EffectModule::Shield(shield) = effect else {
                    continue;
                };
                let absorption =
                    shield.absorb(&mut instance.effect_states[effect_index], remainder, damage_type);
                remainder = absorption.remainder;
                if absorption.broke {
                    self.events.push(BuffEvent::ShieldBroken {
                        instance: instance.id(),
                        template: template.id.clone(),
                        effect_index,
                    });
                    broken.push((instance.id(), shield.remove_on_break));
                }
                if remainder <= 0.0 {
                    break;
                }
            }
        }

        for (id, remove) in broken {
            self.dispatch_direct(id, TriggerEvent::new(TriggerEventKind::OnShieldBroken, 0.0), target);
            if remove {
                self.remove(id, RemoveReason::ShieldBroken, target);
            }
        }
        remainder
    }

    /// Total shield pool still standing across all instances.
    pub fn shield_total(&self) -> f64 {
        self.instances
            .iter()
            .flat_map(|instance| {
                instance
                    .template()
                    .effects
                    .iter()
                    .zip(instance.effect_states.iter())
                    .filter(|(effect, _)| matches!(effect, EffectModule::Shield(_)))
                    .map(|(_, state)| state.shield)
            })
            .sum()
    }

    /// Removes one instance. Returns false if it was not present.
    pub fn remove(
        &mut self,
        id: BuffInstanceId,
        reason: RemoveReason,
        target: &mut dyn BuffTarget,
    ) -> bool {
        let Some(idx) = self.index_of(id) else {
            return false;
        };
        let mut pending = Vec::new();
        let (template_id, faults) = {
            let instance = &mut self.instances[idx];
            if !instance.mark_removed() {
                return false;
            }
            let mut faults = Vec::new();
            let fired = instance.dispatch(
                TriggerEvent::new(TriggerEventKind::OnRemove, f64::from(instance.stacks())),
                target,
                &mut self.rng,
                &mut pending,
                &mut faults,
            );
            record_fired(&mut self.events, instance, &fired, TriggerEventKind::OnRemove);
            faults.extend(instance.run_effects(EffectPhase::Remove, None, target, &mut pending));
            (instance.template_id().to_string(), faults)
        };
        self.report_faults(id, &template_id, faults);
        if let Some(idx) = self.index_of(id) {
            self.instances.remove(idx);
        }
        self.events.push(BuffEvent::Removed {
            instance: id,
            template: template_id,
            reason,
        });
        tracing::debug!(owner = %self.owner, instance = id.0, ?reason, "buff removed");
        self.flush_unshielded(pending, target);
        true
    }

    /// Removes every instance of `template_id`.
    pub fn remove_template(&mut self, template_id: &str, target: &mut dyn BuffTarget) -> usize {
        let ids: Vec<BuffInstanceId> = self
            .instances
            .iter()
            .filter(|instance| instance.template_id() == template_id)
            .map(BuffInstance::id)
            .collect();
        ids.into_iter()
            .filter(|id| self.remove(*id, RemoveReason::Removed, target))
            .count()
    }

    /// Dispels up to `max` matching instances, oldest first.
    pub fn dispel(
        &mut self,
        request: DispelType,
        max: Option<usize>,
        target: &mut dyn BuffTarget,
    ) -> usize {
        let ids: Vec<BuffInstanceId> = self
            .instances
            .iter()
            .filter(|instance| instance.template().is_dispelled_by(request))
            .map(BuffInstance::id)
            .take(max.unwrap_or(usize::MAX))
            .collect();
        let mut removed = 0;
        for id in ids {
            self.dispatch_direct(id, TriggerEvent::new(TriggerEventKind::OnDispel, 1.0), target);
            if self.remove(id, RemoveReason::Dispelled, target) {
                removed += 1;
            }
        }
        removed
    }

    /// Removes everything. Used when the owner dies or a playback is cancelled.
    pub fn clear(&mut self, target: &mut dyn BuffTarget) -> usize {
        let ids: Vec<BuffInstanceId> = self.instances.iter().map(BuffInstance::id).collect();
        ids.into_iter()
            .filter(|id| self.remove(*id, RemoveReason::Cleared, target))
            .count()
    }

    /// Takes back one application of `id`: a stacked instance loses a stack,
    /// anything else is removed. Returns false if the instance is gone.
    pub fn release(&mut self, id: BuffInstanceId, target: &mut dyn BuffTarget) -> bool {
        let Some(idx) = self.index_of(id) else {
            return false;
        };
        let stacks = self.instances[idx].stacks();
        if stacks > 1 {
            self.set_stack_count(idx, stacks - 1, target);
            true
        } else {
            self.remove(id, RemoveReason::Removed, target)
        }
    }

    /// Moves the instance at `idx` to `new` stacks, running stack-change effects
    /// and `OnStackChange` triggers when the count actually changes.
    fn set_stack_count(
        &mut self,
        idx: usize,
        new: u32,
        target: &mut dyn BuffTarget,
    ) -> BuffInstanceId {
        let mut pending = Vec::new();
        let (id, template_id, old, faults) = {
            let instance = &mut self.instances[idx];
            let old = instance.set_stacks(new);
            let mut faults = Vec::new();
            if new != old {
                faults = instance.run_effects(
                    EffectPhase::StackChange { old, new },
                    None,
                    target,
                    &mut pending,
                );
                let fired = instance.dispatch(
                    TriggerEvent::new(TriggerEventKind::OnStackChange, f64::from(new)),
                    target,
                    &mut self.rng,
                    &mut pending,
                    &mut faults,
                );
                record_fired(
                    &mut self.events,
                    instance,
                    &fired,
                    TriggerEventKind::OnStackChange,
                );
            }
            (instance.id(), instance.template_id().to_string(), old, faults)
        };
        self.report_faults(id, &template_id, faults);
        self.events.push(BuffEvent::StackChanged {
            instance: id,
            template: template_id,
            old,
            new,
        });
        self.flush(pending, target);
        id
    }

    fn index_of(&self, id: BuffInstanceId) -> Option<usize> {
        self.instances.iter().position(|instance| instance.id() == id)
    }

    /// Dispatches to a single instance; resulting damage skips shields.
    fn dispatch_direct(&mut self, id: BuffInstanceId, event: TriggerEvent, target: &mut dyn BuffTarget) {
        let Some(idx) = self.index_of(id) else {
            return;
        };
        let mut pending = Vec::new();
        let (template_id, faults) = {
            let instance = &mut self.instances[idx];
            let mut faults = Vec::new();
            let fired = instance.dispatch(event, target, &mut self.rng, &mut pending, &mut faults);
            record_fired(&mut self.events, instance, &fired, event.kind);
            (instance.template_id().to_string(), faults)
        };
        self.report_faults(id, &template_id, faults);
        self.flush_unshielded(pending, target);
    }

    fn flush(&mut self, pending: Vec<PendingDamage>, target: &mut dyn BuffTarget) {
        for damage in pending {
            let remainder = self.absorb_damage(damage.amount, damage.damage_type, target);
            if remainder > 0.0 {
                target.apply_damage(remainder, damage.damage_type, damage.source);
            }
        }
    }

    fn flush_unshielded(&mut self, pending: Vec<PendingDamage>, target: &mut dyn BuffTarget) {
        for damage in pending {
            target.apply_damage(damage.amount, damage.damage_type, damage.source);
        }
    }

    fn report_faults(&mut self, instance: BuffInstanceId, template: &str, faults: Vec<EffectFault>) {
        for fault in faults {
            tracing::warn!(
                owner = %self.owner,
                buff = template,
                instance = instance.0,
                effect = fault.effect_index,
                error = %fault.error,
                "buff effect callback failed"
            );
            self.events.push(BuffEvent::Fault {
                instance,
                template: template.to_string(),
                effect_index: fault.effect_index,
                message: fault.error.to_string(),
            });
        }
    }
}

fn record_fired(
    events: &mut Vec<BuffEvent>,
    instance: &BuffInstance,
    fired: &[usize],
    kind: TriggerEventKind,
) {
    for trigger_index in fired {
        events.push(BuffEvent::TriggerFired {
            instance: instance.id(),
            template: instance.template_id().to_string(),
            trigger_index: *trigger_index,
            event: kind,
        });
    }
}
