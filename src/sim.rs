//! Reference host: a minimal unit and arena implementing the entity and world
//! contracts, plus a fixed-step runner used by the CLI, batch playback and tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::attributes::{Attribute, AttributeModifier, AttributeSheet, ModifierSource};
use crate::buff::{
    ApplyOutcome, BuffCollection, BuffEvent, BuffInstanceId, BuffLibrary, BuffSnapshot,
    BuffTemplate, DispelType, StateFlags, StateRegistry, TriggerEvent, TriggerEventKind,
};
use crate::entity::{
    BuffTarget, DamageType, Entity, EntityId, PresentationCue, ProjectileSpawn, Vec2, World,
};
use crate::error::SkillError;
use crate::timeline::{PlayerState, SkillData, SkillPlayer, TraceEntry, TraceMode};

#[derive(Debug, Clone, Copy, PartialEq)]
struct TimedShield {
    amount: f64,
    /// `None` lasts until depleted.
    remaining: Option<f64>,
}

/// The part of a unit its buffs may touch.
#[derive(Debug, Clone)]
pub struct UnitCore {
    id: EntityId,
    name: String,
    position: Vec2,
    health: f64,
    resource: f64,
    max_resource: f64,
    attributes: AttributeSheet,
    states: StateRegistry,
    shields: Vec<TimedShield>,
    buff_shield: f64,
    damage_taken: f64,
    healing_received: f64,
}

impl UnitCore {
    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn health(&self) -> f64 {
        self.health
    }

    pub fn max_health(&self) -> f64 {
        self.attributes.value(Attribute::MaxHealth).max(0.0)
    }

    pub fn attributes(&self) -> &AttributeSheet {
        &self.attributes
    }

    pub fn shield(&self) -> f64 {
        self.buff_shield + self.shields.iter().map(|s| s.amount).sum::<f64>()
    }

    pub fn damage_taken(&self) -> f64 {
        self.damage_taken
    }

    pub fn healing_received(&self) -> f64 {
        self.healing_received
    }

    fn clamp_health(&mut self) {
        self.health = self.health.min(self.max_health()).max(0.0);
    }

    fn absorb_timed_shields(&mut self, damage: f64) -> f64 {
        let mut remainder = damage;
        for shield in &mut self.shields {
            if remainder <= 0.0 {
                break;
            }
            let absorbed = remainder.min(shield.amount);
            shield.amount -= absorbed;
            remainder -= absorbed;
        }
        self.shields.retain(|shield| shield.amount > 0.0);
        remainder
    }

    fn decay_timed_shields(&mut self, delta: f64) {
        for shield in &mut self.shields {
            if let Some(left) = shield.remaining.as_mut() {
                *left -= delta;
            }
        }
        self.shields
            .retain(|shield| shield.remaining.map_or(true, |left| left > 0.0));
    }
}

impl BuffTarget for UnitCore {
    fn id(&self) -> EntityId {
        self.id
    }

    fn apply_damage(&mut self, amount: f64, _damage_type: DamageType, _source: EntityId) -> f64 {
        if !(amount > 0.0) {
            return 0.0;
        }
        let taken = amount.min(self.health);
        self.health -= taken;
        self.damage_taken += taken;
        taken
    }

    fn apply_heal(&mut self, amount: f64, _source: EntityId) -> f64 {
        if !(amount > 0.0) {
            return 0.0;
        }
        let scaled = amount * self.attributes.value(Attribute::HealingReceived).max(0.0);
        let restored = scaled.min(self.max_health() - self.health).max(0.0);
        self.health += restored;
        self.healing_received += restored;
        restored
    }

    fn apply_modifiers(&mut self, source: ModifierSource, modifiers: &[AttributeModifier]) {
        self.attributes.apply(source, modifiers);
        self.clamp_health();
    }

    fn retract_modifiers(&mut self, source: ModifierSource) {
        self.attributes.retract(source);
        self.clamp_health();
    }

    fn add_state_flags(&mut self, source: ModifierSource, flags: StateFlags) {
        self.states.add(source, flags);
    }

    fn remove_state_flags(&mut self, source: ModifierSource) {
        self.states.remove(source);
    }

    fn state_flags(&self) -> StateFlags {
        self.states.current()
    }

    fn health_percent(&self) -> f64 {
        let max = self.max_health();
        if max > 0.0 {
            self.health / max
        } else {
            0.0
        }
    }

    fn shield_percent(&self) -> f64 {
        let max = self.max_health();
        if max > 0.0 {
            self.shield() / max
        } else {
            0.0
        }
    }

    fn resource_percent(&self) -> f64 {
        if self.max_resource > 0.0 {
            self.resource / self.max_resource
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone)]
pub struct Unit {
    core: UnitCore,
    buffs: BuffCollection,
}

impl Unit {
    pub fn new(id: EntityId, name: impl Into<String>, max_health: f64) -> Self {
        let attributes = AttributeSheet::with_base([
            (Attribute::MaxHealth, max_health),
            (Attribute::DamageTaken, 1.0),
            (Attribute::HealingReceived, 1.0),
        ]);
        Self {
            core: UnitCore {
                id,
                name: name.into(),
                position: Vec2::ZERO,
                health: max_health.max(0.0),
                resource: 100.0,
                max_resource: 100.0,
                attributes,
                states: StateRegistry::new(),
                shields: Vec::new(),
                buff_shield: 0.0,
                damage_taken: 0.0,
                healing_received: 0.0,
            },
            buffs: BuffCollection::with_seed(id, 7 ^ id.0),
        }
    }

    pub fn at(mut self, position: Vec2) -> Self {
        self.core.position = position;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.buffs = BuffCollection::with_seed(self.core.id, seed);
        self
    }

    pub fn with_attribute(mut self, attribute: Attribute, value: f64) -> Self {
        self.core.attributes.set_base(attribute, value);
        self
    }

    pub fn core(&self) -> &UnitCore {
        &self.core
    }

    pub fn buffs(&self) -> &BuffCollection {
        &self.buffs
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn health(&self) -> f64 {
        self.core.health
    }

    pub fn attribute(&self, attribute: Attribute) -> f64 {
        self.core.attributes.value(attribute)
    }

    pub fn state_flags(&self) -> StateFlags {
        self.core.state_flags()
    }

    pub fn set_resource(&mut self, resource: f64, max_resource: f64) {
        self.core.max_resource = max_resource.max(0.0);
        self.core.resource = resource.clamp(0.0, self.core.max_resource);
        self.notify(TriggerEventKind::OnHealthChange, self.core.health_percent());
    }

    /// Sets health directly (clamped) and lets triggers observe the change.
    pub fn set_health(&mut self, health: f64) {
        self.core.health = health;
        self.core.clamp_health();
        self.notify(TriggerEventKind::OnHealthChange, self.core.health_percent());
    }

    /// Advances buffs and timed shields by `delta` seconds.
    pub fn tick(&mut self, delta: f64) {
        let before = self.core.health;
        self.buffs.tick(delta, &mut self.core);
        self.core.decay_timed_shields(delta);
        self.sync_shield();
        if self.core.health != before {
            self.notify(TriggerEventKind::OnHealthChange, self.core.health_percent());
        }
    }

    pub fn dispel(&mut self, request: DispelType, max: Option<usize>) -> usize {
        let removed = self.buffs.dispel(request, max, &mut self.core);
        self.sync_shield();
        removed
    }

    pub fn clear_buffs(&mut self) -> usize {
        let removed = self.buffs.clear(&mut self.core);
        self.sync_shield();
        removed
    }

    /// Forwards a game event (e.g. `OnDamageDealt`) to this unit's triggers.
    pub fn notify(&mut self, kind: TriggerEventKind, value: f64) {
        self.buffs.notify(TriggerEvent::new(kind, value), &mut self.core);
        self.sync_shield();
    }

    pub fn drain_buff_events(&mut self) -> Vec<BuffEvent> {
        self.buffs.drain_events()
    }

    pub fn summary(&self) -> UnitSummary {
        UnitSummary {
            id: self.core.id,
            name: self.core.name.clone(),
            health: self.core.health,
            max_health: self.core.max_health(),
            shield: self.core.shield(),
            position: self.core.position,
            flags: self.core.state_flags(),
            damage_taken: self.core.damage_taken,
            healing_received: self.core.healing_received,
            buffs: self.buffs.snapshots(),
        }
    }

    fn sync_shield(&mut self) {
        self.core.buff_shield = self.buffs.shield_total();
    }
}

impl Entity for Unit {
    fn id(&self) -> EntityId {
        self.core.id
    }

    fn take_damage(&mut self, amount: f64, damage_type: DamageType, _source_pos: Vec2) -> f64 {
        if !(amount > 0.0) || self.core.state_flags().contains(StateFlags::INVULNERABLE) {
            return 0.0;
        }
        let incoming = amount * self.core.attributes.value(Attribute::DamageTaken).max(0.0);
        let remainder = self.buffs.absorb_damage(incoming, damage_type, &mut self.core);
        let remainder = self.core.absorb_timed_shields(remainder);
        let id = self.core.id;
        let taken = self.core.apply_damage(remainder, damage_type, id);
        self.sync_shield();
        self.notify(TriggerEventKind::OnDamageTaken, incoming);
        if taken > 0.0 {
            self.notify(TriggerEventKind::OnHealthChange, self.core.health_percent());
        }
        taken
    }

    fn heal(&mut self, amount: f64) -> f64 {
        let id = self.core.id;
        let restored = self.core.apply_heal(amount, id);
        if restored > 0.0 {
            self.notify(TriggerEventKind::OnHeal, restored);
            self.notify(TriggerEventKind::OnHealthChange, self.core.health_percent());
        }
        restored
    }

    fn add_shield(&mut self, amount: f64, duration: f64) {
        if !(amount > 0.0) {
            return;
        }
        self.core.shields.push(TimedShield {
            amount,
            remaining: (duration > 0.0).then_some(duration),
        });
    }

    fn add_buff(&mut self, template: Arc<BuffTemplate>, source: EntityId) -> ApplyOutcome {
        let outcome = self.buffs.apply(template, source, &mut self.core);
        self.sync_shield();
        outcome
    }

    fn remove_buff(&mut self, template_id: &str) -> usize {
        let removed = self.buffs.remove_template(template_id, &mut self.core);
        self.sync_shield();
        removed
    }

    fn release_buff(&mut self, instance: BuffInstanceId) -> bool {
        let released = self.buffs.release(instance, &mut self.core);
        self.sync_shield();
        released
    }

    fn active_buffs(&self) -> Vec<BuffSnapshot> {
        self.buffs.snapshots()
    }

    fn position(&self) -> Vec2 {
        self.core.position
    }

    fn set_position(&mut self, position: Vec2) {
        self.core.position = position;
    }

    fn health_percent(&self) -> f64 {
        self.core.health_percent()
    }

    fn shield_percent(&self) -> f64 {
        self.core.shield_percent()
    }

    fn resource_percent(&self) -> f64 {
        self.core.resource_percent()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitSummary {
    pub id: EntityId,
    pub name: String,
    pub health: f64,
    pub max_health: f64,
    pub shield: f64,
    pub position: Vec2,
    pub flags: StateFlags,
    pub damage_taken: f64,
    pub healing_received: f64,
    pub buffs: Vec<BuffSnapshot>,
}

#[derive(Debug, Clone, Default)]
pub struct Arena {
    units: BTreeMap<EntityId, Unit>,
    library: Arc<BuffLibrary>,
    projectiles: Vec<ProjectileSpawn>,
    cues: Vec<PresentationCue>,
}

impl Arena {
    pub fn new(library: Arc<BuffLibrary>) -> Self {
        Self {
            library,
            ..Self::default()
        }
    }

    pub fn add_unit(&mut self, unit: Unit) -> EntityId {
        let id = unit.core.id;
        self.units.insert(id, unit);
        id
    }

    pub fn unit(&self, id: EntityId) -> Option<&Unit> {
        self.units.get(&id)
    }

    pub fn unit_mut(&mut self, id: EntityId) -> Option<&mut Unit> {
        self.units.get_mut(&id)
    }

    pub fn units(&self) -> impl Iterator<Item = &Unit> {
        self.units.values()
    }

    pub fn library(&self) -> &BuffLibrary {
        &self.library
    }

    pub fn projectiles(&self) -> &[ProjectileSpawn] {
        &self.projectiles
    }

    pub fn cues(&self) -> &[PresentationCue] {
        &self.cues
    }

    pub fn tick_buffs(&mut self, delta: f64) {
        for unit in self.units.values_mut() {
            unit.tick(delta);
        }
    }

    pub fn drain_buff_events(&mut self) -> Vec<(EntityId, BuffEvent)> {
        self.units
            .iter_mut()
            .flat_map(|(id, unit)| unit.drain_buff_events().into_iter().map(move |e| (*id, e)))
            .collect()
    }

    pub fn summaries(&self) -> Vec<UnitSummary> {
        self.units.values().map(Unit::summary).collect()
    }
}

impl World for Arena {
    fn entity_mut(&mut self, id: EntityId) -> Option<&mut dyn Entity> {
        self.units.get_mut(&id).map(|unit| unit as &mut dyn Entity)
    }

    fn entities_within(&self, center: Vec2, radius: f64) -> Vec<EntityId> {
        self.units
            .values()
            .filter(|unit| unit.core.position.distance(center) <= radius)
            .map(|unit| unit.core.id)
            .collect()
    }

    fn buff_template(&self, id: &str) -> Option<Arc<BuffTemplate>> {
        self.library.get(id)
    }

    fn spawn_projectile(&mut self, projectile: ProjectileSpawn) {
        self.projectiles.push(projectile);
    }

    fn present(&mut self, cue: PresentationCue) {
        self.cues.push(cue);
    }
}

/// Options for [run_skill].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunOptions {
    pub caster: EntityId,
    /// Host step in seconds; `None` uses one frame of the skill.
    pub step: Option<f64>,
    /// Buff time simulated after the timeline ends.
    pub settle_seconds: f64,
    pub trace_mode: TraceMode,
}

impl RunOptions {
    pub fn new(caster: EntityId) -> Self {
        Self {
            caster,
            step: None,
            settle_seconds: 0.0,
            trace_mode: TraceMode::Events,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub skill: String,
    pub frames: u32,
    pub final_frame: u32,
    pub host_steps: u32,
    pub finished: bool,
    pub trace: Vec<TraceEntry>,
    pub buff_events: Vec<(EntityId, BuffEvent)>,
    pub units: Vec<UnitSummary>,
    pub projectiles: Vec<ProjectileSpawn>,
}

/// Plays `skill` once from start to finish against `arena`, ticking buffs
/// with the same host step.
pub fn run_skill(
    skill: Arc<SkillData>,
    arena: &mut Arena,
    targets: Vec<EntityId>,
    options: RunOptions,
) -> Result<RunReport, SkillError> {
    let mut player = SkillPlayer::new(options.caster).with_targets(targets);
    player.set_trace_mode(options.trace_mode);
    player.load(Arc::clone(&skill))?;
    let step = options
        .step
        .filter(|step| step.is_finite() && *step > 0.0)
        .unwrap_or(1.0 / skill.frame_rate);
    player.play(arena);

    let limit = (f64::from(player.total_frames()) / (step * skill.frame_rate)).ceil() as u32 + 8;
    let mut host_steps = 0;
    while player.state() == PlayerState::Playing && host_steps < limit {
        player.update(step, arena);
        arena.tick_buffs(step);
        host_steps += 1;
    }
    if player.state() == PlayerState::Playing {
        tracing::warn!(skill = %skill.id, host_steps, "playback did not finish, stopping");
        player.stop(arena);
    }

    let mut settled = 0.0;
    while settled + step <= options.settle_seconds + f64::EPSILON {
        arena.tick_buffs(step);
        settled += step;
        host_steps += 1;
    }

    Ok(RunReport {
        skill: skill.id.clone(),
        frames: player.total_frames(),
        final_frame: player.current_frame(),
        host_steps,
        finished: player.state() == PlayerState::Finished,
        trace: player.take_trace(),
        buff_events: arena.drain_buff_events(),
        units: arena.summaries(),
        projectiles: arena.projectiles().to_vec(),
    })
}
