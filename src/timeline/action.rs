//! Per-playback action state and the lifecycle callbacks of each action kind.
//!
//! `Action` values are shared authored data. Everything that changes while a
//! skill plays (tick bookkeeping, captured positions, buffs to undo) lives in
//! an [ActionRuntime] owned by one player.

use std::sync::Arc;

use serde::Serialize;

use crate::buff::{ApplyOutcome, BuffInstanceId};
use crate::entity::{DamageType, Entity, EntityId, PresentationCue, ProjectileSpawn, Vec2, World};
use crate::error::ActionError;

use super::skill::{Action, ActionKind, ActionTarget, AreaAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Inactive,
    Initialized,
    Active,
    Exited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    Initialize,
    Execute,
    Process,
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// Left its active window during normal playback.
    Completed,
    Stopped,
    Looped,
    /// Playback reached the end while the action was still tracked.
    Finished,
    /// A seek moved the playhead outside its window.
    Seek,
}

/// Who the action is being played for.
pub struct ActionContext<'a> {
    pub caster: EntityId,
    pub targets: &'a [EntityId],
    pub world: &'a mut dyn World,
}

impl ActionContext<'_> {
    fn resolve(&self, target: ActionTarget) -> Vec<EntityId> {
        match target {
            ActionTarget::Caster => vec![self.caster],
            ActionTarget::Targets => self.targets.to_vec(),
        }
    }

    fn caster_position(&mut self) -> Result<Vec2, ActionError> {
        self.world
            .entity_mut(self.caster)
            .map(|entity| entity.position())
            .ok_or(ActionError::MissingEntity(self.caster))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionRuntime {
    pub track: usize,
    pub action: usize,
    state: LifecycleState,
    executed: bool,
    last_processed: Option<u32>,
    last_tick: Option<u32>,
    movement_start: Option<Vec2>,
    applied_buffs: Vec<(EntityId, BuffInstanceId)>,
}

impl ActionRuntime {
    pub fn new(track: usize, action: usize) -> Self {
        Self {
            track,
            action,
            state: LifecycleState::Inactive,
            executed: false,
            last_processed: None,
            last_tick: None,
            movement_start: None,
            applied_buffs: Vec::new(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn executed(&self) -> bool {
        self.executed
    }

    pub fn last_processed(&self) -> Option<u32> {
        self.last_processed
    }

    /// Initialized or Active: still owed a ForceExit.
    pub fn is_tracked(&self) -> bool {
        matches!(
            self.state,
            LifecycleState::Initialized | LifecycleState::Active
        )
    }

    /// Seek landed past the start frame: the one-shot is considered spent.
    pub(crate) fn skip_execute(&mut self) {
        self.executed = true;
    }

    /// Back to `Inactive`, dropping everything from the previous pass.
    pub fn reset(&mut self) {
        *self = Self::new(self.track, self.action);
    }

    pub fn initialize(&mut self, action: &Action) -> Result<(), ActionError> {
        self.reset();
        self.state = LifecycleState::Initialized;
        validate(action)
    }

    /// One-shot callback at the action's start frame. Never runs twice in a pass.
    pub fn execute(&mut self, action: &Action, ctx: &mut ActionContext<'_>) -> Result<(), ActionError> {
        self.executed = true;
        match &action.kind {
            ActionKind::Damage(damage) => {
                self.last_tick = Some(0);
                deal_damage(ctx, damage.target, damage.amount, damage.damage_type)
            }
            ActionKind::Heal(heal) => {
                self.last_tick = Some(0);
                for id in ctx.resolve(heal.target) {
                    entity(ctx, id)?.heal(heal.amount);
                }
                Ok(())
            }
            ActionKind::Buff(buff) => {
                let template = ctx
                    .world
                    .buff_template(&buff.buff_id)
                    .ok_or_else(|| ActionError::UnknownBuff(buff.buff_id.clone()))?;
                let caster = ctx.caster;
                for id in ctx.resolve(buff.target) {
                    let outcome = entity(ctx, id)?.add_buff(Arc::clone(&template), caster);
                    if buff.remove_on_exit {
                        if let Some(instance) = owned_application(outcome) {
                            self.applied_buffs.push((id, instance));
                        }
                    }
                }
                Ok(())
            }
            ActionKind::Shield(shield) => {
                for id in ctx.resolve(shield.target) {
                    entity(ctx, id)?.add_shield(shield.amount, shield.duration);
                }
                Ok(())
            }
            ActionKind::Projectile(projectile) => {
                let origin = ctx.caster_position()? + projectile.offset;
                let mut direction = projectile.direction;
                if direction.length() <= f64::EPSILON {
                    if let Some(first) = ctx.targets.first().copied() {
                        direction = entity(ctx, first)?.position() - origin;
                    }
                }
                let length = direction.length();
                let direction = if length > f64::EPSILON {
                    direction * (1.0 / length)
                } else {
                    Vec2::new(1.0, 0.0)
                };
                ctx.world.spawn_projectile(ProjectileSpawn {
                    owner: ctx.caster,
                    origin,
                    direction,
                    speed: projectile.speed,
                    max_distance: projectile.max_distance,
                    damage: projectile.damage,
                    damage_type: projectile.damage_type,
                });
                Ok(())
            }
            ActionKind::AreaOfEffect(area) => {
                self.last_tick = Some(0);
                area_hit(ctx, area)
            }
            ActionKind::Movement(_) => {
                self.movement_start = Some(ctx.caster_position()?);
                Ok(())
            }
            ActionKind::Camera(camera) => {
                ctx.world.present(PresentationCue::CameraShake {
                    intensity: camera.intensity,
                    duration_frames: action.duration.max(1),
                });
                Ok(())
            }
        }
    }

    /// Called at most once per absolute frame while `frame` is inside the active window.
    pub fn process(
        &mut self,
        action: &Action,
        frame: u32,
        ctx: &mut ActionContext<'_>,
    ) -> Result<(), ActionError> {
        if self.last_processed == Some(frame) {
            return Ok(());
        }
        self.last_processed = Some(frame);
        self.state = LifecycleState::Active;
        let relative = frame.saturating_sub(action.frame);

        match &action.kind {
            ActionKind::Damage(damage) => {
                if self.tick_due(relative, damage.tick_interval) {
                    deal_damage(ctx, damage.target, damage.amount, damage.damage_type)?;
                }
                Ok(())
            }
            ActionKind::Heal(heal) => {
                if self.tick_due(relative, heal.tick_interval) {
                    for id in ctx.resolve(heal.target) {
                        entity(ctx, id)?.heal(heal.amount);
                    }
                }
                Ok(())
            }
            ActionKind::AreaOfEffect(area) => {
                if self.tick_due(relative, area.tick_interval) {
                    area_hit(ctx, area)?;
                }
                Ok(())
            }
            ActionKind::Movement(movement) => {
                let start = match self.movement_start {
                    Some(start) => start,
                    None => {
                        // Reached through a seek: anchor where the caster stands now.
                        let start = ctx.caster_position()?;
                        self.movement_start = Some(start);
                        start
                    }
                };
                let span = f64::from(action.duration.max(1));
                let t = movement.easing.apply(f64::from(relative + 1) / span);
                let position = start.lerp(start + movement.offset, t);
                let caster = ctx.caster;
                entity(ctx, caster)?.set_position(position);
                Ok(())
            }
            ActionKind::Buff(_)
            | ActionKind::Shield(_)
            | ActionKind::Projectile(_)
            | ActionKind::Camera(_) => Ok(()),
        }
    }

    /// Exactly once per pass; safe even if the action never executed.
    pub fn exit(&mut self, action: &Action, ctx: &mut ActionContext<'_>) -> Result<(), ActionError> {
        self.state = LifecycleState::Exited;
        let applied = std::mem::take(&mut self.applied_buffs);
        if let ActionKind::Buff(buff) = &action.kind {
            if buff.remove_on_exit {
                let mut first_error = None;
                for (id, instance) in applied {
                    match ctx.world.entity_mut(id) {
                        Some(entity) => {
                            entity.release_buff(instance);
                        }
                        None => {
                            first_error.get_or_insert(ActionError::MissingEntity(id));
                        }
                    }
                }
                if let Some(error) = first_error {
                    return Err(error);
                }
            }
        }
        Ok(())
    }

    /// Periodic hits land on relative frames that are multiples of `interval`.
    /// Frame 0 belongs to Execute.
    fn tick_due(&mut self, relative: u32, interval: u32) -> bool {
        if interval == 0 || relative == 0 || relative % interval != 0 {
            return false;
        }
        if self.last_tick == Some(relative) {
            return false;
        }
        self.last_tick = Some(relative);
        true
    }
}

fn entity<'w>(ctx: &'w mut ActionContext<'_>, id: EntityId) -> Result<&'w mut dyn Entity, ActionError> {
    ctx.world.entity_mut(id).ok_or(ActionError::MissingEntity(id))
}

/// The instance an application owns: a new instance or one added stack.
/// Refreshes, ignored reapplies and capped stacks belong to whoever applied first.
fn owned_application(outcome: ApplyOutcome) -> Option<BuffInstanceId> {
    match outcome {
        ApplyOutcome::Created(id) => Some(id),
        ApplyOutcome::Stacked { instance, old, new } if new > old => Some(instance),
        ApplyOutcome::Stacked { .. } | ApplyOutcome::Refreshed(_) | ApplyOutcome::Ignored(_) => None,
    }
}

fn deal_damage(
    ctx: &mut ActionContext<'_>,
    target: ActionTarget,
    amount: f64,
    damage_type: DamageType,
) -> Result<(), ActionError> {
    let origin = ctx.caster_position()?;
    for id in ctx.resolve(target) {
        entity(ctx, id)?.take_damage(amount, damage_type, origin);
    }
    Ok(())
}

fn area_hit(ctx: &mut ActionContext<'_>, area: &AreaAction) -> Result<(), ActionError> {
    let origin = ctx.caster_position()?;
    let center = origin + area.offset;
    let caster = ctx.caster;
    for id in ctx.world.entities_within(center, area.radius) {
        if id == caster && !area.include_caster {
            continue;
        }
        entity(ctx, id)?.take_damage(area.damage, area.damage_type, center);
    }
    Ok(())
}

fn validate(action: &Action) -> Result<(), ActionError> {
    let check = |name: &'static str, value: f64| {
        if value.is_finite() && value >= 0.0 {
            Ok(())
        } else {
            Err(ActionError::InvalidParameter { name, value })
        }
    };
    match &action.kind {
        ActionKind::Damage(damage) => check("amount", damage.amount),
        ActionKind::Heal(heal) => check("amount", heal.amount),
        ActionKind::Buff(_) => Ok(()),
        ActionKind::Shield(shield) => {
            check("amount", shield.amount)?;
            check("duration", shield.duration)
        }
        ActionKind::Projectile(projectile) => {
            check("speed", projectile.speed)?;
            check("max_distance", projectile.max_distance)?;
            check("damage", projectile.damage)
        }
        ActionKind::AreaOfEffect(area) => {
            check("radius", area.radius)?;
            check("damage", area.damage)
        }
        ActionKind::Movement(movement) => {
            check("offset.x", movement.offset.x.abs())?;
            check("offset.y", movement.offset.y.abs())
        }
        ActionKind::Camera(camera) => check("intensity", camera.intensity),
    }
}
