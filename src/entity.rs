//! Host-side contracts consumed by the engine.
//!
//! The engine never owns entity bookkeeping. Actions talk to [World] and
//! [Entity]; buff effects talk to the narrower [BuffTarget] so a buff
//! collection can be ticked while detached from its owner.

use std::fmt;
use std::ops::{Add, Mul, Sub};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::attributes::{AttributeModifier, ModifierSource};
use crate::buff::{ApplyOutcome, BuffInstanceId, BuffSnapshot, BuffTemplate, StateFlags};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn length(self) -> f64 {
        self.x.hypot(self.y)
    }

    pub fn distance(self, other: Vec2) -> f64 {
        (self - other).length()
    }

    pub fn lerp(self, to: Vec2, t: f64) -> Vec2 {
        self + (to - self) * t
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Vec2 {
    type Output = Vec2;

    fn mul(self, rhs: f64) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DamageType {
    #[default]
    Physical,
    Magical,
    True,
}

/// Entity surface used by timeline actions.
pub trait Entity {
    fn id(&self) -> EntityId;

    /// Applies incoming damage (after any shields the host models). Returns damage actually taken.
    fn take_damage(&mut self, amount: f64, damage_type: DamageType, source_pos: Vec2) -> f64;

    /// Returns the amount actually restored.
    fn heal(&mut self, amount: f64) -> f64;

    fn add_shield(&mut self, amount: f64, duration: f64);

    fn add_buff(&mut self, template: Arc<BuffTemplate>, source: EntityId) -> ApplyOutcome;

    /// Removes every instance of `template_id`. Returns how many were removed.
    fn remove_buff(&mut self, template_id: &str) -> usize;

    /// Undoes one application that returned `instance`: drops a stack, or the
    /// instance itself when it holds a single stack.
    fn release_buff(&mut self, instance: BuffInstanceId) -> bool;

    fn active_buffs(&self) -> Vec<BuffSnapshot>;

    fn position(&self) -> Vec2;

    fn set_position(&mut self, position: Vec2);

    fn health_percent(&self) -> f64;

    fn shield_percent(&self) -> f64;

    fn resource_percent(&self) -> f64;
}

/// What a buff's effects and triggers may touch on the entity that carries it.
pub trait BuffTarget {
    fn id(&self) -> EntityId;

    /// Damage that already went through buff shields.
    fn apply_damage(&mut self, amount: f64, damage_type: DamageType, source: EntityId) -> f64;

    fn apply_heal(&mut self, amount: f64, source: EntityId) -> f64;

    /// Installs `modifiers` under `source`, replacing anything previously installed there.
    fn apply_modifiers(&mut self, source: ModifierSource, modifiers: &[AttributeModifier]);

    fn retract_modifiers(&mut self, source: ModifierSource);

    fn add_state_flags(&mut self, source: ModifierSource, flags: StateFlags);

    fn remove_state_flags(&mut self, source: ModifierSource);

    fn state_flags(&self) -> StateFlags;

    fn health_percent(&self) -> f64;

    fn shield_percent(&self) -> f64;

    fn resource_percent(&self) -> f64;
}

/// Request handed to the host when a projectile action fires.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectileSpawn {
    pub owner: EntityId,
    pub origin: Vec2,
    pub direction: Vec2,
    pub speed: f64,
    pub max_distance: f64,
    pub damage: f64,
    pub damage_type: DamageType,
}

/// Fire-and-forget presentation request (camera shake and similar).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PresentationCue {
    CameraShake { intensity: f64, duration_frames: u32 },
}

/// Everything a playing skill can reach outside its own timeline.
pub trait World {
    fn entity_mut(&mut self, id: EntityId) -> Option<&mut dyn Entity>;

    /// Entities whose position lies within `radius` of `center`.
    fn entities_within(&self, center: Vec2, radius: f64) -> Vec<EntityId>;

    fn buff_template(&self, id: &str) -> Option<Arc<BuffTemplate>>;

    fn spawn_projectile(&mut self, projectile: ProjectileSpawn);

    fn present(&mut self, _cue: PresentationCue) {}
}
