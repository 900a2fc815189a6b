//! Authored skill data. Immutable during playback and shared between players.

use serde::{Deserialize, Serialize};

use crate::entity::{DamageType, Vec2};
use crate::error::SkillError;

fn enabled_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillData {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub frame_rate: f64,
    /// Length of the timeline in frames.
    #[serde(default)]
    pub total_duration: u32,
    #[serde(default)]
    pub tracks: Vec<Track>,
}

impl SkillData {
    pub fn new(id: impl Into<String>, frame_rate: f64, total_duration: u32) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            frame_rate,
            total_duration,
            tracks: Vec::new(),
        }
    }

    pub fn with_track(mut self, track: Track) -> Self {
        self.tracks.push(track);
        self
    }

    pub fn validate_frame_rate(&self) -> Result<(), SkillError> {
        if self.frame_rate.is_finite() && self.frame_rate > 0.0 {
            Ok(())
        } else {
            Err(SkillError::InvalidFrameRate {
                skill: self.id.clone(),
                frame_rate: self.frame_rate,
            })
        }
    }

    /// Smallest timeline length that contains every enabled action's window.
    pub fn required_duration(&self) -> u32 {
        self.enabled_actions()
            .map(|(_, _, action)| action.window_end())
            .max()
            .unwrap_or(0)
    }

    /// Authored length, extended if an enabled action runs past it.
    pub fn effective_duration(&self) -> u32 {
        self.total_duration.max(self.required_duration())
    }

    /// Enabled actions of enabled tracks in track-then-list order, with their indices.
    pub fn enabled_actions(&self) -> impl Iterator<Item = (usize, usize, &Action)> {
        self.tracks
            .iter()
            .enumerate()
            .filter(|(_, track)| track.enabled)
            .flat_map(|(track_index, track)| {
                track
                    .actions
                    .iter()
                    .enumerate()
                    .filter(|(_, action)| action.enabled)
                    .map(move |(action_index, action)| (track_index, action_index, action))
            })
    }

    pub fn action(&self, track: usize, action: usize) -> Option<&Action> {
        self.tracks.get(track)?.actions.get(action)
    }

    pub fn action_count(&self) -> usize {
        self.tracks.iter().map(|track| track.actions.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    #[serde(default)]
    pub name: String,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl Track {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            actions: Vec::new(),
        }
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(default)]
    pub name: String,
    pub frame: u32,
    /// Frames. Zero means instantaneous (still active for its start frame).
    #[serde(default)]
    pub duration: u32,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    #[serde(flatten)]
    pub kind: ActionKind,
}

impl Action {
    pub fn new(frame: u32, duration: u32, kind: ActionKind) -> Self {
        Self {
            name: kind.kind_name().to_string(),
            frame,
            duration,
            enabled: true,
            kind,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// First frame after the active window `[frame, frame + max(duration, 1))`.
    pub fn window_end(&self) -> u32 {
        self.frame.saturating_add(self.duration.max(1))
    }

    pub fn is_active_at(&self, frame: u32) -> bool {
        self.frame <= frame && frame < self.window_end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTarget {
    Caster,
    #[default]
    Targets,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Easing {
    #[default]
    Linear,
    EaseIn,
    EaseOut,
    EaseInOut,
}

impl Easing {
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::EaseIn => t * t,
            Self::EaseOut => t * (2.0 - t),
            Self::EaseInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    -1.0 + (4.0 - 2.0 * t) * t
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    Damage(DamageAction),
    Heal(HealAction),
    Buff(BuffAction),
    Shield(ShieldAction),
    Projectile(ProjectileAction),
    AreaOfEffect(AreaAction),
    Movement(MovementAction),
    Camera(CameraAction),
}

impl ActionKind {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Damage(_) => "damage",
            Self::Heal(_) => "heal",
            Self::Buff(_) => "buff",
            Self::Shield(_) => "shield",
            Self::Projectile(_) => "projectile",
            Self::AreaOfEffect(_) => "area_of_effect",
            Self::Movement(_) => "movement",
            Self::Camera(_) => "camera",
        }
    }
}

/// Hit on Execute, then again every `tick_interval` frames inside the window (0 = once).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamageAction {
    pub amount: f64,
    #[serde(default)]
    pub damage_type: DamageType,
    #[serde(default)]
    pub target: ActionTarget,
    #[serde(default)]
    pub tick_interval: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealAction {
    pub amount: f64,
    #[serde(default)]
    pub target: ActionTarget,
    #[serde(default)]
    pub tick_interval: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuffAction {
    pub buff_id: String,
    #[serde(default)]
    pub target: ActionTarget,
    /// Remove the applied buffs when the action exits.
    #[serde(default)]
    pub remove_on_exit: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShieldAction {
    pub amount: f64,
    /// Seconds.
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub target: ActionTarget,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectileAction {
    pub speed: f64,
    pub max_distance: f64,
    pub damage: f64,
    #[serde(default)]
    pub damage_type: DamageType,
    /// Launch direction; zero aims at the first target.
    #[serde(default)]
    pub direction: Vec2,
    #[serde(default)]
    pub offset: Vec2,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaAction {
    pub radius: f64,
    pub damage: f64,
    #[serde(default)]
    pub damage_type: DamageType,
    /// Center relative to the caster.
    #[serde(default)]
    pub offset: Vec2,
    #[serde(default)]
    pub tick_interval: u32,
    #[serde(default)]
    pub include_caster: bool,
}

/// Moves the caster by `offset` over the action's duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementAction {
    pub offset: Vec2,
    #[serde(default)]
    pub easing: Easing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraAction {
    pub intensity: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_covers_zero_duration_start_frame() {
        let action = Action::new(
            4,
            0,
            ActionKind::Camera(CameraAction { intensity: 1.0 }),
        );
        assert!(action.is_active_at(4));
        assert!(!action.is_active_at(5));
        assert_eq!(action.window_end(), 5);
    }

    #[test]
    fn effective_duration_extends_to_last_enabled_action() {
        let skill = SkillData::new("s", 30.0, 10)
            .with_track(Track::new("main").with_action(Action::new(
                8,
                6,
                ActionKind::Camera(CameraAction { intensity: 1.0 }),
            )))
            .with_track(
                Track::new("off")
                    .with_action(Action::new(
                        40,
                        1,
                        ActionKind::Camera(CameraAction { intensity: 1.0 }),
                    ))
                    .disabled(),
            );
        assert_eq!(skill.required_duration(), 14);
        assert_eq!(skill.effective_duration(), 14);
    }

    #[test]
    fn zero_duration_actions_still_occupy_their_frame() {
        let skill = SkillData::new("s", 30.0, 10).with_track(Track::new("main").with_action(
            Action::new(10, 0, ActionKind::Camera(CameraAction { intensity: 1.0 })),
        ));
        assert_eq!(skill.required_duration(), 11);
        assert_eq!(skill.effective_duration(), 11);
    }

    #[test]
    fn easing_endpoints() {
        for easing in [Easing::Linear, Easing::EaseIn, Easing::EaseOut, Easing::EaseInOut] {
            assert!(easing.apply(0.0).abs() < 1e-12);
            assert!((easing.apply(1.0) - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn action_kind_is_flattened_in_json() {
        let json = r#"{"name":"slash","frame":3,"duration":2,"type":"damage","amount":12.5}"#;
        let action: Action = serde_json::from_str(json).expect("parse");
        assert_eq!(action.frame, 3);
        assert!(action.enabled);
        match action.kind {
            ActionKind::Damage(damage) => {
                assert_eq!(damage.amount, 12.5);
                assert_eq!(damage.target, ActionTarget::Targets);
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }
}
