use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use crate::buff::{
    BuffLibrary, BuffTemplate, DispelType, DurationType, EffectModule, StackingType,
    TriggerModule,
};
use crate::timeline::{ActionKind, SkillData};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationSeverity {
    Error,
    Warning,
    Info,
}

impl ValidationSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

impl fmt::Display for ValidationSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationDiagnostic {
    pub severity: ValidationSeverity,
    pub context: String,
    pub message: String,
}

impl fmt::Display for ValidationDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.context, self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub diagnostics: Vec<ValidationDiagnostic>,
}

impl ValidationReport {
    pub fn push(
        &mut self,
        severity: ValidationSeverity,
        context: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.diagnostics.push(ValidationDiagnostic {
            severity,
            context: context.into(),
            message: message.into(),
        });
    }

    pub fn extend(&mut self, other: ValidationReport) {
        self.diagnostics.extend(other.diagnostics);
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|diag| diag.severity == ValidationSeverity::Error)
    }

    pub fn count(&self, severity: ValidationSeverity) -> usize {
        self.diagnostics
            .iter()
            .filter(|diag| diag.severity == severity)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

fn check_amount(report: &mut ValidationReport, context: &str, name: &str, value: f64) {
    if !value.is_finite() || value < 0.0 {
        report.push(
            ValidationSeverity::Error,
            format!("{context}.{name}"),
            format!("expected a non-negative number, got {value}"),
        );
    }
}

/// Checks skill data against what the player needs. `library`, when given,
/// is used to resolve buff references.
pub fn validate_skill(skill: &SkillData, library: Option<&BuffLibrary>) -> ValidationReport {
    let mut report = ValidationReport::default();
    let context = format!("skill '{}'", skill.id);

    if skill.id.trim().is_empty() {
        report.push(ValidationSeverity::Error, "skill", "missing non-empty 'id'");
    }
    if let Err(err) = skill.validate_frame_rate() {
        report.push(
            ValidationSeverity::Error,
            format!("{context}.frame_rate"),
            err.to_string(),
        );
    }

    let required = skill.required_duration();
    if skill.total_duration == 0 && required == 0 {
        report.push(
            ValidationSeverity::Error,
            format!("{context}.total_duration"),
            "timeline is empty",
        );
    } else if skill.total_duration < required {
        report.push(
            ValidationSeverity::Warning,
            format!("{context}.total_duration"),
            format!(
                "{} frames is shorter than the last action window; playback extends to {required}",
                skill.total_duration
            ),
        );
    }

    for (track_index, track) in skill.tracks.iter().enumerate() {
        let track_context = format!("{context}.tracks[{track_index}]");
        if !track.enabled {
            report.push(ValidationSeverity::Info, track_context.clone(), "track disabled");
        }
        if track.actions.is_empty() {
            report.push(ValidationSeverity::Info, track_context.clone(), "track has no actions");
        }
        for (action_index, action) in track.actions.iter().enumerate() {
            let action_context = format!("{track_context}.actions[{action_index}]");
            validate_action(&mut report, &action_context, action, library);
        }
    }

    report
}

fn validate_action(
    report: &mut ValidationReport,
    context: &str,
    action: &crate::timeline::Action,
    library: Option<&BuffLibrary>,
) {
    let tick_interval_check = |report: &mut ValidationReport, interval: u32| {
        if interval > 0 && interval >= action.duration.max(1) {
            report.push(
                ValidationSeverity::Warning,
                format!("{context}.tick_interval"),
                format!(
                    "interval {interval} never fits inside a {}-frame window",
                    action.duration
                ),
            );
        }
    };

    match &action.kind {
        ActionKind::Damage(damage) => {
            check_amount(report, context, "amount", damage.amount);
            tick_interval_check(report, damage.tick_interval);
        }
        ActionKind::Heal(heal) => {
            check_amount(report, context, "amount", heal.amount);
            tick_interval_check(report, heal.tick_interval);
        }
        ActionKind::Buff(buff) => {
            if buff.buff_id.trim().is_empty() {
                report.push(
                    ValidationSeverity::Error,
                    format!("{context}.buff_id"),
                    "missing non-empty 'buff_id'",
                );
            } else if let Some(library) = library {
                if library.get(&buff.buff_id).is_none() {
                    report.push(
                        ValidationSeverity::Error,
                        format!("{context}.buff_id"),
                        format!("unknown buff template '{}'", buff.buff_id),
                    );
                }
            }
        }
        ActionKind::Shield(shield) => {
            check_amount(report, context, "amount", shield.amount);
            check_amount(report, context, "duration", shield.duration);
        }
        ActionKind::Projectile(projectile) => {
            check_amount(report, context, "speed", projectile.speed);
            check_amount(report, context, "max_distance", projectile.max_distance);
            check_amount(report, context, "damage", projectile.damage);
        }
        ActionKind::AreaOfEffect(area) => {
            check_amount(report, context, "radius", area.radius);
            check_amount(report, context, "damage", area.damage);
            tick_interval_check(report, area.tick_interval);
        }
        ActionKind::Movement(_) => {
            if action.duration == 0 {
                report.push(
                    ValidationSeverity::Warning,
                    format!("{context}.duration"),
                    "instant movement teleports in a single frame",
                );
            }
        }
        ActionKind::Camera(camera) => {
            check_amount(report, context, "intensity", camera.intensity);
        }
    }
}

/// Checks a set of buff templates for duplicate ids and unusable module settings.
pub fn validate_buff_templates(templates: &[BuffTemplate]) -> ValidationReport {
    let mut report = ValidationReport::default();
    let mut seen_ids = HashSet::new();

    for (index, template) in templates.iter().enumerate() {
        let context = format!("buff[{index}] id='{}'", template.id);
        if template.id.trim().is_empty() {
            report.push(ValidationSeverity::Error, format!("buff[{index}].id"), "missing non-empty 'id'");
        } else if !seen_ids.insert(template.id.clone()) {
            report.push(
                ValidationSeverity::Error,
                format!("{context}.id"),
                format!("duplicate id '{}'", template.id),
            );
        }

        if template.duration_type == DurationType::Timed
            && !(template.duration.is_finite() && template.duration > 0.0)
        {
            report.push(
                ValidationSeverity::Error,
                format!("{context}.duration"),
                "timed buff needs a positive duration",
            );
        }
        if template.duration_type == DurationType::Infinite && template.dispel != DispelType::None {
            report.push(
                ValidationSeverity::Warning,
                format!("{context}.dispel"),
                "infinite buffs are never dispellable",
            );
        }
        if template.max_stacks > 1 && template.stacking != StackingType::Stack {
            report.push(
                ValidationSeverity::Warning,
                format!("{context}.max_stacks"),
                "max_stacks only applies to stack-type buffs",
            );
        }

        for (effect_index, effect) in template.effects.iter().enumerate() {
            let effect_context = format!("{context}.effects[{effect_index}]");
            match effect {
                EffectModule::Periodic(periodic) => {
                    if !(periodic.tick_interval > 0.0) {
                        report.push(
                            ValidationSeverity::Error,
                            format!("{effect_context}.tick_interval"),
                            "tick interval must be positive",
                        );
                    }
                    check_amount(&mut report, &effect_context, "amount_per_tick", periodic.amount_per_tick);
                }
                EffectModule::Shield(shield) => {
                    check_amount(&mut report, &effect_context, "amount", shield.amount);
                }
                EffectModule::AttributeModifier(modifier) if modifier.modifiers.is_empty() => {
                    report.push(ValidationSeverity::Warning, effect_context, "no modifiers");
                }
                EffectModule::SpecialState(state) if state.flags.is_empty() => {
                    report.push(ValidationSeverity::Warning, effect_context, "no state flags");
                }
                _ => {}
            }
        }

        for (trigger_index, trigger) in template.triggers.iter().enumerate() {
            let trigger_context = format!("{context}.triggers[{trigger_index}]");
            for effect_index in trigger.effect_indices() {
                if *effect_index >= template.effects.len() {
                    report.push(
                        ValidationSeverity::Error,
                        format!("{trigger_context}.effects"),
                        format!(
                            "effect index {effect_index} out of range ({} effects)",
                            template.effects.len()
                        ),
                    );
                }
            }
            match trigger {
                TriggerModule::Periodic(periodic) if !(periodic.interval > 0.0) => {
                    report.push(
                        ValidationSeverity::Error,
                        format!("{trigger_context}.interval"),
                        "interval must be positive",
                    );
                }
                TriggerModule::Event(event) if !(0.0..=1.0).contains(&event.chance) => {
                    report.push(
                        ValidationSeverity::Warning,
                        format!("{trigger_context}.chance"),
                        format!("chance {} is clamped to [0, 1]", event.chance),
                    );
                }
                TriggerModule::Threshold(threshold) if !(0.0..=1.0).contains(&threshold.threshold) => {
                    report.push(
                        ValidationSeverity::Warning,
                        format!("{trigger_context}.threshold"),
                        "threshold is a fraction and should be within [0, 1]",
                    );
                }
                TriggerModule::Conditional(conditional) if conditional.conditions.is_empty() => {
                    report.push(
                        ValidationSeverity::Warning,
                        format!("{trigger_context}.conditions"),
                        "no conditions",
                    );
                }
                _ => {}
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buff::{EventTrigger, PeriodicEffect, PeriodicKind, TriggerEventKind};
    use crate::timeline::{Action, BuffAction, ActionTarget, DamageAction, Track};

    #[test]
    fn unknown_buff_reference_is_an_error() {
        let skill = SkillData::new("s", 30.0, 10).with_track(Track::new("t").with_action(
            Action::new(
                0,
                1,
                ActionKind::Buff(BuffAction {
                    buff_id: "missing".into(),
                    target: ActionTarget::Targets,
                    remove_on_exit: false,
                }),
            ),
        ));
        let library = BuffLibrary::new();
        let report = validate_skill(&skill, Some(&library));
        assert!(report.has_errors());
        assert!(validate_skill(&skill, None).is_empty());
    }

    #[test]
    fn short_total_duration_is_a_warning() {
        let skill = SkillData::new("s", 30.0, 5).with_track(Track::new("t").with_action(
            Action::new(
                4,
                6,
                ActionKind::Damage(DamageAction {
                    amount: 1.0,
                    damage_type: Default::default(),
                    target: ActionTarget::Targets,
                    tick_interval: 0,
                }),
            ),
        ));
        let report = validate_skill(&skill, None);
        assert!(!report.has_errors());
        assert_eq!(report.count(ValidationSeverity::Warning), 1);
    }

    #[test]
    fn buff_templates_report_bad_indices_and_duplicates() {
        let dot = BuffTemplate::new("burn", "Burn")
            .timed(3.0)
            .with_effect(EffectModule::Periodic(PeriodicEffect {
                kind: PeriodicKind::Damage,
                amount_per_tick: 5.0,
                tick_interval: 1.0,
                damage_type: Default::default(),
                scale_with_stacks: false,
                tick_on_apply: false,
            }))
            .with_trigger(TriggerModule::Event(EventTrigger {
                event: TriggerEventKind::OnDamageTaken,
                min_value: 0.0,
                max_value: 0.0,
                chance: 1.0,
                cooldown: 0.0,
                effects: vec![3],
            }));
        let report = validate_buff_templates(&[dot.clone(), dot]);
        let errors: Vec<_> = report
            .diagnostics
            .iter()
            .filter(|d| d.severity == ValidationSeverity::Error)
            .map(|d| d.message.clone())
            .collect();
        assert!(errors.iter().any(|m| m.contains("duplicate id")));
        assert!(errors.iter().any(|m| m.contains("out of range")));
    }
}
