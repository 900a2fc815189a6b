use std::sync::Arc;

use skillforge::attributes::{Attribute, AttributeModifier};
use skillforge::buff::{
    ApplyOutcome, AttributeModifierEffect, BuffCategory, BuffEvent, BuffInstanceId, BuffTemplate,
    DispelType, EffectModule, PeriodicEffect, PeriodicKind, RemoveReason, ShieldEffect, ShieldType,
    SpecialStateEffect, StackingType, StateFlags, TriggerEventKind,
};
use skillforge::entity::{DamageType, Entity, EntityId, Vec2};
use skillforge::sim::Unit;

const HOLDER: EntityId = EntityId(10);
const SOURCE: EntityId = EntityId(20);

fn approx_eq(a: f64, b: f64, tol: f64) {
    assert!((a - b).abs() <= tol, "expected {b}, got {a}");
}

fn unit() -> Unit {
    Unit::new(HOLDER, "holder", 1000.0).with_attribute(Attribute::Attack, 100.0)
}

fn attack_up(stacking: StackingType, max_stacks: u32) -> Arc<BuffTemplate> {
    Arc::new(
        BuffTemplate::new("attack_up", "Attack Up")
            .timed(10.0)
            .stacking(stacking, max_stacks)
            .with_effect(EffectModule::AttributeModifier(AttributeModifierEffect {
                modifiers: vec![AttributeModifier::flat(Attribute::Attack, 10.0)],
                scale_with_stacks: true,
            })),
    )
}

fn poison(amount_per_tick: f64) -> BuffTemplate {
    BuffTemplate::new("poison", "Poison")
        .timed(10.0)
        .stacking(StackingType::Stack, 5)
        .dispellable(DispelType::Poison)
        .with_effect(EffectModule::Periodic(PeriodicEffect {
            kind: PeriodicKind::Damage,
            amount_per_tick,
            tick_interval: 1.0,
            damage_type: DamageType::True,
            scale_with_stacks: true,
            tick_on_apply: false,
        }))
}

fn tick_for(unit: &mut Unit, seconds: f64, step: f64) {
    let steps = (seconds / step).round() as u32;
    for _ in 0..steps {
        unit.tick(step);
    }
}

fn removals(events: &[BuffEvent]) -> Vec<RemoveReason> {
    events
        .iter()
        .filter_map(|event| match event {
            BuffEvent::Removed { reason, .. } => Some(*reason),
            _ => None,
        })
        .collect()
}

#[test]
fn stacks_cap_at_max_and_scale_the_contribution() {
    let mut unit = unit();
    let template = attack_up(StackingType::Stack, 3);
    let mut last = None;
    for _ in 0..5 {
        last = Some(unit.add_buff(Arc::clone(&template), SOURCE));
    }

    assert!(matches!(last, Some(ApplyOutcome::Stacked { old: 3, new: 3, .. })));
    assert_eq!(unit.buffs().stacks_of("attack_up"), Some(3));
    approx_eq(unit.attribute(Attribute::Attack), 130.0, 1e-9);

    assert_eq!(unit.remove_buff("attack_up"), 1);
    approx_eq(unit.attribute(Attribute::Attack), 100.0, 1e-9);
}

#[test]
fn refresh_resets_duration_without_stacking() {
    let mut unit = unit();
    let template = attack_up(StackingType::Refresh, 1);
    unit.add_buff(Arc::clone(&template), SOURCE);
    tick_for(&mut unit, 3.0, 0.5);
    assert!(matches!(
        unit.add_buff(template, SOURCE),
        ApplyOutcome::Refreshed(_)
    ));

    let snapshot = unit.active_buffs();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].stacks, 1);
    approx_eq(snapshot[0].remaining.unwrap_or_default(), 10.0, 1e-9);
    approx_eq(unit.attribute(Attribute::Attack), 110.0, 1e-9);
}

#[test]
fn non_stacking_reapply_is_ignored_unless_configured_to_refresh() {
    let mut unit = unit();
    let template = attack_up(StackingType::None, 1);
    unit.add_buff(Arc::clone(&template), SOURCE);
    tick_for(&mut unit, 4.0, 1.0);
    assert!(matches!(
        unit.add_buff(Arc::clone(&template), SOURCE),
        ApplyOutcome::Ignored(_)
    ));
    approx_eq(unit.active_buffs()[0].remaining.unwrap_or_default(), 6.0, 1e-9);

    let mut refreshing = (*template).clone();
    refreshing.id = "attack_up_refreshing".to_string();
    refreshing.refresh_on_reapply = true;
    let refreshing = Arc::new(refreshing);
    unit.add_buff(Arc::clone(&refreshing), SOURCE);
    tick_for(&mut unit, 4.0, 1.0);
    unit.add_buff(refreshing, SOURCE);
    let remaining = unit
        .active_buffs()
        .into_iter()
        .find(|snapshot| snapshot.template_id == "attack_up_refreshing")
        .and_then(|snapshot| snapshot.remaining);
    approx_eq(remaining.unwrap_or_default(), 10.0, 1e-9);
}

#[test]
fn independent_applications_create_separate_instances() {
    let mut unit = unit();
    let template = attack_up(StackingType::Independent, 1);
    let first = unit.add_buff(Arc::clone(&template), SOURCE);
    let second = unit.add_buff(template, SOURCE);

    assert_ne!(first.instance(), second.instance());
    assert_eq!(unit.buffs().count_of("attack_up"), 2);
    approx_eq(unit.attribute(Attribute::Attack), 120.0, 1e-9);
}

#[test]
fn stacked_dot_ticks_on_its_own_timer() {
    let mut unit = unit();
    let template = Arc::new(poison(10.0));
    unit.add_buff(Arc::clone(&template), SOURCE);
    unit.add_buff(template, SOURCE);

    tick_for(&mut unit, 3.4, 0.1);

    approx_eq(unit.health(), 940.0, 1e-9);
    let instance = unit.buffs().instances().next().expect("poison instance");
    assert_eq!(instance.effect_state(0).map(|state| state.ticks_fired), Some(3));
}

#[test]
fn timed_buffs_expire_and_retract_their_modifiers() {
    let mut unit = unit();
    let template = Arc::new(
        BuffTemplate::new("haste", "Haste")
            .timed(1.0)
            .with_effect(EffectModule::AttributeModifier(AttributeModifierEffect {
                modifiers: vec![AttributeModifier::percent_add(Attribute::Attack, 0.5)],
                scale_with_stacks: false,
            })),
    );
    unit.add_buff(template, SOURCE);
    approx_eq(unit.attribute(Attribute::Attack), 150.0, 1e-9);

    unit.tick(0.5);
    assert_eq!(unit.buffs().len(), 1);
    unit.tick(0.5);
    assert!(unit.buffs().is_empty());
    approx_eq(unit.attribute(Attribute::Attack), 100.0, 1e-9);
    assert_eq!(removals(&unit.drain_buff_events()), vec![RemoveReason::Expired]);
}

#[test]
fn shields_absorb_before_health_and_can_remove_their_buff() {
    let mut unit = unit();
    let template = Arc::new(
        BuffTemplate::new("barrier", "Barrier")
            .timed(10.0)
            .with_effect(EffectModule::Shield(ShieldEffect {
                amount: 50.0,
                shield_type: ShieldType::All,
                scale_with_stacks: false,
                remove_on_break: true,
            })),
    );
    unit.add_buff(template, SOURCE);
    approx_eq(unit.summary().shield, 50.0, 1e-9);

    let taken = unit.take_damage(30.0, DamageType::Physical, Vec2::ZERO);
    approx_eq(taken, 0.0, 1e-9);
    approx_eq(unit.summary().shield, 20.0, 1e-9);

    let taken = unit.take_damage(80.0, DamageType::Physical, Vec2::ZERO);
    approx_eq(taken, 60.0, 1e-9);
    approx_eq(unit.health(), 940.0, 1e-9);
    assert!(unit.buffs().is_empty());

    let events = unit.drain_buff_events();
    assert_eq!(
        events
            .iter()
            .filter(|event| matches!(event, BuffEvent::ShieldBroken { .. }))
            .count(),
        1
    );
    assert_eq!(removals(&events), vec![RemoveReason::ShieldBroken]);
}

#[test]
fn typed_shields_let_other_damage_through() {
    let mut unit = unit();
    let template = Arc::new(
        BuffTemplate::new("ward", "Ward")
            .infinite()
            .with_effect(EffectModule::Shield(ShieldEffect {
                amount: 100.0,
                shield_type: ShieldType::Magical,
                scale_with_stacks: false,
                remove_on_break: false,
            })),
    );
    unit.add_buff(template, SOURCE);

    approx_eq(unit.take_damage(40.0, DamageType::Physical, Vec2::ZERO), 40.0, 1e-9);
    approx_eq(unit.take_damage(40.0, DamageType::Magical, Vec2::ZERO), 0.0, 1e-9);
    approx_eq(unit.health(), 960.0, 1e-9);
}

#[test]
fn damage_taken_attribute_scales_incoming_damage() {
    let mut unit = unit();
    let template = Arc::new(
        BuffTemplate::new("vulnerable", "Vulnerable")
            .timed(5.0)
            .with_effect(EffectModule::AttributeModifier(AttributeModifierEffect {
                modifiers: vec![AttributeModifier::percent_add(Attribute::DamageTaken, 0.25)],
                scale_with_stacks: false,
            })),
    );
    unit.add_buff(template, SOURCE);
    approx_eq(unit.take_damage(100.0, DamageType::Physical, Vec2::ZERO), 125.0, 1e-9);
}

#[test]
fn invulnerable_holders_take_no_damage() {
    let mut unit = unit();
    let template = Arc::new(
        BuffTemplate::new("divine", "Divine")
            .timed(2.0)
            .with_effect(EffectModule::SpecialState(SpecialStateEffect {
                flags: StateFlags::INVULNERABLE,
            })),
    );
    unit.add_buff(template, SOURCE);
    approx_eq(unit.take_damage(500.0, DamageType::True, Vec2::ZERO), 0.0, 1e-9);

    tick_for(&mut unit, 2.0, 0.5);
    assert!(unit.state_flags().is_empty());
    approx_eq(unit.take_damage(500.0, DamageType::True, Vec2::ZERO), 500.0, 1e-9);
}

#[test]
fn state_flags_survive_until_their_last_source_is_removed() {
    let mut unit = unit();
    let stun = |id: &str| {
        Arc::new(
            BuffTemplate::new(id, id)
                .timed(5.0)
                .with_effect(EffectModule::SpecialState(SpecialStateEffect {
                    flags: StateFlags::STUN,
                })),
        )
    };
    unit.add_buff(stun("stun_a"), SOURCE);
    unit.add_buff(stun("stun_b"), SOURCE);
    unit.remove_buff("stun_a");
    assert!(unit.state_flags().contains(StateFlags::STUN));
    unit.remove_buff("stun_b");
    assert!(!unit.state_flags().contains(StateFlags::STUN));
}

#[test]
fn dispel_matches_type_and_respects_limits() {
    let mut unit = unit();
    let curse = |id: &str| {
        Arc::new(
            BuffTemplate::new(id, id)
                .until_dispelled(DispelType::Curse)
                .stacking(StackingType::Independent, 1),
        )
    };
    unit.add_buff(curse("hex"), SOURCE);
    unit.add_buff(curse("hex"), SOURCE);
    unit.add_buff(curse("doom"), SOURCE);
    unit.add_buff(Arc::new(BuffTemplate::new("aura", "Aura").infinite().dispellable(DispelType::Magic)), SOURCE);

    assert_eq!(unit.dispel(DispelType::Poison, None), 0);
    assert_eq!(unit.dispel(DispelType::Curse, Some(2)), 2);
    assert_eq!(unit.buffs().count_of("doom"), 1);
    assert_eq!(unit.dispel(DispelType::All, None), 1);
    assert_eq!(unit.buffs().count_of("aura"), 1);
    assert_eq!(
        removals(&unit.drain_buff_events()),
        vec![RemoveReason::Dispelled; 3]
    );
}

#[test]
fn clearing_removes_every_instance_once() {
    let mut unit = unit();
    unit.add_buff(attack_up(StackingType::Stack, 3), SOURCE);
    unit.add_buff(Arc::new(poison(5.0)), SOURCE);
    assert_eq!(unit.clear_buffs(), 2);
    assert_eq!(unit.clear_buffs(), 0);
    approx_eq(unit.attribute(Attribute::Attack), 100.0, 1e-9);
    assert_eq!(
        removals(&unit.drain_buff_events()),
        vec![RemoveReason::Cleared, RemoveReason::Cleared]
    );
}

#[test]
fn a_faulting_effect_does_not_block_its_siblings() {
    let mut unit = unit();
    let template = Arc::new(
        BuffTemplate::new("glitch", "Glitch")
            .timed(5.0)
            .with_effect(EffectModule::Periodic(PeriodicEffect {
                kind: PeriodicKind::Damage,
                amount_per_tick: 10.0,
                tick_interval: 0.0,
                damage_type: DamageType::Physical,
                scale_with_stacks: false,
                tick_on_apply: false,
            }))
            .with_effect(EffectModule::AttributeModifier(AttributeModifierEffect {
                modifiers: vec![AttributeModifier::flat(Attribute::Attack, 25.0)],
                scale_with_stacks: false,
            })),
    );
    unit.add_buff(template, SOURCE);
    unit.tick(0.5);

    approx_eq(unit.attribute(Attribute::Attack), 125.0, 1e-9);
    approx_eq(unit.health(), 1000.0, 1e-9);
    let faults: Vec<usize> = unit
        .drain_buff_events()
        .into_iter()
        .filter_map(|event| match event {
            BuffEvent::Fault { effect_index, .. } => Some(effect_index),
            _ => None,
        })
        .collect();
    assert!(!faults.is_empty());
    assert!(faults.iter().all(|index| *index == 0));
}

#[test]
fn snapshots_describe_live_instances() {
    let mut unit = unit();
    let mut template = poison(1.0);
    template.category = BuffCategory::Debuff;
    unit.add_buff(Arc::new(template), SOURCE);
    let snapshot = &unit.active_buffs()[0];
    assert_eq!(snapshot.template_id, "poison");
    assert_eq!(snapshot.category, BuffCategory::Debuff);
    assert_eq!(snapshot.source, SOURCE);
    assert_eq!(snapshot.stacks, 1);
}

fn dot(id: &str, amount_per_tick: f64) -> Arc<BuffTemplate> {
    Arc::new(
        BuffTemplate::new(id, id)
            .timed(10.0)
            .with_effect(EffectModule::Periodic(PeriodicEffect {
                kind: PeriodicKind::Damage,
                amount_per_tick,
                tick_interval: 1.0,
                damage_type: DamageType::Physical,
                scale_with_stacks: false,
                tick_on_apply: false,
            })),
    )
}

#[test]
fn a_shield_breaking_mid_tick_does_not_skip_later_instances() {
    let mut unit = unit();
    unit.add_buff(
        Arc::new(
            BuffTemplate::new("flimsy", "Flimsy")
                .timed(10.0)
                .with_effect(EffectModule::Shield(ShieldEffect {
                    amount: 5.0,
                    shield_type: ShieldType::All,
                    scale_with_stacks: false,
                    remove_on_break: true,
                })),
        ),
        SOURCE,
    );
    unit.add_buff(dot("dot_a", 10.0), SOURCE);
    unit.add_buff(dot("dot_b", 10.0), SOURCE);

    unit.tick(1.0);

    let remaining: Vec<(String, Option<f64>)> = unit
        .active_buffs()
        .into_iter()
        .map(|snapshot| (snapshot.template_id, snapshot.remaining))
        .collect();
    assert_eq!(
        remaining,
        vec![
            ("dot_a".to_string(), Some(9.0)),
            ("dot_b".to_string(), Some(9.0)),
        ]
    );
    approx_eq(unit.health(), 985.0, 1e-9);
    let instance = unit.buffs().instances().nth(1).expect("dot_b instance");
    assert_eq!(instance.effect_state(0).map(|state| state.ticks_fired), Some(1));
}

#[test]
fn buff_events_serialize_with_a_kind_tag() {
    let event = BuffEvent::TriggerFired {
        instance: BuffInstanceId(4),
        template: "thorns".to_string(),
        trigger_index: 0,
        event: TriggerEventKind::OnDamageTaken,
    };
    let json = serde_json::to_value(&event).expect("buff event should serialize");
    assert_eq!(json["kind"], "trigger_fired");
    assert_eq!(json["event"], "on_damage_taken");
    assert_eq!(json["instance"], 4);
}
