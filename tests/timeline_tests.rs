use std::sync::{Arc, Mutex};

use skillforge::buff::{
    BuffEvent, BuffLibrary, BuffTemplate, EffectModule, RemoveReason, SpecialStateEffect,
    StackingType, StateFlags,
};
use skillforge::entity::{DamageType, Entity, EntityId, Vec2};
use skillforge::error::SkillError;
use skillforge::sim::{Arena, Unit};
use skillforge::timeline::{
    Action, ActionKind, ActionTarget, BuffAction, CameraAction, DamageAction, Easing, ExitReason,
    LifecyclePhase, LifecycleState, MovementAction, PlaybackEvent, PlayerState, SkillData,
    SkillPlayer, TraceMode, Track,
};

const CASTER: EntityId = EntityId(1);
const TARGET: EntityId = EntityId(2);
const FRAME: f64 = 1.0 / 30.0;

fn damage(amount: f64, tick_interval: u32) -> ActionKind {
    ActionKind::Damage(DamageAction {
        amount,
        damage_type: DamageType::Physical,
        target: ActionTarget::Targets,
        tick_interval,
    })
}

fn buff(buff_id: &str, remove_on_exit: bool) -> ActionKind {
    ActionKind::Buff(BuffAction {
        buff_id: buff_id.to_string(),
        target: ActionTarget::Targets,
        remove_on_exit,
    })
}

fn arena() -> Arena {
    let mut library = BuffLibrary::new();
    library.insert(
        BuffTemplate::new("rooted", "Rooted")
            .infinite()
            .with_effect(EffectModule::SpecialState(SpecialStateEffect {
                flags: StateFlags::ROOT,
            })),
    );
    let mut arena = Arena::new(Arc::new(library));
    arena.add_unit(Unit::new(CASTER, "caster", 1000.0));
    arena.add_unit(Unit::new(TARGET, "target", 1000.0).at(Vec2::new(3.0, 0.0)));
    arena
}

fn player_for(skill: SkillData) -> SkillPlayer {
    let mut player = SkillPlayer::new(CASTER).with_targets(vec![TARGET]);
    player.set_trace_mode(TraceMode::Events);
    player.load(Arc::new(skill)).expect("skill should load");
    player
}

fn run_frames(player: &mut SkillPlayer, arena: &mut Arena, frames: u32) {
    for _ in 0..frames {
        player.update(FRAME, arena);
    }
}

fn events_for<'a>(player: &'a SkillPlayer, track: usize, action: usize) -> Vec<&'a PlaybackEvent> {
    player
        .trace()
        .entries()
        .iter()
        .map(|entry| &entry.event)
        .filter(|event| event.action_ref() == Some((track, action)))
        .collect()
}

fn count(events: &[&PlaybackEvent], name: &str) -> usize {
    events.iter().filter(|event| event.name() == name).count()
}

fn exit_reasons(events: &[&PlaybackEvent]) -> Vec<ExitReason> {
    events
        .iter()
        .filter_map(|event| match event {
            PlaybackEvent::ActionExited { reason, .. } => Some(*reason),
            _ => None,
        })
        .collect()
}

#[test]
fn action_window_runs_execute_once_process_per_frame_and_exit_once() {
    let skill = SkillData::new("strike", 30.0, 30)
        .with_track(Track::new("hits").with_action(Action::new(10, 5, damage(10.0, 0))));
    let mut arena = arena();
    let mut player = player_for(skill);
    assert!(player.play(&mut arena));
    run_frames(&mut player, &mut arena, 40);

    assert_eq!(player.state(), PlayerState::Finished);
    let events = events_for(&player, 0, 0);
    assert_eq!(count(&events, "action_executed"), 1);
    assert_eq!(count(&events, "action_ticked"), 5);
    assert_eq!(exit_reasons(&events), vec![ExitReason::Completed]);

    let ticked: Vec<u32> = events
        .iter()
        .filter_map(|event| match event {
            PlaybackEvent::ActionTicked { relative_frame, .. } => Some(*relative_frame),
            _ => None,
        })
        .collect();
    assert_eq!(ticked, vec![0, 1, 2, 3, 4]);
    assert_eq!(arena.unit(TARGET).map(Unit::health), Some(990.0));
}

#[test]
fn exit_lands_on_the_last_window_frame() {
    let skill = SkillData::new("strike", 30.0, 30)
        .with_track(Track::new("hits").with_action(Action::new(10, 5, damage(1.0, 0))));
    let mut arena = arena();
    let mut player = player_for(skill);
    player.play(&mut arena);
    run_frames(&mut player, &mut arena, 40);

    let exit_frame = player
        .trace()
        .entries()
        .iter()
        .find(|entry| entry.event.name() == "action_exited")
        .map(|entry| entry.frame);
    assert_eq!(exit_frame, Some(14));
}

#[test]
fn periodic_damage_hits_on_interval_multiples_inside_window() {
    let skill = SkillData::new("channel", 30.0, 20)
        .with_track(Track::new("beam").with_action(Action::new(0, 10, damage(5.0, 3))));
    let mut arena = arena();
    let mut player = player_for(skill);
    player.play(&mut arena);
    run_frames(&mut player, &mut arena, 25);

    // Execute at 0, ticks at relative 3, 6, 9.
    assert_eq!(arena.unit(TARGET).map(Unit::health), Some(980.0));
}

#[test]
fn small_host_steps_accumulate_to_exact_frames() {
    let skill = SkillData::new("long", 30.0, 300);
    let skill = skill.with_track(Track::new("idle").with_action(Action::new(299, 0, damage(0.0, 0))));
    let mut arena = arena();
    let mut player = player_for(skill);
    player.play(&mut arena);
    let mut total = 0;
    for _ in 0..1000 {
        total += player.update(0.003, &mut arena);
    }
    assert_eq!(total, 90);
    assert_eq!(player.current_frame(), 90);
}

#[test]
fn speed_multiplier_scales_frames_per_update() {
    let skill = SkillData::new("fast", 30.0, 60)
        .with_track(Track::new("t").with_action(Action::new(50, 1, damage(1.0, 0))));
    let mut arena = arena();
    let mut player = player_for(skill);
    player.set_speed(2.0);
    player.play(&mut arena);
    assert_eq!(player.update(FRAME, &mut arena), 2);
    assert_eq!(player.current_frame(), 2);
}

#[test]
fn stop_at_frame_zero_exits_once_and_never_executes() {
    let skill = SkillData::new("root", 30.0, 30)
        .with_track(Track::new("cc").with_action(Action::new(0, 20, buff("rooted", true))));
    let mut arena = arena();
    let mut player = player_for(skill);
    player.play(&mut arena);
    assert!(player.stop(&mut arena));
    run_frames(&mut player, &mut arena, 5);

    let events = events_for(&player, 0, 0);
    assert_eq!(count(&events, "action_executed"), 0);
    assert_eq!(exit_reasons(&events), vec![ExitReason::Stopped]);
    assert_eq!(player.state(), PlayerState::Stopped);
    assert!(arena.drain_buff_events().is_empty());
}

#[test]
fn stop_mid_play_removes_applied_buffs_exactly_once() {
    let skill = SkillData::new("root", 30.0, 30)
        .with_track(Track::new("cc").with_action(Action::new(0, 20, buff("rooted", true))));
    let mut arena = arena();
    let mut player = player_for(skill);
    player.play(&mut arena);
    run_frames(&mut player, &mut arena, 5);
    assert!(arena
        .unit(TARGET)
        .is_some_and(|unit| unit.state_flags().contains(StateFlags::ROOT)));

    assert!(player.stop(&mut arena));
    assert!(!player.stop(&mut arena));
    run_frames(&mut player, &mut arena, 30);

    let events = events_for(&player, 0, 0);
    assert_eq!(exit_reasons(&events), vec![ExitReason::Stopped]);
    let removed: Vec<RemoveReason> = arena
        .drain_buff_events()
        .into_iter()
        .filter_map(|(_, event)| match event {
            BuffEvent::Removed { reason, .. } => Some(reason),
            _ => None,
        })
        .collect();
    assert_eq!(removed, vec![RemoveReason::Removed]);
    assert!(arena
        .unit(TARGET)
        .is_some_and(|unit| !unit.state_flags().contains(StateFlags::ROOT)));
}

#[test]
fn buffs_without_remove_on_exit_outlive_the_action() {
    let skill = SkillData::new("root", 30.0, 10)
        .with_track(Track::new("cc").with_action(Action::new(0, 2, buff("rooted", false))));
    let mut arena = arena();
    let mut player = player_for(skill);
    player.play(&mut arena);
    run_frames(&mut player, &mut arena, 15);
    assert_eq!(player.state(), PlayerState::Finished);
    assert_eq!(arena.unit(TARGET).map(|unit| unit.active_buffs().len()), Some(1));
}

#[test]
fn forward_seek_skips_execute_and_exits_passed_actions() {
    let skill = SkillData::new("combo", 30.0, 60)
        .with_track(Track::new("a").with_action(Action::new(10, 10, damage(10.0, 0))))
        .with_track(Track::new("b").with_action(Action::new(40, 5, damage(10.0, 0))));
    let mut arena = arena();
    let mut player = player_for(skill);
    player.play(&mut arena);
    run_frames(&mut player, &mut arena, 5);

    assert!(player.set_frame(15, &mut arena));
    assert_eq!(player.current_frame(), 15);
    let a = events_for(&player, 0, 0);
    assert_eq!(count(&a, "action_executed"), 0);
    assert_eq!(count(&a, "action_ticked"), 1);
    assert_eq!(player.runtime(1, 0).map(|r| r.state()), Some(LifecycleState::Initialized));

    assert!(player.set_frame(50, &mut arena));
    assert_eq!(exit_reasons(&events_for(&player, 0, 0)), vec![ExitReason::Seek]);
    assert_eq!(exit_reasons(&events_for(&player, 1, 0)), vec![ExitReason::Seek]);

    run_frames(&mut player, &mut arena, 20);
    assert_eq!(player.state(), PlayerState::Finished);
    assert_eq!(player.trace().count("action_executed"), 0);
    assert_eq!(arena.unit(TARGET).map(Unit::health), Some(1000.0));
}

#[test]
fn seek_onto_start_frame_leaves_execute_to_next_update() {
    let skill = SkillData::new("combo", 30.0, 30)
        .with_track(Track::new("a").with_action(Action::new(10, 3, damage(10.0, 0))));
    let mut arena = arena();
    let mut player = player_for(skill);
    player.play(&mut arena);
    player.set_frame(10, &mut arena);
    assert_eq!(player.trace().count("action_ticked"), 0);

    player.update(FRAME, &mut arena);
    assert_eq!(player.trace().count("action_executed"), 1);
    assert_eq!(arena.unit(TARGET).map(Unit::health), Some(990.0));
}

#[test]
fn backward_seek_exits_already_run_actions_for_the_rest_of_the_pass() {
    let skill = SkillData::new("combo", 30.0, 30)
        .with_track(Track::new("a").with_action(Action::new(10, 10, damage(10.0, 0))));
    let mut arena = arena();
    let mut player = player_for(skill);
    player.play(&mut arena);
    run_frames(&mut player, &mut arena, 12);
    assert_eq!(player.trace().count("action_executed"), 1);

    player.set_frame(2, &mut arena);
    assert_eq!(exit_reasons(&events_for(&player, 0, 0)), vec![ExitReason::Seek]);
    run_frames(&mut player, &mut arena, 40);
    assert_eq!(player.trace().count("action_executed"), 1);
    assert_eq!(arena.unit(TARGET).map(Unit::health), Some(990.0));
}

#[test]
fn seek_is_clamped_to_the_last_frame() {
    let skill = SkillData::new("short", 30.0, 10)
        .with_track(Track::new("a").with_action(Action::new(0, 1, damage(1.0, 0))));
    let mut arena = arena();
    let mut player = player_for(skill);
    player.play(&mut arena);
    player.set_frame(500, &mut arena);
    assert_eq!(player.current_frame(), 9);
}

#[test]
fn looping_reinitializes_every_pass() {
    let skill = SkillData::new("loop", 30.0, 10)
        .with_track(Track::new("a").with_action(Action::new(2, 1, damage(1.0, 0))));
    let mut arena = arena();
    let mut player = player_for(skill);
    player.set_looping(true);
    player.play(&mut arena);
    run_frames(&mut player, &mut arena, 25);

    assert_eq!(player.state(), PlayerState::Playing);
    assert_eq!(player.loop_count(), 2);
    assert_eq!(player.current_frame(), 5);
    assert_eq!(player.trace().count("skill_looped"), 2);
    assert_eq!(player.trace().count("action_executed"), 3);
    assert_eq!(arena.unit(TARGET).map(Unit::health), Some(997.0));
}

#[test]
fn commands_pause_resume_jump_and_stop_between_updates() {
    let skill = SkillData::new("cmd", 30.0, 60)
        .with_track(Track::new("a").with_action(Action::new(30, 5, damage(1.0, 0))));
    let mut arena = arena();
    let mut player = player_for(skill);
    let sender = player.command_sender();
    player.play(&mut arena);
    run_frames(&mut player, &mut arena, 3);

    assert!(sender.request_pause());
    assert_eq!(player.update(FRAME, &mut arena), 0);
    assert_eq!(player.state(), PlayerState::Paused);
    assert_eq!(player.current_frame(), 3);

    sender.request_resume();
    sender.request_frame_jump(20);
    assert_eq!(player.update(FRAME, &mut arena), 1);
    assert_eq!(player.current_frame(), 21);

    sender.request_stop();
    assert_eq!(player.update(FRAME, &mut arena), 0);
    assert_eq!(player.state(), PlayerState::Stopped);
    assert_eq!(player.trace().count("skill_stopped"), 1);
}

#[test]
fn listeners_receive_every_event_in_order() {
    let skill = SkillData::new("listen", 30.0, 3)
        .with_track(Track::new("a").with_action(Action::new(1, 1, damage(1.0, 0))));
    let mut arena = arena();
    let mut player = player_for(skill);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    player.add_listener(move |event: &PlaybackEvent| {
        if let Ok(mut names) = sink.lock() {
            names.push(event.name());
        }
    });
    player.play(&mut arena);
    run_frames(&mut player, &mut arena, 5);

    let names = seen.lock().expect("listener lock").clone();
    assert_eq!(names.first(), Some(&"action_initialized"));
    assert_eq!(names.last(), Some(&"skill_finished"));
    assert_eq!(names.iter().filter(|name| **name == "frame_changed").count(), 3);
}

#[test]
fn a_faulting_action_never_stops_its_siblings() {
    let skill = SkillData::new("faulty", 30.0, 10)
        .with_track(Track::new("bad").with_action(Action::new(0, 1, buff("missing", false))))
        .with_track(Track::new("good").with_action(Action::new(0, 1, damage(25.0, 0))));
    let mut arena = arena();
    let mut player = player_for(skill);
    player.play(&mut arena);
    run_frames(&mut player, &mut arena, 12);

    assert_eq!(player.state(), PlayerState::Finished);
    let faults: Vec<LifecyclePhase> = player
        .trace()
        .entries()
        .iter()
        .filter_map(|entry| match &entry.event {
            PlaybackEvent::ActionFault { phase, .. } => Some(*phase),
            _ => None,
        })
        .collect();
    assert_eq!(faults, vec![LifecyclePhase::Execute]);
    assert_eq!(arena.unit(TARGET).map(Unit::health), Some(975.0));
}

#[test]
fn invalid_parameters_fault_on_initialize() {
    let skill = SkillData::new("negative", 30.0, 5)
        .with_track(Track::new("a").with_action(Action::new(0, 1, damage(-5.0, 0))));
    let mut arena = arena();
    let mut player = player_for(skill);
    player.play(&mut arena);

    let fault = player.trace().entries().iter().find_map(|entry| match &entry.event {
        PlaybackEvent::ActionFault { phase, message, .. } => Some((*phase, message.clone())),
        _ => None,
    });
    let (phase, message) = fault.expect("initialize fault");
    assert_eq!(phase, LifecyclePhase::Initialize);
    assert!(message.contains("amount"));
}

#[test]
fn movement_reaches_the_offset_on_the_last_window_frame() {
    let movement = ActionKind::Movement(MovementAction {
        offset: Vec2::new(3.0, 0.0),
        easing: Easing::Linear,
    });
    let skill = SkillData::new("dash", 30.0, 10)
        .with_track(Track::new("move").with_action(Action::new(0, 3, movement)));
    let mut arena = arena();
    let mut player = player_for(skill);
    player.play(&mut arena);

    run_frames(&mut player, &mut arena, 1);
    let x = arena.unit(CASTER).map(|unit| unit.position().x).unwrap_or_default();
    assert!((x - 1.0).abs() < 1e-9, "expected 1.0 after one frame, got {x}");

    run_frames(&mut player, &mut arena, 10);
    assert_eq!(arena.unit(CASTER).map(|unit| unit.position()), Some(Vec2::new(3.0, 0.0)));
}

#[test]
fn disabled_tracks_and_actions_are_not_played() {
    let skill = SkillData::new("quiet", 30.0, 10)
        .with_track(Track::new("off").with_action(Action::new(0, 1, damage(10.0, 0))).disabled())
        .with_track(Track::new("on").with_action(Action::new(1, 1, damage(10.0, 0)).disabled()));
    let mut arena = arena();
    let mut player = player_for(skill);
    assert!(player.runtimes().is_empty());
    player.play(&mut arena);
    run_frames(&mut player, &mut arena, 12);
    assert_eq!(arena.unit(TARGET).map(Unit::health), Some(1000.0));
}

#[test]
fn load_rejects_bad_frame_rates_and_empty_timelines() {
    let mut player = SkillPlayer::new(CASTER);
    assert!(matches!(
        player.load(Arc::new(SkillData::new("zero", 0.0, 10))),
        Err(SkillError::InvalidFrameRate { .. })
    ));
    assert!(matches!(
        player.load(Arc::new(SkillData::new("empty", 30.0, 0))),
        Err(SkillError::EmptyTimeline { .. })
    ));
}

#[test]
fn load_while_playing_is_refused_and_short_durations_extend() {
    let skill = SkillData::new("short", 30.0, 5)
        .with_track(Track::new("a").with_action(Action::new(8, 4, damage(1.0, 0))));
    let mut arena = arena();
    let mut player = player_for(skill.clone());
    assert_eq!(player.total_frames(), 12);

    player.play(&mut arena);
    assert!(!player.play(&mut arena));
    assert!(matches!(
        player.load(Arc::new(skill)),
        Err(SkillError::InvalidState("playing"))
    ));
}

#[test]
fn transport_calls_are_ignored_in_the_wrong_state() {
    let skill = SkillData::new("s", 30.0, 5)
        .with_track(Track::new("a").with_action(Action::new(0, 1, damage(1.0, 0))));
    let mut arena = arena();
    let mut player = player_for(skill);
    assert!(!player.pause());
    assert!(!player.resume());
    assert!(!player.stop(&mut arena));
    assert!(!player.set_frame(2, &mut arena));
    assert_eq!(player.update(FRAME, &mut arena), 0);
    assert_eq!(player.state(), PlayerState::Idle);
}

#[test]
fn zero_duration_action_on_the_last_authored_frame_still_executes() {
    let skill = SkillData::new("flash", 30.0, 10).with_track(
        Track::new("camera").with_action(Action::new(
            10,
            0,
            ActionKind::Camera(CameraAction { intensity: 0.5 }),
        )),
    );
    let mut arena = arena();
    let mut player = player_for(skill);
    assert_eq!(player.total_frames(), 11);
    player.play(&mut arena);
    run_frames(&mut player, &mut arena, 20);

    let events = events_for(&player, 0, 0);
    assert_eq!(count(&events, "action_executed"), 1);
    assert_eq!(exit_reasons(&events), vec![ExitReason::Completed]);
    assert_eq!(arena.cues().len(), 1);
}

fn shared_target_arena() -> Arena {
    let mut library = BuffLibrary::new();
    library.insert(
        BuffTemplate::new("pinned", "Pinned")
            .infinite()
            .stacking(StackingType::Independent, 1)
            .with_effect(EffectModule::SpecialState(SpecialStateEffect {
                flags: StateFlags::ROOT,
            })),
    );
    library.insert(
        BuffTemplate::new("sunder", "Sunder")
            .infinite()
            .stacking(StackingType::Stack, 5),
    );
    let mut arena = Arena::new(Arc::new(library));
    arena.add_unit(Unit::new(CASTER, "caster", 1000.0));
    arena.add_unit(Unit::new(EntityId(3), "ally", 1000.0));
    arena.add_unit(Unit::new(TARGET, "target", 1000.0).at(Vec2::new(3.0, 0.0)));
    arena
}

#[test]
fn remove_on_exit_only_undoes_the_players_own_application() {
    let mut arena = shared_target_arena();
    let short = SkillData::new("short_pin", 30.0, 10)
        .with_track(Track::new("cc").with_action(Action::new(0, 2, buff("pinned", true))))
        .with_track(Track::new("armor").with_action(Action::new(0, 2, buff("sunder", true))));
    let long = SkillData::new("long_pin", 30.0, 30)
        .with_track(Track::new("cc").with_action(Action::new(0, 20, buff("pinned", true))))
        .with_track(Track::new("armor").with_action(Action::new(0, 20, buff("sunder", true))));

    let mut first = player_for(short);
    let mut second = SkillPlayer::new(EntityId(3)).with_targets(vec![TARGET]);
    second.load(Arc::new(long)).expect("skill should load");
    first.play(&mut arena);
    second.play(&mut arena);
    for _ in 0..5 {
        first.update(FRAME, &mut arena);
        second.update(FRAME, &mut arena);
    }

    let target = arena.unit(TARGET).expect("target");
    assert_eq!(target.buffs().count_of("pinned"), 1);
    assert_eq!(target.buffs().stacks_of("sunder"), Some(1));
    assert!(target.state_flags().contains(StateFlags::ROOT));

    run_frames(&mut second, &mut arena, 30);
    let target = arena.unit(TARGET).expect("target");
    assert_eq!(target.buffs().count_of("pinned"), 0);
    assert_eq!(target.buffs().stacks_of("sunder"), None);
    assert!(!target.state_flags().contains(StateFlags::ROOT));
}
