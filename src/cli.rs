use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::buff::BuffLibrary;
use crate::config::EngineConfig;
use crate::data::loader::{load_buff_dir, load_buff_file, load_skill_file, LoadedBuffs};
use crate::data::validate::{validate_skill, ValidationReport, ValidationSeverity};
use crate::entity::{EntityId, Vec2};
use crate::export::{report_to_json, trace_to_csv};
use crate::parallel::{run_replicas, total_damage, BatchJob};
use crate::sim::{run_skill, Arena, RunOptions, Unit};
use crate::timeline::{SkillData, TraceMode};

pub const CASTER: EntityId = EntityId(1);
pub const TARGET: EntityId = EntityId(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Play,
    Validate,
    Buffs,
    Batch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Json,
    Table,
    Csv,
}

pub fn parse_command(args: &[String]) -> Option<Command> {
    match args.get(1).map(String::as_str) {
        Some("play") => Some(Command::Play),
        Some("validate") => Some(Command::Validate),
        Some("buffs") => Some(Command::Buffs),
        Some("batch") => Some(Command::Batch),
        _ => None,
    }
}

pub fn run_with_args(args: &[String]) -> i32 {
    let config = EngineConfig::from_env();
    match parse_command(args) {
        Some(Command::Play) => handle_play(args, &config),
        Some(Command::Validate) => handle_validate(args, &config),
        Some(Command::Buffs) => handle_buffs(args),
        Some(Command::Batch) => handle_batch(args, &config),
        None => {
            eprintln!("usage: skillforge <play|validate|buffs|batch>");
            2
        }
    }
}

const VALUE_FLAGS: &[&str] = &["--settle"];

/// Positional arguments after the command, flags and their values removed.
fn positional(args: &[String]) -> Vec<&str> {
    let mut out = Vec::new();
    let mut iter = args.iter().skip(2).map(String::as_str);
    while let Some(arg) = iter.next() {
        if VALUE_FLAGS.contains(&arg) {
            iter.next();
        } else if !arg.starts_with("--") {
            out.push(arg);
        }
    }
    out
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|arg| arg == flag)
        .and_then(|index| args.get(index + 1))
        .map(String::as_str)
}

fn output_format(args: &[String]) -> OutputFormat {
    if args.iter().any(|arg| arg == "--csv") {
        OutputFormat::Csv
    } else if args.iter().any(|arg| arg == "--table") {
        OutputFormat::Table
    } else {
        OutputFormat::Json
    }
}

fn print_diagnostics(report: &ValidationReport) {
    for diag in &report.diagnostics {
        if diag.severity != ValidationSeverity::Info {
            eprintln!("- {diag}");
        }
    }
}

fn load_library(path: Option<&str>) -> Result<Arc<BuffLibrary>, String> {
    let Some(path) = path else {
        return Ok(Arc::new(BuffLibrary::new()));
    };
    let loaded = load_buffs(path)?;
    print_diagnostics(&loaded.report);
    if loaded.report.has_errors() {
        return Err(format!("buff data '{path}' has errors"));
    }
    Ok(Arc::new(loaded.into_library()))
}

fn load_buffs(path: &str) -> Result<LoadedBuffs, String> {
    let result = if Path::new(path).is_dir() {
        load_buff_dir(path)
    } else {
        load_buff_file(path)
    };
    result.map_err(|err| err.to_string())
}

fn load_skill(path: &str, config: &EngineConfig) -> Result<(SkillData, ValidationReport), String> {
    let loaded = load_skill_file(path, config.frame_rate).map_err(|err| err.to_string())?;
    Ok((loaded.skill, loaded.report))
}

/// Caster at the origin facing one target three units away.
fn duel_arena(library: Arc<BuffLibrary>, seed: u64) -> Arena {
    let mut arena = Arena::new(library);
    arena.add_unit(Unit::new(CASTER, "caster", 1000.0).with_seed(seed));
    arena.add_unit(
        Unit::new(TARGET, "target", 1000.0)
            .at(Vec2::new(3.0, 0.0))
            .with_seed(seed.wrapping_add(1)),
    );
    arena
}

fn handle_play(args: &[String], config: &EngineConfig) -> i32 {
    let positional = positional(args);
    let Some(skill_path) = positional.first() else {
        eprintln!(
            "usage: skillforge play <skill.json> [buffs.yaml|buff-dir] [--table|--csv] [--settle <secs>]"
        );
        return 2;
    };
    let format = output_format(args);

    let (skill, mut report) = match load_skill(skill_path, config) {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("failed to load skill: {err}");
            return 1;
        }
    };
    let library = match load_library(positional.get(1).copied()) {
        Ok(library) => library,
        Err(err) => {
            eprintln!("{err}");
            return 1;
        }
    };
    if positional.get(1).is_some() {
        report.extend(validate_skill(&skill, Some(&library)));
    }
    print_diagnostics(&report);
    if report.has_errors() {
        eprintln!("skill '{}' has errors, not playing", skill.id);
        return 1;
    }

    let mut arena = duel_arena(library, config.seed);
    let mut options = RunOptions::new(CASTER);
    options.settle_seconds = parse_f64_arg(flag_value(args, "--settle"), "settle", 0.0).max(0.0);
    options.trace_mode = match format {
        OutputFormat::Json => config.trace_mode,
        OutputFormat::Table | OutputFormat::Csv => TraceMode::Events,
    };
    let skill = Arc::new(skill);
    let result = match run_skill(Arc::clone(&skill), &mut arena, vec![TARGET], options) {
        Ok(result) => result,
        Err(err) => {
            eprintln!("playback failed: {err}");
            return 1;
        }
    };

    match format {
        OutputFormat::Table => {
            let target_health = result
                .units
                .iter()
                .find(|unit| unit.id == TARGET)
                .map_or(0.0, |unit| unit.health);
            let faults = result
                .trace
                .iter()
                .filter(|entry| entry.event.name() == "action_fault")
                .count();
            println!("skill\tframes\tfinished\ttrace_events\tbuff_events\tfaults\ttarget_health");
            println!(
                "{}\t{}\t{}\t{}\t{}\t{}\t{:.3}",
                result.skill,
                result.frames,
                result.finished,
                result.trace.len(),
                result.buff_events.len(),
                faults,
                target_health
            );
            0
        }
        OutputFormat::Csv => match trace_to_csv(&result.trace, false) {
            Ok(csv) => {
                print!("{csv}");
                0
            }
            Err(err) => {
                eprintln!("failed to export trace: {err}");
                1
            }
        },
        OutputFormat::Json => match report_to_json(&result) {
            Ok(payload) => {
                println!("{payload}");
                0
            }
            Err(err) => {
                eprintln!("failed to serialize playback result: {err}");
                1
            }
        },
    }
}

fn handle_validate(args: &[String], config: &EngineConfig) -> i32 {
    let positional = positional(args);
    let Some(skill_path) = positional.first() else {
        eprintln!("usage: skillforge validate <skill.json> [buffs.yaml|buff-dir]");
        return 2;
    };

    let (skill, mut report) = match load_skill(skill_path, config) {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("validation failed: {err}");
            return 1;
        }
    };
    if let Some(buff_path) = positional.get(1) {
        match load_buffs(buff_path) {
            Ok(loaded) => {
                report.extend(loaded.report.clone());
                let library = loaded.into_library();
                report.extend(validate_skill(&skill, Some(&library)));
            }
            Err(err) => {
                eprintln!("validation failed: {err}");
                return 1;
            }
        }
    }

    if report.has_errors() {
        eprintln!(
            "validation failed: {} issue(s)",
            report.count(ValidationSeverity::Error)
        );
        print_diagnostics(&report);
        1
    } else {
        print_diagnostics(&report);
        println!("validation passed: {skill_path}");
        0
    }
}

#[derive(Debug, Serialize)]
struct BuffRow<'a> {
    id: &'a str,
    name: &'a str,
    category: crate::buff::BuffCategory,
    duration_type: crate::buff::DurationType,
    duration: f64,
    stacking: crate::buff::StackingType,
    max_stacks: u32,
    effects: usize,
    triggers: usize,
}

fn handle_buffs(args: &[String]) -> i32 {
    let positional = positional(args);
    let Some(path) = positional.first() else {
        eprintln!("usage: skillforge buffs <buffs.yaml|buff-dir> [--table]");
        return 2;
    };
    let loaded = match load_buffs(path) {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("failed to load buffs: {err}");
            return 1;
        }
    };
    print_diagnostics(&loaded.report);

    let rows: Vec<BuffRow<'_>> = loaded
        .templates
        .iter()
        .map(|template| BuffRow {
            id: &template.id,
            name: &template.name,
            category: template.category,
            duration_type: template.duration_type,
            duration: template.duration,
            stacking: template.stacking,
            max_stacks: template.effective_max_stacks(),
            effects: template.effects.len(),
            triggers: template.triggers.len(),
        })
        .collect();

    if output_format(args) == OutputFormat::Table {
        println!("id\tname\tstacking\tmax_stacks\teffects\ttriggers");
        for row in &rows {
            println!(
                "{}\t{}\t{:?}\t{}\t{}\t{}",
                row.id, row.name, row.stacking, row.max_stacks, row.effects, row.triggers
            );
        }
    } else {
        match serde_json::to_string_pretty(&rows) {
            Ok(payload) => println!("{payload}"),
            Err(err) => {
                eprintln!("failed to serialize buff list: {err}");
                return 1;
            }
        }
    }

    if loaded.report.has_errors() {
        1
    } else {
        0
    }
}

#[derive(Debug, Serialize)]
struct BatchSummary {
    skill: String,
    playbacks: usize,
    finished: usize,
    failed: usize,
    total_damage: f64,
}

fn handle_batch(args: &[String], config: &EngineConfig) -> i32 {
    let positional = positional(args);
    let Some(skill_path) = positional.first() else {
        eprintln!("usage: skillforge batch <skill.json> [count] [buffs.yaml|buff-dir]");
        return 2;
    };
    let count = parse_usize_arg(positional.get(1).copied(), "count", 8);

    let (skill, report) = match load_skill(skill_path, config) {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("failed to load skill: {err}");
            return 1;
        }
    };
    print_diagnostics(&report);
    if report.has_errors() {
        return 1;
    }
    let library = match load_library(positional.get(2).copied()) {
        Ok(library) => library,
        Err(err) => {
            eprintln!("{err}");
            return 1;
        }
    };

    let skill = Arc::new(skill);
    let seed = config.seed;
    let outcomes = run_replicas(&skill, count, &config.worker_pool(), |index| BatchJob {
        label: format!("replica-{index}"),
        arena: duel_arena(Arc::clone(&library), seed.wrapping_add(index as u64 * 2)),
        targets: vec![TARGET],
        options: RunOptions {
            trace_mode: TraceMode::Off,
            ..RunOptions::new(CASTER)
        },
    });

    let summary = BatchSummary {
        skill: skill.id.clone(),
        playbacks: outcomes.len(),
        finished: outcomes
            .iter()
            .filter(|o| o.report.as_ref().is_ok_and(|r| r.finished))
            .count(),
        failed: outcomes.iter().filter(|o| o.report.is_err()).count(),
        total_damage: total_damage(&outcomes),
    };
    match serde_json::to_string_pretty(&summary) {
        Ok(payload) => {
            println!("{payload}");
            0
        }
        Err(err) => {
            eprintln!("failed to serialize batch summary: {err}");
            1
        }
    }
}

fn parse_usize_arg(raw: Option<&str>, name: &str, default: usize) -> usize {
    raw.and_then(|value| value.parse::<usize>().ok())
        .unwrap_or_else(|| {
            if let Some(value) = raw {
                eprintln!("invalid {name} '{value}', defaulting to {default}");
            }
            default
        })
}

fn parse_f64_arg(raw: Option<&str>, name: &str, default: f64) -> f64 {
    match raw.map(|value| (value, value.parse::<f64>())) {
        Some((_, Ok(parsed))) if parsed.is_finite() => parsed,
        Some((value, _)) => {
            eprintln!("invalid {name} '{value}', defaulting to {default}");
            default
        }
        None => default,
    }
}
