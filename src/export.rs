//! Trace export: playback and buff events as CSV rows, whole reports as JSON.

use serde::Serialize;

use crate::buff::BuffEvent;
use crate::entity::EntityId;
use crate::error::ExportError;
use crate::sim::RunReport;
use crate::timeline::{PlaybackEvent, TraceEntry};

#[derive(Debug, Serialize)]
struct TraceRow {
    frame: u32,
    event: &'static str,
    track: Option<usize>,
    action: Option<usize>,
    detail: String,
}

#[derive(Debug, Serialize)]
struct BuffRow {
    entity: u64,
    event: &'static str,
    instance: u64,
    template: String,
    detail: String,
}

fn playback_detail(event: &PlaybackEvent) -> String {
    match event {
        PlaybackEvent::SkillStarted { skill } | PlaybackEvent::SkillFinished { skill } => skill.clone(),
        PlaybackEvent::SkillStopped { skill, frame } => format!("{skill} at {frame}"),
        PlaybackEvent::SkillLooped { skill, loop_count } => format!("{skill} loop {loop_count}"),
        PlaybackEvent::SkillPaused { frame }
        | PlaybackEvent::SkillResumed { frame }
        | PlaybackEvent::FrameChanged { frame } => frame.to_string(),
        PlaybackEvent::Seeked { from, to } => format!("{from}->{to}"),
        PlaybackEvent::ActionInitialized { .. } => String::new(),
        PlaybackEvent::ActionExecuted { name, kind, .. } => format!("{kind}:{name}"),
        PlaybackEvent::ActionTicked { relative_frame, .. } => format!("relative {relative_frame}"),
        PlaybackEvent::ActionExited { reason, .. } => format!("{reason:?}").to_lowercase(),
        PlaybackEvent::ActionFault { phase, message, .. } => format!("{phase:?}: {message}"),
    }
}

/// One CSV row per trace entry. `include_frames` controls the noisy per-frame rows.
pub fn trace_to_csv(entries: &[TraceEntry], include_frames: bool) -> Result<String, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for entry in entries {
        if !include_frames && matches!(entry.event, PlaybackEvent::FrameChanged { .. }) {
            continue;
        }
        let action_ref = entry.event.action_ref();
        writer.serialize(TraceRow {
            frame: entry.frame,
            event: entry.event.name(),
            track: action_ref.map(|(track, _)| track),
            action: action_ref.map(|(_, action)| action),
            detail: playback_detail(&entry.event),
        })?;
    }
    finish(writer)
}

pub fn buff_events_to_csv(events: &[(EntityId, BuffEvent)]) -> Result<String, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for (entity, event) in events {
        let row = match event {
            BuffEvent::Applied { instance, template } => BuffRow {
                entity: entity.0,
                event: "applied",
                instance: instance.0,
                template: template.clone(),
                detail: String::new(),
            },
            BuffEvent::Refreshed { instance, template } => BuffRow {
                entity: entity.0,
                event: "refreshed",
                instance: instance.0,
                template: template.clone(),
                detail: String::new(),
            },
            BuffEvent::StackChanged {
                instance,
                template,
                old,
                new,
            } => BuffRow {
                entity: entity.0,
                event: "stack_changed",
                instance: instance.0,
                template: template.clone(),
                detail: format!("{old}->{new}"),
            },
            BuffEvent::Removed {
                instance,
                template,
                reason,
            } => BuffRow {
                entity: entity.0,
                event: "removed",
                instance: instance.0,
                template: template.clone(),
                detail: format!("{reason:?}").to_lowercase(),
            },
            BuffEvent::TriggerFired {
                instance,
                template,
                trigger_index,
                event,
            } => BuffRow {
                entity: entity.0,
                event: "trigger_fired",
                instance: instance.0,
                template: template.clone(),
                detail: format!("trigger {trigger_index} on {event:?}"),
            },
            BuffEvent::ShieldBroken {
                instance,
                template,
                effect_index,
            } => BuffRow {
                entity: entity.0,
                event: "shield_broken",
                instance: instance.0,
                template: template.clone(),
                detail: format!("effect {effect_index}"),
            },
            BuffEvent::Fault {
                instance,
                template,
                effect_index,
                message,
            } => BuffRow {
                entity: entity.0,
                event: "fault",
                instance: instance.0,
                template: template.clone(),
                detail: format!("effect {effect_index}: {message}"),
            },
        };
        writer.serialize(row)?;
    }
    finish(writer)
}

pub fn report_to_json(report: &RunReport) -> Result<String, ExportError> {
    Ok(serde_json::to_string_pretty(report)?)
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<String, ExportError> {
    let bytes = writer
        .into_inner()
        .map_err(|err| ExportError::Flush(err.to_string()))?;
    Ok(String::from_utf8(bytes)?)
}
