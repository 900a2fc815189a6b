//! Skill and buff data loading. Malformed elements are skipped and reported,
//! never fatal; only unreadable files and unparseable documents are errors.

use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::buff::{BuffLibrary, BuffTemplate};
use crate::error::LoadError;
use crate::timeline::{Action, SkillData, Track};

use super::validate::{validate_buff_templates, validate_skill, ValidationReport, ValidationSeverity};

#[derive(Debug, Clone)]
pub struct LoadedSkill {
    pub skill: SkillData,
    pub report: ValidationReport,
}

#[derive(Debug, Clone, Default)]
pub struct LoadedBuffs {
    pub templates: Vec<BuffTemplate>,
    pub report: ValidationReport,
}

impl LoadedBuffs {
    pub fn into_library(self) -> BuffLibrary {
        let mut library = BuffLibrary::new();
        for id in library.extend(self.templates) {
            tracing::warn!(buff = %id, "duplicate buff template, later definition wins");
        }
        library
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    Json,
    Yaml,
}

impl DataFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Yaml,
        }
    }
}

fn read(path: &Path) -> Result<String, LoadError> {
    fs::read_to_string(path).map_err(|source| LoadError::Read {
        path: path.display().to_string(),
        source,
    })
}

/// Parses skill JSON. Null or malformed tracks/actions are dropped with a warning.
/// `default_frame_rate` fills in a missing `frame_rate`.
pub fn parse_skill_json(raw: &str, default_frame_rate: f64) -> Result<LoadedSkill, LoadError> {
    let payload: Value = serde_json::from_str(raw)?;
    let object = payload
        .as_object()
        .ok_or_else(|| LoadError::Invalid("expected a top-level JSON object".to_string()))?;
    let mut report = ValidationReport::default();

    let id = object
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| LoadError::Invalid("missing non-empty 'id'".to_string()))?
        .to_string();
    let context = format!("skill '{id}'");

    let name = object
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or(&id)
        .to_string();
    let frame_rate = match object.get("frame_rate") {
        Some(value) => value.as_f64().ok_or_else(|| {
            LoadError::Invalid(format!("{context}.frame_rate: expected a number"))
        })?,
        None => {
            report.push(
                ValidationSeverity::Info,
                format!("{context}.frame_rate"),
                format!("missing, using default {default_frame_rate}"),
            );
            default_frame_rate
        }
    };
    let total_duration = object
        .get("total_duration")
        .and_then(Value::as_u64)
        .map(|frames| u32::try_from(frames).unwrap_or(u32::MAX))
        .unwrap_or(0);

    let mut tracks = Vec::new();
    let raw_tracks = object
        .get("tracks")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for (track_index, raw_track) in raw_tracks.iter().enumerate() {
        let track_context = format!("{context}.tracks[{track_index}]");
        let Some(track_object) = raw_track.as_object() else {
            tracing::warn!(skill = %id, track = track_index, "skipping null or non-object track");
            report.push(ValidationSeverity::Warning, track_context, "track is not an object, skipped");
            continue;
        };
        let mut track = Track::new(
            track_object
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default(),
        );
        track.enabled = track_object
            .get("enabled")
            .and_then(Value::as_bool)
            .unwrap_or(true);

        let raw_actions = track_object
            .get("actions")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for (action_index, raw_action) in raw_actions.iter().enumerate() {
            let action_context = format!("{track_context}.actions[{action_index}]");
            if raw_action.is_null() {
                tracing::warn!(skill = %id, track = track_index, action = action_index, "skipping null action");
                report.push(ValidationSeverity::Warning, action_context, "null action skipped");
                continue;
            }
            match serde_json::from_value::<Action>(raw_action.clone()) {
                Ok(action) => track.actions.push(action),
                Err(err) => {
                    tracing::warn!(
                        skill = %id,
                        track = track_index,
                        action = action_index,
                        error = %err,
                        "skipping malformed action"
                    );
                    report.push(
                        ValidationSeverity::Warning,
                        action_context,
                        format!("malformed action skipped: {err}"),
                    );
                }
            }
        }
        tracks.push(track);
    }

    let skill = SkillData {
        id,
        name,
        frame_rate,
        total_duration,
        tracks,
    };
    report.extend(validate_skill(&skill, None));
    Ok(LoadedSkill { skill, report })
}

pub fn load_skill_file(
    path: impl AsRef<Path>,
    default_frame_rate: f64,
) -> Result<LoadedSkill, LoadError> {
    let raw = read(path.as_ref())?;
    parse_skill_json(&raw, default_frame_rate)
}

/// Parses a buff document: either a top-level list of templates or `{ buffs: [...] }`.
/// Entries that fail to deserialize are skipped and reported.
pub fn parse_buff_templates(raw: &str, format: DataFormat) -> Result<LoadedBuffs, LoadError> {
    let mut loaded = LoadedBuffs::default();
    let mut accept = |index: usize, parsed: Result<BuffTemplate, String>| match parsed {
        Ok(template) => loaded.templates.push(template),
        Err(err) => {
            tracing::warn!(entry = index, error = %err, "skipping malformed buff template");
            loaded.report.push(
                ValidationSeverity::Warning,
                format!("buff[{index}]"),
                format!("malformed template skipped: {err}"),
            );
        }
    };

    match format {
        DataFormat::Json => {
            let payload: Value = serde_json::from_str(raw)?;
            let entries = payload
                .get("buffs")
                .and_then(Value::as_array)
                .or_else(|| payload.as_array())
                .ok_or_else(|| {
                    LoadError::Invalid("expected a list of buffs or { buffs: [...] }".to_string())
                })?;
            for (index, entry) in entries.iter().enumerate() {
                accept(
                    index,
                    serde_json::from_value(entry.clone()).map_err(|err| err.to_string()),
                );
            }
        }
        DataFormat::Yaml => {
            let payload: serde_yaml::Value = serde_yaml::from_str(raw)?;
            let entries = payload
                .get("buffs")
                .and_then(serde_yaml::Value::as_sequence)
                .or_else(|| payload.as_sequence())
                .ok_or_else(|| {
                    LoadError::Invalid("expected a list of buffs or { buffs: [...] }".to_string())
                })?;
            for (index, entry) in entries.iter().enumerate() {
                accept(
                    index,
                    serde_yaml::from_value(entry.clone()).map_err(|err| err.to_string()),
                );
            }
        }
    }

    let checks = validate_buff_templates(&loaded.templates);
    loaded.report.extend(checks);
    Ok(loaded)
}

pub fn load_buff_file(path: impl AsRef<Path>) -> Result<LoadedBuffs, LoadError> {
    let path = path.as_ref();
    let raw = read(path)?;
    parse_buff_templates(&raw, DataFormat::from_path(path))
}

fn is_buff_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| {
            name.ends_with(".buffs.yaml") || name.ends_with(".buffs.yml") || name.ends_with(".buffs.json")
        })
}

/// Loads every `*.buffs.{yaml,yml,json}` file in `dir`, in file-name order.
/// A missing directory yields nothing; unreadable files are skipped.
pub fn load_buff_dir(dir: impl AsRef<Path>) -> Result<LoadedBuffs, LoadError> {
    let dir = dir.as_ref();
    let mut merged = LoadedBuffs::default();
    if !dir.is_dir() {
        return Ok(merged);
    }
    let entries = fs::read_dir(dir).map_err(|source| LoadError::Read {
        path: dir.display().to_string(),
        source,
    })?;
    let mut paths: Vec<_> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_buff_file(path))
        .collect();
    paths.sort();

    for path in paths {
        match load_buff_file(&path) {
            Ok(loaded) => {
                merged.templates.extend(loaded.templates);
                merged.report.extend(loaded.report);
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "skipping unreadable buff file");
                merged.report.push(
                    ValidationSeverity::Warning,
                    path.display().to_string(),
                    format!("skipped: {err}"),
                );
            }
        }
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_and_malformed_actions_are_skipped() {
        let raw = r#"{
            "id": "slash",
            "frame_rate": 30,
            "total_duration": 20,
            "tracks": [
                null,
                { "name": "hits", "actions": [
                    null,
                    { "frame": 2, "type": "damage", "amount": 10 },
                    { "frame": "soon", "type": "damage", "amount": 10 },
                    { "frame": 4, "type": "teleport" }
                ]}
            ]
        }"#;
        let loaded = parse_skill_json(raw, 30.0).expect("load");
        assert_eq!(loaded.skill.tracks.len(), 1);
        assert_eq!(loaded.skill.tracks[0].actions.len(), 1);
        assert_eq!(loaded.report.count(ValidationSeverity::Warning), 4);
    }

    #[test]
    fn missing_frame_rate_uses_default() {
        let loaded = parse_skill_json(r#"{"id":"x","total_duration":3}"#, 60.0).expect("load");
        assert_eq!(loaded.skill.frame_rate, 60.0);
        assert_eq!(loaded.report.count(ValidationSeverity::Info), 1);
    }

    #[test]
    fn missing_id_is_an_error() {
        assert!(matches!(
            parse_skill_json(r#"{"frame_rate":30}"#, 30.0),
            Err(LoadError::Invalid(_))
        ));
    }
}
