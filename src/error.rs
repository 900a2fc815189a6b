use thiserror::Error;

use crate::entity::EntityId;

/// Errors raised by playback control that cannot be clamped away.
#[derive(Debug, Error)]
pub enum SkillError {
    #[error("cannot load skill while player is {0}")]
    InvalidState(&'static str),

    #[error("skill '{skill}' has invalid frame rate {frame_rate}")]
    InvalidFrameRate { skill: String, frame_rate: f64 },

    #[error("skill '{skill}' has zero total duration")]
    EmptyTimeline { skill: String },
}

/// A fault inside one action callback. Captured per action by the player.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("entity {0} not found")]
    MissingEntity(EntityId),

    #[error("unknown buff template '{0}'")]
    UnknownBuff(String),

    #[error("invalid parameter {name}: {value}")]
    InvalidParameter { name: &'static str, value: f64 },
}

/// A fault inside one effect or trigger callback. Captured per module by the buff collection.
#[derive(Debug, Error)]
pub enum EffectError {
    #[error("invalid tick interval {0}")]
    InvalidInterval(f64),

    #[error("invalid magnitude {0}")]
    InvalidMagnitude(f64),

    #[error("effect index {index} out of range ({len} effects)")]
    EffectIndexOutOfRange { index: usize, len: usize },
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid data: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to flush CSV output: {0}")]
    Flush(String),

    #[error("CSV output is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("failed to serialize JSON: {0}")]
    Json(#[from] serde_json::Error),
}
