//! Frame-accurate skill timelines and a modular buff engine.
//!
//! [timeline::SkillPlayer] drives authored actions frame by frame against a
//! [entity::World]; [buff::BuffCollection] owns the buffs on one target and
//! resolves stacking, durations, effects and triggers.

pub mod attributes;
pub mod buff;
pub mod cli;
pub mod config;
pub mod data;
pub mod entity;
pub mod error;
pub mod export;
pub mod parallel;
pub mod rng;
pub mod sim;
pub mod timeline;
