//! Parallel batch playback.
//!
//! Every job owns its arena and its player, so playbacks of the same skill
//! share only the immutable `SkillData`.

use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;

use crate::entity::EntityId;
use crate::sim::{run_skill, Arena, RunOptions, RunReport};
use crate::timeline::SkillData;

use super::pool::WorkerPool;

pub struct BatchJob {
    pub label: String,
    pub arena: Arena,
    pub targets: Vec<EntityId>,
    pub options: RunOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchOutcome {
    pub index: usize,
    pub label: String,
    pub report: Result<RunReport, String>,
}

fn run_job(skill: &Arc<SkillData>, index: usize, job: BatchJob) -> BatchOutcome {
    let BatchJob {
        label,
        mut arena,
        targets,
        options,
    } = job;
    let report = run_skill(Arc::clone(skill), &mut arena, targets, options).map_err(|err| {
        tracing::warn!(skill = %skill.id, job = index, error = %err, "batch playback failed");
        err.to_string()
    });
    BatchOutcome {
        index,
        label,
        report,
    }
}

/// Plays `skill` once per job in parallel. Outcomes keep job order.
pub fn run_batch(skill: &Arc<SkillData>, jobs: Vec<BatchJob>, pool: &WorkerPool) -> Vec<BatchOutcome> {
    pool.install(|| {
        jobs.into_par_iter()
            .enumerate()
            .map(|(index, job)| run_job(skill, index, job))
            .collect()
    })
}

/// Builds and plays `count` jobs in parallel; `make` is called on the worker for each index.
pub fn run_replicas<F>(
    skill: &Arc<SkillData>,
    count: usize,
    pool: &WorkerPool,
    make: F,
) -> Vec<BatchOutcome>
where
    F: Fn(usize) -> BatchJob + Sync + Send,
{
    pool.install(|| {
        (0..count)
            .into_par_iter()
            .map(|index| run_job(skill, index, make(index)))
            .collect()
    })
}

/// Total damage taken by every unit across successful outcomes.
pub fn total_damage(outcomes: &[BatchOutcome]) -> f64 {
    outcomes
        .iter()
        .filter_map(|outcome| outcome.report.as_ref().ok())
        .flat_map(|report| report.units.iter())
        .map(|unit| unit.damage_taken)
        .sum()
}
