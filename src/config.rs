//! Engine settings read from environment variables.
//!
//! Invalid values are logged and replaced by the default, never fatal.

use std::env;

use crate::parallel::WorkerPool;
use crate::timeline::TraceMode;

pub const ENV_FRAME_RATE: &str = "SKILLFORGE_FRAME_RATE";
pub const ENV_SEED: &str = "SKILLFORGE_SEED";
pub const ENV_TRACE: &str = "SKILLFORGE_TRACE";
pub const ENV_WORKERS: &str = "SKILLFORGE_WORKERS";
pub const ENV_LOG: &str = "SKILLFORGE_LOG";

pub const DEFAULT_FRAME_RATE: f64 = 30.0;
pub const DEFAULT_SEED: u64 = 7;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// Used for skill files that omit `frame_rate`.
    pub frame_rate: f64,
    pub seed: u64,
    pub trace_mode: TraceMode,
    /// 0 uses the global Rayon pool.
    pub workers: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frame_rate: DEFAULT_FRAME_RATE,
            seed: DEFAULT_SEED,
            trace_mode: TraceMode::Off,
            workers: 0,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from any key lookup (tests pass a map instead of the process env).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let frame_rate = parse_or_default(lookup(ENV_FRAME_RATE), ENV_FRAME_RATE, defaults.frame_rate, |raw| {
            raw.parse::<f64>().ok().filter(|rate| rate.is_finite() && *rate > 0.0)
        });
        let seed = parse_or_default(lookup(ENV_SEED), ENV_SEED, defaults.seed, |raw| raw.parse().ok());
        let trace_mode = parse_or_default(lookup(ENV_TRACE), ENV_TRACE, defaults.trace_mode, parse_trace_mode);
        let workers = parse_or_default(lookup(ENV_WORKERS), ENV_WORKERS, defaults.workers, |raw| raw.parse().ok());
        Self {
            frame_rate,
            seed,
            trace_mode,
            workers,
        }
    }

    pub fn worker_pool(&self) -> WorkerPool {
        WorkerPool::with_workers(self.workers)
    }
}

pub fn parse_trace_mode(raw: &str) -> Option<TraceMode> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "off" | "none" => Some(TraceMode::Off),
        "events" | "on" => Some(TraceMode::Events),
        _ => None,
    }
}

fn parse_or_default<T, P>(raw: Option<String>, name: &str, default: T, parse: P) -> T
where
    T: Copy + std::fmt::Debug,
    P: FnOnce(&str) -> Option<T>,
{
    let Some(raw) = raw else {
        return default;
    };
    parse(&raw).unwrap_or_else(|| {
        tracing::warn!("invalid {name} '{raw}', defaulting to {default:?}");
        default
    })
}
