pub mod batch;
pub mod pool;

pub use batch::{run_batch, run_replicas, total_damage, BatchJob, BatchOutcome};
pub use pool::WorkerPool;
