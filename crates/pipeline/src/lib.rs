mod dispatch;
mod report;
mod validate;
mod worker;

pub use dispatch::run;
pub use report::LoadReport;
pub use validate::validate;
pub use worker::WorkerStats;

use std::time::Duration;

use sluice_feed::Batch;
use sluice_runtime::{DEFAULT_POOL_SIZE, STARTUP_TIMEOUT};
use thiserror::Error;

/// Message on a worker channel: either work, or the one-per-worker
/// termination sentinel after which nothing more arrives.
pub enum Payload {
    Batch(Batch),
    Shutdown,
}

/// Fixed for the lifetime of one run; a different pool size means a
/// fresh pipeline invocation.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub pool_size: usize,
    /// Bound on the wait for every worker's store connection to open.
    pub startup_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            startup_timeout: STARTUP_TIMEOUT,
        }
    }
}

/// Conditions that prevent a run from dispatching at all. Failures
/// after dispatch begins are carried in the [`LoadReport`] instead,
/// so in-flight work is never abandoned.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("worker pool size must be at least 1")]
    EmptyPool,

    #[error("worker {0} failed to start: {1}")]
    WorkerStartup(usize, String),

    #[error("timed out waiting for workers to report ready")]
    StartupTimeout,
}
