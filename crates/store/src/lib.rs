mod memory;
mod persist;

pub use memory::{MemoryConnection, MemoryStore};
pub use persist::{SNAPSHOT_VERSION, load_snapshot, save_snapshot};

use sluice_feed::Record;
use thiserror::Error;

/// Outcome of a single-record write the pipeline must tell apart:
/// a duplicate key is a counted soft failure, anything else is fatal
/// to the writing worker.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Read-only membership index over known entity ids. Safe for
/// concurrent callers; staleness against concurrent writers elsewhere
/// is acceptable.
pub trait Directory: Send + Sync {
    fn exists(&self, entity_id: &str) -> bool;
}

/// Write-side seam of the backing store. `connect` is called exactly
/// once per worker, before any batch is dispatched.
pub trait Store: Send + Sync {
    fn connect(&self) -> anyhow::Result<Box<dyn Connection>>;
}

/// One worker's private handle to the store. Never shared across
/// workers; released by drop when the worker terminates.
pub trait Connection: Send {
    fn insert(&mut self, record: &Record) -> Result<(), WriteError>;
}
