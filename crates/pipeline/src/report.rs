use serde::Serialize;

use crate::worker::WorkerStats;

/// Aggregate outcome of one pipeline run.
#[derive(Debug, Default, Serialize)]
pub struct LoadReport {
    /// Batches pulled from the source; each used one rotation turn.
    pub batches: u64,
    /// Records that passed validation and were dispatched.
    pub accepted: u64,
    /// Records dropped by validation (unknown entity id).
    pub rejected: u64,
    pub inserted: u64,
    pub duplicates: u64,
    /// Records accepted but never written because their worker had
    /// already failed fatally or died.
    pub unprocessed: u64,
    /// Fatal mid-stream source failure, if any.
    pub source_error: Option<String>,
    pub workers: Vec<WorkerStats>,
}

impl LoadReport {
    pub(crate) fn assemble(
        batches: u64,
        accepted: u64,
        rejected: u64,
        lost: u64,
        source_error: Option<String>,
        workers: Vec<WorkerStats>,
    ) -> Self {
        Self {
            batches,
            accepted,
            rejected,
            inserted: workers.iter().map(|w| w.inserted).sum(),
            duplicates: workers.iter().map(|w| w.duplicates).sum(),
            // `lost` covers records undeliverable to a dead worker;
            // they were accepted but never written.
            unprocessed: workers.iter().map(|w| w.unprocessed).sum::<u64>() + lost,
            source_error,
            workers,
        }
    }

    /// Success means the source finished and every worker exited
    /// cleanly. Rejections and duplicates are soft and never
    /// downgrade a run.
    pub fn success(&self) -> bool {
        self.source_error.is_none() && self.workers.iter().all(|w| w.error.is_none())
    }

    pub fn summary(&self) -> String {
        format!(
            "{} batches: {} inserted, {} duplicates, {} rejected, {} unprocessed",
            self.batches, self.inserted, self.duplicates, self.rejected, self.unprocessed
        )
    }
}
