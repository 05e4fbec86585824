use std::{
    io,
    sync::Arc,
    thread::{self, JoinHandle},
};

use crossbeam::channel::{Receiver, Sender};
use log::{debug, error, warn};
use serde::Serialize;
use sluice_store::{Store, WriteError};

use crate::Payload;

/// What one worker did with its share of the run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkerStats {
    pub worker_id: usize,
    /// Batches received, including any drained after a fatal error.
    pub batches: u64,
    pub inserted: u64,
    /// Soft failures: records whose id was already in the store.
    pub duplicates: u64,
    /// Records drained but never written after a fatal backend error.
    pub unprocessed: u64,
    /// Set when this worker's processing ended fatally.
    pub error: Option<String>,
}

/// Sent once per worker on the readiness barrier: its id once the
/// store connection is open, or the reason it could not start.
pub(crate) type ReadySignal = Result<usize, (usize, String)>;

pub(crate) fn spawn(
    worker_id: usize,
    store: Arc<dyn Store>,
    rx: Receiver<Payload>,
    ready_tx: Sender<ReadySignal>,
) -> io::Result<JoinHandle<WorkerStats>> {
    thread::Builder::new()
        .name(format!("worker-{worker_id}"))
        .spawn(move || worker_loop(worker_id, store, rx, ready_tx))
}

fn worker_loop(
    worker_id: usize,
    store: Arc<dyn Store>,
    rx: Receiver<Payload>,
    ready_tx: Sender<ReadySignal>,
) -> WorkerStats {
    let mut stats = WorkerStats {
        worker_id,
        ..Default::default()
    };

    // One private connection for this worker's entire lifetime.
    let mut conn = match store.connect() {
        Ok(conn) => conn,
        Err(e) => {
            let reason = format!("{e:#}");
            stats.error = Some(reason.clone());
            let _ = ready_tx.send(Err((worker_id, reason)));
            return stats;
        }
    };

    let _ = ready_tx.send(Ok(worker_id));
    drop(ready_tx);
    debug!("[worker {worker_id}] started");

    while let Ok(payload) = rx.recv() {
        let batch = match payload {
            Payload::Batch(batch) => batch,
            Payload::Shutdown => break,
        };

        stats.batches += 1;

        if stats.error.is_some() {
            // Already failed fatally: keep draining so shutdown can
            // complete, but surface the records as unprocessed.
            stats.unprocessed += batch.len() as u64;
            continue;
        }

        for (pos, record) in batch.iter().enumerate() {
            match conn.insert(record) {
                Ok(()) => stats.inserted += 1,
                Err(WriteError::Duplicate(id)) => {
                    stats.duplicates += 1;
                    warn!("[worker {worker_id}] duplicate key '{id}'");
                }
                Err(WriteError::Backend(reason)) => {
                    error!("[worker {worker_id}] store write failed: {reason}");
                    stats.unprocessed += (batch.len() - pos) as u64;
                    stats.error = Some(reason);
                    break;
                }
            }
        }
    }

    // Dropping the connection releases it; the sentinel guarantees
    // nothing more will arrive on this channel.
    drop(conn);
    debug!(
        "[worker {worker_id}] done ({} inserted, {} duplicates)",
        stats.inserted, stats.duplicates
    );

    stats
}
