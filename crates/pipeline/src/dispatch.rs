use std::{sync::Arc, thread::JoinHandle, time::Instant};

use crossbeam::channel::{self, Sender};
use log::{debug, error, info};
use sluice_feed::Batch;
use sluice_store::{Directory, Store};

use crate::{
    Payload, PipelineConfig, PipelineError,
    report::LoadReport,
    validate::validate,
    worker::{self, WorkerStats},
};

/// Drive one pipeline run to completion: spawn the worker pool, wait
/// for every worker's connection on the readiness barrier, fan
/// validated batches out round-robin, then sentinel-stop and join.
///
/// Source items are batches in feed order; an `Err` item is a fatal
/// mid-stream source failure. Batches dispatched before the failure
/// are still drained by the workers before the run reports it.
pub fn run<S>(
    source: S,
    directory: &dyn Directory,
    store: Arc<dyn Store>,
    config: &PipelineConfig,
) -> Result<LoadReport, PipelineError>
where
    S: IntoIterator<Item = anyhow::Result<Batch>>,
{
    if config.pool_size == 0 {
        return Err(PipelineError::EmptyPool);
    }
    let pool_size = config.pool_size;

    let (ready_tx, ready_rx) = channel::bounded::<worker::ReadySignal>(pool_size);

    let mut senders: Vec<Sender<Payload>> = Vec::with_capacity(pool_size);
    let mut handles: Vec<JoinHandle<WorkerStats>> = Vec::with_capacity(pool_size);

    for worker_id in 0..pool_size {
        let (tx, rx) = channel::unbounded::<Payload>();
        match worker::spawn(worker_id, Arc::clone(&store), rx, ready_tx.clone()) {
            Ok(handle) => {
                senders.push(tx);
                handles.push(handle);
            }
            Err(e) => {
                abort_startup(senders, handles, &[]);
                return Err(PipelineError::WorkerStartup(worker_id, e.to_string()));
            }
        }
    }
    drop(ready_tx);

    // Readiness barrier: no batch is pulled until every worker holds
    // an open store connection, and a worker that cannot get one
    // fails the run before any work is consumed.
    let deadline = Instant::now() + config.startup_timeout;
    let mut ready = vec![false; pool_size];
    for _ in 0..pool_size {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match ready_rx.recv_timeout(remaining) {
            Ok(Ok(worker_id)) => {
                ready[worker_id] = true;
                debug!("[dispatch] worker {worker_id} ready");
            }
            Ok(Err((worker_id, reason))) => {
                abort_startup(senders, handles, &ready);
                return Err(PipelineError::WorkerStartup(worker_id, reason));
            }
            Err(_) => {
                abort_startup(senders, handles, &ready);
                return Err(PipelineError::StartupTimeout);
            }
        }
    }
    info!("[dispatch] {pool_size} workers ready");

    let mut batch_index: u64 = 0;
    let mut accepted_total: u64 = 0;
    let mut rejected_total: u64 = 0;
    let mut lost: u64 = 0;
    let mut source_error: Option<String> = None;

    for item in source {
        let batch = match item {
            Ok(batch) => batch,
            Err(e) => {
                error!("[dispatch] source failed after {batch_index} batches: {e:#}");
                source_error = Some(format!("{e:#}"));
                break;
            }
        };

        let (accepted, rejected) = validate(directory, batch);
        accepted_total += accepted.len() as u64;
        rejected_total += rejected;

        // Pure rotation over the batch index. An empty accepted batch
        // still uses its turn, so the batch-to-worker mapping stays
        // reproducible for a fixed pool size.
        let target = (batch_index % pool_size as u64) as usize;
        debug!(
            "[dispatch] batch {batch_index} -> worker {target} ({} records)",
            accepted.len()
        );
        // A send can only fail if the worker panicked; its join handle
        // surfaces the panic, but the records it can no longer drain
        // must still be accounted as unprocessed.
        if let Err(undelivered) = senders[target].send(Payload::Batch(accepted)) {
            if let Payload::Batch(batch) = undelivered.into_inner() {
                lost += batch.len() as u64;
            }
        }

        batch_index += 1;
    }

    let workers = shutdown(senders, handles);
    let report = LoadReport::assemble(
        batch_index,
        accepted_total,
        rejected_total,
        lost,
        source_error,
        workers,
    );
    info!("[dispatch] {}", report.summary());

    Ok(report)
}

/// Startup failed: sentinel-stop the pool, but join only workers that
/// reported ready. A worker still blocked inside `connect()` must not
/// wedge the abort; once its attempt returns it drains the sentinel
/// already queued on its channel and exits on its own.
fn abort_startup(
    senders: Vec<Sender<Payload>>,
    handles: Vec<JoinHandle<WorkerStats>>,
    ready: &[bool],
) {
    for tx in &senders {
        let _ = tx.send(Payload::Shutdown);
    }
    drop(senders);

    for (worker_id, handle) in handles.into_iter().enumerate() {
        if ready.get(worker_id).copied().unwrap_or(false) {
            let _ = handle.join();
        }
    }
}

/// Shutdown coordinator: exactly one sentinel per channel, then wait
/// for every worker to observe it and exit.
fn shutdown(senders: Vec<Sender<Payload>>, handles: Vec<JoinHandle<WorkerStats>>) -> Vec<WorkerStats> {
    for tx in &senders {
        let _ = tx.send(Payload::Shutdown);
    }
    drop(senders);

    handles
        .into_iter()
        .enumerate()
        .map(|(worker_id, handle)| {
            handle.join().unwrap_or_else(|_| WorkerStats {
                worker_id,
                error: Some("worker thread panicked".to_string()),
                ..Default::default()
            })
        })
        .collect()
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
