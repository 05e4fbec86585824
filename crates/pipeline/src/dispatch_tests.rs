use super::*;

use std::{
    sync::atomic::{AtomicUsize, Ordering},
    thread,
    time::Duration,
};

use crossbeam::channel;
use sluice_feed::Record;
use sluice_store::{Connection, MemoryStore, WriteError};

fn record(id: &str, entity_id: &str) -> Record {
    Record {
        id: id.to_string(),
        entity_id: entity_id.to_string(),
        body: format!("body of {id}"),
    }
}

/// A store seeded with entity "u1"; every test record references it
/// unless the test is about validation.
fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.add_entity("u1");
    store
}

fn source(batches: Vec<Batch>) -> impl Iterator<Item = anyhow::Result<Batch>> {
    batches.into_iter().map(Ok)
}

fn config(pool_size: usize) -> PipelineConfig {
    PipelineConfig {
        pool_size,
        ..Default::default()
    }
}

#[test]
fn round_robin_maps_batch_index_mod_pool_size() {
    let store = seeded_store();

    // Five batches of sizes 1..=5, so per-worker insert counts are
    // distinguishable: worker 0 gets batches {0,2,4}, worker 1 {1,3}.
    let mut batches = Vec::new();
    for b in 0..5 {
        batches.push(
            (0..=b)
                .map(|i| record(&format!("r{b}-{i}"), "u1"))
                .collect::<Batch>(),
        );
    }

    let report = run(source(batches), &store, Arc::new(store.clone()), &config(2))
        .expect("pipeline runs");

    assert!(report.success());
    assert_eq!(report.batches, 5);
    assert_eq!(report.accepted, 15);
    assert_eq!(report.rejected, 0);
    assert_eq!(report.inserted, 15);
    assert_eq!(store.record_count(), 15);

    assert_eq!(report.workers.len(), 2);
    assert_eq!(report.workers[0].worker_id, 0);
    assert_eq!(report.workers[0].batches, 3);
    assert_eq!(report.workers[0].inserted, 1 + 3 + 5);
    assert_eq!(report.workers[1].worker_id, 1);
    assert_eq!(report.workers[1].batches, 2);
    assert_eq!(report.workers[1].inserted, 2 + 4);
}

#[test]
fn every_accepted_record_lands_exactly_once() {
    let store = seeded_store();

    let batches: Vec<Batch> = (0..7)
        .map(|b| {
            (0..10)
                .map(|i| record(&format!("r{b}-{i}"), "u1"))
                .collect()
        })
        .collect();

    let report = run(source(batches), &store, Arc::new(store.clone()), &config(3))
        .expect("pipeline runs");

    assert!(report.success());
    assert_eq!(report.inserted, 70);
    assert_eq!(report.duplicates, 0);
    assert_eq!(store.record_count(), 70);
    for b in 0..7 {
        for i in 0..10 {
            assert!(store.get(&format!("r{b}-{i}")).is_some());
        }
    }
}

#[test]
fn rejected_records_never_reach_the_store() {
    let store = seeded_store();
    let batches = vec![vec![
        record("r1", "u1"),
        record("r2", "ghost"),
        record("r3", "u1"),
    ]];

    let report = run(source(batches), &store, Arc::new(store.clone()), &config(2))
        .expect("pipeline runs");

    assert!(report.success());
    assert_eq!(report.rejected, 1);
    assert_eq!(report.accepted, 2);
    assert_eq!(report.inserted, 2);
    assert!(store.get("r2").is_none());
}

#[test]
fn duplicate_keys_are_soft_and_do_not_stop_the_batch() {
    let store = seeded_store();
    store
        .connect()
        .expect("connect")
        .insert(&record("r1", "u1"))
        .expect("pre-insert");

    let batches = vec![vec![record("r1", "u1"), record("r2", "u1")]];
    let report = run(source(batches), &store, Arc::new(store.clone()), &config(1))
        .expect("pipeline runs");

    assert!(report.success(), "duplicates never downgrade a run");
    assert_eq!(report.duplicates, 1);
    assert_eq!(report.inserted, 1);
    assert_eq!(store.record_count(), 2);
}

#[test]
fn rerunning_the_same_feed_only_yields_duplicates() {
    let store = seeded_store();
    let batches: Vec<Batch> = (0..4)
        .map(|b| vec![record(&format!("r{b}"), "u1")])
        .collect();

    let first = run(
        source(batches.clone()),
        &store,
        Arc::new(store.clone()),
        &config(2),
    )
    .expect("first run");
    assert_eq!(first.inserted, 4);

    let second = run(source(batches), &store, Arc::new(store.clone()), &config(2))
        .expect("second run");
    assert!(second.success());
    assert_eq!(second.inserted, 0);
    assert_eq!(second.duplicates, 4);
    assert_eq!(store.record_count(), 4);
}

#[test]
fn empty_after_validation_batch_still_uses_a_turn() {
    let store = seeded_store();

    // Batch 0 validates to empty but must still land on worker 0,
    // pushing the valid batch 1 to worker 1.
    let batches = vec![
        vec![record("r1", "ghost"), record("r2", "ghost")],
        vec![record("r3", "u1")],
    ];

    let report = run(source(batches), &store, Arc::new(store.clone()), &config(2))
        .expect("pipeline runs");

    assert!(report.success());
    assert_eq!(report.workers[0].batches, 1);
    assert_eq!(report.workers[0].inserted, 0);
    assert_eq!(report.workers[1].batches, 1);
    assert_eq!(report.workers[1].inserted, 1);
}

#[test]
fn zero_workers_is_rejected_up_front() {
    let store = seeded_store();
    let result = run(
        source(vec![vec![record("r1", "u1")]]),
        &store,
        Arc::new(store.clone()),
        &config(0),
    );
    assert!(matches!(result, Err(PipelineError::EmptyPool)));
}

/// Store whose connections cannot be opened at all.
struct UnreachableStore;

impl sluice_store::Store for UnreachableStore {
    fn connect(&self) -> anyhow::Result<Box<dyn Connection>> {
        Err(anyhow::anyhow!("connection refused"))
    }
}

#[test]
fn worker_startup_failure_aborts_before_dispatch() {
    let directory = seeded_store();

    let result = run(
        source(vec![vec![record("r1", "u1")]]),
        &directory,
        Arc::new(UnreachableStore),
        &config(2),
    );

    match result {
        Err(PipelineError::WorkerStartup(_, reason)) => {
            assert!(reason.contains("connection refused"))
        }
        other => panic!("expected WorkerStartup, got {other:?}"),
    }
    // Nothing was dispatched, so nothing could have been written.
    assert_eq!(directory.record_count(), 0);
}

/// Store that only lets the first connection through, so one worker
/// of the pool starts and the other fails.
struct OneConnectionStore {
    inner: MemoryStore,
    connects: AtomicUsize,
}

impl sluice_store::Store for OneConnectionStore {
    fn connect(&self) -> anyhow::Result<Box<dyn Connection>> {
        if self.connects.fetch_add(1, Ordering::SeqCst) == 0 {
            self.inner.connect()
        } else {
            Err(anyhow::anyhow!("connection pool exhausted"))
        }
    }
}

#[test]
fn partial_startup_failure_still_stops_the_started_worker() {
    let directory = seeded_store();
    let store = OneConnectionStore {
        inner: directory.clone(),
        connects: AtomicUsize::new(0),
    };

    // Returning at all proves the started worker got its sentinel and
    // exited rather than blocking on an empty channel forever.
    let result = run(
        source(vec![vec![record("r1", "u1")]]),
        &directory,
        Arc::new(store),
        &config(2),
    );
    assert!(matches!(result, Err(PipelineError::WorkerStartup(_, _))));
    assert_eq!(directory.record_count(), 0);
}

/// Store whose second connection attempt blocks far longer than any
/// startup timeout, like a database that accepts the TCP connection
/// and then never responds.
struct WedgedStore {
    inner: MemoryStore,
    connects: AtomicUsize,
}

impl sluice_store::Store for WedgedStore {
    fn connect(&self) -> anyhow::Result<Box<dyn Connection>> {
        if self.connects.fetch_add(1, Ordering::SeqCst) == 0 {
            self.inner.connect()
        } else {
            thread::sleep(Duration::from_secs(3600));
            Err(anyhow::anyhow!("never reached"))
        }
    }
}

#[test]
fn startup_timeout_surfaces_within_a_bounded_wait() {
    let directory = seeded_store();
    let store = WedgedStore {
        inner: directory.clone(),
        connects: AtomicUsize::new(0),
    };

    let timeout_config = PipelineConfig {
        pool_size: 2,
        startup_timeout: Duration::from_millis(200),
    };

    // The run must report the timeout instead of waiting on the wedged
    // worker; the worker that did start gets its sentinel and exits.
    let (done_tx, done_rx) = channel::bounded(1);
    thread::spawn(move || {
        let result = run(
            source(vec![vec![record("r1", "u1")]]),
            &directory,
            Arc::new(store),
            &timeout_config,
        );
        let _ = done_tx.send(result);
    });

    let result = done_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("run returned despite the wedged connection");
    assert!(matches!(result, Err(PipelineError::StartupTimeout)));
}

/// Connection that panics on the first insert, taking its worker
/// thread down. Dropping it (which unwinding does) reports the death
/// so a test can sequence batches around it.
struct DyingConnection {
    died_tx: channel::Sender<()>,
}

impl Drop for DyingConnection {
    fn drop(&mut self) {
        let _ = self.died_tx.send(());
    }
}

impl Connection for DyingConnection {
    fn insert(&mut self, _record: &Record) -> Result<(), WriteError> {
        panic!("worker hit an unrecoverable bug");
    }
}

struct DyingStore {
    died_tx: channel::Sender<()>,
}

impl sluice_store::Store for DyingStore {
    fn connect(&self) -> anyhow::Result<Box<dyn Connection>> {
        Ok(Box::new(DyingConnection {
            died_tx: self.died_tx.clone(),
        }))
    }
}

#[test]
fn batches_undeliverable_to_a_dead_worker_count_as_unprocessed() {
    let directory = seeded_store();
    let (died_tx, died_rx) = channel::bounded(1);
    let store = DyingStore { died_tx };

    // The second batch is produced only after the worker is dead, so
    // its send fails deterministically.
    let mut produced = 0;
    let source = std::iter::from_fn(move || {
        produced += 1;
        match produced {
            1 => Some(Ok(vec![record("r1", "u1")])),
            2 => {
                died_rx
                    .recv_timeout(Duration::from_secs(5))
                    .expect("worker died");
                // The worker's receiver is dropped by the same unwind
                // that fired the death signal, moments later.
                thread::sleep(Duration::from_millis(50));
                Some(Ok(vec![record("r2", "u1")]))
            }
            _ => None,
        }
    });

    let report = run(source, &directory, Arc::new(store), &config(1)).expect("run completes");

    assert!(!report.success());
    assert_eq!(report.accepted, 2);
    assert_eq!(report.inserted, 0);
    // The batch the dead worker could not receive is surfaced, not
    // silently dropped.
    assert_eq!(report.unprocessed, 1);
    assert_eq!(
        report.workers[0].error.as_deref(),
        Some("worker thread panicked")
    );
}

/// Wraps memory connections so a record with body "BOOM" fails like a
/// backend outage instead of a duplicate key.
struct TrippableStore {
    inner: MemoryStore,
}

struct TrippableConnection {
    inner: Box<dyn Connection>,
}

impl sluice_store::Store for TrippableStore {
    fn connect(&self) -> anyhow::Result<Box<dyn Connection>> {
        Ok(Box::new(TrippableConnection {
            inner: self.inner.connect()?,
        }))
    }
}

impl Connection for TrippableConnection {
    fn insert(&mut self, record: &Record) -> Result<(), WriteError> {
        if record.body == "BOOM" {
            return Err(WriteError::Backend("simulated outage".to_string()));
        }
        self.inner.insert(record)
    }
}

#[test]
fn backend_failure_drains_the_worker_and_fails_the_run() {
    let directory = seeded_store();
    let store = TrippableStore {
        inner: directory.clone(),
    };

    let mut bomb = record("r2", "u1");
    bomb.body = "BOOM".to_string();

    let batches = vec![
        vec![record("r1", "u1"), bomb, record("r3", "u1")],
        vec![record("r4", "u1")],
    ];

    let report = run(source(batches), &directory, Arc::new(store), &config(1))
        .expect("run completes despite the fatal worker");

    assert!(!report.success());
    assert_eq!(report.inserted, 1);
    // The failed record, the rest of its batch, and the whole
    // following batch are surfaced as unprocessed, not guessed-at.
    assert_eq!(report.unprocessed, 3);
    assert_eq!(report.workers[0].batches, 2);
    assert!(report.workers[0].error.as_deref() == Some("simulated outage"));
    assert_eq!(directory.record_count(), 1);
    assert!(directory.get("r3").is_none());
    assert!(directory.get("r4").is_none());
}

#[test]
fn source_failure_mid_stream_still_drains_dispatched_batches() {
    let store = seeded_store();

    let items: Vec<anyhow::Result<Batch>> = vec![
        Ok(vec![record("r1", "u1"), record("r2", "u1")]),
        Err(anyhow::anyhow!("feed truncated")),
        // Never reached; the dispatcher stops at the first Err.
        Ok(vec![record("r9", "u1")]),
    ];

    let report = run(items, &store, Arc::new(store.clone()), &config(2)).expect("run completes");

    assert!(!report.success());
    assert_eq!(report.batches, 1);
    assert_eq!(report.inserted, 2, "in-flight work is drained, not abandoned");
    assert!(
        report
            .source_error
            .as_deref()
            .is_some_and(|e| e.contains("feed truncated"))
    );
    assert!(store.get("r9").is_none());
}

#[test]
fn pipeline_terminates_within_a_bounded_wait() {
    let store = seeded_store();
    let batches: Vec<Batch> = (0..20)
        .map(|b| vec![record(&format!("r{b}"), "u1")])
        .collect();

    let (done_tx, done_rx) = channel::bounded(1);
    thread::spawn(move || {
        let report = run(source(batches), &store, Arc::new(store.clone()), &config(4));
        let _ = done_tx.send(report);
    });

    let report = done_rx
        .recv_timeout(Duration::from_secs(10))
        .expect("pipeline finished in time")
        .expect("pipeline succeeded");
    assert!(report.success());
    assert_eq!(report.inserted, 20);
}

#[test]
fn empty_source_is_a_clean_run() {
    let store = seeded_store();
    let report = run(
        Vec::<anyhow::Result<Batch>>::new(),
        &store,
        Arc::new(store.clone()),
        &config(2),
    )
    .expect("pipeline runs");

    assert!(report.success());
    assert_eq!(report.batches, 0);
    assert_eq!(report.inserted, 0);
}
