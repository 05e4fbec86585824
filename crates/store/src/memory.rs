use std::sync::{Arc, Mutex, MutexGuard};

use hashbrown::{HashMap, HashSet, hash_map::Entry};
use log::debug;
use sluice_feed::Record;

use crate::{Connection, Directory, Store, WriteError};

#[derive(Debug, Default)]
struct Inner {
    entities: HashSet<String>,
    records: HashMap<String, Record>,
}

/// In-memory reference store. Clones share one underlying map, so the
/// store can stand in for an external database while per-worker
/// connections stay real handles.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicked writer cannot leave the maps half-updated, so a
        // poisoned lock is still usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_entity(&self, entity_id: impl Into<String>) -> bool {
        self.lock().entities.insert(entity_id.into())
    }

    pub fn entity_count(&self) -> usize {
        self.lock().entities.len()
    }

    pub fn record_count(&self) -> usize {
        self.lock().records.len()
    }

    pub fn get(&self, id: &str) -> Option<Record> {
        self.lock().records.get(id).cloned()
    }

    /// Entities and records in sorted order, for stable snapshots.
    pub fn dump(&self) -> (Vec<String>, Vec<Record>) {
        let inner = self.lock();

        let mut entities: Vec<String> = inner.entities.iter().cloned().collect();
        entities.sort_unstable();

        let mut records: Vec<Record> = inner.records.values().cloned().collect();
        records.sort_unstable_by(|a, b| a.id.cmp(&b.id));

        (entities, records)
    }

    /// Rebuild a store from dumped state. Later duplicates of an id
    /// are ignored, matching insert semantics.
    pub fn restore(entities: Vec<String>, records: Vec<Record>) -> Self {
        let store = Self::new();
        {
            let mut inner = store.lock();
            inner.entities.extend(entities);
            for record in records {
                inner.records.entry(record.id.clone()).or_insert(record);
            }
        }
        store
    }
}

impl Directory for MemoryStore {
    fn exists(&self, entity_id: &str) -> bool {
        self.lock().entities.contains(entity_id)
    }
}

impl Store for MemoryStore {
    fn connect(&self) -> anyhow::Result<Box<dyn Connection>> {
        debug!("[store] opened memory connection");
        Ok(Box::new(MemoryConnection {
            inner: Arc::clone(&self.inner),
        }))
    }
}

/// One worker's handle onto a `MemoryStore`.
pub struct MemoryConnection {
    inner: Arc<Mutex<Inner>>,
}

impl Connection for MemoryConnection {
    fn insert(&mut self, record: &Record) -> Result<(), WriteError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        match inner.records.entry(record.id.clone()) {
            Entry::Occupied(_) => Err(WriteError::Duplicate(record.id.clone())),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(())
            }
        }
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
