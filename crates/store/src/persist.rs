use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Result, bail};
use log::debug;
use serde::{Deserialize, Serialize};
use sluice_feed::Record;
use tempfile::NamedTempFile;

use crate::MemoryStore;

pub const SNAPSHOT_VERSION: u8 = 1;

#[derive(Debug, Deserialize, Serialize)]
struct Snapshot {
    /// Schema version
    version: u8,
    entities: Vec<String>,
    records: Vec<Record>,
}

/// Load a store snapshot. A missing file is an empty store, not an
/// error; a present-but-unreadable one is.
pub fn load_snapshot(path: &Path) -> Result<MemoryStore> {
    if !path.exists() {
        debug!("[store] no snapshot at {}, starting empty", path.display());
        return Ok(MemoryStore::new());
    }

    let file =
        File::open(path).with_context(|| format!("Failed to open snapshot {}", path.display()))?;
    let snapshot: Snapshot = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse snapshot {}", path.display()))?;

    if snapshot.version != SNAPSHOT_VERSION {
        bail!(
            "snapshot {} has unsupported version {} (expected {})",
            path.display(),
            snapshot.version,
            SNAPSHOT_VERSION
        );
    }

    debug!(
        "[store] loaded snapshot {} ({} entities, {} records)",
        path.display(),
        snapshot.entities.len(),
        snapshot.records.len()
    );

    Ok(MemoryStore::restore(snapshot.entities, snapshot.records))
}

/// Write a store snapshot atomically: serialize into a temp file in
/// the target directory, sync, then rename over the target path.
pub fn save_snapshot(path: &Path, store: &MemoryStore) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create snapshot directory {}", parent.display()))?;

    let (entities, records) = store.dump();
    let snapshot = Snapshot {
        version: SNAPSHOT_VERSION,
        entities,
        records,
    };

    let tmp = NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;

    let mut writer = BufWriter::new(tmp.as_file());
    serde_json::to_writer(&mut writer, &snapshot).context("Failed to serialize snapshot")?;
    writer.flush().context("Failed to flush snapshot")?;
    drop(writer);

    tmp.as_file().sync_all().context("Failed to sync snapshot")?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to replace snapshot {}", path.display()))?;

    debug!(
        "[store] saved snapshot {} ({} entities, {} records)",
        path.display(),
        snapshot.entities.len(),
        snapshot.records.len()
    );

    Ok(())
}

#[cfg(test)]
#[path = "persist_tests.rs"]
mod tests;
