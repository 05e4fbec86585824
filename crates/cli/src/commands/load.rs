use std::{path::PathBuf, process::ExitCode, sync::Arc};

use anyhow::{Context, Result};
use clap::Args;
use log::{error, info};
use sluice_feed::{BatchReader, read_entity_ids};
use sluice_pipeline::{LoadReport, PipelineConfig};
use sluice_runtime::{DEFAULT_BATCH_SIZE, DEFAULT_POOL_SIZE, default_store_path};
use sluice_store::{MemoryStore, load_snapshot, save_snapshot};

use crate::printer::{OutputFormat, print_report};

#[derive(Debug, Args)]
pub struct LoadArgs {
    /// Record feed to load
    pub feed: PathBuf,

    /// Entity seed file used to populate the directory before loading
    #[arg(long)]
    pub entities: Option<PathBuf>,

    /// Store snapshot path
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Workers in the pool; each owns one store connection
    #[arg(long, short = 'w', default_value_t = DEFAULT_POOL_SIZE)]
    pub workers: usize,

    /// Records per batch pulled from the feed
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Start from an empty store instead of the snapshot
    #[arg(long)]
    pub fresh: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: LoadArgs) -> ExitCode {
    match execute(args) {
        Ok(code) => code,
        Err(e) => {
            error!("[load] {e:#}");
            eprintln!("[load] {e:#}");
            ExitCode::from(2)
        }
    }
}

fn execute(args: LoadArgs) -> Result<ExitCode> {
    let json = args.json;
    let report = load_feed(args)?;

    let format = if json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };
    print_report(&report, format)?;

    if report.success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(1))
    }
}

fn load_feed(args: LoadArgs) -> Result<LoadReport> {
    let db = args.db.clone().unwrap_or_else(default_store_path);

    let store = if args.fresh {
        MemoryStore::new()
    } else {
        load_snapshot(&db)?
    };

    if let Some(entities) = &args.entities {
        let ids = read_entity_ids(entities)?;
        let total = ids.len();
        let mut added = 0usize;
        for id in ids {
            if store.add_entity(id) {
                added += 1;
            }
        }
        info!(
            "[load] seeded {added} new entities ({total} listed in {})",
            entities.display()
        );
    }

    let reader = BatchReader::open(&args.feed, args.batch_size)?;
    let source = reader.map(|item| item.map_err(anyhow::Error::from));

    let config = PipelineConfig {
        pool_size: args.workers,
        ..Default::default()
    };
    let report = sluice_pipeline::run(source, &store, Arc::new(store.clone()), &config)?;

    save_snapshot(&db, &store)
        .with_context(|| format!("Failed to save store snapshot {}", db.display()))?;

    Ok(report)
}

#[cfg(test)]
#[path = "load_tests.rs"]
mod tests;
