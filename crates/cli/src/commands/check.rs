use std::{path::PathBuf, process::ExitCode};

use anyhow::Result;
use clap::Args;
use log::error;
use sluice_feed::BatchReader;
use sluice_runtime::DEFAULT_BATCH_SIZE;

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Record feed to parse
    pub feed: PathBuf,

    /// Records per batch
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,
}

pub fn run(args: CheckArgs) -> ExitCode {
    match execute(args) {
        Ok(code) => code,
        Err(e) => {
            error!("[check] {e:#}");
            eprintln!("[check] {e:#}");
            ExitCode::from(2)
        }
    }
}

fn execute(args: CheckArgs) -> Result<ExitCode> {
    let reader = BatchReader::open(&args.feed, args.batch_size)?;

    let mut batches = 0u64;
    let mut records = 0u64;
    for item in reader {
        match item {
            Ok(batch) => {
                batches += 1;
                records += batch.len() as u64;
            }
            Err(e) => {
                eprintln!("[check] {e}");
                // A malformed feed is a soft finding, not a crash.
                return Ok(ExitCode::from(1));
            }
        }
    }

    eprintln!(
        "[check] {}: {batches} batches, {records} records",
        args.feed.display()
    );
    Ok(ExitCode::SUCCESS)
}
