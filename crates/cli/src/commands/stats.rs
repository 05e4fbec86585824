use std::{path::PathBuf, process::ExitCode};

use anyhow::Result;
use clap::Args;
use log::error;
use serde_json::json;
use sluice_runtime::default_store_path;
use sluice_store::load_snapshot;

#[derive(Debug, Args)]
pub struct StatsArgs {
    /// Store snapshot path
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Print counts as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: StatsArgs) -> ExitCode {
    match execute(args) {
        Ok(code) => code,
        Err(e) => {
            error!("[stats] {e:#}");
            eprintln!("[stats] {e:#}");
            ExitCode::from(2)
        }
    }
}

fn execute(args: StatsArgs) -> Result<ExitCode> {
    let db = args.db.clone().unwrap_or_else(default_store_path);

    if !db.exists() {
        eprintln!("[stats] no snapshot at {}", db.display());
        // Absence is a "soft" failure with non-zero exit.
        return Ok(ExitCode::from(1));
    }

    let store = load_snapshot(&db)?;

    if args.json {
        let line = json!({
            "snapshot": db.display().to_string(),
            "entities": store.entity_count(),
            "records": store.record_count(),
        });
        println!("{line}");
    } else {
        eprintln!("[stats] snapshot: {}", db.display());
        eprintln!("[stats] entities: {}", store.entity_count());
        eprintln!("[stats] records:  {}", store.record_count());
    }

    Ok(ExitCode::SUCCESS)
}
