use std::{path::PathBuf, time::Duration};

pub const PROGRAM_NAME: &str = "sluice";
pub const PROGRAM_LOG_LEVEL: &str = "SLUICE_LOG_LEVEL";
pub const STORE_FILE_NAME: &str = "store.json";

/// Records per batch pulled from the feed in one iteration.
/// Larger batches amortize channel and validation overhead but hold
/// more of the feed in memory at once.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Workers (and store connections) in the pool unless overridden.
pub const DEFAULT_POOL_SIZE: usize = 2;

/// How long the dispatcher waits for every worker to report its store
/// connection open before giving up on the run.
pub const STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

pub fn xdg_or_home(xdg_var: &str, home_suffix: &str) -> PathBuf {
    if let Some(dir) = std::env::var_os(xdg_var) {
        PathBuf::from(dir)
    } else {
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(home_suffix)
    }
}

pub fn sluice_dir() -> PathBuf {
    xdg_or_home("XDG_DATA_HOME", ".local/share").join(PROGRAM_NAME)
}

/// Default store snapshot path, used when `--db` is not given.
pub fn default_store_path() -> PathBuf {
    sluice_dir().join(STORE_FILE_NAME)
}
