mod config;
pub mod logging;

pub use config::{
    DEFAULT_BATCH_SIZE, DEFAULT_POOL_SIZE, STARTUP_TIMEOUT, default_store_path, sluice_dir,
};

pub use logging::init;
