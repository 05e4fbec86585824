pub mod check;
pub mod load;
pub mod stats;

use clap::Subcommand;
pub use check::CheckArgs;
pub use load::LoadArgs;
pub use stats::StatsArgs;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Bulk-load a record feed into the store.
    ///
    /// Example:
    ///   sluice load updates.csv --entities accounts.csv -w 4
    Load(LoadArgs),

    /// Parse a feed without writing anything, reporting counts and
    /// the first malformed row.
    Check(CheckArgs),

    /// Show entity and record counts for a store snapshot.
    Stats(StatsArgs),
}
