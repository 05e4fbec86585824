use std::process::ExitCode;

use clap::Parser;

mod commands;
mod printer;

use commands::Command;
use sluice_runtime::logging;

#[derive(Debug, Parser)]
#[command(name = "sluice", version, about = "Concurrent bulk record loader")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

fn main() -> ExitCode {
    logging::init().ok();

    let cli = Cli::parse();
    match cli.command {
        Command::Load(args) => commands::load::run(args),
        Command::Check(args) => commands::check::run(args),
        Command::Stats(args) => commands::stats::run(args),
    }
}
