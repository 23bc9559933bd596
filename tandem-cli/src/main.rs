//! Tandem: project host for a background tooling daemon.
//!
//! # Usage
//!
//! ```text
//! tandem init <dir> [--socket <path>] [--variant <module>=<variant>]... [--offline] [--json]
//! tandem status [--socket <path>] [--json]
//! ```

mod commands;
mod console;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{init::InitArgs, status::StatusArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "tandem",
    version,
    about = "Open projects against a background tooling daemon",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Bind the tooling daemon, start its server and initialize a project.
    Init(InitArgs),

    /// Show the tooling daemon's status.
    Status(StatusArgs),
}

fn main() -> Result<()> {
    tandem_daemon::init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Status(args) => args.run(),
    }
}
