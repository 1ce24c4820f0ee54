//! pulselog: controller for the pulselog daemon.
//!
//! # Usage
//!
//! ```text
//! pulselog                          print the current interval and log file
//! pulselog [-f <file name>] [-i <interval secs>]
//! pulselog daemon start [--log-dir DIR]
//! pulselog daemon stop|status
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{control::ControlArgs, daemon::DaemonCommand};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "pulselog",
    version,
    about = "Change where and how often the pulselog daemon writes its messages",
    long_about = "With no options, prints the daemon's current interval and log file.",
    args_conflicts_with_subcommands = true,
)]
struct Cli {
    #[command(flatten)]
    control: ControlArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run or manage the background daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Daemon { command }) => commands::daemon::run(command),
        None => cli.control.run(),
    }
}
