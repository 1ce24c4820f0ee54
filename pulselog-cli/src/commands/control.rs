//! `pulselog [-f <file name>] [-i <interval secs>]`: read or change the
//! running daemon's attributes.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Deserialize;

use pulselog_core::{Attribute, Interval};
use pulselog_daemon::{request_set, response_into_data, send_request, DaemonError, DaemonRequest};

#[derive(Args, Debug)]
pub struct ControlArgs {
    /// Name of the file in the log directory that receives messages.
    #[arg(short = 'f', long = "file", value_name = "FILE NAME")]
    pub filename: Option<String>,

    /// Seconds between messages; 0 disables the timer.
    #[arg(
        short = 'i',
        long = "interval",
        value_name = "INTERVAL SECS",
        allow_hyphen_values = true
    )]
    pub interval: Option<String>,
}

/// The parts of the status payload this command prints.
#[derive(Debug, Deserialize)]
struct Current {
    interval: Interval,
    filename: String,
    log_dir: PathBuf,
}

impl ControlArgs {
    pub fn run(self) -> Result<()> {
        let home = dirs::home_dir().context("could not determine home directory")?;

        let interval = self
            .interval
            .as_deref()
            .map(Interval::parse)
            .transpose()
            .context("invalid interval in seconds")?;

        if let Some(filename) = &self.filename {
            if let Err(err) = set(&home, Attribute::Filename, filename) {
                if interval.is_some() {
                    eprintln!("interval not updated");
                }
                return Err(err);
            }
        }

        if let Some(interval) = interval {
            set(&home, Attribute::Interval, &interval.to_string())?;
        }

        if self.filename.is_none() && interval.is_none() {
            print_current(&home)?;
        }
        Ok(())
    }
}

fn set(home: &Path, attr: Attribute, value: &str) -> Result<()> {
    let report = request_set(home, attr.name(), value)
        .map_err(hint_if_not_running)
        .with_context(|| format!("failed to set {attr}"))?;

    if let Some(warning) = report.get("warning").and_then(|w| w.as_str()) {
        eprintln!("{} {warning}", "warning:".yellow().bold());
    }
    Ok(())
}

fn print_current(home: &Path) -> Result<()> {
    let response = send_request(home, &DaemonRequest::status())
        .map_err(hint_if_not_running)
        .context("failed to read daemon parameters")?;
    let data = response_into_data(response).context("failed to read daemon parameters")?;
    let current: Current =
        serde_json::from_value(data).context("unexpected daemon status payload")?;

    let timer_status = if current.interval.is_disabled() {
        " (timer disabled)"
    } else {
        ""
    };
    println!("interval: {} seconds{timer_status}", current.interval);
    println!("file: {}", current.log_dir.join(&current.filename).display());
    Ok(())
}

fn hint_if_not_running(err: DaemonError) -> DaemonError {
    if matches!(err, DaemonError::DaemonNotRunning { .. }) {
        eprintln!(
            "{}",
            "perhaps the pulselog daemon is not running? start it with `pulselog daemon start`"
                .yellow()
        );
    }
    err
}
