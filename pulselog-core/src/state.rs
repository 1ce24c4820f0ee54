//! Shared configuration: interval, filename, open log file and counter,
//! guarded as one unit.
//!
//! Every read or write of those four fields happens inside
//! [`SharedConfig::with_config_locked`]. File I/O that depends on them runs
//! while the lock is held, so nobody can observe a handle that is open under
//! a name other than the current filename.

use std::io;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::error::PulseError;
use crate::resource::{LogDirectory, LogFile};
use crate::types::{Filename, Interval};

/// The line appended on every tick.
pub fn format_message(counter: u64) -> String {
    format!("Hello from pulselog ({counter})\n")
}

/// The fields protected by the configuration lock.
#[derive(Debug, Default)]
pub struct ConfigState {
    interval: Interval,
    filename: Filename,
    file: Option<LogFile>,
    counter: u64,
}

impl ConfigState {
    pub fn interval(&self) -> Interval {
        self.interval
    }

    pub fn filename(&self) -> &Filename {
        &self.filename
    }

    pub fn file_open(&self) -> bool {
        self.file.is_some()
    }

    pub fn counter(&self) -> u64 {
        self.counter
    }
}

/// Result of [`SharedConfig::set_interval`].
///
/// The interval is always stored. `open_error` reports a failed lazy open,
/// which does not undo the update.
#[derive(Debug)]
pub struct IntervalUpdate {
    pub interval: Interval,
    pub opened: bool,
    pub open_error: Option<PulseError>,
}

/// What one tick did.
#[derive(Debug)]
pub enum TickOutcome {
    /// No file is open; nothing was written and the counter is unchanged.
    Skipped,
    Written { counter: u64, filename: Filename },
    /// The append failed part-way. The counter still advanced.
    Failed {
        counter: u64,
        filename: Filename,
        source: io::Error,
    },
}

/// A tick's outcome plus the interval read under the same lock, used to re-arm.
#[derive(Debug)]
pub struct TickReport {
    pub outcome: TickOutcome,
    pub next: Interval,
}

/// Point-in-time copy of the configuration for `get`/`status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub interval: Interval,
    pub filename: Filename,
    pub log_dir: PathBuf,
    pub file_open: bool,
    pub counter: u64,
}

/// The single configuration instance owned by the service.
#[derive(Debug)]
pub struct SharedConfig {
    dir: LogDirectory,
    state: Mutex<ConfigState>,
}

impl SharedConfig {
    /// Interval 0, default filename, no file open, counter 0.
    pub fn new(dir: LogDirectory) -> Self {
        Self {
            dir,
            state: Mutex::new(ConfigState::default()),
        }
    }

    /// Run `f` with exclusive access to the configuration.
    ///
    /// A poisoned lock is recovered: every mutation below finishes updating
    /// the fields before anything that can panic.
    pub fn with_config_locked<R>(&self, f: impl FnOnce(&mut ConfigState) -> R) -> R {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Point the log at `new_name`.
    ///
    /// The new file is opened before the old one is closed. If the open fails
    /// the previous filename and handle stay in place.
    pub fn swap_file_handle(&self, new_name: Filename) -> Result<(), PulseError> {
        self.with_config_locked(|state| {
            let file = self.dir.open_for_append(&new_name)?;
            state.filename = new_name;
            state.file = Some(file);
            Ok(())
        })
    }

    /// Store `interval`, opening the current filename if the timer is being
    /// enabled and nothing is open yet.
    pub fn set_interval(&self, interval: Interval) -> IntervalUpdate {
        self.with_config_locked(|state| {
            state.interval = interval;

            let mut update = IntervalUpdate {
                interval,
                opened: false,
                open_error: None,
            };
            if interval.is_disabled() || state.file.is_some() {
                return update;
            }

            match self.dir.open_for_append(&state.filename) {
                Ok(file) => {
                    state.file = Some(file);
                    update.opened = true;
                }
                Err(err) => update.open_error = Some(err),
            }
            update
        })
    }

    pub fn interval(&self) -> Interval {
        self.with_config_locked(|state| state.interval)
    }

    /// One tick: append the counter message if a file is open, advance the
    /// counter, and report the interval to re-arm with.
    pub fn tick(&self) -> TickReport {
        self.with_config_locked(|state| {
            let outcome = match state.file.as_mut() {
                None => TickOutcome::Skipped,
                Some(file) => {
                    assert_eq!(
                        file.name(),
                        &state.filename,
                        "log file is open under a stale filename"
                    );
                    let counter = state.counter;
                    let written = file.append(format_message(counter).as_bytes());
                    state.counter = counter.saturating_add(1);

                    let filename = state.filename.clone();
                    match written {
                        Ok(()) => TickOutcome::Written { counter, filename },
                        Err(source) => TickOutcome::Failed {
                            counter,
                            filename,
                            source,
                        },
                    }
                }
            };

            TickReport {
                outcome,
                next: state.interval,
            }
        })
    }

    pub fn snapshot(&self) -> ConfigSnapshot {
        self.with_config_locked(|state| ConfigSnapshot {
            interval: state.interval,
            filename: state.filename.clone(),
            log_dir: self.dir.path().to_path_buf(),
            file_open: state.file.is_some(),
            counter: state.counter,
        })
    }

    /// Close the log file, if any. Returns whether one was open.
    pub fn close(&self) -> bool {
        self.with_config_locked(|state| state.file.take()).is_some()
    }
}
