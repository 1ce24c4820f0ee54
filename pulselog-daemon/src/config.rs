//! Daemon configuration: where things live and how long an interval second is.

use std::path::{Path, PathBuf};
use std::time::Duration;

use pulselog_core::LogDirectory;

use crate::paths::{socket_path, DEFAULT_LOG_DIR, TICK_UNIT};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    /// Root for `.pulselog/` (socket, runtime state).
    pub home: PathBuf,
    /// Directory holding the log file.
    pub log_dir: PathBuf,
    /// Wall-clock length of one interval unit.
    pub tick_unit: Duration,
}

impl DaemonConfig {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            tick_unit: TICK_UNIT,
        }
    }

    pub fn with_log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.log_dir = log_dir.into();
        self
    }

    pub fn with_tick_unit(mut self, tick_unit: Duration) -> Self {
        self.tick_unit = tick_unit;
        self
    }

    pub fn socket(&self) -> PathBuf {
        socket_path(&self.home)
    }

    pub fn log_directory(&self) -> LogDirectory {
        LogDirectory::new(&self.log_dir)
    }

    pub fn home(&self) -> &Path {
        &self.home
    }
}
