use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DAEMON_SOCKET: &str = "daemon.sock";

/// Where the log file lives unless overridden.
pub const DEFAULT_LOG_DIR: &str = "/var/tmp/pulselog";

/// Environment variable that overrides [`DEFAULT_LOG_DIR`].
pub const LOG_DIR_ENV: &str = "PULSELOG_LOG_DIR";

/// Set to `json` for JSON log lines instead of the human-readable format.
pub const LOG_FORMAT_ENV: &str = "PULSELOG_LOG_FORMAT";

/// One interval second.
pub const TICK_UNIT: Duration = Duration::from_secs(1);

pub fn pulselog_root(home: &Path) -> PathBuf {
    home.join(".pulselog")
}

pub fn socket_path(home: &Path) -> PathBuf {
    pulselog_root(home).join(DAEMON_SOCKET)
}
