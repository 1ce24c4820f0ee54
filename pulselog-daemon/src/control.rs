//! Attribute surface used to reconfigure the running service.
//!
//! Text in, text out: values are parsed from controller input (one trailing
//! line break tolerated) and rendered back followed by `\n`.

use std::sync::Arc;

use serde::Serialize;

use pulselog_core::{Attribute, ConfigSnapshot, Filename, Interval, PulseError, SharedConfig};

use crate::error::{join_err, DaemonError};
use crate::ticker::Ticker;

/// What a successful `set` changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetReport {
    pub attr: Attribute,
    pub value: String,
    /// Non-fatal problem, e.g. the log file could not be opened when the
    /// timer was enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    #[serde(flatten)]
    pub config: ConfigSnapshot,
    pub timer: &'static str,
}

#[derive(Debug, Clone)]
pub struct ControlInterface {
    shared: Arc<SharedConfig>,
    ticker: Ticker,
}

impl ControlInterface {
    pub fn new(shared: Arc<SharedConfig>, ticker: Ticker) -> Self {
        Self { shared, ticker }
    }

    /// Current value of `attr`, newline terminated.
    pub fn get(&self, attr: Attribute) -> String {
        let snap = self.shared.snapshot();
        match attr {
            Attribute::Interval => format!("{}\n", snap.interval),
            Attribute::Filename => format!("{}\n", snap.filename),
            Attribute::Counter => format!("{}\n", snap.counter),
        }
    }

    pub async fn set(&self, attr: Attribute, text: &str) -> Result<SetReport, DaemonError> {
        match attr {
            Attribute::Interval => self.set_interval(text).await,
            Attribute::Filename => self.set_filename(text).await,
            Attribute::Counter => Err(PulseError::ReadOnlyAttribute(attr.name()).into()),
        }
    }

    /// Store a new interval and wait until the ticker has applied it.
    ///
    /// Writing `0` returns only once a tick that was already running has
    /// finished; no further tick fires until the interval is nonzero again.
    pub async fn set_interval(&self, text: &str) -> Result<SetReport, DaemonError> {
        let interval = Interval::parse(text)?;

        let shared = self.shared.clone();
        let update = tokio::task::spawn_blocking(move || shared.set_interval(interval))
            .await
            .map_err(|err| join_err("set interval", err))?;

        let warning = update.open_error.map(|err| {
            tracing::warn!(
                interval = %update.interval,
                error = %err,
                "interval stored but the log file could not be opened",
            );
            err.to_string()
        });
        if update.opened {
            tracing::info!(filename = %self.shared.snapshot().filename, "log file opened");
        }

        self.ticker.reschedule().await?;
        tracing::info!(interval = %update.interval, "interval updated");

        Ok(SetReport {
            attr: Attribute::Interval,
            value: update.interval.to_string(),
            warning,
        })
    }

    /// Validate a new filename and switch the log file to it.
    ///
    /// On any failure the previous filename and file stay in place.
    pub async fn set_filename(&self, text: &str) -> Result<SetReport, DaemonError> {
        let filename = Filename::parse(text)?;

        let shared = self.shared.clone();
        let target = filename.clone();
        tokio::task::spawn_blocking(move || shared.swap_file_handle(target))
            .await
            .map_err(|err| join_err("set filename", err))??;

        tracing::info!(filename = %filename, "log file switched");
        Ok(SetReport {
            attr: Attribute::Filename,
            value: filename.to_string(),
            warning: None,
        })
    }

    pub fn status(&self) -> StatusReport {
        StatusReport {
            config: self.shared.snapshot(),
            timer: self.ticker.phase().label(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;

    use pulselog_core::LogDirectory;
    use tempfile::TempDir;
    use tokio::sync::broadcast;

    const UNIT: Duration = Duration::from_millis(20);

    struct Harness {
        root: TempDir,
        control: ControlInterface,
        _stop: broadcast::Sender<()>,
    }

    impl Harness {
        fn new() -> Self {
            let root = TempDir::new().expect("tempdir");
            Self::with_dir(root, "pulselog")
        }

        fn with_dir(root: TempDir, relative: &str) -> Self {
            let shared = Arc::new(SharedConfig::new(LogDirectory::new(
                root.path().join(relative),
            )));
            let (stop, stop_rx) = broadcast::channel(1);
            let (ticker, _handle) = Ticker::spawn(shared.clone(), UNIT, stop_rx);
            Self {
                root,
                control: ControlInterface::new(shared, ticker),
                _stop: stop,
            }
        }

        fn log(&self, name: &str) -> String {
            fs::read_to_string(self.root.path().join("pulselog").join(name)).unwrap_or_default()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn get_renders_values_with_newline() {
        let h = Harness::new();

        assert_eq!(h.control.get(Attribute::Interval), "0\n");
        assert_eq!(h.control.get(Attribute::Filename), "messages\n");
        assert_eq!(h.control.get(Attribute::Counter), "0\n");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn set_filename_then_read_back() {
        let h = Harness::new();

        let report = h
            .control
            .set(Attribute::Filename, "log1\n")
            .await
            .expect("set filename");
        assert_eq!(report.value, "log1");
        assert_eq!(h.control.get(Attribute::Filename), "log1\n");
        assert!(h.root.path().join("pulselog/log1").exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn invalid_input_is_rejected_without_side_effects() {
        let h = Harness::new();
        h.control.set_filename("log1").await.expect("set filename");

        let cases = [
            (Attribute::Filename, "a/b"),
            (Attribute::Filename, ""),
            (Attribute::Filename, ".."),
            (Attribute::Interval, "-1"),
            (Attribute::Interval, "abc"),
            (Attribute::Interval, "4294967296"),
        ];
        for (attr, bad) in cases {
            let err = h.control.set(attr, bad).await.unwrap_err();
            assert!(err.is_validation(), "{attr} {bad:?} gave {err}");
        }

        assert_eq!(h.control.get(Attribute::Filename), "log1\n");
        assert_eq!(h.control.get(Attribute::Interval), "0\n");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn counter_is_read_only() {
        let h = Harness::new();

        let err = h.control.set(Attribute::Counter, "5").await.unwrap_err();
        assert!(matches!(
            err,
            DaemonError::Core(PulseError::ReadOnlyAttribute("counter"))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn enabling_writes_to_default_file() {
        let h = Harness::new();

        let report = h.control.set_interval("1\n").await.expect("enable");
        assert_eq!(report.value, "1");
        assert!(report.warning.is_none());
        assert_ne!(h.control.status().timer, "idle");

        tokio::time::timeout(Duration::from_secs(5), async {
            while h.log("messages").is_empty() {
                tokio::time::sleep(UNIT).await;
            }
        })
        .await
        .expect("no message written");
        assert!(h.log("messages").starts_with("Hello from pulselog (0)\n"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn disabling_stops_writes() {
        let h = Harness::new();
        h.control.set_interval("1").await.expect("enable");
        tokio::time::sleep(UNIT * 3).await;

        h.control.set_interval("0").await.expect("disable");
        assert_eq!(h.control.status().timer, "idle");

        let before = h.log("messages");
        tokio::time::sleep(UNIT * 5).await;
        assert_eq!(h.log("messages"), before);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_setters_each_get_their_own_value_back() {
        let h = Harness::new();

        let (a, b) = tokio::join!(h.control.set_interval("7"), h.control.set_interval("9"));
        assert_eq!(a.expect("set 7").value, "7");
        assert_eq!(b.expect("set 9").value, "9");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn lazy_open_failure_is_a_warning() {
        let root = TempDir::new().expect("tempdir");
        let h = Harness::with_dir(root, "missing/pulselog");

        let report = h.control.set_interval("3").await.expect("update succeeds");
        assert!(report.warning.is_some());
        assert_eq!(h.control.get(Attribute::Interval), "3\n");
        assert!(!h.control.status().config.file_open);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn status_serializes_flat() {
        let h = Harness::new();
        h.control.set_filename("log1").await.expect("set filename");

        let value = serde_json::to_value(h.control.status()).expect("encode");
        assert_eq!(value["filename"], "log1");
        assert_eq!(value["interval"], 0);
        assert_eq!(value["file_open"], true);
        assert_eq!(value["timer"], "idle");
    }
}
