//! The periodic task that appends one message per interval.
//!
//! The schedule lives inside a single tokio task. Reschedule requests and
//! ticks are handled strictly one after the other, so a reschedule that
//! disables the timer completes only after any tick already running has
//! finished writing.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use pulselog_core::{Interval, SharedConfig, TickOutcome, TickReport};

use crate::error::{join_err, DaemonError};

/// Where the ticker is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPhase {
    /// Not scheduled.
    Idle,
    /// Will fire after `delay`, measured from when it was armed.
    Armed { delay: Duration },
    /// A tick is executing.
    Running,
    /// The task has exited.
    Stopped,
}

impl TimerPhase {
    pub fn label(&self) -> &'static str {
        match self {
            TimerPhase::Idle => "idle",
            TimerPhase::Armed { .. } => "armed",
            TimerPhase::Running => "running",
            TimerPhase::Stopped => "stopped",
        }
    }
}

struct Reschedule {
    done: oneshot::Sender<Interval>,
}

/// Handle to the ticker task.
#[derive(Debug, Clone)]
pub struct Ticker {
    requests: mpsc::Sender<Reschedule>,
    phase: watch::Receiver<TimerPhase>,
    unit: Duration,
}

impl Ticker {
    /// Spawn the ticker in the `Idle` phase.
    ///
    /// `unit` is the wall-clock length of one interval second. The task exits
    /// when `shutdown` fires, after finishing a tick in progress.
    pub fn spawn(
        shared: Arc<SharedConfig>,
        unit: Duration,
        shutdown: broadcast::Receiver<()>,
    ) -> (Self, JoinHandle<Result<(), DaemonError>>) {
        let (requests, requests_rx) = mpsc::channel(16);
        let (phase_tx, phase) = watch::channel(TimerPhase::Idle);
        let handle = tokio::spawn(ticker_task(shared, unit, requests_rx, phase_tx, shutdown));

        (
            Self {
                requests,
                phase,
                unit,
            },
            handle,
        )
    }

    /// Re-read the stored interval and re-arm (or disarm) accordingly.
    ///
    /// Resolves once the ticker has applied it, which is after any tick in
    /// progress has completed. Returns the interval that was applied.
    pub async fn reschedule(&self) -> Result<Interval, DaemonError> {
        let (done, done_rx) = oneshot::channel();
        self.requests
            .send(Reschedule { done })
            .await
            .map_err(|_| DaemonError::ChannelClosed("ticker requests"))?;
        done_rx
            .await
            .map_err(|_| DaemonError::ChannelClosed("ticker reply"))
    }

    /// Delay between ticks for `interval`.
    pub fn delay_for(&self, interval: Interval) -> Duration {
        delay_for(self.unit, interval)
    }

    pub fn phase(&self) -> TimerPhase {
        *self.phase.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<TimerPhase> {
        self.phase.clone()
    }
}

/// Both re-arm paths (reschedule request and self re-arm after a tick) go
/// through here.
fn delay_for(unit: Duration, interval: Interval) -> Duration {
    unit.saturating_mul(interval.secs())
}

async fn ticker_task(
    shared: Arc<SharedConfig>,
    unit: Duration,
    mut requests: mpsc::Receiver<Reschedule>,
    phase: watch::Sender<TimerPhase>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut deadline: Option<Instant> = None;

    loop {
        let next_fire = deadline;
        let fire = async move {
            match next_fire {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = shutdown_rx.recv() => break,
            request = requests.recv() => {
                let Some(request) = request else { break };
                let config = shared.clone();
                let interval = tokio::task::spawn_blocking(move || config.interval())
                    .await
                    .map_err(|err| join_err("ticker interval read", err))?;
                deadline = arm(&phase, unit, interval);
                tracing::debug!(interval = %interval, phase = phase.borrow().label(), "ticker rescheduled");
                let _ = request.done.send(interval);
            }
            _ = fire => {
                phase.send_replace(TimerPhase::Running);
                let config = shared.clone();
                let report = tokio::task::spawn_blocking(move || config.tick())
                    .await
                    .map_err(|err| join_err("tick", err))?;
                log_tick(&report);
                deadline = arm(&phase, unit, report.next);
            }
        }
    }

    phase.send_replace(TimerPhase::Stopped);
    tracing::debug!("ticker stopped");
    Ok(())
}

fn arm(phase: &watch::Sender<TimerPhase>, unit: Duration, interval: Interval) -> Option<Instant> {
    if interval.is_disabled() {
        phase.send_replace(TimerPhase::Idle);
        return None;
    }
    let delay = delay_for(unit, interval);
    phase.send_replace(TimerPhase::Armed { delay });
    Some(Instant::now() + delay)
}

fn log_tick(report: &TickReport) {
    match &report.outcome {
        TickOutcome::Skipped => tracing::debug!("tick skipped: no log file open"),
        TickOutcome::Written { counter, filename } => {
            tracing::debug!(counter, filename = %filename, "message appended");
        }
        TickOutcome::Failed {
            counter,
            filename,
            source,
        } => {
            tracing::error!(
                counter,
                filename = %filename,
                error = %source,
                "append failed; dropping this tick",
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::mpsc as std_mpsc;

    use pulselog_core::{Filename, LogDirectory};
    use tempfile::TempDir;
    use tokio::time::{sleep, timeout};

    const UNIT: Duration = Duration::from_millis(20);

    fn shared(root: &TempDir) -> Arc<SharedConfig> {
        Arc::new(SharedConfig::new(LogDirectory::new(root.path().join("pulselog"))))
    }

    fn line_count(root: &TempDir, name: &str) -> usize {
        fs::read_to_string(root.path().join("pulselog").join(name))
            .map(|content| content.lines().count())
            .unwrap_or(0)
    }

    async fn wait_for_phase(ticker: &Ticker, wanted: impl Fn(&TimerPhase) -> bool) {
        let mut phase = ticker.subscribe();
        timeout(Duration::from_secs(5), phase.wait_for(|p| wanted(p)))
            .await
            .expect("phase change timed out")
            .expect("ticker dropped");
    }

    #[test]
    fn delay_scales_interval_by_unit() {
        assert_eq!(delay_for(Duration::from_secs(1), Interval::from_secs(5)), Duration::from_secs(5));
        assert_eq!(delay_for(UNIT, Interval::from_secs(3)), Duration::from_millis(60));
        assert_eq!(delay_for(UNIT, Interval::DISABLED), Duration::ZERO);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn starts_idle_and_stays_idle_for_zero() {
        let root = TempDir::new().expect("tempdir");
        let (_stop_tx, stop_rx) = broadcast::channel(1);
        let (ticker, _handle) = Ticker::spawn(shared(&root), UNIT, stop_rx);

        assert_eq!(ticker.phase(), TimerPhase::Idle);
        let applied = ticker.reschedule().await.expect("reschedule");
        assert!(applied.is_disabled());
        assert_eq!(ticker.phase(), TimerPhase::Idle);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn armed_ticker_writes_repeatedly() {
        let root = TempDir::new().expect("tempdir");
        let config = shared(&root);
        let (_stop_tx, stop_rx) = broadcast::channel(1);
        let (ticker, _handle) = Ticker::spawn(config.clone(), UNIT, stop_rx);

        config.set_interval(Interval::from_secs(1));
        ticker.reschedule().await.expect("reschedule");
        assert_ne!(ticker.phase(), TimerPhase::Idle);

        timeout(Duration::from_secs(5), async {
            while line_count(&root, "messages") < 3 {
                sleep(UNIT).await;
            }
        })
        .await
        .expect("ticker did not write three lines");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn self_rearm_picks_up_new_interval() {
        let root = TempDir::new().expect("tempdir");
        let config = shared(&root);
        let (_stop_tx, stop_rx) = broadcast::channel(1);
        let (ticker, _handle) = Ticker::spawn(config.clone(), UNIT, stop_rx);

        config.set_interval(Interval::from_secs(1));
        ticker.reschedule().await.expect("reschedule");

        // No reschedule request: the next tick must read the new value itself.
        let slow = Interval::from_secs(50);
        let config_for_update = config.clone();
        tokio::task::spawn_blocking(move || config_for_update.set_interval(slow))
            .await
            .expect("join");

        let expected = ticker.delay_for(slow);
        wait_for_phase(&ticker, |p| *p == TimerPhase::Armed { delay: expected }).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn disable_waits_for_tick_in_progress() {
        let root = TempDir::new().expect("tempdir");
        let config = shared(&root);
        let (_stop_tx, stop_rx) = broadcast::channel(1);
        let (ticker, _handle) = Ticker::spawn(config.clone(), UNIT, stop_rx);

        config.swap_file_handle(Filename::parse("log1").expect("name")).expect("open");
        config.set_interval(Interval::from_secs(1));
        ticker.reschedule().await.expect("arm");

        // Hold the configuration lock so the next tick blocks mid-flight.
        let (held_tx, held_rx) = std_mpsc::channel::<()>();
        let (release_tx, release_rx) = std_mpsc::channel::<()>();
        let holder = {
            let config = config.clone();
            std::thread::spawn(move || {
                config.with_config_locked(|_| {
                    let _ = held_tx.send(());
                    let _ = release_rx.recv();
                })
            })
        };
        held_rx.recv().expect("lock held");
        wait_for_phase(&ticker, |p| *p == TimerPhase::Running).await;

        let disable = {
            let config = config.clone();
            let ticker = ticker.clone();
            tokio::spawn(async move {
                tokio::task::spawn_blocking(move || config.set_interval(Interval::DISABLED))
                    .await
                    .expect("join");
                ticker.reschedule().await
            })
        };

        sleep(UNIT * 5).await;
        assert!(!disable.is_finished(), "disable returned while a tick was blocked");

        release_tx.send(()).expect("release");
        holder.join().expect("holder panicked");

        let applied = timeout(Duration::from_secs(5), disable)
            .await
            .expect("disable timed out")
            .expect("join")
            .expect("reschedule");
        assert!(applied.is_disabled());
        assert_eq!(ticker.phase(), TimerPhase::Idle);
        let written = line_count(&root, "log1");
        assert!(written >= 1, "in-flight tick must have finished");

        sleep(UNIT * 5).await;
        assert_eq!(line_count(&root, "log1"), written, "no tick after disable");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shutdown_stops_the_task() {
        let root = TempDir::new().expect("tempdir");
        let config = shared(&root);
        let (stop_tx, stop_rx) = broadcast::channel(1);
        let (ticker, handle) = Ticker::spawn(config.clone(), UNIT, stop_rx);

        config.set_interval(Interval::from_secs(1));
        ticker.reschedule().await.expect("arm");

        stop_tx.send(()).expect("stop");
        timeout(Duration::from_secs(5), handle)
            .await
            .expect("ticker did not stop")
            .expect("join")
            .expect("ticker result");

        assert_eq!(ticker.phase(), TimerPhase::Stopped);
        assert!(matches!(
            ticker.reschedule().await,
            Err(DaemonError::ChannelClosed(_))
        ));
    }
}
