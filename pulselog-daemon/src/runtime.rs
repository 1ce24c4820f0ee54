use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinSet;

use pulselog_core::{Attribute, SharedConfig};

use crate::config::DaemonConfig;
use crate::control::{ControlInterface, StatusReport};
use crate::error::{io_err, join_err, DaemonError};
use crate::paths::{pulselog_root, LOG_FORMAT_ENV};
use crate::protocol::{DaemonRequest, DaemonResponse};
use crate::ticker::Ticker;

/// `status` payload: the configuration snapshot plus process facts.
#[derive(Debug, Clone, Serialize)]
pub struct StatusPayload {
    pub running: bool,
    pub pid: u32,
    pub started_at_unix: u64,
    #[serde(flatten)]
    pub status: StatusReport,
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(config: DaemonConfig) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(config))
}

/// Run the daemon until `stop`, ctrl-c or SIGTERM.
///
/// Teardown order: the socket is removed first so no new connection can
/// arrive, connected clients finish their current request and are closed,
/// then the ticker is stopped (waiting for a tick in progress), then the log
/// file is closed.
pub async fn run(config: DaemonConfig) -> Result<(), DaemonError> {
    ensure_runtime_dirs(config.home())?;

    let shared = Arc::new(SharedConfig::new(config.log_directory()));
    let started_at_unix = unix_seconds_now();

    let (shutdown_tx, _) = broadcast::channel::<()>(16);
    let (ticker_stop_tx, ticker_stop_rx) = broadcast::channel::<()>(1);
    let (ticker, ticker_handle) = Ticker::spawn(shared.clone(), config.tick_unit, ticker_stop_rx);
    let control = ControlInterface::new(shared.clone(), ticker);

    tracing::info!(
        home = %config.home().display(),
        log_dir = %config.log_dir.display(),
        pid = std::process::id(),
        "pulselog daemon starting",
    );

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let socket = config.socket();
        tokio::spawn(async move {
            let result = socket_server_task(
                socket,
                control,
                shutdown.clone(),
                shutdown.subscribe(),
                started_at_unix,
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move { signal_task(shutdown).await })
    };

    let (socket_result, signal_result) = tokio::join!(socket_handle, signal_handle);

    let _ = ticker_stop_tx.send(());
    let ticker_result = ticker_handle.await;

    let closed = tokio::task::spawn_blocking(move || shared.close())
        .await
        .map_err(|err| join_err("close log file", err))?;
    tracing::info!(file_closed = closed, "pulselog daemon stopped");

    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    handle_join("ticker", ticker_result)?;
    Ok(())
}

async fn signal_task(shutdown: broadcast::Sender<()>) -> Result<(), DaemonError> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut shutdown_rx = shutdown.subscribe();
    let mut terminate = signal(SignalKind::terminate()).map_err(|e| io_err("SIGTERM handler", e))?;

    tokio::select! {
        _ = shutdown_rx.recv() => return Ok(()),
        _ = terminate.recv() => {
            tracing::info!("received SIGTERM, shutting down daemon");
        }
        signal = tokio::signal::ctrl_c() => {
            if let Err(err) = signal {
                return Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}")));
            }
            tracing::info!("received ctrl-c, shutting down daemon");
        }
    }

    let _ = shutdown.send(());
    Ok(())
}

async fn socket_server_task(
    socket: PathBuf,
    control: ControlInterface,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "control socket listening");

    let (closing_tx, closing_rx) = watch::channel(false);
    let mut clients = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            Some(_) = clients.join_next(), if !clients.is_empty() => {}
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let control = control.clone();
                let shutdown_tx = shutdown_tx.clone();
                let closing = closing_rx.clone();
                clients.spawn(async move {
                    if let Err(err) =
                        handle_socket_client(stream, control, shutdown_tx, closing, started_at_unix)
                            .await
                    {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    drop(listener);
    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    tracing::debug!(socket = %socket.display(), "control socket removed");

    // Connected clients finish the request in hand and are then closed.
    closing_tx.send_replace(true);
    while let Some(joined) = clients.join_next().await {
        if let Err(err) = joined {
            tracing::warn!(error = %err, "socket client task failed");
        }
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    control: ControlInterface,
    shutdown_tx: broadcast::Sender<()>,
    mut closing: watch::Receiver<bool>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        let next = tokio::select! {
            biased;
            _ = closing.wait_for(|closing| *closing) => break,
            next = lines.next_line() => next.map_err(|e| io_err("daemon socket read", e))?,
        };
        let Some(line) = next else { break };

        if line.trim().is_empty() {
            continue;
        }

        let request: DaemonRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let stop = request.cmd == "stop";
        let response = dispatch(&control, request, started_at_unix).await;
        write_response(&mut writer, &response).await?;
        if stop {
            tracing::info!("stop requested over control socket");
            let _ = shutdown_tx.send(());
            break;
        }
    }

    Ok(())
}

/// Turn one request into one response. Failures become `ok: false`.
///
/// `stop` is only acknowledged here; the caller triggers shutdown once the
/// reply has been written.
async fn dispatch(
    control: &ControlInterface,
    request: DaemonRequest,
    started_at_unix: u64,
) -> DaemonResponse {
    let result = match request.cmd.as_str() {
        "get" => handle_get(control, &request).await,
        "set" => handle_set(control, &request).await,
        "status" => build_status_payload(control, started_at_unix).await,
        "stop" => Ok(json!({ "stopping": true })),
        other => Err(DaemonError::Protocol(format!("unknown command '{other}'"))),
    };

    match result {
        Ok(data) => DaemonResponse::ok(data),
        Err(err) => {
            if err.is_validation() {
                tracing::debug!(cmd = %request.cmd, error = %err, "request rejected");
            } else {
                tracing::warn!(cmd = %request.cmd, error = %err, "request failed");
            }
            DaemonResponse::error(err.to_string())
        }
    }
}

fn requested_attribute(request: &DaemonRequest) -> Result<Attribute, DaemonError> {
    let name = request
        .attr
        .as_deref()
        .ok_or_else(|| DaemonError::Protocol(format!("'{}' needs an attr", request.cmd)))?;
    Ok(name.parse::<Attribute>()?)
}

async fn handle_get(control: &ControlInterface, request: &DaemonRequest) -> Result<Value, DaemonError> {
    let attr = requested_attribute(request)?;
    let control = control.clone();
    let text = tokio::task::spawn_blocking(move || control.get(attr))
        .await
        .map_err(|err| join_err("get", err))?;
    Ok(Value::String(text))
}

async fn handle_set(control: &ControlInterface, request: &DaemonRequest) -> Result<Value, DaemonError> {
    let attr = requested_attribute(request)?;
    let value = request
        .value
        .as_deref()
        .ok_or_else(|| DaemonError::Protocol("'set' needs a value".to_string()))?;
    let report = control.set(attr, value).await?;
    Ok(serde_json::to_value(report)?)
}

async fn build_status_payload(
    control: &ControlInterface,
    started_at_unix: u64,
) -> Result<Value, DaemonError> {
    let control = control.clone();
    let status = tokio::task::spawn_blocking(move || control.status())
        .await
        .map_err(|err| join_err("status", err))?;
    Ok(serde_json::to_value(StatusPayload {
        running: true,
        pid: std::process::id(),
        started_at_unix,
        status,
    })?)
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    let root = pulselog_root(home);
    if !root.exists() {
        fs::DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(&root)
            .map_err(|e| io_err(&root, e))?;
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var(LOG_FORMAT_ENV).is_ok_and(|format| format == "json");
    let _ = if json {
        fmt().json().with_env_filter(filter).try_init()
    } else {
        fmt().with_env_filter(filter).with_target(false).try_init()
    };
}

fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}
