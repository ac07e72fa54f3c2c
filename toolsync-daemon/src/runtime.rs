//! Daemon runtime: one tokio process hosting the periodic timer, the
//! snapshot/config watcher and the control socket around a shared
//! [`CycleController`].

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;
use tokio::time::Instant;

use toolsync_core::{config, layout::CONFIG_FILE, state, SyncRoot};
use toolsync_engine::report;

use crate::error::{io_err, DaemonError};
use crate::paths::{socket_path, DEBOUNCE_WINDOW};
use crate::protocol::{DaemonRequest, DaemonResponse};
use crate::scheduler::{CycleController, CycleOutcome};

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(root: SyncRoot) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(root))
}

/// Run the daemon: periodic timer, filesystem watcher, socket server and
/// ctrl-c handler, all sharing one [`CycleController`].
///
/// The daemon holds no connectors; it reconciles snapshot files written by
/// connector processes.
pub async fn run(root: SyncRoot) -> Result<(), DaemonError> {
    root.ensure()?;
    let config = config::load_config(&root);
    let controller = CycleController::new(root.clone(), Vec::new());
    controller.start(config.periodic_interval());
    let started_at_unix = unix_seconds_now();

    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let watcher_handle = {
        let shutdown = shutdown_tx.clone();
        let controller = controller.clone();
        tokio::spawn(async move {
            let result = watcher_task(controller, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let controller = controller.clone();
        tokio::spawn(async move {
            let result = socket_server_task(
                controller,
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
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    tracing::info!(root = %root.path().display(), "daemon started");
    let (watcher_result, socket_result, signal_result) =
        tokio::join!(watcher_handle, socket_handle, signal_handle);
    controller.stop();

    handle_join("watcher", watcher_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Watcher
// ---------------------------------------------------------------------------

async fn watcher_task(
    controller: CycleController,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let root = controller.root().clone();
    let snapshots = root.snapshots_dir();
    if !snapshots.exists() {
        fs::create_dir_all(&snapshots).map_err(|e| io_err(&snapshots, e))?;
    }

    // Canonicalize so event paths (which arrive as real paths, e.g.
    // /private/var/... on macOS) match the comparisons below.
    let root_dir = fs::canonicalize(root.path()).unwrap_or_else(|_| root.path().to_path_buf());
    let snapshots = fs::canonicalize(&snapshots).unwrap_or(snapshots);

    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher: RecommendedWatcher = recommended_watcher(move |event| {
        let _ = event_tx.send(event);
    })?;
    watcher.watch(&root_dir, RecursiveMode::NonRecursive)?;
    watcher.watch(&snapshots, RecursiveMode::NonRecursive)?;

    let mut debounce = HashMap::<PathBuf, Instant>::new();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "watcher event error");
                        continue;
                    }
                };
                if !is_relevant_event_kind(&event.kind) {
                    continue;
                }

                for path in event.paths {
                    let Some(reason) = change_reason(&path, &root_dir, &snapshots) else {
                        continue;
                    };
                    if !should_process_event(&mut debounce, &path, Instant::now()) {
                        continue;
                    }

                    let controller = controller.clone();
                    tokio::spawn(async move {
                        match controller.notify_external_change_async(reason.clone()).await {
                            Ok(CycleOutcome::Completed(report)) => tracing::info!(
                                reason = %report.reason,
                                revision = report.revision,
                                "watcher-triggered cycle completed",
                            ),
                            Ok(outcome) => tracing::debug!(%reason, ?outcome, "watcher trigger"),
                            Err(err) => tracing::error!(%reason, error = %err, "watcher-triggered cycle failed"),
                        }
                    });
                }
            }
        }
    }

    Ok(())
}

fn is_relevant_event_kind(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// Cycle reason for a changed path, or `None` if the path is not an input.
fn change_reason(path: &Path, root_dir: &Path, snapshots: &Path) -> Option<String> {
    if path == root_dir.join(CONFIG_FILE) {
        return Some("config".to_string());
    }
    if path.parent() != Some(snapshots) {
        return None;
    }
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if !is_json {
        return None;
    }
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(|stem| format!("snapshot:{stem}"))
}

fn should_process_event(
    debounce: &mut HashMap<PathBuf, Instant>,
    path: &Path,
    now: Instant,
) -> bool {
    should_process_event_with_threshold(debounce, path, now, DEBOUNCE_WINDOW)
}

fn should_process_event_with_threshold(
    debounce: &mut HashMap<PathBuf, Instant>,
    path: &Path,
    now: Instant,
    threshold: Duration,
) -> bool {
    debounce.retain(|_, seen_at| now.duration_since(*seen_at) <= Duration::from_secs(30));
    match debounce.get(path) {
        Some(last_seen) if now.duration_since(*last_seen) < threshold => false,
        _ => {
            debounce.insert(path.to_path_buf(), now);
            true
        }
    }
}

// ---------------------------------------------------------------------------
// Socket server
// ---------------------------------------------------------------------------

async fn socket_server_task(
    controller: CycleController,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let socket = socket_path(controller.root());
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let controller = controller.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) =
                        handle_socket_client(stream, controller, shutdown_tx, started_at_unix).await
                    {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    controller: CycleController,
    shutdown_tx: broadcast::Sender<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
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

        let response = match request.cmd.as_str() {
            "status" => DaemonResponse::ok(build_status_payload(&controller, started_at_unix)),
            "cycle" => {
                let reason = request.reason.clone().unwrap_or_else(|| "socket".to_string());
                match controller.run_cycle_async(reason).await {
                    Ok(outcome) => DaemonResponse::ok(outcome_payload(&outcome)),
                    Err(err) => DaemonResponse::error(err.to_string()),
                }
            }
            "report" => match write_report(controller.root().clone()).await {
                Ok(path) => DaemonResponse::ok(json!({ "path": path.display().to_string() })),
                Err(err) => DaemonResponse::error(err.to_string()),
            },
            "stop" => {
                let _ = shutdown_tx.send(());
                DaemonResponse::ok(json!({ "stopping": true }))
            }
            other => DaemonResponse::error(format!("unknown command '{other}'")),
        };

        write_response(&mut writer, &response).await?;
        if request.cmd == "stop" {
            break;
        }
    }

    Ok(())
}

fn build_status_payload(controller: &CycleController, started_at_unix: u64) -> Value {
    let root = controller.root();
    let revision = state::load_state(root);
    json!({
        "running": true,
        "started_at_unix": started_at_unix,
        "root": root.path().display().to_string(),
        "socket": socket_path(root).display().to_string(),
        "revision": revision.revision,
        "last_run_at": revision.last_run_at,
        "scheduler": controller.status(),
    })
}

/// Wire shape of a [`CycleOutcome`]; also used by the CLI for in-process runs.
pub fn outcome_payload(outcome: &CycleOutcome) -> Value {
    match outcome {
        CycleOutcome::Completed(report) => json!({ "outcome": "completed", "report": report }),
        CycleOutcome::Skipped => json!({ "outcome": "skipped" }),
        CycleOutcome::Queued => json!({ "outcome": "queued" }),
        CycleOutcome::Suppressed => json!({ "outcome": "suppressed" }),
    }
}

async fn write_report(root: SyncRoot) -> Result<PathBuf, DaemonError> {
    tokio::task::spawn_blocking(move || {
        let config = config::load_config(&root);
        report::write_report(&root, &config)
    })
    .await
    .map_err(|err| DaemonError::Protocol(format!("report task join error: {err}")))?
    .map_err(DaemonError::from)
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
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}
