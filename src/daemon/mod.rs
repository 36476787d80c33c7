//! Single-project background daemon (SPEC_FULL.md §4.9): one maintenance
//! ticker, one Unix-domain RPC socket, one PID file, all scoped to the
//! project the daemon was started in. Grounded on the teacher's
//! `daemon/mod.rs` lifecycle shape (PID file, signal-driven shutdown,
//! wake-on-connect unblock of the IPC accept loop) but single-tenant: no
//! connection pool, no capture queue, no SQLite integrity pass.

pub mod ipc_server;
pub mod periodic_tasks;
pub mod processor;

/// Re-exported from the crate root: `intelligence::thread_manager` needs
/// the same registry and must not depend on `daemon`, so the type now
/// lives at `crate::locks` (see that module for the full rationale).
pub use crate::locks;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::AiConfig;
use crate::processing::embeddings::EmbeddingManager;
use crate::storage::path_utils;
use crate::{AiError, AiResult};

/// Env var an `ai` invocation sets around subprocesses it spawns itself
/// (the injector's CLI passthrough, the LLM subprocess) so a recursively
/// invoked `ai` never re-enters capture/injection against its own output.
pub const REENTRY_GUARD_ENV: &str = "AI_HOOK_ACTIVE";

fn read_pid_file(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// `kill(pid, 0)` delivers no signal, only checks existence/permission —
/// the standard liveness probe on unix.
fn pid_is_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

/// True if a daemon for this project appears to already be running: its PID
/// file names a live process AND that process answers a `ping` on the
/// socket. A stale PID file (process gone) or a dead socket does not count.
fn daemon_already_running(project_root: &Path) -> bool {
    let pid_path = path_utils::pid_path(project_root);
    match read_pid_file(&pid_path) {
        Some(pid) if pid_is_alive(pid) => crate::processing::daemon_ipc_client::ping(project_root),
        _ => false,
    }
}

fn write_pid_file(project_root: &Path) -> AiResult<()> {
    let path = path_utils::pid_path(project_root);
    std::fs::create_dir_all(path_utils::ai_dir(project_root))?;
    std::fs::write(&path, std::process::id().to_string())?;
    Ok(())
}

fn remove_pid_file(project_root: &Path) {
    std::fs::remove_file(path_utils::pid_path(project_root)).ok();
}

/// Run the daemon in the foreground until signaled to stop. Refuses to
/// start if a live daemon is already serving this project (§4.9: "refuse to
/// start if an existing pid is alive and the socket responds to a ping").
pub fn run(project_root: &Path) -> AiResult<()> {
    crate::tracing_init::init_file_tracing(project_root);

    if daemon_already_running(project_root) {
        return Err(AiError::InvalidState(format!(
            "a daemon is already running for {}",
            project_root.display()
        )));
    }

    let cfg = AiConfig::load(project_root);
    for dir in [
        path_utils::threads_dir(project_root),
        path_utils::bridges_dir(project_root),
        path_utils::synthesis_dir(project_root),
        path_utils::archives_dir(project_root),
        path_utils::shared_published_dir(project_root),
        path_utils::shared_subscriptions_dir(project_root),
        path_utils::shared_proposals_outgoing_dir(project_root),
        path_utils::shared_proposals_incoming_dir(project_root),
        path_utils::tmp_recall_dir(project_root),
    ] {
        std::fs::create_dir_all(&dir)?;
    }

    write_pid_file(project_root)?;

    // Eagerly initialize the embedding engine so the first capture doesn't
    // pay ONNX/TF-IDF init latency inline.
    let emb = EmbeddingManager::global();
    tracing::info!(use_onnx = emb.use_onnx, "embedding engine initialized");

    let running = Arc::new(AtomicBool::new(true));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&running))
        .map_err(|e| AiError::Storage(format!("failed to register SIGINT handler: {e}")))?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&running))
        .map_err(|e| AiError::Storage(format!("failed to register SIGTERM handler: {e}")))?;

    let socket_path = path_utils::socket_path(project_root);
    let ipc_running = Arc::clone(&running);
    let ipc_root = project_root.to_path_buf();
    let ipc_handle = std::thread::spawn(move || {
        if let Err(e) = ipc_server::serve(&ipc_root, ipc_running) {
            tracing::error!(error = %e, "IPC server exited with error");
        }
    });

    let tick_running = Arc::clone(&running);
    let tick_root = project_root.to_path_buf();
    let tick_secs = cfg.daemon.maintenance_tick_secs;
    let tick_handle = std::thread::spawn(move || {
        periodic_tasks::run_maintenance_loop(&tick_root, tick_running, tick_secs);
    });

    tracing::info!(project = %project_root.display(), "daemon started");
    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_secs(1));
    }

    tracing::info!("daemon shutting down");
    wake_listener(&socket_path);
    ipc_handle.join().ok();
    tick_handle.join().ok();
    remove_pid_file(project_root);
    tracing::info!("daemon stopped");
    Ok(())
}

/// Unblock the IPC server's blocking `accept()` by connecting to it once
/// and immediately dropping the stream — the standard trick for a
/// synchronous listener with no separate shutdown channel.
fn wake_listener(socket_path: &Path) {
    use interprocess::local_socket::{prelude::*, GenericFilePath};
    if let Ok(name) = socket_path.to_fs_name::<GenericFilePath>() {
        let _ = interprocess::local_socket::Stream::connect(name);
    }
}

/// `ai daemon start`: spawn a detached child re-running this same binary as
/// `ai daemon run-foreground`, and wait for it to come up.
pub fn start_detached(project_root: &Path) -> AiResult<()> {
    if daemon_already_running(project_root) {
        return Err(AiError::InvalidState("daemon is already running".into()));
    }

    let exe = std::env::current_exe().map_err(AiError::Io)?;
    std::fs::create_dir_all(path_utils::ai_dir(project_root))?;
    let log_path = path_utils::processor_log_path(project_root);
    let log_out = std::fs::OpenOptions::new().create(true).append(true).open(&log_path)?;
    let log_err = log_out.try_clone()?;

    std::process::Command::new(exe)
        .arg("daemon")
        .arg("run-foreground")
        .current_dir(project_root)
        .stdin(std::process::Stdio::null())
        .stdout(log_out)
        .stderr(log_err)
        .spawn()
        .map_err(AiError::Io)?;

    let pid_path = path_utils::pid_path(project_root);
    for _ in 0..50 {
        if pid_path.exists() && crate::processing::daemon_ipc_client::ping(project_root) {
            return Ok(());
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    Err(AiError::Provider("daemon did not become ready within 5s".into()))
}

/// `ai daemon stop`: request a graceful `shutdown`, then wait for the PID
/// file to disappear.
pub fn stop(project_root: &Path) -> AiResult<()> {
    if !daemon_already_running(project_root) {
        remove_pid_file(project_root);
        return Err(AiError::InvalidState("daemon is not running".into()));
    }
    crate::processing::daemon_ipc_client::shutdown(project_root)?;

    let pid_path = path_utils::pid_path(project_root);
    for _ in 0..(crate::constants::SHUTDOWN_DRAIN_SECS * 10) {
        if !pid_path.exists() {
            return Ok(());
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    Ok(())
}

/// `ai daemon status`: liveness only. Aggregate counts come from the
/// `status` RPC op once a caller knows the daemon is up.
pub fn is_running(project_root: &Path) -> bool {
    daemon_already_running(project_root)
}

pub fn pid_file_path(project_root: &Path) -> PathBuf {
    path_utils::pid_path(project_root)
}
