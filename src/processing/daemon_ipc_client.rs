//! Daemon IPC client — the thin CLI's (and capture pipeline's) transport to
//! the project-local daemon over its Unix-domain stream socket (SPEC_FULL.md
//! §4.9, §6). Protocol: one newline-delimited JSON request per connection,
//! one newline-delimited JSON reply back, then the connection closes.
//!
//! `interprocess::local_socket` keeps this portable (named pipes on
//! Windows), mirroring the teacher's transport choice; the wire schema here
//! is the spec's plain `{"op":...}` / `{"status":...}` envelope, not the
//! teacher's JSON-RPC 2.0 `method`/`id` one, and there is no
//! `project_hash`/`agent_id` pair in any request — this daemon serves
//! exactly one project.

use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::storage::path_utils;
use crate::{AiError, AiResult};

#[derive(Debug, Deserialize)]
struct IpcReply {
    status: String,
    result: Option<serde_json::Value>,
    error: Option<IpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct IpcErrorBody {
    #[allow(dead_code)]
    kind: String,
    message: String,
}

/// `ping` — cheap liveness check.
pub fn ping(project_root: &Path) -> bool {
    call(project_root, "ping", serde_json::json!({})).is_ok()
}

/// `status` — aggregate counts and current mode.
pub fn daemon_status(project_root: &Path) -> AiResult<serde_json::Value> {
    call(project_root, "status", serde_json::json!({}))
}

/// `shutdown` — request a graceful stop.
pub fn shutdown(project_root: &Path) -> AiResult<serde_json::Value> {
    call(project_root, "shutdown", serde_json::json!({}))
}

/// `capture` — forward a captured event for extraction/classification.
pub fn capture(
    project_root: &Path,
    tool: &str,
    content: &str,
    file_path: Option<&str>,
    session_id: Option<&str>,
) -> AiResult<serde_json::Value> {
    let mut args = serde_json::json!({ "tool": tool, "content": content });
    if let Some(p) = file_path {
        args["file_path"] = serde_json::Value::String(p.to_string());
    }
    if let Some(s) = session_id {
        args["session_id"] = serde_json::Value::String(s.to_string());
    }
    call(project_root, "capture", args)
}

/// Generic op call — used by the CLI subcommands that just forward args.
pub fn send_op(project_root: &Path, op: &str, args: serde_json::Value) -> AiResult<serde_json::Value> {
    call(project_root, op, args)
}

/// Inner IPC call: connect, write one line, read one line, parse. Runs on a
/// dedicated thread so the caller can bound the whole exchange with a timeout
/// even if the daemon never answers.
fn do_ipc_call(sock_path: std::path::PathBuf, request_json: String) -> AiResult<serde_json::Value> {
    use interprocess::local_socket::{prelude::*, GenericFilePath};

    let name = sock_path
        .to_fs_name::<GenericFilePath>()
        .map_err(|e| AiError::Provider(format!("Invalid socket name: {}", e)))?;

    let mut stream = interprocess::local_socket::Stream::connect(name)
        .map_err(|e| AiError::Provider(format!("Failed to connect to daemon: {}", e)))?;

    stream
        .write_all(request_json.as_bytes())
        .map_err(|e| AiError::Provider(format!("Failed to write to daemon: {}", e)))?;
    stream
        .write_all(b"\n")
        .map_err(|e| AiError::Provider(format!("Failed to write newline: {}", e)))?;
    stream
        .flush()
        .map_err(|e| AiError::Provider(format!("Failed to flush: {}", e)))?;

    let mut reader = BufReader::new(&mut stream);
    let mut response_line = String::new();
    reader
        .read_line(&mut response_line)
        .map_err(|e| AiError::Provider(format!("Failed to read daemon response: {}", e)))?;

    let reply: IpcReply = serde_json::from_str(&response_line)
        .map_err(|e| AiError::Provider(format!("Invalid daemon response: {}", e)))?;

    if reply.status != "ok" {
        let message = reply.error.map(|e| e.message).unwrap_or_else(|| "unknown daemon error".to_string());
        return Err(AiError::Provider(message));
    }

    Ok(reply.result.unwrap_or(serde_json::Value::Object(Default::default())))
}

/// Issue one op against the project's daemon, bounded by a 5s client-side
/// timeout via thread + channel (the daemon's own per-request budget is 30s;
/// this is the caller giving up on an unresponsive daemon, not the protocol).
fn call(project_root: &Path, op: &str, args: serde_json::Value) -> AiResult<serde_json::Value> {
    let sock_path = path_utils::socket_path(project_root);

    #[cfg(unix)]
    if !sock_path.exists() {
        return Err(AiError::Provider(format!(
            "Daemon socket not found: {}. Is the daemon running? (`ai daemon start`)",
            sock_path.display()
        )));
    }

    let mut request = args;
    request["op"] = serde_json::Value::String(op.to_string());
    let request_json = serde_json::to_string(&request).map_err(AiError::Serialization)?;

    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        tx.send(do_ipc_call(sock_path, request_json)).ok();
    });

    rx.recv_timeout(Duration::from_secs(5))
        .map_err(|_| AiError::Provider("Daemon IPC timeout after 5s".into()))?
}
