//! IPC server — the daemon's side of the Unix-domain RPC socket (SPEC_FULL.md
//! §4.9, §6). Grounded on the teacher's `interprocess`-based listener/accept
//! loop (one thread per connection, wake-on-connect shutdown trick), rebuilt
//! against the spec's plain `{"op":...}` / `{"status":"ok"|"error",...}`
//! envelope instead of the teacher's JSON-RPC 2.0 `method`/`id` one, and
//! dispatching into the single-project `ThreadManager`/`retriever`/
//! `injector`/`suggestions`/`synthesis`/`health` APIs instead of the
//! teacher's `ConnectionPool`/`CaptureQueue` multi-agent machinery.

use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};

use crate::config::AiConfig;
use crate::locks::LockRegistry;
use crate::daemon::processor::CaptureProcessor;
use crate::intelligence::thread_manager::{SplitGroup, SplitOutcome, ThreadManager};
use crate::intelligence::{health, injector, retriever, suggestions, synthesis};
use crate::records::FocusEntry;
use crate::storage::{path_utils, records as record_store};
use crate::thread::{SplitLockMode, ThreadStatus};
use crate::{AiError, AiResult};

#[derive(Serialize)]
struct IpcErrorBody {
    kind: &'static str,
    message: String,
}

/// Serialize a dispatch outcome into the reply envelope and write it back,
/// never propagating a write failure to the caller beyond a log line — a
/// client that vanished mid-reply is not the daemon's problem.
fn send_reply(stream: &mut interprocess::local_socket::Stream, outcome: AiResult<Value>) {
    let body = match outcome {
        Ok(result) => json!({ "status": "ok", "result": result }),
        Err(e) => json!({
            "status": "error",
            "error": IpcErrorBody { kind: e.error_kind(), message: e.to_string() },
        }),
    };
    let mut line = match serde_json::to_string(&body) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize IPC reply");
            return;
        }
    };
    line.push('\n');
    if let Err(e) = stream.write_all(line.as_bytes()) {
        tracing::warn!(error = %e, "failed to write IPC reply");
    }
}

/// Bind the project's socket and serve requests until `running` flips
/// false. One thread per connection — requests are short-lived (§5: "Hook
/// clients are short-lived, sequential, and ephemeral").
pub fn serve(project_root: &Path, running: Arc<AtomicBool>) -> AiResult<()> {
    use interprocess::local_socket::{prelude::*, GenericFilePath, ListenerOptions};

    let socket_path = path_utils::socket_path(project_root);
    std::fs::remove_file(&socket_path).ok();

    let name = socket_path
        .to_fs_name::<GenericFilePath>()
        .map_err(|e| AiError::Provider(format!("invalid socket path: {e}")))?;
    let listener = ListenerOptions::new()
        .name(name)
        .create_sync()
        .map_err(|e| AiError::Provider(format!("failed to bind IPC socket: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&socket_path, std::fs::Permissions::from_mode(0o600)).ok();
    }

    tracing::info!(socket = %socket_path.display(), "IPC server listening");

    let locks = Arc::new(LockRegistry::new());
    let processor = Arc::new(CaptureProcessor::new());

    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok(stream) => {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                let project_root = project_root.to_path_buf();
                let locks = Arc::clone(&locks);
                let processor = Arc::clone(&processor);
                let running = Arc::clone(&running);
                std::thread::spawn(move || {
                    handle_connection(stream, &project_root, &locks, &processor, &running);
                });
            }
            Err(e) => {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                tracing::warn!(error = %e, "IPC accept failed");
            }
        }
    }

    std::fs::remove_file(&socket_path).ok();
    tracing::info!("IPC server stopped");
    Ok(())
}

fn handle_connection(
    mut stream: interprocess::local_socket::Stream,
    project_root: &Path,
    locks: &Arc<LockRegistry>,
    processor: &Arc<CaptureProcessor>,
    running: &Arc<AtomicBool>,
) {
    let mut line = String::new();
    {
        let mut reader = BufReader::new(&mut stream);
        if reader.read_line(&mut line).is_err() || line.trim().is_empty() {
            return;
        }
    }

    let request: Value = match serde_json::from_str(&line) {
        Ok(v) => v,
        Err(e) => {
            send_reply(&mut stream, Err(AiError::InvalidInput(format!("invalid JSON request: {e}"))));
            return;
        }
    };

    let op = match request.get("op").and_then(Value::as_str) {
        Some(op) => op.to_string(),
        None => {
            send_reply(&mut stream, Err(AiError::InvalidInput("request is missing an \"op\" field".into())));
            return;
        }
    };

    let cfg = AiConfig::load(project_root);
    let outcome = dispatch(&op, &request, project_root, locks, processor, &cfg, running);
    send_reply(&mut stream, outcome);
}

fn arg_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

fn require_str<'a>(args: &'a Value, key: &str) -> AiResult<&'a str> {
    arg_str(args, key).ok_or_else(|| AiError::InvalidInput(format!("missing required field \"{key}\"")))
}

fn parse_split_lock_mode(s: &str) -> AiResult<SplitLockMode> {
    match s {
        "compaction" => Ok(SplitLockMode::Compaction),
        "agent_release" => Ok(SplitLockMode::AgentRelease),
        "force" => Ok(SplitLockMode::Force),
        other => Err(AiError::InvalidInput(format!("unknown split lock mode: {other}"))),
    }
}

fn focus_entries_json(entries: &[FocusEntry]) -> Value {
    json!(entries.iter().map(|f| json!({ "topic": f.topic, "weight": f.weight })).collect::<Vec<_>>())
}

/// Dispatch one request to its handler. Every op runs in-line on this
/// connection's own thread; per-thread/per-bridge mutations take the
/// matching lock only across the read-mutate-write, per §5, never across
/// an LLM call (the classifier/extractor calls inside `ThreadManager`
/// already run before any lock here is taken).
fn dispatch(
    op: &str,
    request: &Value,
    project_root: &Path,
    locks: &Arc<LockRegistry>,
    processor: &Arc<CaptureProcessor>,
    cfg: &AiConfig,
    running: &Arc<AtomicBool>,
) -> AiResult<Value> {
    match op {
        "ping" => Ok(json!({ "pong": true })),

        "shutdown" => {
            running.store(false, Ordering::SeqCst);
            Ok(json!({ "bye": true }))
        }

        "status" => op_status(project_root, cfg),

        "capture" => op_capture(request, project_root, processor, cfg, locks),

        "recall" => op_recall(request, project_root, cfg),

        "merge" => op_merge(request, project_root, locks),

        "split" => op_split(request, project_root, cfg, locks),

        "unlock" => op_unlock(request, project_root, locks),

        "suggestions" => {
            let context = arg_str(request, "context");
            Ok(serde_json::to_value(suggestions::build(project_root, context, true)?)?)
        }

        "compact" => op_compact(request, project_root, cfg),

        "focus" => op_focus(request, project_root),

        "unfocus" => op_unfocus(request, project_root),

        "pin" => op_pin(request, project_root, cfg, locks),

        "rate_context" => op_rate_context(request, project_root, locks),

        other => Err(AiError::InvalidInput(format!("unknown op \"{other}\""))),
    }
}

fn op_status(project_root: &Path, cfg: &AiConfig) -> AiResult<Value> {
    let report = health::build(project_root, true)?;
    let heartbeat = record_store::load_heartbeat(project_root)?;
    Ok(json!({
        "mode": format!("{:?}", cfg.mode).to_lowercase(),
        "threads_active": report.threads_active,
        "threads_suspended": report.threads_suspended,
        "threads_archived": report.threads_archived,
        "bridges_total": report.bridges_total,
        "quarantined_files": report.quarantined_files,
        "beat": heartbeat.beat,
    }))
}

fn op_capture(
    request: &Value,
    project_root: &Path,
    processor: &Arc<CaptureProcessor>,
    cfg: &AiConfig,
    locks: &Arc<LockRegistry>,
) -> AiResult<Value> {
    if !cfg.auto_capture {
        return Ok(json!({ "thread_id": Value::Null, "action": "skip", "title": Value::Null }));
    }

    let tool = require_str(request, "tool")?;
    let content = require_str(request, "content")?;
    let file_path = arg_str(request, "file_path");
    let source_type = crate::thread::OriginType::from_tool_name(tool).as_str();

    let outcome = processor.capture(project_root, content, source_type, file_path, cfg, locks)?;
    match outcome {
        Some(o) => Ok(json!({ "thread_id": o.thread.id, "action": o.decision, "title": o.thread.title })),
        None => Ok(json!({ "thread_id": Value::Null, "action": "skip", "title": Value::Null })),
    }
}

fn op_recall(request: &Value, project_root: &Path, cfg: &AiConfig) -> AiResult<Value> {
    let query = require_str(request, "query")?;
    let include_suspended = request.get("include_suspended").and_then(Value::as_bool).unwrap_or(false);
    let limit = request.get("limit").and_then(Value::as_u64).map(|n| n as usize);

    let mut matches = retriever::recall(project_root, query, include_suspended, cfg)?;
    matches.truncate(limit.unwrap_or(crate::constants::RETRIEVAL_MAX_RESULTS));

    let query_embedding = crate::processing::embeddings::EmbeddingManager::global().embed(query);
    let query_topics = crate::processing::cleaner::extract_topics(query);
    let matched: Vec<Value> = matches
        .iter()
        .map(|t| {
            let score = crate::intelligence::classifier::sim(&query_embedding, &query_topics, t);
            json!({ "id": t.id, "score": score, "reactivated": t.status == ThreadStatus::Active })
        })
        .collect();

    let text = injector::format_recall(project_root, &matches, crate::constants::RECALL_BUDGET_CHARS)?;
    Ok(json!({ "text": text, "matched": matched }))
}

fn op_merge(request: &Value, project_root: &Path, locks: &Arc<LockRegistry>) -> AiResult<Value> {
    let survivor_id = require_str(request, "survivor_id")?;
    let absorbed_id = require_str(request, "absorbed_id")?;
    let (survivor_lock, absorbed_lock) = locks.lock_thread_pair(survivor_id, absorbed_id);
    let _g1 = survivor_lock.lock().expect("lock poisoned");
    let _g2 = absorbed_lock.lock().expect("lock poisoned");

    let survivor = ThreadManager::merge(project_root, survivor_id, absorbed_id)?;
    Ok(json!({ "survivor_id": survivor.id }))
}

fn op_split(request: &Value, project_root: &Path, cfg: &AiConfig, locks: &Arc<LockRegistry>) -> AiResult<Value> {
    let thread_id = require_str(request, "thread_id")?;
    let confirm = request.get("confirm").and_then(Value::as_bool).unwrap_or(false);
    let lock_mode = match arg_str(request, "lock") {
        Some(s) => parse_split_lock_mode(s)?,
        None => SplitLockMode::AgentRelease,
    };

    let groups: Vec<SplitGroup> = request
        .get("message_groups")
        .and_then(Value::as_array)
        .ok_or_else(|| AiError::InvalidInput("split requires \"message_groups\"".into()))?
        .iter()
        .map(|g| {
            let title = g.get("title").and_then(Value::as_str).unwrap_or("untitled group").to_string();
            let message_ids = g
                .get("message_ids")
                .and_then(Value::as_array)
                .map(|ids| ids.iter().filter_map(Value::as_str).map(String::from).collect())
                .unwrap_or_default();
            SplitGroup { title, message_ids }
        })
        .collect();

    match ThreadManager::split(project_root, thread_id, &groups, lock_mode, confirm, cfg, locks)? {
        SplitOutcome::Preview(previews) => {
            let messages: Vec<Value> = previews
                .iter()
                .map(|p| json!({ "title": p.title, "message_ids": p.message_ids, "message_count": p.message_count }))
                .collect();
            Ok(json!({ "messages": messages }))
        }
        SplitOutcome::Executed(children) => {
            let new_ids: Vec<&str> = children.iter().map(|c| c.id.as_str()).collect();
            Ok(json!({ "new_ids": new_ids }))
        }
    }
}

fn op_unlock(request: &Value, project_root: &Path, locks: &Arc<LockRegistry>) -> AiResult<Value> {
    let thread_id = require_str(request, "thread_id")?;
    let mode = match arg_str(request, "mode") {
        Some(s) => parse_split_lock_mode(s)?,
        None => SplitLockMode::Force,
    };
    ThreadManager::unlock(project_root, thread_id, mode, locks)?;
    Ok(json!({ "unlocked": true }))
}

/// `strategy` selects how much gets folded into the compaction synthesis:
/// `gentle` only considers active threads, `normal` adds suspended ones,
/// `aggressive` additionally archives the suspended threads it just
/// summarized (mirrors the maintenance tick's own stale-suspended
/// archival, just triggered on demand instead of on a beat count).
fn op_compact(request: &Value, project_root: &Path, cfg: &AiConfig) -> AiResult<Value> {
    let strategy = arg_str(request, "strategy").unwrap_or("normal");
    let dry_run = request.get("dry_run").and_then(Value::as_bool).unwrap_or(false);

    let threads = crate::storage::ThreadStore::new(project_root);
    let mut pool = threads.list_by_status(&ThreadStatus::Active)?;
    if strategy != "gentle" {
        pool.extend(threads.list_by_status(&ThreadStatus::Suspended)?);
    }

    let synth = synthesis::compact(&pool, &cfg.synthesis);

    if !dry_run {
        record_store::put_synthesis(project_root, &synth)?;
        if strategy == "aggressive" {
            for t in pool.iter().filter(|t| t.status == ThreadStatus::Suspended) {
                ThreadManager::archive(project_root, &t.id)?;
            }
        }
    }

    Ok(json!({
        "strategy": strategy,
        "dry_run": dry_run,
        "synthesis_id": synth.id,
        "summary": synth.summary,
        "threads_considered": pool.len(),
    }))
}

fn op_focus(request: &Value, project_root: &Path) -> AiResult<Value> {
    let mut entries = record_store::load_focus(project_root)?;
    if let Some(topic) = arg_str(request, "topic") {
        let weight = request.get("weight").and_then(Value::as_f64).unwrap_or(0.5);
        entries.retain(|f| !f.topic.eq_ignore_ascii_case(topic));
        entries.push(FocusEntry::new(topic.to_string(), weight));
        record_store::save_focus(project_root, &entries)?;
    }
    Ok(json!({ "active_focus": focus_entries_json(&entries) }))
}

fn op_unfocus(request: &Value, project_root: &Path) -> AiResult<Value> {
    let mut entries = record_store::load_focus(project_root)?;
    match arg_str(request, "topic") {
        Some(topic) => entries.retain(|f| !f.topic.eq_ignore_ascii_case(topic)),
        None => entries.clear(),
    }
    record_store::save_focus(project_root, &entries)?;
    Ok(json!({ "active_focus": focus_entries_json(&entries) }))
}

fn op_pin(request: &Value, project_root: &Path, cfg: &AiConfig, locks: &Arc<LockRegistry>) -> AiResult<Value> {
    let content = require_str(request, "content")?;
    let title = arg_str(request, "title");
    let topics = request
        .get("topics")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_str).map(String::from).collect::<Vec<_>>());
    let boost = request.get("weight_boost").and_then(Value::as_f64).unwrap_or(0.0);

    let thread = ThreadManager::pin(project_root, content, title, topics, boost, cfg, locks)?;
    Ok(json!({ "thread_id": thread.id }))
}

fn op_rate_context(request: &Value, project_root: &Path, locks: &Arc<LockRegistry>) -> AiResult<Value> {
    let thread_id = require_str(request, "thread_id")?;
    let useful = request
        .get("useful")
        .and_then(Value::as_bool)
        .ok_or_else(|| AiError::InvalidInput("missing required field \"useful\"".into()))?;
    let reason = arg_str(request, "reason");
    let score = ThreadManager::rate_context(project_root, thread_id, useful, reason, locks)?;
    Ok(json!({ "relevance_score": score }))
}
