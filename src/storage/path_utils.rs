//! On-disk layout (SPEC_FULL.md §6): everything lives under `<project>/.ai/`,
//! not a global per-user data directory — the store is project-local.

use std::path::{Path, PathBuf};

pub fn ai_dir(project_root: &Path) -> PathBuf {
    project_root.join(".ai")
}

pub fn config_path(project_root: &Path) -> PathBuf {
    ai_dir(project_root).join("config.json")
}

pub fn user_rules_path(project_root: &Path) -> PathBuf {
    ai_dir(project_root).join("user_rules.json")
}

pub fn heartbeat_path(project_root: &Path) -> PathBuf {
    ai_dir(project_root).join("heartbeat.json")
}

pub fn focus_path(project_root: &Path) -> PathBuf {
    ai_dir(project_root).join("focus.json")
}

pub fn pid_path(project_root: &Path) -> PathBuf {
    ai_dir(project_root).join("processor.pid")
}

pub fn socket_path(project_root: &Path) -> PathBuf {
    ai_dir(project_root).join("processor.sock")
}

pub fn processor_log_path(project_root: &Path) -> PathBuf {
    ai_dir(project_root).join("processor.log")
}

pub fn inject_log_path(project_root: &Path) -> PathBuf {
    ai_dir(project_root).join("inject.log")
}

pub fn db_dir(project_root: &Path) -> PathBuf {
    ai_dir(project_root).join("db")
}

pub fn threads_dir(project_root: &Path) -> PathBuf {
    db_dir(project_root).join("threads")
}

pub fn thread_path(project_root: &Path, id: &str) -> PathBuf {
    threads_dir(project_root).join(format!("{}.json", id))
}

pub fn bridges_dir(project_root: &Path) -> PathBuf {
    db_dir(project_root).join("bridges")
}

pub fn bridge_path(project_root: &Path, id: &str) -> PathBuf {
    bridges_dir(project_root).join(format!("{}.json", id))
}

pub fn synthesis_dir(project_root: &Path) -> PathBuf {
    db_dir(project_root).join("synthesis")
}

pub fn synthesis_path(project_root: &Path, id: &str) -> PathBuf {
    synthesis_dir(project_root).join(format!("{}.json", id))
}

pub fn archives_dir(project_root: &Path) -> PathBuf {
    db_dir(project_root).join("archives")
}

pub fn archive_path(project_root: &Path, id: &str) -> PathBuf {
    archives_dir(project_root).join(format!("{}.json", id))
}

pub fn tmp_dir(project_root: &Path) -> PathBuf {
    ai_dir(project_root).join("tmp")
}

pub fn tmp_recall_dir(project_root: &Path) -> PathBuf {
    tmp_dir(project_root).join("recall")
}

pub fn shared_dir(project_root: &Path) -> PathBuf {
    db_dir(project_root).join("shared")
}

pub fn shared_published_dir(project_root: &Path) -> PathBuf {
    shared_dir(project_root).join("published")
}

pub fn shared_subscriptions_dir(project_root: &Path) -> PathBuf {
    shared_dir(project_root).join("subscriptions")
}

pub fn shared_proposals_outgoing_dir(project_root: &Path) -> PathBuf {
    shared_dir(project_root).join("proposals").join("outgoing")
}

pub fn shared_proposals_incoming_dir(project_root: &Path) -> PathBuf {
    shared_dir(project_root).join("proposals").join("incoming")
}

/// Resolve the project root an `ai` invocation operates against: the
/// current directory, canonicalized so the daemon's socket/pid paths are
/// stable regardless of symlinks.
pub fn resolve_project_root() -> std::io::Result<PathBuf> {
    std::env::current_dir()?.canonicalize()
}

/// Expand a leading `~` to the user's home directory (used only for
/// user-supplied paths in config, never for the `.ai/` layout itself).
pub fn expand_tilde(path: &str) -> String {
    if path.starts_with("~/") || path == "~" {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}
