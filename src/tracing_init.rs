//! Shared tracing initialization — daemon and CLI both append to the same
//! per-project log, so `ai health` and the daemon's own traces interleave
//! into one coherent stream.

use std::path::Path;
use std::sync::Mutex;

use crate::storage::path_utils;

/// Initialize tracing to `<project_root>/.ai/processor.log` (append mode).
///
/// - `project_root`: the project whose `.ai/` directory owns this log.
pub fn init_file_tracing(project_root: &Path) {
    use tracing_subscriber::EnvFilter;

    let ai_dir = path_utils::ai_dir(project_root);
    std::fs::create_dir_all(&ai_dir).ok();
    let log_path = path_utils::processor_log_path(project_root);

    // Open in APPEND mode — the daemon and short-lived CLI invocations write
    // to the same file. Short writes (< PIPE_BUF = 4096) are atomic on
    // Linux/macOS.
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .unwrap_or_else(|_| {
            let null = if cfg!(windows) { "NUL" } else { "/dev/null" };
            std::fs::File::create(null).expect("Cannot create log fallback")
        });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(Mutex::new(log_file))
        .with_target(true)
        .with_ansi(false)
        .try_init();
}

/// Initialize tracing to stderr only, for CLI invocations that fail before
/// a project root is resolved (argument errors, `ai help`).
pub fn init_stderr_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
