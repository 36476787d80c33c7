//! Health reporting — surfaces corruption/quarantine events and aggregate
//! counts for the `health` CLI subcommand and the `suggestions` RPC op
//! (SPEC_FULL.md §7: "subsystem reports the event via `health`"). Read-only:
//! this never mutates the store, it only scans it.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::storage::path_utils;
use crate::storage::{BridgeStore, ThreadStore};
use crate::thread::ThreadStatus;
use crate::AiResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub threads_active: usize,
    pub threads_suspended: usize,
    pub threads_archived: usize,
    pub bridges_total: usize,
    pub quarantined_files: usize,
    pub daemon_alive: bool,
}

impl HealthReport {
    pub fn is_ok(&self) -> bool {
        self.quarantined_files == 0
    }
}

/// Build a health report. `daemon_alive` is passed in rather than probed
/// here, since probing the socket is an IPC concern (`daemon_ipc_client`),
/// not a storage-scanning one.
pub fn build(project_root: &Path, daemon_alive: bool) -> AiResult<HealthReport> {
    let threads = ThreadStore::new(project_root);
    let bridges = BridgeStore::new(project_root);

    Ok(HealthReport {
        threads_active: threads.list_by_status(&ThreadStatus::Active)?.len(),
        threads_suspended: threads.list_by_status(&ThreadStatus::Suspended)?.len(),
        threads_archived: threads.list_by_status(&ThreadStatus::Archived)?.len(),
        bridges_total: bridges.list_all()?.len(),
        quarantined_files: count_quarantined(project_root),
        daemon_alive,
    })
}

/// Count `.corrupt.<ts>` files left behind by `store::quarantine` across
/// every record directory. Best-effort: an unreadable directory counts as
/// zero rather than failing the whole report.
fn count_quarantined(project_root: &Path) -> usize {
    let dirs = [
        path_utils::threads_dir(project_root),
        path_utils::bridges_dir(project_root),
        path_utils::synthesis_dir(project_root),
        path_utils::archives_dir(project_root),
    ];
    dirs.iter().map(|d| count_corrupt_in(d)).sum()
}

fn count_corrupt_in(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().to_string_lossy().contains(".corrupt."))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_quarantined_files_across_dirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(path_utils::threads_dir(dir.path())).unwrap();
        std::fs::write(path_utils::threads_dir(dir.path()).join("thread_1.corrupt.2026-01-01T00-00-00Z.json"), b"bad").unwrap();

        let report = build(dir.path(), false).unwrap();
        assert_eq!(report.quarantined_files, 1);
        assert!(!report.is_ok());
    }

    #[test]
    fn empty_project_is_healthy() {
        let dir = tempfile::tempdir().unwrap();
        let report = build(dir.path(), true).unwrap();
        assert!(report.is_ok());
        assert!(report.daemon_alive);
    }
}
