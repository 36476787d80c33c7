//! Maintenance tick (SPEC_FULL.md §4.9): heartbeat, thread/bridge decay,
//! quota enforcement, stale-suspended archival and outgoing shared-proposal
//! expiry, run every `tick_secs` on its own thread. Grounded on the
//! teacher's `run_prune_loop`/`run_task` panic-isolated tick wrapper,
//! rebuilt against the real `decayer`/`gossip`/`ThreadManager` free
//! functions and file-shard storage instead of the teacher's
//! Archiver/Decayer/Gossip/MergeEvaluator structs over a per-agent SQLite
//! connection pool.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::AiConfig;
use crate::constants::ARCHIVE_AFTER_BEATS;
use crate::intelligence::thread_manager::ThreadManager;
use crate::intelligence::{decayer, gossip, synthesis};
use crate::storage::{path_utils, records as record_store, shared, ThreadStore};
use crate::thread::ThreadStatus;

/// Run a single maintenance task inside `catch_unwind` — one misbehaving
/// task (e.g. a corrupt record hit mid-decay) must never take down the
/// whole tick, let alone the daemon.
fn run_task(name: &str, task: impl FnOnce() -> crate::AiResult<()>) {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(task)) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(task = name, error = %e, "maintenance task failed"),
        Err(_) => tracing::error!(task = name, "maintenance task panicked"),
    }
}

/// One full maintenance pass, in the order the spec lists them: heartbeat,
/// thread decay, bridge decay + orphan cleanup, quota, archival, proposal
/// expiry.
pub fn run_tick(project_root: &Path, cfg: &AiConfig) {
    run_task("heartbeat", || {
        let mut hb = record_store::load_heartbeat(project_root)?;
        hb.tick();
        record_store::save_heartbeat(project_root, &hb)
    });

    run_task("thread_decay", || {
        let n = decayer::decay_active(project_root, &cfg.decay)?;
        if n > 0 {
            tracing::info!(count = n, "threads decayed");
        }
        Ok(())
    });

    run_task("bridge_decay", || {
        let decayed = gossip::decay_all(project_root, &cfg.decay)?;
        let orphaned = gossip::clean_orphans(project_root)?;
        if decayed > 0 || orphaned > 0 {
            tracing::info!(decayed, orphaned, "bridges swept");
        }
        Ok(())
    });

    run_task("quota", || {
        let suspended = ThreadManager::enforce_quota(project_root, cfg)?;
        if suspended > 0 {
            tracing::info!(count = suspended, "threads suspended over quota");
        }
        Ok(())
    });

    run_task("archive_stale_suspended", || archive_stale_suspended(project_root, cfg));

    run_task("expire_proposals", || {
        let n = shared::expire_outgoing_proposals(project_root)?;
        if n > 0 {
            tracing::info!(count = n, "outgoing share proposals expired");
        }
        Ok(())
    });
}

/// Fold threads that have sat SUSPENDED for longer than
/// `ARCHIVE_AFTER_BEATS` maintenance ticks into one synthesis record, then
/// archive them (§4.9 step 5). A "beat" here is one maintenance tick, so
/// the wall-clock threshold scales with the configured tick interval.
fn archive_stale_suspended(project_root: &Path, cfg: &AiConfig) -> crate::AiResult<()> {
    let store = ThreadStore::new(project_root);
    let suspended = store.list_by_status(&ThreadStatus::Suspended)?;
    if suspended.is_empty() {
        return Ok(());
    }

    let stale_after = Duration::from_secs(cfg.daemon.maintenance_tick_secs.max(1) * ARCHIVE_AFTER_BEATS as u64);
    let now = crate::time_utils::now();
    let stale: Vec<_> = suspended
        .into_iter()
        .filter(|t| (now - t.last_active).to_std().map(|age| age >= stale_after).unwrap_or(false))
        .collect();
    if stale.is_empty() {
        return Ok(());
    }

    let synth = synthesis::compact(&stale, &cfg.synthesis);
    record_store::put_synthesis(project_root, &synth)?;
    for t in &stale {
        ThreadManager::archive(project_root, &t.id)?;
    }
    tracing::info!(count = stale.len(), "archived suspended threads idle past archive_after_beats");
    Ok(())
}

/// Drive `run_tick` every `tick_secs` until `running` flips false, sleeping
/// in short slices so shutdown is noticed promptly rather than after a full
/// (potentially many-minute) interval.
pub fn run_maintenance_loop(project_root: &Path, running: Arc<AtomicBool>, tick_secs: u64) {
    let interval = Duration::from_secs(tick_secs.max(1));
    std::fs::create_dir_all(path_utils::ai_dir(project_root)).ok();

    while running.load(Ordering::Relaxed) {
        let started = Instant::now();
        let cfg = AiConfig::load(project_root);
        run_tick(project_root, &cfg);

        let remaining = interval.saturating_sub(started.elapsed());
        let mut waited = Duration::ZERO;
        while waited < remaining && running.load(Ordering::Relaxed) {
            let step = Duration::from_millis(200).min(remaining - waited);
            std::thread::sleep(step);
            waited += step;
        }
    }

    tracing::info!("maintenance loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_tick_is_a_no_op_on_an_empty_project() {
        let dir = tempfile::tempdir().unwrap();
        for d in [
            path_utils::threads_dir(dir.path()),
            path_utils::bridges_dir(dir.path()),
            path_utils::synthesis_dir(dir.path()),
            path_utils::archives_dir(dir.path()),
            path_utils::shared_proposals_outgoing_dir(dir.path()),
        ] {
            std::fs::create_dir_all(d).unwrap();
        }
        let cfg = AiConfig::default();
        run_tick(dir.path(), &cfg);

        let hb = record_store::load_heartbeat(dir.path()).unwrap();
        assert_eq!(hb.beat, 1);
    }
}
