//! Decayer — passive weight decay for threads (SPEC_FULL.md §3.2, §4.9 tick
//! step 2). Does not delete or merge anything; only reduces weight and
//! suspends threads that fall below the floor. Bridge decay lives in
//! [`super::gossip::decay_all`].

use crate::config::DecayConfig;
use crate::storage::ThreadStore;
use crate::thread::ThreadStatus;
use crate::AiResult;

/// Decay every ACTIVE thread's weight by
/// `weight *= 0.5^(Δdays / thread_half_life_days)`, suspending any thread
/// that falls below `thread_suspend_threshold`. Returns the number of
/// threads whose weight changed.
pub fn decay_active(project_root: &std::path::Path, cfg: &DecayConfig) -> AiResult<u32> {
    let store = ThreadStore::new(project_root);
    let now = crate::time_utils::now();
    let mut affected = 0u32;
    let mut suspended = 0u32;

    for mut t in store.list_by_status(&ThreadStatus::Active)? {
        let age_days = (now - t.last_active).num_hours() as f64 / 24.0;
        if age_days <= 0.0 {
            continue;
        }

        let decay_factor = 0.5f64.powf(age_days / cfg.thread_half_life_days);
        let new_weight = (t.weight * decay_factor).max(0.0);
        if (new_weight - t.weight).abs() < 0.001 {
            continue;
        }

        t.weight = new_weight;
        t.clamp_weight();
        affected += 1;

        if t.weight < cfg.thread_suspend_threshold {
            tracing::info!(thread_id = %t.id, weight = t.weight, "thread auto-suspended by decay");
            t.status = ThreadStatus::Suspended;
            suspended += 1;
        }

        store.put(&t)?;
    }

    tracing::info!(affected, suspended, "decay cycle complete");
    Ok(affected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::OriginType;
    use chrono::Duration;

    #[test]
    fn decay_suspends_below_threshold() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(crate::storage::path_utils::threads_dir(dir.path())).unwrap();
        let store = ThreadStore::new(dir.path());

        let mut t = crate::thread::Thread::new("t1".into(), "title".into(), OriginType::Prompt);
        t.weight = 0.15;
        t.last_active = crate::time_utils::now() - Duration::days(10);
        store.put(&t).unwrap();

        let cfg = DecayConfig::default();
        decay_active(dir.path(), &cfg).unwrap();

        let updated = store.get("t1").unwrap();
        assert_eq!(updated.status, ThreadStatus::Suspended);
    }

    #[test]
    fn fresh_thread_does_not_decay() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(crate::storage::path_utils::threads_dir(dir.path())).unwrap();
        let store = ThreadStore::new(dir.path());

        let t = crate::thread::Thread::new("t1".into(), "title".into(), OriginType::Prompt);
        store.put(&t).unwrap();

        let cfg = DecayConfig::default();
        let affected = decay_active(dir.path(), &cfg).unwrap();
        assert_eq!(affected, 0);
    }
}
