//! GossipPropagator — reactively maintains the bridge graph (SPEC_FULL.md
//! §4.6). Grounded on the teacher's `gossip.rs` three-phase structure
//! (direct similarity, one-hop propagation, decay), generalized to the
//! real JSON `BridgeStore`/`ThreadStore` and the spec's corrected numbers.

use crate::bridge::{BridgeType, ThinkBridge};
use crate::config::{DecayConfig, GossipConfig};
use crate::id_gen;
use crate::processing::embeddings::cosine_similarity;
use crate::storage::{BridgeStore, ThreadStore};
use crate::thread::Thread;
use crate::AiResult;

/// `on_thread_modified(t)` — direct-similarity bridge creation/boost, then
/// one-hop propagation from `t`'s strong neighbors.
pub fn on_thread_modified(
    project_root: &std::path::Path,
    t: &Thread,
    config: &GossipConfig,
) -> AiResult<()> {
    let threads = ThreadStore::new(project_root);
    let bridges = BridgeStore::new(project_root);

    let t_emb = match &t.embedding {
        Some(e) if !e.is_empty() => e.clone(),
        _ => return Ok(()),
    };

    let active: Vec<Thread> = threads
        .list_by_status(&crate::thread::ThreadStatus::Active)?
        .into_iter()
        .filter(|u| u.id != t.id)
        .collect();

    let existing = bridges.list_for_thread(&t.id)?;

    // Phase 1: direct similarity.
    for u in &active {
        let u_emb = match &u.embedding {
            Some(e) if !e.is_empty() => e,
            _ => continue,
        };
        let sim = cosine_similarity(&t_emb, u_emb);
        if sim < config.create_threshold {
            continue;
        }
        if let Some(existing_bridge) = existing.iter().find(|b| b.connects(&t.id, &u.id)) {
            let mut boosted = existing_bridge.clone();
            boosted.boost(crate::constants::BRIDGE_USE_BOOST);
            bridges.put(&boosted)?;
        } else {
            let relation = determine_relation(t, u);
            let bridge = ThinkBridge::new(id_gen::bridge_id(), t.id.clone(), u.id.clone(), relation, sim);
            bridges.put(&bridge)?;
            tracing::info!(source = %t.id, target = %u.id, sim, "gossip: bridge created");
        }
    }

    if !config.propagation_enabled {
        return Ok(());
    }

    // Phase 2: one-hop propagation, capped at depth 1.
    let refreshed = bridges.list_for_thread(&t.id)?;
    for direct in refreshed.iter().filter(|b| b.weight >= config.propagation_neighbor_min_weight) {
        let neighbor_id = direct.other_end(&t.id).unwrap_or(&t.id).to_string();
        if neighbor_id == t.id {
            continue;
        }
        let neighbor = match threads.try_get(&neighbor_id)? {
            Some(n) if n.status == crate::thread::ThreadStatus::Active => n,
            _ => continue,
        };
        for nb in bridges.list_for_thread(&neighbor_id)? {
            if nb.propagation_depth >= config.propagation_max_depth {
                continue;
            }
            let v_id = match nb.other_end(&neighbor_id) {
                Some(id) if id != t.id => id.to_string(),
                _ => continue,
            };
            if bridges.list_for_thread(&t.id)?.iter().any(|b| b.connects(&t.id, &v_id)) {
                continue;
            }
            let v = match threads.try_get(&v_id)? {
                Some(v) if v.status == crate::thread::ThreadStatus::Active => v,
                _ => continue,
            };
            let v_emb = match &v.embedding {
                Some(e) if !e.is_empty() => e,
                _ => continue,
            };
            let sim = cosine_similarity(&t_emb, v_emb);
            if sim < config.create_threshold {
                continue;
            }
            let mut prop = ThinkBridge::new(id_gen::bridge_id(), t.id.clone(), v_id.clone(), BridgeType::Extends, sim);
            prop.propagated_from = Some(nb.id.clone());
            prop.propagation_depth = nb.propagation_depth + 1;
            bridges.put(&prop)?;
            tracing::info!(source = %t.id, target = %v_id, via = %neighbor.id, "gossip: propagated bridge created");
        }
    }

    Ok(())
}

/// `decay_all()` — apply exponential weight decay to every bridge and
/// delete bridges below their relation's death threshold.
pub fn decay_all(project_root: &std::path::Path, decay_cfg: &DecayConfig) -> AiResult<u32> {
    let bridges = BridgeStore::new(project_root);
    let now = crate::time_utils::now();
    let mut affected = 0u32;

    for mut b in bridges.list_all()? {
        let reference = b.last_used.unwrap_or(b.created_at);
        let age_days = (now - reference).num_hours() as f64 / 24.0;
        if age_days <= 0.0 {
            continue;
        }
        let decay_factor = 0.5f64.powf(age_days / decay_cfg.bridge_half_life_days);
        b.weight = (b.weight * decay_factor).max(0.0);
        b.recompute_status();
        affected += 1;

        if b.is_dead() {
            bridges.delete(&b.id)?;
        } else {
            bridges.put(&b)?;
        }
    }

    tracing::info!(affected, "gossip: bridge decay cycle complete");
    Ok(affected)
}

/// `on_bridge_used(b)` — Hebbian reinforcement when a bridge is traversed
/// during recall or injection.
pub fn on_bridge_used(project_root: &std::path::Path, bridge_id: &str) -> AiResult<()> {
    let bridges = BridgeStore::new(project_root);
    let mut b = bridges.get(bridge_id)?;
    b.boost(crate::constants::BRIDGE_USE_BOOST);
    bridges.put(&b)
}

/// A bridge whose either endpoint no longer exists is reachable only as
/// dead weight; cleaned opportunistically during decay so the store doesn't
/// accumulate edges to deleted threads.
pub fn clean_orphans(project_root: &std::path::Path) -> AiResult<u32> {
    let threads = ThreadStore::new(project_root);
    let bridges = BridgeStore::new(project_root);
    let mut removed = 0u32;
    for b in bridges.list_all()? {
        let source_ok = threads.try_get(&b.source_id)?.is_some();
        let target_ok = threads.try_get(&b.target_id)?.is_some();
        if !source_ok || !target_ok {
            bridges.delete(&b.id)?;
            removed += 1;
        }
    }
    Ok(removed)
}

fn determine_relation(t: &Thread, u: &Thread) -> BridgeType {
    if t.parent_id.as_deref() == Some(u.id.as_str()) {
        BridgeType::ChildOf
    } else if u.parent_id.as_deref() == Some(t.id.as_str()) {
        BridgeType::ChildOf
    } else if t.parent_id.is_some() && t.parent_id == u.parent_id {
        BridgeType::Sibling
    } else {
        BridgeType::Extends
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::OriginType;

    fn setup() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(crate::storage::path_utils::bridges_dir(dir.path())).unwrap();
        std::fs::create_dir_all(crate::storage::path_utils::threads_dir(dir.path())).unwrap();
        dir
    }

    #[test]
    fn creates_bridge_above_threshold() {
        let dir = setup();
        let threads = ThreadStore::new(dir.path());
        let mut a = Thread::new("a".into(), "Thread A".into(), OriginType::Prompt);
        a.embedding = Some(vec![1.0, 0.0]);
        let mut b = Thread::new("b".into(), "Thread B".into(), OriginType::Prompt);
        b.embedding = Some(vec![0.95, 0.05]);
        threads.put(&a).unwrap();
        threads.put(&b).unwrap();

        let cfg = GossipConfig::default();
        on_thread_modified(dir.path(), &a, &cfg).unwrap();

        let bridges = BridgeStore::new(dir.path());
        assert_eq!(bridges.list_for_thread("a").unwrap().len(), 1);
    }

    #[test]
    fn decay_deletes_bridge_below_death_threshold() {
        let dir = setup();
        let bridges = BridgeStore::new(dir.path());
        let mut b = ThinkBridge::new(id_gen::bridge_id(), "a".into(), "b".into(), BridgeType::Extends, 0.5);
        b.created_at = crate::time_utils::now() - chrono::Duration::days(30);
        b.last_used = None;
        bridges.put(&b).unwrap();

        let cfg = DecayConfig::default();
        decay_all(dir.path(), &cfg).unwrap();
        assert!(bridges.list_all().unwrap().is_empty());
    }
}
