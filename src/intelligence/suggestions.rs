//! Suggestions report for the `suggestions` RPC op (SPEC_FULL.md §6): a
//! read-only scan over the current thread/bridge graph that surfaces merge
//! candidates, split candidates, recall hints and a health summary, without
//! mutating anything itself. Each candidate list is heuristic, grounded in
//! the same thresholds the gossip/classifier/merge machinery already uses
//! so a suggestion and an automatic action never disagree about what counts
//! as "similar enough" or "too large".

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::BRIDGE_CREATE_THRESHOLD;
use crate::intelligence::health::{self, HealthReport};
use crate::intelligence::merge_metadata::MAX_TOPICS;
use crate::storage::{BridgeStore, ThreadStore};
use crate::thread::ThreadStatus;
use crate::AiResult;

/// A thread large or topically-scattered enough that splitting it would
/// likely sharpen retrieval. Not a hard rule — a human or the LLM-backed
/// split flow decides the actual grouping.
const SPLIT_MESSAGE_COUNT_HINT: usize = 40;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeCandidate {
    pub thread_a: String,
    pub thread_b: String,
    pub title_a: String,
    pub title_b: String,
    pub bridge_weight: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitCandidate {
    pub thread_id: String,
    pub title: String,
    pub message_count: usize,
    pub topic_count: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecallHint {
    pub thread_id: String,
    pub title: String,
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestionsReport {
    pub merge_candidates: Vec<MergeCandidate>,
    pub split_candidates: Vec<SplitCandidate>,
    pub recall_hints: Vec<RecallHint>,
    pub health: HealthReport,
}

/// `context` is currently unused for filtering but accepted to match the
/// RPC's `{context?}` args shape; a future pass may use it to scope
/// suggestions to threads relevant to the caller's current prompt.
pub fn build(project_root: &Path, _context: Option<&str>, daemon_alive: bool) -> AiResult<SuggestionsReport> {
    let threads = ThreadStore::new(project_root);
    let bridges = BridgeStore::new(project_root);

    let active = threads.list_by_status(&ThreadStatus::Active)?;
    let suspended = threads.list_by_status(&ThreadStatus::Suspended)?;

    let mut merge_candidates = Vec::new();
    for b in bridges.list_all()? {
        if b.weight < BRIDGE_CREATE_THRESHOLD {
            continue;
        }
        let (Some(a), Some(b_thread)) = (
            active.iter().find(|t| t.id == b.source_id),
            active.iter().find(|t| t.id == b.target_id),
        ) else {
            continue;
        };
        merge_candidates.push(MergeCandidate {
            thread_a: a.id.clone(),
            thread_b: b_thread.id.clone(),
            title_a: a.title.clone(),
            title_b: b_thread.title.clone(),
            bridge_weight: b.weight,
            reason: format!("{} bridge at weight {:.2}", b.relation_type, b.weight),
        });
    }
    merge_candidates.sort_by(|a, b| b.bridge_weight.partial_cmp(&a.bridge_weight).unwrap_or(std::cmp::Ordering::Equal));

    let mut split_candidates = Vec::new();
    for t in active.iter().chain(suspended.iter()) {
        let mut reasons = Vec::new();
        if t.topics.len() > MAX_TOPICS {
            reasons.push(format!("{} topics exceeds {}", t.topics.len(), MAX_TOPICS));
        }
        if t.messages.len() > SPLIT_MESSAGE_COUNT_HINT {
            reasons.push(format!("{} messages exceeds {}", t.messages.len(), SPLIT_MESSAGE_COUNT_HINT));
        }
        if reasons.is_empty() {
            continue;
        }
        split_candidates.push(SplitCandidate {
            thread_id: t.id.clone(),
            title: t.title.clone(),
            message_count: t.messages.len(),
            topic_count: t.topics.len(),
            reason: reasons.join("; "),
        });
    }

    let mut recall_hints: Vec<RecallHint> = suspended
        .iter()
        .filter(|t| !t.topics.is_empty())
        .map(|t| RecallHint { thread_id: t.id.clone(), title: t.title.clone(), topics: t.topics.clone() })
        .collect();
    recall_hints.sort_by(|a, b| a.title.cmp(&b.title));
    recall_hints.truncate(5);

    Ok(SuggestionsReport {
        merge_candidates,
        split_candidates,
        recall_hints,
        health: health::build(project_root, daemon_alive)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{BridgeType, ThinkBridge};
    use crate::thread::OriginType;
    use crate::thread::Thread;

    #[test]
    fn flags_high_weight_bridge_as_merge_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let threads = ThreadStore::new(dir.path());
        let mut a = Thread::new("t_a".into(), "auth rework".into(), OriginType::Prompt);
        a.status = ThreadStatus::Active;
        let mut b = Thread::new("t_b".into(), "auth cleanup".into(), OriginType::Prompt);
        b.status = ThreadStatus::Active;
        threads.put(&a).unwrap();
        threads.put(&b).unwrap();

        let bridges = BridgeStore::new(dir.path());
        let mut bridge = ThinkBridge::new("br1".into(), "t_a".into(), "t_b".into(), BridgeType::Extends, 0.8);
        bridge.weight = 0.8;
        bridges.put(&bridge).unwrap();

        let report = build(dir.path(), None, true).unwrap();
        assert_eq!(report.merge_candidates.len(), 1);
        assert_eq!(report.merge_candidates[0].thread_a, "t_a");
    }

    #[test]
    fn flags_topic_heavy_thread_as_split_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let threads = ThreadStore::new(dir.path());
        let mut t = Thread::new("t1".into(), "grab bag".into(), OriginType::Prompt);
        t.topics = (0..12).map(|i| format!("topic{i}")).collect();
        threads.put(&t).unwrap();

        let report = build(dir.path(), None, false).unwrap();
        assert_eq!(report.split_candidates.len(), 1);
        assert_eq!(report.split_candidates[0].thread_id, "t1");
    }
}
