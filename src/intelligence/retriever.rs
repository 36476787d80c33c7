//! Retriever — relevance-ranked thread selection for context injection and
//! explicit recall (SPEC_FULL.md §4.8). A simplified weighted-sum ranking,
//! unlike the teacher's multi-validator Engram consensus system: one scoring
//! function, one topic-index pre-filter, no voting.

use std::cmp::Ordering;
use std::path::Path;

use crate::config::{AiConfig, InjectionConfig};
use crate::constants::RETRIEVAL_PRIORITY_FLOOR;
use crate::intelligence::classifier;
use crate::processing::cleaner;
use crate::processing::embeddings::EmbeddingManager;
use crate::records::FocusEntry;
use crate::storage::{ThreadStore, TopicIndex};
use crate::thread::{Thread, ThreadStatus};
use crate::AiResult;

pub struct RankedThread {
    pub thread: Thread,
    pub priority: f64,
}

/// `priority(t) = sim(prompt, t) * t.weight * t.relevance_score +
/// focus_boost(t)`, restricted to threads at or above the priority floor
/// and capped to `cfg.max_results`.
pub fn rank(
    prompt: &str,
    active_threads: &[Thread],
    focus: &[FocusEntry],
    cfg: &InjectionConfig,
) -> Vec<RankedThread> {
    let prompt_embedding = EmbeddingManager::global().embed(prompt);
    let prompt_topics = cleaner::extract_topics(prompt);

    let index = TopicIndex::build(active_threads);
    let candidate_ids = index.lookup(&prompt_topics);

    let candidates: Vec<&Thread> = if candidate_ids.is_empty() {
        // No topic overlap at all — fall back to scanning every active
        // thread rather than returning nothing (the index only narrows,
        // it never substitutes for the embedding comparison).
        active_threads.iter().collect()
    } else {
        active_threads.iter().filter(|t| candidate_ids.contains(&t.id)).collect()
    };

    let mut ranked: Vec<RankedThread> = candidates
        .into_iter()
        .map(|t| {
            let sim = classifier::sim(&prompt_embedding, &prompt_topics, t);
            let priority = (sim * t.weight * t.relevance_score + focus_boost(t, focus)).max(0.0);
            RankedThread { thread: t.clone(), priority }
        })
        .filter(|r| r.priority >= RETRIEVAL_PRIORITY_FLOOR)
        .collect();

    ranked.sort_by(|a, b| b.priority.partial_cmp(&a.priority).unwrap_or(Ordering::Equal));
    ranked.truncate(cfg.max_results);
    ranked
}

/// `focus_boost(t) = Σ f.weight*0.5 (f.topic == t.id) + f.weight*0.3
/// (f.topic ∈ t.topics) + f.weight*0.2 (f.topic substring of t.title, ci),
/// clamped to `FOCUS_BOOST_CAP`.
fn focus_boost(t: &Thread, focus: &[FocusEntry]) -> f64 {
    let title_lower = t.title.to_lowercase();
    let total: f64 = focus
        .iter()
        .map(|f| {
            let mut boost = 0.0;
            if f.topic.eq_ignore_ascii_case(&t.id) {
                boost += f.weight * 0.5;
            }
            if t.topics.iter().any(|tp| tp.eq_ignore_ascii_case(&f.topic)) {
                boost += f.weight * 0.3;
            }
            if title_lower.contains(&f.topic.to_lowercase()) {
                boost += f.weight * 0.2;
            }
            boost
        })
        .sum();
    total.min(crate::constants::FOCUS_BOOST_CAP)
}

/// Explicit recall: scores every ACTIVE (and, if requested, SUSPENDED)
/// thread against `query`, reactivating any suspended thread that crosses
/// `RECALL_REACTIVATION_THRESHOLD`, and returns matches sorted best-first.
pub fn recall(project_root: &Path, query: &str, include_suspended: bool, cfg: &AiConfig) -> AiResult<Vec<Thread>> {
    let threads = ThreadStore::new(project_root);
    let query_embedding = EmbeddingManager::global().embed(query);
    let query_topics = cleaner::extract_topics(query);

    let mut scored: Vec<(Thread, f64)> = Vec::new();

    for t in threads.list_by_status(&ThreadStatus::Active)? {
        let score = classifier::sim(&query_embedding, &query_topics, &t);
        if score >= cfg.thread_matching.continue_threshold {
            scored.push((t, score));
        }
    }

    if include_suspended {
        for mut t in threads.list_by_status(&ThreadStatus::Suspended)? {
            let score = classifier::sim(&query_embedding, &query_topics, &t);
            if score >= crate::constants::RECALL_REACTIVATION_THRESHOLD {
                t.status = ThreadStatus::Active;
                t.boost(crate::constants::THREAD_USE_BOOST);
                threads.put(&t)?;
                tracing::info!(thread_id = %t.id, score, "recall: reactivated suspended thread");
            }
            if score >= cfg.thread_matching.continue_threshold {
                scored.push((t, score));
            }
        }
    }

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    Ok(scored.into_iter().map(|(t, _)| t).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::OriginType;

    #[test]
    fn focus_boost_matches_case_insensitively() {
        let mut t = Thread::new("t1".into(), "title".into(), OriginType::Prompt);
        t.topics = vec!["Rust".into()];
        let focus = vec![FocusEntry::new("rust".into(), 0.4)];
        assert!((focus_boost(&t, &focus) - 0.4 * 0.3).abs() < 1e-9);
    }

    #[test]
    fn focus_boost_caps_at_limit() {
        let mut t = Thread::new("t1".into(), "title".into(), OriginType::Prompt);
        t.topics = vec!["rust".into(), "async".into()];
        let focus = vec![FocusEntry::new("rust".into(), 0.6), FocusEntry::new("async".into(), 0.6)];
        assert_eq!(focus_boost(&t, &focus), crate::constants::FOCUS_BOOST_CAP);
    }

    #[test]
    fn focus_boost_thread_id_exact_match_weighted_highest() {
        let t = Thread::new("t1".into(), "some unrelated title".into(), OriginType::Prompt);
        let focus = vec![FocusEntry::new("t1".into(), 0.4)];
        assert!((focus_boost(&t, &focus) - 0.4 * 0.5).abs() < 1e-9);
    }

    #[test]
    fn focus_boost_title_substring_match() {
        let t = Thread::new("t1".into(), "Fix the auth bug".into(), OriginType::Prompt);
        let focus = vec![FocusEntry::new("auth".into(), 0.5)];
        assert!((focus_boost(&t, &focus) - 0.5 * 0.2).abs() < 1e-9);
    }

    #[test]
    fn rank_drops_threads_below_priority_floor() {
        let mut unrelated = Thread::new("t1".into(), "unrelated".into(), OriginType::Prompt);
        unrelated.embedding = Some(vec![0.0, 1.0]);
        unrelated.weight = 0.05;
        let cfg = crate::config::InjectionConfig::default();
        let ranked = rank("completely different query", &[unrelated], &[], &cfg);
        assert!(ranked.is_empty());
    }
}
