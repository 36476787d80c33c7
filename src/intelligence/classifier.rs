//! Classifier -- the decision engine that routes captured content to a
//! thread (continue/fork/reactivate) or spins up a new one (SPEC_FULL.md
//! §4.4). Grounded on `thread_manager.rs`'s `decide_action` flow and
//! `coherence.rs`'s LLM tie-breaker, with the spec's corrected thresholds.

use crate::config::{CoherenceConfig, ThreadMatchingConfig};
use crate::processing::coherence;
use crate::processing::embeddings::cosine_similarity;
use crate::processing::extractor::Extraction;
use crate::thread::Thread;

/// Bonus applied to `sim()` when at least one topic matches exactly
/// (case-insensitive) between the incoming extraction and a candidate.
const EXACT_MATCH_BONUS: f64 = 0.15;

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Continue { thread_id: String, score: f64 },
    Fork { parent_id: String, score: f64 },
    Reactivate { thread_id: String, score: f64 },
    NewThread { score: f64 },
    /// Coherence scored below the forget floor against an open
    /// `pending_context` — the capture is dropped, not turned into a thread.
    Skip,
}

/// `sim(content, t) = 0.7*cosine + 0.3*topic_overlap + (0.15 if exact match)`,
/// clamped to `[0, 1]`.
pub fn sim(content_embedding: &[f32], subjects: &[String], t: &Thread) -> f64 {
    let cosine = match &t.embedding {
        Some(e) if !e.is_empty() => cosine_similarity(content_embedding, e),
        _ => 0.0,
    };
    let overlap = topic_overlap(subjects, &t.topics);
    let exact = if has_exact_match(subjects, &t.topics) { EXACT_MATCH_BONUS } else { 0.0 };
    (0.7 * cosine + 0.3 * overlap + exact).clamp(0.0, 1.0)
}

/// `|A ∩ B| / max(|A|, 1)`, case-insensitive.
pub fn topic_overlap(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() {
        return 0.0;
    }
    let b_lower: Vec<String> = b.iter().map(|s| s.to_lowercase()).collect();
    let shared = a.iter().filter(|t| b_lower.contains(&t.to_lowercase())).count();
    shared as f64 / a.len().max(1) as f64
}

fn has_exact_match(a: &[String], b: &[String]) -> bool {
    let b_lower: Vec<String> = b.iter().map(|s| s.to_lowercase()).collect();
    a.iter().any(|t| b_lower.contains(&t.to_lowercase()))
}

/// Best-scoring candidate and its score, or `None` if the candidate set is empty.
fn best_match<'a>(
    content_embedding: &[f32],
    subjects: &[String],
    candidates: &'a [Thread],
) -> Option<(&'a Thread, f64)> {
    candidates
        .iter()
        .map(|t| (t, sim(content_embedding, subjects, t)))
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
}

/// Open coherence context carried across captures (SPEC_FULL.md §4.7):
/// the thread a prior capture landed in, and a digest of its content, so
/// the next capture can be coherence-checked against it for a FORK decision.
pub struct PendingContext<'a> {
    pub thread_id: &'a str,
    pub context_text: &'a str,
}

/// Full decision policy (§4.4, steps 1-4). `pending` is `None` when there is
/// no open pending_context (e.g. the very first capture, or one that already
/// expired) — step 3 is then skipped entirely and a bare miss falls to
/// `NEW_THREAD`.
#[allow(clippy::too_many_arguments)]
pub fn decide(
    extraction: &Extraction,
    content: &str,
    content_embedding: &[f32],
    active_threads: &[Thread],
    suspended_threads: &[Thread],
    pending: Option<PendingContext<'_>>,
    matching_cfg: &ThreadMatchingConfig,
    coherence_cfg: &CoherenceConfig,
) -> Decision {
    // Step 1: best ACTIVE match.
    if let Some((best, score)) = best_match(content_embedding, &extraction.subjects, active_threads) {
        if score >= matching_cfg.continue_threshold {
            return Decision::Continue { thread_id: best.id.clone(), score };
        }
    }

    // Step 2: SUSPENDED match, with an LLM tie-breaker in the borderline band.
    if let Some((best, score)) = best_match(content_embedding, &extraction.subjects, suspended_threads) {
        if score >= matching_cfg.reactivate_threshold {
            return Decision::Reactivate { thread_id: best.id.clone(), score };
        }
        if score >= matching_cfg.continue_threshold {
            let confirmed = coherence::check_coherence(best.summary.as_str(), content, &best.labels, coherence_cfg)
                .map(|r| r.score >= coherence_cfg.orphan_threshold)
                .unwrap_or(false);
            if confirmed {
                return Decision::Reactivate { thread_id: best.id.clone(), score };
            }
        }
    }

    // Step 3: optional FORK against an open pending_context.
    if let Some(ctx) = pending {
        let result = coherence::check_coherence(ctx.context_text, content, &extraction.labels, coherence_cfg);
        if let Ok(r) = result {
            match coherence::determine_action(r.score, coherence_cfg.child_threshold, coherence_cfg.orphan_threshold) {
                coherence::CoherenceAction::Child => {
                    return Decision::Fork { parent_id: ctx.thread_id.to_string(), score: r.score };
                }
                coherence::CoherenceAction::Orphan => {
                    return Decision::NewThread { score: r.score };
                }
                coherence::CoherenceAction::Forget => {
                    return Decision::Skip;
                }
                coherence::CoherenceAction::Continue => {}
            }
        }
    }

    Decision::NewThread { score: 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::OriginType;

    fn thread_with(topics: &[&str], embedding: Vec<f32>) -> Thread {
        let mut t = Thread::new("t1".into(), "title".into(), OriginType::Prompt);
        t.topics = topics.iter().map(|s| s.to_string()).collect();
        t.embedding = Some(embedding);
        t
    }

    #[test]
    fn exact_topic_match_adds_bonus() {
        let t = thread_with(&["rust", "async"], vec![1.0, 0.0]);
        let with_match = sim(&[1.0, 0.0], &["rust".to_string()], &t);
        let without_match = sim(&[1.0, 0.0], &["python".to_string()], &t);
        assert!(with_match > without_match);
    }

    #[test]
    fn topic_overlap_is_intersection_over_query_size() {
        let overlap = topic_overlap(
            &["rust".to_string(), "async".to_string()],
            &["rust".to_string()],
        );
        assert_eq!(overlap, 0.5);
    }

    #[test]
    fn continue_wins_over_new_thread_above_threshold() {
        let active = vec![thread_with(&["rust"], vec![1.0, 0.0])];
        let extraction = Extraction {
            subjects: vec!["rust".to_string()],
            ..Default::default()
        };
        let matching_cfg = ThreadMatchingConfig::default();
        let coherence_cfg = CoherenceConfig::default();
        let decision = decide(
            &extraction,
            "content",
            &[1.0, 0.0],
            &active,
            &[],
            None,
            &matching_cfg,
            &coherence_cfg,
        );
        assert!(matches!(decision, Decision::Continue { .. }));
    }

    #[test]
    fn no_candidates_falls_back_to_new_thread() {
        let extraction = Extraction::default();
        let matching_cfg = ThreadMatchingConfig::default();
        let coherence_cfg = CoherenceConfig::default();
        let decision = decide(&extraction, "content", &[1.0, 0.0], &[], &[], None, &matching_cfg, &coherence_cfg);
        assert!(matches!(decision, Decision::NewThread { .. }));
    }
}
