//! Spec-mandated numeric constants. Most are also exposed as config
//! defaults (see config.rs) so a project can override them; these are the
//! hardcoded fallbacks and the values used by invariant tests.

// === Resource caps ===
pub const MAX_THREADS_HARD_CAP: usize = 10_000;
pub const MAX_MESSAGE_SIZE_BYTES: usize = 5_000;
pub const MAX_RATINGS_KEPT: usize = 10;
pub const MAX_USER_RULES_KEPT: usize = 20;

// === Thread decay ===
pub const THREAD_SUSPEND_THRESHOLD: f64 = 0.1;
pub const THREAD_USE_BOOST: f64 = 0.1;
pub const THREAD_HALF_LIFE_DAYS: f64 = 1.5;

// === Bridge decay ===
pub const BRIDGE_HALF_LIFE_DAYS: f64 = 1.0;
pub const BRIDGE_DEATH_THRESHOLD: f64 = 0.05;
pub const BRIDGE_CHILD_DEATH_THRESHOLD: f64 = 0.01;
pub const BRIDGE_USE_BOOST: f64 = 0.1;
pub const BRIDGE_CREATE_THRESHOLD: f64 = 0.50;
pub const BRIDGE_PROPAGATION_MAX_DEPTH: u32 = 1;
pub const BRIDGE_PROPAGATION_NEIGHBOR_MIN_WEIGHT: f64 = 0.3;

// === Classifier thresholds ===
pub const CONTINUE_THRESHOLD: f64 = 0.35;
pub const REACTIVATE_AUTO_THRESHOLD: f64 = 0.50;
pub const REACTIVATE_BORDERLINE_THRESHOLD: f64 = 0.35;
pub const COHERENCE_CHILD_THRESHOLD: f64 = 0.60;
pub const COHERENCE_ORPHAN_THRESHOLD: f64 = 0.30;
pub const PENDING_CONTEXT_TTL_SECS: u64 = 600;

// === Fork / split / merge ===
pub const FORK_WEIGHT_FACTOR: f64 = 0.8;
pub const SPLIT_WEIGHT_FACTOR: f64 = 0.8;
pub const MERGE_WEIGHT_BOOST: f64 = 0.1;
pub const PIN_MAX_BOOST: f64 = 0.5;

// === Extraction ===
pub const EXTRACTION_MAX_CONTENT_CHARS: usize = 3_000;
pub const EXTRACTION_TIMEOUT_SECS: u64 = 30;
pub const MIN_CAPTURE_LENGTH: usize = 20;
pub const MIN_TOPIC_TOKEN_LEN: usize = 3;

// === Retrieval / injection ===
pub const RETRIEVAL_MAX_RESULTS: usize = 5;
pub const RETRIEVAL_PRIORITY_FLOOR: f64 = 0.05;
pub const FOCUS_BOOST_CAP: f64 = 0.5;
pub const INJECT_BUDGET_CHARS: usize = 8_000;
pub const INJECT_CHARS_PER_TOKEN: f64 = 3.5;
pub const RECALL_BUDGET_CHARS: usize = 8_000;
pub const SESSION_GAP_THRESHOLD_SECS: i64 = 4 * 3600;
pub const SYNTHESIS_FRESH_SECS: i64 = 2 * 3600;
pub const RECALL_REACTIVATION_THRESHOLD: f64 = 0.5;

// === Daemon ===
pub const MAINTENANCE_TICK_SECS: u64 = 300;
pub const ARCHIVE_AFTER_BEATS: u64 = 72;
pub const RPC_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const HOOK_CONNECT_TIMEOUT_MS: u64 = 500;
pub const SHUTDOWN_DRAIN_SECS: u64 = 5;

// === Thread mode quotas ===
pub const QUOTA_LIGHT: usize = 15;
pub const QUOTA_NORMAL: usize = 50;
pub const QUOTA_HEAVY: usize = 100;
pub const QUOTA_MAX: usize = 200;

// === Shared-cognition ===
pub const SHARE_PROPOSAL_TTL_HOURS: i64 = 24;

// === UTF-8 safe truncation ===
/// Truncate a string to at most `max_bytes` bytes on a valid UTF-8 char boundary.
pub fn truncate_safe(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

// === Label filtering ===
/// Labels too generic to carry semantic value — filtered out before storage.
pub const LABEL_BLOCKLIST: &[&str] = &[
    "action", "decision", "metadata", "empty", "search result",
    "no matches", "empty result", "file-listing", "directory-listing",
    "grep-output", "search-config", "build-output", "code-snippet",
];

pub fn filter_blocked_labels(labels: &[String]) -> Vec<String> {
    labels
        .iter()
        .filter(|l| {
            !LABEL_BLOCKLIST
                .iter()
                .any(|blocked| l.to_lowercase() == *blocked)
        })
        .cloned()
        .collect()
}

/// Topic-noise denylist: prompt-template artifacts and generic code-shape
/// words dropped from extracted topics/subjects (see SPEC_FULL.md §4.3).
pub const TOPIC_NOISE_WORDS: &[&str] = &[
    "message", "contenu", "analyse", "fichier",
    "response", "result", "data", "type", "value",
];

pub fn filter_topic_noise(topics: &[String]) -> Vec<String> {
    topics
        .iter()
        .filter(|t| {
            let lower = t.to_lowercase();
            !TOPIC_NOISE_WORDS.contains(&lower.as_str())
                && t.len() >= MIN_TOPIC_TOKEN_LEN
                && t.chars().any(|c| c.is_alphabetic())
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_safe_ascii() {
        assert_eq!(truncate_safe("hello world", 5), "hello");
    }

    #[test]
    fn test_truncate_safe_multibyte() {
        let s = "caf\u{00e9}s";
        let result = truncate_safe(s, 4);
        assert!(result.len() <= 4);
        assert!(result.is_char_boundary(result.len()));
    }

    #[test]
    fn test_filter_blocked_labels_case_insensitive() {
        let labels: Vec<String> = vec!["Action", "METADATA", "rust"]
            .into_iter().map(String::from).collect();
        let result = filter_blocked_labels(&labels);
        assert_eq!(result, vec!["rust".to_string()]);
    }

    #[test]
    fn test_filter_topic_noise_drops_short_and_no_letter_tokens() {
        let topics: Vec<String> = vec!["ab", "123", "jwt", "MESSAGE"]
            .into_iter().map(String::from).collect();
        let result = filter_topic_noise(&topics);
        assert_eq!(result, vec!["jwt".to_string()]);
    }
}
