//! Entity id generation and content digesting.
//!
//! Ids follow the spec's `<kind>_<timestamp_millis>_<rand>` shape so they
//! sort roughly by creation time while staying globally unique within a
//! project store (invariant 1: ids are never reused).

use sha2::{Digest, Sha256};
use uuid::Uuid;

fn rand_suffix() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

fn id_with_prefix(prefix: &str) -> String {
    format!("{}_{}_{}", prefix, chrono::Utc::now().timestamp_millis(), rand_suffix())
}

pub fn thread_id() -> String {
    id_with_prefix("thread")
}

pub fn bridge_id() -> String {
    id_with_prefix("bridge")
}

pub fn message_id() -> String {
    id_with_prefix("msg")
}

pub fn synthesis_id() -> String {
    id_with_prefix("synth")
}

pub fn shared_id() -> String {
    id_with_prefix("shared")
}

pub fn proposal_id() -> String {
    id_with_prefix("proposal")
}

/// Stable content digest (for `pending_context.content_digest`), not used
/// as an identity source — a cryptographic hash so it never depends on
/// process-seeded string hashers (see SPEC_FULL.md §9).
pub fn content_digest(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_prefixed() {
        let a = thread_id();
        let b = thread_id();
        assert_ne!(a, b);
        assert!(a.starts_with("thread_"));
    }

    #[test]
    fn content_digest_is_deterministic() {
        assert_eq!(content_digest("hello"), content_digest("hello"));
        assert_ne!(content_digest("hello"), content_digest("world"));
    }
}
