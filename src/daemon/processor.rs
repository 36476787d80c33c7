//! Capture pipeline wrapper (SPEC_FULL.md §4.5, §4.7): owns the daemon's
//! single in-memory `pending_context` slot across RPC calls, since the
//! classifier's step 3 (open-context FORK tie-break) needs the thread a
//! prior capture landed in and a digest of its content. Grounded on the
//! teacher's `processor.rs` `PendingContext`/TTL shape, rebuilt against the
//! real `ThreadManager::process_input` instead of a rusqlite-backed
//! `ThreadStorage`.

use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::AiConfig;
use crate::constants::{truncate_safe, PENDING_CONTEXT_TTL_SECS};
use crate::intelligence::thread_manager::{PendingContextState, ProcessOutcome, ThreadManager};
use crate::locks::LockRegistry;
use crate::AiResult;

/// Max chars of captured content kept as the next capture's coherence
/// context — generous enough for a meaningful comparison, small enough to
/// never itself blow the extraction budget.
const CONTEXT_DIGEST_CHARS: usize = 1_500;

struct PendingContext {
    thread_id: String,
    context_text: String,
    set_at: u64,
}

impl PendingContext {
    fn is_expired(&self) -> bool {
        now_secs().saturating_sub(self.set_at) > PENDING_CONTEXT_TTL_SECS
    }
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// One instance per daemon `run()`, shared by every connection handler.
pub struct CaptureProcessor {
    pending: Mutex<Option<PendingContext>>,
}

impl CaptureProcessor {
    pub fn new() -> Self {
        Self { pending: Mutex::new(None) }
    }

    /// Process one captured event: read (and expire) the pending-context
    /// slot, run it through `ThreadManager::process_input`, then refresh
    /// the slot from whatever thread the capture landed in.
    pub fn capture(
        &self,
        project_root: &Path,
        content: &str,
        source_type: &str,
        file_path: Option<&str>,
        cfg: &AiConfig,
        locks: &LockRegistry,
    ) -> AiResult<Option<ProcessOutcome>> {
        let pending_state = {
            let mut guard = self.pending.lock().expect("pending context mutex poisoned");
            if guard.as_ref().is_some_and(PendingContext::is_expired) {
                *guard = None;
            }
            guard.as_ref().map(|p| PendingContextState {
                thread_id: p.thread_id.clone(),
                context_text: p.context_text.clone(),
            })
        };

        let outcome = ThreadManager::process_input(
            project_root,
            content,
            source_type,
            file_path,
            pending_state.as_ref(),
            cfg,
            locks,
        )?;

        if let Some(o) = &outcome {
            let mut guard = self.pending.lock().expect("pending context mutex poisoned");
            *guard = Some(PendingContext {
                thread_id: o.thread.id.clone(),
                context_text: truncate_safe(content, CONTEXT_DIGEST_CHARS).to_string(),
                set_at: now_secs(),
            });
        }

        Ok(outcome)
    }
}

impl Default for CaptureProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_context_expires_past_ttl() {
        let ctx = PendingContext {
            thread_id: "t1".into(),
            context_text: "hello".into(),
            set_at: now_secs() - PENDING_CONTEXT_TTL_SECS - 1,
        };
        assert!(ctx.is_expired());
    }

    #[test]
    fn fresh_pending_context_is_not_expired() {
        let ctx = PendingContext { thread_id: "t1".into(), context_text: "hello".into(), set_at: now_secs() };
        assert!(!ctx.is_expired());
    }

    #[test]
    fn capture_sets_pending_context_from_outcome() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(crate::storage::path_utils::threads_dir(dir.path())).unwrap();
        let cfg = AiConfig::default();
        let processor = CaptureProcessor::new();
        let locks = LockRegistry::new();

        let outcome = processor
            .capture(dir.path(), "investigating a flaky login test across sessions", "prompt", None, &cfg, &locks)
            .unwrap();
        assert!(outcome.is_some());

        let guard = processor.pending.lock().unwrap();
        assert!(guard.is_some());
    }
}
