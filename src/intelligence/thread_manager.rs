//! ThreadManager -- lifecycle operations over the thread/bridge graph
//! (SPEC_FULL.md §4.5). Grounded on the teacher's `ThreadAction`/
//! `process_input` dispatch shape, rebuilt against the real JSON
//! `ThreadStore`/`BridgeStore` and the Classifier's `Decision` instead of
//! the teacher's rusqlite `decide_action`.

use std::path::Path;

use chrono::Utc;

use crate::bridge::{BridgeType, ThinkBridge};
use crate::config::AiConfig;
use crate::constants::{
    truncate_safe, FORK_WEIGHT_FACTOR, MAX_MESSAGE_SIZE_BYTES, MAX_THREADS_HARD_CAP,
    MERGE_WEIGHT_BOOST, PIN_MAX_BOOST, SPLIT_WEIGHT_FACTOR, THREAD_USE_BOOST,
};
use crate::id_gen;
use crate::intelligence::classifier::{self, Decision, PendingContext};
use crate::intelligence::gossip;
use crate::intelligence::merge_metadata;
use crate::locks::LockRegistry;
use crate::processing::embeddings::EmbeddingManager;
use crate::processing::extractor::{self, Extraction, ExtractionSource};
use crate::storage::{BridgeStore, ThreadStore};
use crate::thread::{Message, OriginType, Rating, SplitLockMode, Thread, ThreadStatus, WorkContext, PINNED_TAG};
use crate::{AiError, AiResult};

/// Result of `process_input`: the thread the capture landed in, tagged with
/// which branch of the decision policy placed it there.
pub struct ProcessOutcome {
    pub thread: Thread,
    pub decision: &'static str,
}

/// Open coherence context carried between captures in the same session
/// (owned, so the daemon can hold it across RPC calls without borrowing).
#[derive(Debug, Clone)]
pub struct PendingContextState {
    pub thread_id: String,
    pub context_text: String,
}

/// A proposed (or, once executed, realized) grouping for `split`.
#[derive(Debug, Clone)]
pub struct SplitGroup {
    pub title: String,
    pub message_ids: Vec<String>,
}

pub struct SplitGroupPreview {
    pub title: String,
    pub message_ids: Vec<String>,
    pub message_count: usize,
}

pub enum SplitOutcome {
    /// `confirm == false`: groupings as they would be applied, nothing written.
    Preview(Vec<SplitGroupPreview>),
    /// `confirm == true`: the children that were created.
    Executed(Vec<Thread>),
}

fn parse_source(source_type: &str) -> ExtractionSource {
    match source_type {
        "file_read" => ExtractionSource::FileRead,
        "file_write" => ExtractionSource::FileWrite,
        "task" => ExtractionSource::Task,
        "fetch" => ExtractionSource::Fetch,
        "response" => ExtractionSource::Response,
        "command" => ExtractionSource::Command,
        _ => ExtractionSource::Prompt,
    }
}

fn make_message(content: &str, source_type: &str) -> Message {
    let is_truncated = content.len() > MAX_MESSAGE_SIZE_BYTES;
    let text = if is_truncated {
        truncate_safe(content, MAX_MESSAGE_SIZE_BYTES).to_string()
    } else {
        content.to_string()
    };
    Message {
        id: id_gen::message_id(),
        content: text,
        source: source_type.to_string(),
        timestamp: crate::time_utils::now(),
        metadata: serde_json::Value::Null,
        is_truncated,
    }
}

pub struct ThreadManager;

impl ThreadManager {
    /// §4.5 main entry point: extraction -> classify -> apply decision ->
    /// Hebbian boost -> append message -> recompute embedding -> persist ->
    /// gossip. Returns `None` when the capture is pure noise (zero
    /// confidence) or the classifier decided to forget it.
    pub fn process_input(
        project_root: &Path,
        content: &str,
        source_type: &str,
        file_path: Option<&str>,
        pending: Option<&PendingContextState>,
        cfg: &AiConfig,
        locks: &LockRegistry,
    ) -> AiResult<Option<ProcessOutcome>> {
        let extraction = extractor::extract(
            content,
            parse_source(source_type),
            &cfg.extraction,
            &cfg.label_suggestion,
            &cfg.importance,
        )?;

        if extraction.confidence <= 0.0 {
            tracing::debug!(title = %extraction.title, "capture discarded: zero-confidence noise");
            return Ok(None);
        }

        let threads = ThreadStore::new(project_root);
        let content_embedding = EmbeddingManager::global().embed(content);
        let active = threads.list_by_status(&ThreadStatus::Active)?;
        let suspended = threads.list_by_status(&ThreadStatus::Suspended)?;

        let pending_ctx = pending.map(|p| PendingContext {
            thread_id: p.thread_id.as_str(),
            context_text: p.context_text.as_str(),
        });

        let decision = classifier::decide(
            &extraction,
            content,
            &content_embedding,
            &active,
            &suspended,
            pending_ctx,
            &cfg.thread_matching,
            &cfg.coherence,
        );

        let outcome = match decision {
            Decision::Skip => {
                tracing::debug!(title = %extraction.title, "capture dropped: coherence below forget floor");
                return Ok(None);
            }
            Decision::Continue { thread_id, score } => {
                let guard = locks.lock_thread(&thread_id);
                let _g = guard.lock().expect("thread lock poisoned");
                let mut t = threads.get(&thread_id)?;
                tracing::info!(thread_id = %t.id, score, "classifier: continue");
                Self::apply_capture(&mut t, &extraction, content, source_type, file_path);
                threads.put(&t)?;
                gossip::on_thread_modified(project_root, &t, &cfg.gossip)?;
                ProcessOutcome { thread: t, decision: "continue" }
            }
            Decision::Reactivate { thread_id, score } => {
                let guard = locks.lock_thread(&thread_id);
                let _g = guard.lock().expect("thread lock poisoned");
                let mut t = threads.get(&thread_id)?;
                tracing::info!(thread_id = %t.id, score, "classifier: reactivate");
                Self::reactivate_in_place(&mut t);
                Self::apply_capture(&mut t, &extraction, content, source_type, file_path);
                threads.put(&t)?;
                gossip::on_thread_modified(project_root, &t, &cfg.gossip)?;
                ProcessOutcome { thread: t, decision: "reactivate" }
            }
            Decision::Fork { parent_id, score } => {
                tracing::info!(parent_id = %parent_id, score, "classifier: fork");
                Self::ensure_capacity(project_root, cfg)?;
                let guard = locks.lock_thread(&parent_id);
                let _g = guard.lock().expect("thread lock poisoned");
                let mut parent = threads.get(&parent_id)?;
                let child = Self::spawn_child(&mut parent, &extraction, content, source_type, file_path)?;
                threads.put(&parent)?;
                threads.put(&child)?;
                Self::link_child_bridge(project_root, &parent.id, &child.id)?;
                gossip::on_thread_modified(project_root, &child, &cfg.gossip)?;
                ProcessOutcome { thread: child, decision: "fork" }
            }
            Decision::NewThread { score } => {
                tracing::info!(score, title = %extraction.title, "classifier: new_thread");
                Self::ensure_capacity(project_root, cfg)?;
                let t = Self::create_thread(&extraction, content, source_type, file_path, None);
                threads.put(&t)?;
                gossip::on_thread_modified(project_root, &t, &cfg.gossip)?;
                ProcessOutcome { thread: t, decision: "new_thread" }
            }
        };

        Ok(Some(outcome))
    }

    /// Explicit fork — extracts `content` and attaches it to `parent_id` as
    /// a new child thread, bypassing the classifier (used by the CLI/RPC
    /// `fork` op, as opposed to the classifier's own FORK decision).
    pub fn fork(
        project_root: &Path,
        parent_id: &str,
        content: &str,
        source_type: &str,
        cfg: &AiConfig,
    ) -> AiResult<Thread> {
        let threads = ThreadStore::new(project_root);
        let mut parent = threads.get(parent_id)?;
        let extraction = extractor::extract(
            content,
            parse_source(source_type),
            &cfg.extraction,
            &cfg.label_suggestion,
            &cfg.importance,
        )?;

        Self::ensure_capacity(project_root, cfg)?;
        let child = Self::spawn_child(&mut parent, &extraction, content, source_type, None)?;
        threads.put(&parent)?;
        threads.put(&child)?;
        Self::link_child_bridge(project_root, &parent.id, &child.id)?;
        gossip::on_thread_modified(project_root, &child, &cfg.gossip)?;
        Ok(child)
    }

    /// Reactivate a suspended thread: status -> Active, +0.1 Hebbian boost.
    /// Archived threads cannot be reactivated (invariant: archive is terminal).
    pub fn reactivate(project_root: &Path, id: &str) -> AiResult<Thread> {
        let threads = ThreadStore::new(project_root);
        let mut t = threads.get(id)?;
        if t.status == ThreadStatus::Archived {
            return Err(AiError::InvalidState(format!(
                "thread {id} is archived; archive is terminal and cannot be reactivated"
            )));
        }
        Self::reactivate_in_place(&mut t);
        threads.put(&t)?;
        Ok(t)
    }

    fn reactivate_in_place(t: &mut Thread) {
        t.status = ThreadStatus::Active;
        t.boost(THREAD_USE_BOOST);
    }

    /// Suspend an active thread.
    pub fn suspend(project_root: &Path, id: &str) -> AiResult<Thread> {
        let threads = ThreadStore::new(project_root);
        let mut t = threads.get(id)?;
        if t.status == ThreadStatus::Archived {
            return Err(AiError::InvalidState(format!("thread {id} is archived, cannot suspend")));
        }
        t.status = ThreadStatus::Suspended;
        threads.put(&t)?;
        Ok(t)
    }

    /// Archive a thread permanently. Bridges touching it are cleaned up: a
    /// CHILD_OF edge from one of its children is redirected to re-parent the
    /// child onto this thread's own parent (keeping the hierarchy connected
    /// across the archived link); every other bridge touching it is simply
    /// dropped, since an archived thread no longer participates in gossip or
    /// ranking (invariant 2: an archived thread carries no live edges).
    pub fn archive(project_root: &Path, id: &str) -> AiResult<Thread> {
        let threads = ThreadStore::new(project_root);
        let bridges = BridgeStore::new(project_root);
        let mut t = threads.get(id)?;

        for b in bridges.list_for_thread(id)? {
            if b.relation_type == BridgeType::ChildOf && b.target_id == id {
                if let Some(mut child) = threads.try_get(&b.source_id)? {
                    child.parent_id = t.parent_id.clone();
                    threads.put(&child)?;
                    if let Some(grandparent_id) = &t.parent_id {
                        let redirected = ThinkBridge::new(
                            id_gen::bridge_id(),
                            child.id.clone(),
                            grandparent_id.clone(),
                            BridgeType::ChildOf,
                            b.confidence,
                        );
                        bridges.put(&redirected)?;
                    }
                }
            }
            bridges.delete(&b.id)?;
        }

        if let Some(parent_id) = t.parent_id.clone() {
            if let Some(mut parent) = threads.try_get(&parent_id)? {
                parent.child_ids.retain(|c| c != id);
                threads.put(&parent)?;
            }
        }

        t.status = ThreadStatus::Archived;
        threads.put(&t)?;
        Ok(t)
    }

    /// Merge `absorbed` into `survivor` (invariant 6): topics/labels
    /// consolidated and capped, weight = max(a, b) + boost clamped to the
    /// survivor's max, messages concatenated and re-sorted by time, children
    /// re-parented onto the survivor, bridges redirected. `absorbed` is
    /// archived and tagged `merged_into:<survivor_id>` rather than deleted,
    /// so history and external references survive the merge. Refuses when
    /// `absorbed` is split-locked.
    pub fn merge(project_root: &Path, survivor_id: &str, absorbed_id: &str) -> AiResult<Thread> {
        if survivor_id == absorbed_id {
            return Err(AiError::InvalidInput("cannot merge a thread into itself".into()));
        }

        let threads = ThreadStore::new(project_root);
        let mut survivor = threads.get(survivor_id)?;
        let mut absorbed = threads.get(absorbed_id)?;

        if absorbed.split_locked {
            return Err(AiError::InvalidState(format!(
                "thread {absorbed_id} is split-locked and cannot be merged"
            )));
        }

        merge_metadata::consolidate_after_merge(&mut survivor, &absorbed);
        survivor.weight = (survivor.weight.max(absorbed.weight) + MERGE_WEIGHT_BOOST).min(survivor.max_weight());
        survivor.clamp_weight();

        survivor.messages.extend(absorbed.messages.drain(..));
        survivor.messages.sort_by_key(|m| m.timestamp);

        for cid in absorbed.child_ids.drain(..) {
            if let Some(mut child) = threads.try_get(&cid)? {
                child.parent_id = Some(survivor.id.clone());
                threads.put(&child)?;
            }
            if !survivor.child_ids.contains(&cid) {
                survivor.child_ids.push(cid);
            }
        }

        let bridges = BridgeStore::new(project_root);
        let survivor_pairs = bridges.list_for_thread(survivor_id)?;
        for mut b in bridges.list_for_thread(absorbed_id)? {
            if b.source_id == absorbed_id {
                b.source_id = survivor.id.clone();
            }
            if b.target_id == absorbed_id {
                b.target_id = survivor.id.clone();
            }
            if b.source_id == b.target_id {
                bridges.delete(&b.id)?;
                continue;
            }
            let other = b.other_end(survivor_id).unwrap_or(&b.target_id).to_string();
            if let Some(dup) = survivor_pairs.iter().find(|existing| existing.connects(survivor_id, &other)) {
                // Invariant 1: at most one live bridge per unordered pair.
                // Union by taking the stronger weight, drop the redirected one.
                if b.weight > dup.weight {
                    let mut winner = b.clone();
                    winner.id = dup.id.clone();
                    bridges.put(&winner)?;
                }
                bridges.delete(&b.id)?;
                continue;
            }
            bridges.put(&b)?;
        }

        absorbed.status = ThreadStatus::Archived;
        absorbed.tags.push(Thread::merged_into_tag(&survivor.id));

        threads.put(&survivor)?;
        threads.put(&absorbed)?;
        Ok(survivor)
    }

    /// Two-step split: `confirm == false` returns the proposed message
    /// groupings without writing anything; `confirm == true` creates one
    /// child thread per group, each `split_locked` under `lock_mode`, with
    /// weight `src.weight * 0.8`. The source is archived once split (its
    /// content now lives in the children).
    pub fn split(
        project_root: &Path,
        src_id: &str,
        groups: &[SplitGroup],
        lock_mode: SplitLockMode,
        confirm: bool,
        cfg: &AiConfig,
        locks: &LockRegistry,
    ) -> AiResult<SplitOutcome> {
        let guard = locks.lock_thread(src_id);
        let _g = guard.lock().expect("thread lock poisoned");

        let threads = ThreadStore::new(project_root);
        let mut src = threads.get(src_id)?;

        if src.split_locked {
            return Err(AiError::InvalidState(format!("thread {src_id} is already split-locked")));
        }
        if groups.len() < 2 {
            return Err(AiError::InvalidInput("split requires at least 2 message groups".into()));
        }

        if !confirm {
            let previews = groups
                .iter()
                .map(|g| SplitGroupPreview {
                    title: g.title.clone(),
                    message_ids: g.message_ids.clone(),
                    message_count: g.message_ids.len(),
                })
                .collect();
            return Ok(SplitOutcome::Preview(previews));
        }

        let mut children = Vec::with_capacity(groups.len());
        for group in groups {
            let messages: Vec<Message> = src
                .messages
                .iter()
                .filter(|m| group.message_ids.contains(&m.id))
                .cloned()
                .collect();

            let mut child = Thread::new(id_gen::thread_id(), group.title.clone(), OriginType::Split);
            child.parent_id = Some(src.id.clone());
            child.weight = (src.weight * SPLIT_WEIGHT_FACTOR).max(0.0);
            child.clamp_weight();
            child.topics = src.topics.clone();
            child.labels = src.labels.clone();
            child.split_locked = true;
            child.split_locked_until = Some(lock_mode.clone());

            let embed_text = format!("{} {}", child.title, child.topics.join(" "));
            child.embedding = Some(EmbeddingManager::global().embed(&embed_text));
            child.messages = messages;

            threads.put(&child)?;
            Self::link_child_bridge(project_root, &src.id, &child.id)?;
            gossip::on_thread_modified(project_root, &child, &cfg.gossip)?;
            children.push(child);
        }

        src.child_ids.extend(children.iter().map(|c| c.id.clone()));
        src.status = ThreadStatus::Archived;
        threads.put(&src)?;

        Ok(SplitOutcome::Executed(children))
    }

    /// Clear `split_locked`. Allowed unconditionally under `Force`;
    /// otherwise only when `mode` matches the lock the thread was split
    /// under.
    pub fn unlock(project_root: &Path, id: &str, mode: SplitLockMode, locks: &LockRegistry) -> AiResult<Thread> {
        let guard = locks.lock_thread(id);
        let _g = guard.lock().expect("thread lock poisoned");

        let threads = ThreadStore::new(project_root);
        let mut t = threads.get(id)?;
        if !t.split_locked {
            return Err(AiError::InvalidState(format!("thread {id} is not split-locked")));
        }
        let allowed = mode == SplitLockMode::Force || t.split_locked_until.as_ref() == Some(&mode);
        if !allowed {
            return Err(AiError::InvalidState(format!(
                "thread {id} is locked under {:?}; unlock requires a matching mode or Force",
                t.split_locked_until
            )));
        }
        t.split_locked = false;
        t.split_locked_until = None;
        threads.put(&t)?;
        Ok(t)
    }

    pub fn rename(project_root: &Path, id: &str, new_title: &str) -> AiResult<Thread> {
        let new_title = new_title.trim();
        if new_title.is_empty() {
            return Err(AiError::InvalidInput("title cannot be empty".into()));
        }
        let threads = ThreadStore::new(project_root);
        let mut t = threads.get(id)?;
        t.title = new_title.to_string();
        threads.put(&t)?;
        Ok(t)
    }

    /// Pin new content as a thread directly, bypassing the classifier
    /// entirely: weight is `1.0 + boost` (boost clamped to
    /// `[0, PIN_MAX_BOOST]`), tagged `pinned` so it gets the pinned max
    /// weight ceiling and survives ranking floors.
    pub fn pin(
        project_root: &Path,
        content: &str,
        title: Option<&str>,
        topics: Option<Vec<String>>,
        boost: f64,
        cfg: &AiConfig,
        locks: &LockRegistry,
    ) -> AiResult<Thread> {
        let boost = boost.clamp(0.0, PIN_MAX_BOOST);
        let extraction = extractor::extract(
            content,
            ExtractionSource::Prompt,
            &cfg.extraction,
            &cfg.label_suggestion,
            &cfg.importance,
        )?;

        Self::ensure_capacity(project_root, cfg)?;
        let mut t = Self::create_thread(&extraction, content, "prompt", None, None);
        if let Some(title) = title {
            t.title = title.to_string();
        }
        if let Some(topics) = topics {
            t.topics = topics;
        }
        t.tags.push(PINNED_TAG.to_string());
        t.weight = (1.0 + boost).min(t.max_weight());

        // `t.id` is freshly generated, so no other request can be racing on
        // it yet — the lock here is the same idiom every other mutating op
        // uses, not a response to genuine contention.
        let guard = locks.lock_thread(&t.id);
        let _g = guard.lock().expect("thread lock poisoned");

        let threads = ThreadStore::new(project_root);
        threads.put(&t)?;
        gossip::on_thread_modified(project_root, &t, &cfg.gossip)?;
        Ok(t)
    }

    /// Feed back a usefulness rating from `rate_context` (§6): pushes the
    /// rating and recomputes `relevance_score` from the capped rating
    /// history. Returns the updated score.
    pub fn rate_context(
        project_root: &Path,
        id: &str,
        useful: bool,
        reason: Option<&str>,
        locks: &LockRegistry,
    ) -> AiResult<f64> {
        let guard = locks.lock_thread(id);
        let _g = guard.lock().expect("thread lock poisoned");

        let threads = ThreadStore::new(project_root);
        let mut t = threads.get(id)?;
        t.ratings.push(Rating {
            useful,
            timestamp: crate::time_utils::now(),
            reason: reason.map(String::from),
        });
        t.recompute_relevance();
        if let Some(stats) = t.injection_stats.as_mut() {
            if useful {
                stats.record_usage();
            }
        }
        threads.put(&t)?;
        Ok(t.relevance_score)
    }

    /// Suspend the lowest-weight active threads above the current mode's
    /// quota. Returns the number of threads suspended.
    pub fn enforce_quota(project_root: &Path, cfg: &AiConfig) -> AiResult<usize> {
        let quota = cfg.active_threads_limit.unwrap_or_else(|| cfg.mode.quota());
        let threads = ThreadStore::new(project_root);
        let mut active = threads.list_by_status(&ThreadStatus::Active)?;
        if active.len() <= quota {
            return Ok(0);
        }

        active.sort_by(|a, b| a.weight.partial_cmp(&b.weight).unwrap_or(std::cmp::Ordering::Equal));
        let excess = active.len() - quota;
        let mut suspended = 0usize;
        for t in active.iter_mut().take(excess) {
            t.status = ThreadStatus::Suspended;
            threads.put(t)?;
            suspended += 1;
        }
        tracing::info!(suspended, quota, "quota enforced");
        Ok(suspended)
    }

    /// Make room for one more active thread before creating it: suspends
    /// the single lowest-weight active thread if already at quota, and
    /// refuses outright above the hard cap on total stored threads.
    fn ensure_capacity(project_root: &Path, cfg: &AiConfig) -> AiResult<()> {
        let threads = ThreadStore::new(project_root);
        if threads.stats()?.record_count >= MAX_THREADS_HARD_CAP {
            return Err(AiError::CapacityExceeded(format!(
                "project has reached the hard cap of {MAX_THREADS_HARD_CAP} stored threads"
            )));
        }

        let quota = cfg.active_threads_limit.unwrap_or_else(|| cfg.mode.quota());
        let active = threads.list_by_status(&ThreadStatus::Active)?;
        if active.len() < quota {
            return Ok(());
        }
        if let Some(lightest) = active
            .iter()
            .min_by(|a, b| a.weight.partial_cmp(&b.weight).unwrap_or(std::cmp::Ordering::Equal))
        {
            let mut t = lightest.clone();
            t.status = ThreadStatus::Suspended;
            tracing::info!(thread_id = %t.id, weight = t.weight, "suspended lowest-weight thread to make room under quota");
            threads.put(&t)?;
        }
        Ok(())
    }

    fn spawn_child(
        parent: &mut Thread,
        extraction: &Extraction,
        content: &str,
        source_type: &str,
        file_path: Option<&str>,
    ) -> AiResult<Thread> {
        let mut child = Self::create_thread(extraction, content, source_type, file_path, Some(&parent.id));
        child.weight = (parent.weight * FORK_WEIGHT_FACTOR).max(0.0);
        child.clamp_weight();
        parent.child_ids.push(child.id.clone());
        Ok(child)
    }

    fn link_child_bridge(project_root: &Path, parent_id: &str, child_id: &str) -> AiResult<()> {
        let bridges = BridgeStore::new(project_root);
        let bridge = ThinkBridge::new(
            id_gen::bridge_id(),
            child_id.to_string(),
            parent_id.to_string(),
            BridgeType::ChildOf,
            FORK_WEIGHT_FACTOR,
        );
        bridges.put(&bridge)
    }

    fn create_thread(
        extraction: &Extraction,
        content: &str,
        source_type: &str,
        file_path: Option<&str>,
        parent_id: Option<&str>,
    ) -> Thread {
        let origin = source_type.parse().unwrap_or(OriginType::Prompt);
        let mut t = Thread::new(id_gen::thread_id(), extraction.title.clone(), origin);
        t.summary = extraction.summary.clone();
        t.topics = crate::constants::filter_topic_noise(&extraction.subjects);
        t.labels = crate::constants::filter_blocked_labels(&extraction.labels);
        t.importance = extraction.importance.max(0.1);
        t.parent_id = parent_id.map(String::from);
        t.relevance_score = if extraction.confidence >= 0.8 {
            1.0
        } else {
            0.5 + extraction.confidence * 0.5
        };

        if let Some(fp) = file_path {
            t.work_context = Some(WorkContext {
                files: vec![fp.to_string()],
                actions: vec![source_type.to_string()],
                goal: None,
                updated_at: crate::time_utils::now(),
            });
        }

        t.append_message(make_message(content, source_type));
        let embed_text = format!("{} {}", t.title, t.topics.join(" "));
        t.embedding = Some(EmbeddingManager::global().embed(&embed_text));
        t
    }

    fn apply_capture(t: &mut Thread, extraction: &Extraction, content: &str, source_type: &str, file_path: Option<&str>) {
        t.append_message(make_message(content, source_type));
        t.boost(THREAD_USE_BOOST);

        let mut topics = t.topics.clone();
        topics.extend(extraction.subjects.iter().cloned());
        topics = merge_metadata::dedup_case_insensitive(topics);
        topics.truncate(merge_metadata::MAX_TOPICS);
        t.topics = topics;

        let mut labels = t.labels.clone();
        labels.extend(crate::constants::filter_blocked_labels(&extraction.labels));
        labels = merge_metadata::dedup_case_insensitive(labels);
        labels.truncate(merge_metadata::MAX_LABELS);
        t.labels = labels;

        if t.summary.is_empty() {
            t.summary = extraction.summary.clone();
        }

        if let Some(fp) = file_path {
            let wc = t.work_context.get_or_insert_with(|| WorkContext {
                files: Vec::new(),
                actions: Vec::new(),
                goal: None,
                updated_at: Utc::now(),
            });
            if !wc.files.iter().any(|f| f == fp) {
                wc.files.push(fp.to_string());
            }
            if !wc.actions.iter().any(|a| a == source_type) {
                wc.actions.push(source_type.to_string());
            }
            wc.updated_at = Utc::now();
        }

        let embed_text = format!(
            "{} {} {}",
            t.title,
            t.topics.join(" "),
            truncate_safe(&t.summary, 200)
        );
        t.embedding = Some(EmbeddingManager::global().embed(&embed_text));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(crate::storage::path_utils::threads_dir(dir.path())).unwrap();
        std::fs::create_dir_all(crate::storage::path_utils::bridges_dir(dir.path())).unwrap();
        dir
    }

    fn no_llm_config() -> AiConfig {
        let mut cfg = AiConfig::default();
        cfg.extraction.llm.enabled = false;
        cfg.coherence.llm.enabled = false;
        cfg
    }

    #[test]
    fn process_input_creates_new_thread_for_fresh_content() {
        let dir = setup();
        let cfg = no_llm_config();
        let locks = LockRegistry::new();
        let outcome = ThreadManager::process_input(
            dir.path(),
            "Investigating a flaky test in the bridge decay cycle, seems related to timestamp rounding.",
            "prompt",
            None,
            None,
            &cfg,
            &locks,
        )
        .unwrap()
        .expect("non-noise content should create a thread");

        assert_eq!(outcome.decision, "new_thread");
        let threads = ThreadStore::new(dir.path());
        let stored = threads.get(&outcome.thread.id).unwrap();
        assert_eq!(stored.messages.len(), 1);
    }

    #[test]
    fn fork_sets_child_weight_to_parent_times_factor() {
        let dir = setup();
        let cfg = no_llm_config();
        let threads = ThreadStore::new(dir.path());
        let mut parent = Thread::new("p1".into(), "Parent thread".into(), OriginType::Prompt);
        parent.weight = 0.9;
        threads.put(&parent).unwrap();

        let child = ThreadManager::fork(dir.path(), "p1", "a tangent worth tracking separately", "prompt", &cfg).unwrap();
        assert!((child.weight - 0.9 * FORK_WEIGHT_FACTOR).abs() < 1e-9);
        assert_eq!(child.parent_id.as_deref(), Some("p1"));

        let updated_parent = threads.get("p1").unwrap();
        assert!(updated_parent.child_ids.contains(&child.id));

        let bridges = BridgeStore::new(dir.path());
        let edges = bridges.list_for_thread("p1").unwrap();
        assert!(edges.iter().any(|b| b.relation_type == BridgeType::ChildOf));
    }

    #[test]
    fn merge_refuses_split_locked_absorbed() {
        let dir = setup();
        let threads = ThreadStore::new(dir.path());
        let survivor = Thread::new("s1".into(), "Survivor".into(), OriginType::Prompt);
        let mut absorbed = Thread::new("a1".into(), "Absorbed".into(), OriginType::Prompt);
        absorbed.split_locked = true;
        threads.put(&survivor).unwrap();
        threads.put(&absorbed).unwrap();

        let result = ThreadManager::merge(dir.path(), "s1", "a1");
        assert!(matches!(result, Err(AiError::InvalidState(_))));
    }

    #[test]
    fn merge_takes_max_weight_plus_boost() {
        let dir = setup();
        let threads = ThreadStore::new(dir.path());
        let mut survivor = Thread::new("s1".into(), "Survivor".into(), OriginType::Prompt);
        survivor.weight = 0.4;
        let mut absorbed = Thread::new("a1".into(), "Absorbed".into(), OriginType::Prompt);
        absorbed.weight = 0.7;
        threads.put(&survivor).unwrap();
        threads.put(&absorbed).unwrap();

        let merged = ThreadManager::merge(dir.path(), "s1", "a1").unwrap();
        assert!((merged.weight - (0.7 + MERGE_WEIGHT_BOOST)).abs() < 1e-9);

        let absorbed_after = threads.get("a1").unwrap();
        assert_eq!(absorbed_after.status, ThreadStatus::Archived);
        assert_eq!(absorbed_after.merged_into(), Some("s1"));
    }

    #[test]
    fn split_preview_does_not_write_children() {
        let dir = setup();
        let cfg = no_llm_config();
        let threads = ThreadStore::new(dir.path());
        let mut src = Thread::new("src1".into(), "Big thread".into(), OriginType::Prompt);
        src.messages.push(Message {
            id: "m1".into(),
            content: "one".into(),
            source: "prompt".into(),
            timestamp: crate::time_utils::now(),
            metadata: serde_json::Value::Null,
            is_truncated: false,
        });
        threads.put(&src).unwrap();

        let groups = vec![
            SplitGroup { title: "Part A".into(), message_ids: vec!["m1".into()] },
            SplitGroup { title: "Part B".into(), message_ids: vec![] },
        ];
        let locks = LockRegistry::new();
        let plan = ThreadManager::split(dir.path(), "src1", &groups, SplitLockMode::Compaction, false, &cfg, &locks).unwrap();
        match plan {
            SplitOutcome::Preview(previews) => assert_eq!(previews.len(), 2),
            SplitOutcome::Executed(_) => panic!("confirm=false must not execute"),
        }
        assert!(threads.get("src1").unwrap().child_ids.is_empty());
    }

    #[test]
    fn split_confirm_locks_children_and_archives_source() {
        let dir = setup();
        let cfg = no_llm_config();
        let threads = ThreadStore::new(dir.path());
        let mut src = Thread::new("src1".into(), "Big thread".into(), OriginType::Prompt);
        src.weight = 0.8;
        threads.put(&src).unwrap();

        let groups = vec![
            SplitGroup { title: "Part A".into(), message_ids: vec![] },
            SplitGroup { title: "Part B".into(), message_ids: vec![] },
        ];
        let locks = LockRegistry::new();
        let plan = ThreadManager::split(dir.path(), "src1", &groups, SplitLockMode::AgentRelease, true, &cfg, &locks).unwrap();
        let children = match plan {
            SplitOutcome::Executed(c) => c,
            SplitOutcome::Preview(_) => panic!("confirm=true must execute"),
        };
        assert_eq!(children.len(), 2);
        assert!(children.iter().all(|c| c.split_locked));
        assert!((children[0].weight - 0.8 * SPLIT_WEIGHT_FACTOR).abs() < 1e-9);
        assert_eq!(threads.get("src1").unwrap().status, ThreadStatus::Archived);
    }

    #[test]
    fn unlock_requires_matching_mode_unless_force() {
        let dir = setup();
        let threads = ThreadStore::new(dir.path());
        let mut t = Thread::new("t1".into(), "Child".into(), OriginType::Split);
        t.split_locked = true;
        t.split_locked_until = Some(SplitLockMode::Compaction);
        threads.put(&t).unwrap();

        let locks = LockRegistry::new();
        let wrong_mode = ThreadManager::unlock(dir.path(), "t1", SplitLockMode::AgentRelease, &locks);
        assert!(matches!(wrong_mode, Err(AiError::InvalidState(_))));

        let forced = ThreadManager::unlock(dir.path(), "t1", SplitLockMode::Force, &locks).unwrap();
        assert!(!forced.split_locked);
    }

    #[test]
    fn pin_bypasses_classifier_and_sets_boosted_weight() {
        let dir = setup();
        let cfg = no_llm_config();
        let locks = LockRegistry::new();
        let t = ThreadManager::pin(dir.path(), "Remember: always run tests before merging.", Some("House rule"), None, 0.3, &cfg, &locks).unwrap();
        assert_eq!(t.title, "House rule");
        assert!(t.is_pinned());
        assert!((t.weight - 1.3).abs() < 1e-9);
    }

    #[test]
    fn enforce_quota_suspends_lowest_weight_first() {
        let dir = setup();
        let mut cfg = AiConfig::default();
        cfg.mode = crate::config::ThreadMode::Light;
        let threads = ThreadStore::new(dir.path());
        for i in 0..(crate::constants::QUOTA_LIGHT + 3) {
            let mut t = Thread::new(format!("t{i}"), format!("Thread {i}"), OriginType::Prompt);
            t.weight = 0.1 + (i as f64) * 0.001;
            threads.put(&t).unwrap();
        }
        let suspended = ThreadManager::enforce_quota(dir.path(), &cfg).unwrap();
        assert_eq!(suspended, 3);
        assert_eq!(threads.get("t0").unwrap().status, ThreadStatus::Suspended);
    }

    #[test]
    fn enforce_quota_uses_active_threads_limit_override() {
        let dir = setup();
        let mut cfg = AiConfig::default();
        cfg.mode = crate::config::ThreadMode::Max;
        cfg.active_threads_limit = Some(2);
        let threads = ThreadStore::new(dir.path());
        for i in 0..5 {
            let mut t = Thread::new(format!("t{i}"), format!("Thread {i}"), OriginType::Prompt);
            t.weight = 0.1 + (i as f64) * 0.001;
            threads.put(&t).unwrap();
        }
        let suspended = ThreadManager::enforce_quota(dir.path(), &cfg).unwrap();
        assert_eq!(suspended, 3);
        assert_eq!(threads.get("t0").unwrap().status, ThreadStatus::Suspended);
        assert_eq!(threads.get("t4").unwrap().status, ThreadStatus::Active);
    }

    #[test]
    fn rate_context_unuseful_lowers_relevance_score() {
        let dir = setup();
        let threads = ThreadStore::new(dir.path());
        let t = Thread::new("t1".into(), "Thread".into(), OriginType::Prompt);
        threads.put(&t).unwrap();

        let locks = LockRegistry::new();
        let score = ThreadManager::rate_context(dir.path(), "t1", false, Some("not relevant"), &locks).unwrap();
        assert!(score < 1.0);
        assert_eq!(threads.get("t1").unwrap().ratings.len(), 1);
    }

    #[test]
    fn archive_redirects_child_to_grandparent() {
        let dir = setup();
        let threads = ThreadStore::new(dir.path());
        let bridges = BridgeStore::new(dir.path());

        let grandparent = Thread::new("gp".into(), "Grandparent".into(), OriginType::Prompt);
        let mut parent = Thread::new("p".into(), "Parent".into(), OriginType::Prompt);
        parent.parent_id = Some("gp".into());
        let mut child = Thread::new("c".into(), "Child".into(), OriginType::Split);
        child.parent_id = Some("p".into());
        parent.child_ids.push("c".into());

        threads.put(&grandparent).unwrap();
        threads.put(&parent).unwrap();
        threads.put(&child).unwrap();
        bridges.put(&ThinkBridge::new(id_gen::bridge_id(), "c".into(), "p".into(), BridgeType::ChildOf, 0.8)).unwrap();

        ThreadManager::archive(dir.path(), "p").unwrap();

        let child_after = threads.get("c").unwrap();
        assert_eq!(child_after.parent_id.as_deref(), Some("gp"));
    }
}
