//! Shared-cognition snapshots, subscriptions and cross-project bridge
//! proposals (SPEC_FULL.md §4.11). Isolated from the main thread graph: a
//! shared snapshot carries its own `shared_id` and never leaks the
//! originating thread's id across the boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::storage::{path_utils, store};
use crate::thread::Thread;
use crate::AiResult;

/// A deep-copy of a thread published for other projects/agents to pull.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedSnapshot {
    pub shared_id: String,
    pub title: String,
    pub summary: String,
    pub topics: Vec<String>,
    pub messages: Vec<crate::thread::Message>,
    pub published_at: DateTime<Utc>,
}

impl SharedSnapshot {
    pub fn from_thread(shared_id: String, thread: &Thread) -> Self {
        Self {
            shared_id,
            title: thread.title.clone(),
            summary: thread.summary.clone(),
            topics: thread.topics.clone(),
            messages: thread.messages.clone(),
            published_at: Utc::now(),
        }
    }
}

/// A proposed cross-agent bridge awaiting bilateral consent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeProposal {
    pub id: String,
    pub shared_id: String,
    pub target_thread_id: String,
    pub relation_type: crate::bridge::BridgeType,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl BridgeProposal {
    pub fn is_expired(&self) -> bool {
        (Utc::now() - self.created_at).num_hours() >= crate::constants::SHARE_PROPOSAL_TTL_HOURS
    }
}

pub fn publish(project_root: &Path, snapshot: &SharedSnapshot) -> AiResult<()> {
    let path = path_utils::shared_published_dir(project_root).join(format!("{}.json", snapshot.shared_id));
    store::atomic_write_json(&path, snapshot)
}

pub fn pull(project_root: &Path, shared_id: &str) -> AiResult<Option<SharedSnapshot>> {
    let published = path_utils::shared_published_dir(project_root).join(format!("{}.json", shared_id));
    let snapshot: Option<SharedSnapshot> = store::load_json(&published)?;
    if let Some(ref s) = snapshot {
        let sub_path = path_utils::shared_subscriptions_dir(project_root).join(format!("{}.json", shared_id));
        store::atomic_write_json(&sub_path, s)?;
    }
    Ok(snapshot)
}

/// Snapshots pulled from other projects, for display in injected context.
pub fn list_subscriptions(project_root: &Path) -> AiResult<Vec<SharedSnapshot>> {
    let dir = path_utils::shared_subscriptions_dir(project_root);
    let ids = store::list_ids(&dir)?;
    let mut snapshots = Vec::new();
    for id in ids {
        let path = dir.join(format!("{}.json", id));
        if let Ok(Some(s)) = store::load_json(&path) {
            snapshots.push(s);
        }
    }
    Ok(snapshots)
}

pub fn propose_bridge(project_root: &Path, proposal: &BridgeProposal) -> AiResult<()> {
    let path = path_utils::shared_proposals_outgoing_dir(project_root).join(format!("{}.json", proposal.id));
    store::atomic_write_json(&path, proposal)
}

pub fn list_outgoing_proposals(project_root: &Path) -> AiResult<Vec<BridgeProposal>> {
    let dir = path_utils::shared_proposals_outgoing_dir(project_root);
    let ids = store::list_ids(&dir)?;
    let mut proposals = Vec::new();
    for id in ids {
        let path = dir.join(format!("{}.json", id));
        if let Ok(Some(p)) = store::load_json(&path) {
            proposals.push(p);
        }
    }
    Ok(proposals)
}

/// Delete every outgoing proposal past its TTL. Called from the maintenance
/// tick; acceptance is driven externally and removes the proposal itself.
pub fn expire_outgoing_proposals(project_root: &Path) -> AiResult<usize> {
    let proposals = list_outgoing_proposals(project_root)?;
    let mut removed = 0;
    for p in proposals {
        if p.is_expired() {
            let path = path_utils::shared_proposals_outgoing_dir(project_root).join(format!("{}.json", p.id));
            store::delete(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proposal_expires_after_ttl() {
        let mut p = BridgeProposal {
            id: "proposal_1".into(),
            shared_id: "shared_1".into(),
            target_thread_id: "thread_1".into(),
            relation_type: crate::bridge::BridgeType::Extends,
            reason: String::new(),
            created_at: Utc::now(),
        };
        assert!(!p.is_expired());
        p.created_at = Utc::now() - chrono::Duration::hours(25);
        assert!(p.is_expired());
    }
}
