//! Thread — the central entity of the memory graph: a topic-scoped stream
//! of captured observations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::MAX_RATINGS_KEPT;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ThreadStatus {
    Active,
    Suspended,
    Archived,
}

impl ThreadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Archived => "archived",
        }
    }
}

impl std::fmt::Display for ThreadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ThreadStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "suspended" => Ok(Self::Suspended),
            "archived" => Ok(Self::Archived),
            _ => Err(format!("Unknown thread status: {}", s)),
        }
    }
}

impl Default for ThreadStatus {
    fn default() -> Self {
        Self::Active
    }
}

/// Source/origin of a captured event. The mapping tool -> origin is a
/// static table (see `OriginType::from_tool_name`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum OriginType {
    Prompt,
    FileRead,
    FileWrite,
    Task,
    Fetch,
    Response,
    Command,
    Split,
    Reactivation,
}

impl OriginType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prompt => "prompt",
            Self::FileRead => "file_read",
            Self::FileWrite => "file_write",
            Self::Task => "task",
            Self::Fetch => "fetch",
            Self::Response => "response",
            Self::Command => "command",
            Self::Split => "split",
            Self::Reactivation => "reactivation",
        }
    }

    /// Static tool -> origin table (see DESIGN NOTES: "implicit polymorphism
    /// over capture source").
    pub fn from_tool_name(tool: &str) -> Self {
        match tool {
            "Read" | "Glob" | "Grep" => Self::FileRead,
            "Write" | "Edit" | "NotebookEdit" => Self::FileWrite,
            "Task" => Self::Task,
            "WebFetch" | "WebSearch" => Self::Fetch,
            "Bash" => Self::Command,
            _ => Self::Response,
        }
    }
}

impl std::str::FromStr for OriginType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prompt" => Ok(Self::Prompt),
            "file_read" => Ok(Self::FileRead),
            "file_write" => Ok(Self::FileWrite),
            "task" => Ok(Self::Task),
            "fetch" => Ok(Self::Fetch),
            "response" => Ok(Self::Response),
            "command" => Ok(Self::Command),
            "split" => Ok(Self::Split),
            "reactivation" => Ok(Self::Reactivation),
            _ => Err(format!("Unknown origin type: {}", s)),
        }
    }
}

impl Default for OriginType {
    fn default() -> Self {
        Self::Prompt
    }
}

/// Lock mode applied to threads created by a split; governs when `unlock`
/// is allowed to clear `split_locked`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SplitLockMode {
    Compaction,
    AgentRelease,
    Force,
}

/// One captured message inside a thread's append-only log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub content: String,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// True if `content` was truncated to the max message size on capture.
    #[serde(default)]
    pub is_truncated: bool,
}

/// A single usefulness rating fed back by the agent/user via `rate_context`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rating {
    pub useful: bool,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Ephemeral work-context pointer — the file/task a thread is actively
/// about. Feeds ranking only; cleared by the maintenance tick once stale
/// and never persisted across archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkContext {
    pub files: Vec<String>,
    pub actions: Vec<String>,
    pub goal: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl WorkContext {
    /// < 2h = 1.0, 2-8h = 0.5, 8-24h = 0.1, > 24h = 0.0
    pub fn freshness_factor(&self) -> f64 {
        let age_hours = (Utc::now() - self.updated_at).num_minutes() as f64 / 60.0;
        if age_hours < 2.0 {
            1.0
        } else if age_hours < 8.0 {
            0.5
        } else if age_hours < 24.0 {
            0.1
        } else {
            0.0
        }
    }

    pub fn is_expired(&self) -> bool {
        self.freshness_factor() == 0.0
    }
}

/// Tracks how often a thread was injected vs. actually referenced again,
/// so the maintenance tick can apply a relevance penalty to threads that
/// are injected but never used.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct InjectionStats {
    pub injection_count: u32,
    pub used_count: u32,
    pub last_injected_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl InjectionStats {
    pub fn usage_ratio(&self) -> f64 {
        if self.injection_count == 0 {
            return 1.0;
        }
        self.used_count as f64 / self.injection_count as f64
    }

    pub fn should_decay(&self) -> bool {
        self.injection_count >= 5 && self.usage_ratio() < 0.2
    }

    pub fn compute_relevance_penalty(&self) -> f64 {
        if !self.should_decay() {
            return 0.0;
        }
        ((1.0 - self.usage_ratio()) * 0.3).min(0.3)
    }

    pub fn record_injection(&mut self) {
        self.injection_count += 1;
        self.last_injected_at = Some(Utc::now());
    }

    pub fn record_usage(&mut self) {
        self.used_count += 1;
        self.last_used_at = Some(Utc::now());
    }
}

pub const PINNED_TAG: &str = "pinned";
pub const MAX_WEIGHT: f64 = 1.0;
pub const MAX_PINNED_WEIGHT: f64 = 1.5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    pub title: String,
    pub status: ThreadStatus,
    pub messages: Vec<Message>,
    pub summary: String,
    pub topics: Vec<String>,
    pub origin_type: OriginType,
    pub parent_id: Option<String>,
    pub child_ids: Vec<String>,
    pub weight: f64,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub activation_count: u32,
    pub embedding: Option<Vec<f32>>,
    pub ratings: Vec<Rating>,
    pub relevance_score: f64,
    pub split_locked: bool,
    pub split_locked_until: Option<SplitLockMode>,
    pub tags: Vec<String>,

    // Supplemented fields (see SPEC_FULL.md §3.1).
    pub labels: Vec<String>,
    pub importance: f64,
    pub work_context: Option<WorkContext>,
    pub injection_stats: Option<InjectionStats>,
}

impl Thread {
    pub fn new(id: String, title: String, origin_type: OriginType) -> Self {
        let now = Utc::now();
        Self {
            id,
            title,
            status: ThreadStatus::Active,
            messages: Vec::new(),
            summary: String::new(),
            topics: Vec::new(),
            origin_type,
            parent_id: None,
            child_ids: Vec::new(),
            weight: 1.0,
            created_at: now,
            last_active: now,
            activation_count: 1,
            embedding: None,
            ratings: Vec::new(),
            relevance_score: 1.0,
            split_locked: false,
            split_locked_until: None,
            tags: Vec::new(),
            labels: Vec::new(),
            importance: 0.5,
            work_context: None,
            injection_stats: None,
        }
    }

    pub fn is_pinned(&self) -> bool {
        self.tags.iter().any(|t| t == PINNED_TAG)
    }

    pub fn max_weight(&self) -> f64 {
        if self.is_pinned() {
            MAX_PINNED_WEIGHT
        } else {
            MAX_WEIGHT
        }
    }

    /// Invariant 4: clamp weight to [0, max_weight].
    pub fn clamp_weight(&mut self) {
        let max = self.max_weight();
        self.weight = self.weight.clamp(0.0, max);
    }

    /// Hebbian boost on activation, clamped per invariant 4.
    pub fn boost(&mut self, amount: f64) {
        self.weight += amount;
        self.clamp_weight();
        self.activation_count += 1;
        self.last_active = Utc::now();
    }

    pub fn append_message(&mut self, msg: Message) {
        self.messages.push(msg);
    }

    /// Fold ratings (capped to the `MAX_RATINGS_KEPT` most recent) into a
    /// relevance score: unanimous "useful" keeps 1.0, any "not useful"
    /// pulls it down proportionally.
    pub fn recompute_relevance(&mut self) {
        if self.ratings.len() > MAX_RATINGS_KEPT {
            let excess = self.ratings.len() - MAX_RATINGS_KEPT;
            self.ratings.drain(0..excess);
        }
        if self.ratings.is_empty() {
            return;
        }
        let useful = self.ratings.iter().filter(|r| r.useful).count() as f64;
        self.relevance_score = (useful / self.ratings.len() as f64).max(0.1);
    }

    pub fn merged_into_tag(id: &str) -> String {
        format!("merged_into:{}", id)
    }

    pub fn merged_into(&self) -> Option<&str> {
        self.tags.iter().find_map(|t| t.strip_prefix("merged_into:"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boost_clamps_to_one_for_unpinned() {
        let mut t = Thread::new("t1".into(), "title".into(), OriginType::Prompt);
        t.weight = 0.95;
        t.boost(0.5);
        assert_eq!(t.weight, 1.0);
    }

    #[test]
    fn boost_allows_up_to_1_5_when_pinned() {
        let mut t = Thread::new("t1".into(), "title".into(), OriginType::Prompt);
        t.tags.push(PINNED_TAG.to_string());
        t.weight = 1.4;
        t.boost(0.5);
        assert_eq!(t.weight, 1.5);
    }

    #[test]
    fn merged_into_tag_roundtrip() {
        let mut t = Thread::new("b".into(), "title".into(), OriginType::Prompt);
        t.tags.push(Thread::merged_into_tag("a"));
        assert_eq!(t.merged_into(), Some("a"));
    }

    #[test]
    fn recompute_relevance_keeps_only_recent_ratings() {
        let mut t = Thread::new("t1".into(), "title".into(), OriginType::Prompt);
        for i in 0..15 {
            t.ratings.push(Rating {
                useful: i % 2 == 0,
                timestamp: Utc::now(),
                reason: None,
            });
        }
        t.recompute_relevance();
        assert_eq!(t.ratings.len(), MAX_RATINGS_KEPT);
    }
}
