//! Small standalone persisted records that don't warrant their own module:
//! heartbeat, focus, user rules and synthesis snapshots (SPEC_FULL.md §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::MAX_USER_RULES_KEPT;

/// One record per project; incremented once per maintenance tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    pub beat: u64,
    pub started_at: DateTime<Utc>,
    pub last_beat_at: DateTime<Utc>,
    pub last_interaction_at: DateTime<Utc>,
    pub last_interaction_beat: u64,
    pub last_session_id: Option<String>,
    pub last_thread_id: Option<String>,
    pub last_thread_title: Option<String>,
}

impl Default for Heartbeat {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            beat: 0,
            started_at: now,
            last_beat_at: now,
            last_interaction_at: now,
            last_interaction_beat: 0,
            last_session_id: None,
            last_thread_id: None,
            last_thread_title: None,
        }
    }
}

impl Heartbeat {
    pub fn tick(&mut self) {
        self.beat += 1;
        self.last_beat_at = Utc::now();
    }

    pub fn record_interaction(&mut self, session_id: Option<&str>, thread_id: Option<&str>, thread_title: Option<&str>) {
        self.last_interaction_at = Utc::now();
        self.last_interaction_beat = self.beat;
        if let Some(s) = session_id {
            self.last_session_id = Some(s.to_string());
        }
        if let Some(t) = thread_id {
            self.last_thread_id = Some(t.to_string());
        }
        if let Some(t) = thread_title {
            self.last_thread_title = Some(t.to_string());
        }
    }

    pub fn since_last(&self) -> u64 {
        self.beat.saturating_sub(self.last_interaction_beat)
    }
}

/// A user-or-agent-declared topic boost applied during ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FocusEntry {
    pub topic: String,
    pub weight: f64,
    pub set_at: DateTime<Utc>,
}

impl FocusEntry {
    pub fn new(topic: String, weight: f64) -> Self {
        Self {
            topic,
            weight: weight.clamp(0.0, 1.0),
            set_at: Utc::now(),
        }
    }
}

/// A persistent imperative the agent should keep honoring across sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRule {
    pub text: String,
    pub source_prompt: String,
    pub timestamp: DateTime<Utc>,
}

/// Bounded FIFO of at most `MAX_USER_RULES_KEPT` rules; oldest dropped first.
pub fn push_user_rule(rules: &mut Vec<UserRule>, rule: UserRule) {
    rules.push(rule);
    if rules.len() > MAX_USER_RULES_KEPT {
        let excess = rules.len() - MAX_USER_RULES_KEPT;
        rules.drain(0..excess);
    }
}

/// A compact textual snapshot produced before high-pressure compaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Synthesis {
    pub id: String,
    pub generated_at: DateTime<Utc>,
    pub summary: String,
    pub active_thread_states: Vec<ThreadStateLine>,
    pub decisions: Vec<String>,
    pub open_questions: Vec<String>,
}

/// One-line state of an active thread as captured at synthesis time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadStateLine {
    pub thread_id: String,
    pub title: String,
    pub one_line_state: String,
}

impl Synthesis {
    pub fn is_fresh(&self) -> bool {
        (Utc::now() - self.generated_at).num_seconds() < crate::constants::SYNTHESIS_FRESH_SECS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_user_rule_caps_at_limit() {
        let mut rules = Vec::new();
        for i in 0..25 {
            push_user_rule(&mut rules, UserRule {
                text: format!("rule {i}"),
                source_prompt: String::new(),
                timestamp: Utc::now(),
            });
        }
        assert_eq!(rules.len(), MAX_USER_RULES_KEPT);
        assert_eq!(rules.last().unwrap().text, "rule 24");
    }

    #[test]
    fn heartbeat_since_last_tracks_beats() {
        let mut hb = Heartbeat::default();
        hb.tick();
        hb.tick();
        hb.record_interaction(None, None, None);
        hb.tick();
        hb.tick();
        hb.tick();
        assert_eq!(hb.since_last(), 3);
    }

    #[test]
    fn synthesis_freshness_window() {
        let mut s = Synthesis {
            id: "synth_1".into(),
            generated_at: Utc::now(),
            summary: String::new(),
            active_thread_states: Vec::new(),
            decisions: Vec::new(),
            open_questions: Vec::new(),
        };
        assert!(s.is_fresh());
        s.generated_at = Utc::now() - chrono::Duration::hours(3);
        assert!(!s.is_fresh());
    }
}
