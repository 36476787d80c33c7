//! ThinkBridge — a weighted semantic edge between two threads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum BridgeType {
    Extends,
    Contradicts,
    Depends,
    Replaces,
    ChildOf,
    Sibling,
}

impl BridgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extends => "extends",
            Self::Contradicts => "contradicts",
            Self::Depends => "depends",
            Self::Replaces => "replaces",
            Self::ChildOf => "child_of",
            Self::Sibling => "sibling",
        }
    }

    /// Death threshold for this relation kind. CHILD_OF bridges persist
    /// much longer so hierarchy survives ordinary decay.
    pub fn death_threshold(&self) -> f64 {
        match self {
            Self::ChildOf => crate::constants::BRIDGE_CHILD_DEATH_THRESHOLD,
            _ => crate::constants::BRIDGE_DEATH_THRESHOLD,
        }
    }
}

impl std::fmt::Display for BridgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BridgeType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "extends" => Ok(Self::Extends),
            "contradicts" => Ok(Self::Contradicts),
            "depends" => Ok(Self::Depends),
            "replaces" => Ok(Self::Replaces),
            "child_of" => Ok(Self::ChildOf),
            "sibling" => Ok(Self::Sibling),
            _ => Err(format!("Unknown bridge type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum BridgeStatus {
    Active,
    Weak,
    Invalid,
}

impl BridgeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Weak => "weak",
            Self::Invalid => "invalid",
        }
    }
}

impl std::fmt::Display for BridgeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const WEAK_THRESHOLD: f64 = 0.3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThinkBridge {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub relation_type: BridgeType,
    pub reason: String,
    pub shared_concepts: Vec<String>,
    pub weight: f64,
    pub confidence: f64,
    pub status: BridgeStatus,
    pub use_count: u32,
    pub last_used: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Bridge id this one was propagated from (one-hop gossip). None = direct.
    pub propagated_from: Option<String>,
    /// 0 = direct creation, >0 = created by transitive gossip.
    pub propagation_depth: u32,
}

impl ThinkBridge {
    pub fn new(
        id: String,
        source_id: String,
        target_id: String,
        relation_type: BridgeType,
        confidence: f64,
    ) -> Self {
        let mut b = Self {
            id,
            source_id,
            target_id,
            relation_type,
            reason: String::new(),
            shared_concepts: Vec::new(),
            weight: confidence,
            confidence,
            status: BridgeStatus::Active,
            use_count: 0,
            last_used: None,
            created_at: Utc::now(),
            propagated_from: None,
            propagation_depth: 0,
        };
        b.recompute_status();
        b
    }

    /// `status` is a derived view of `weight`; recompute after any mutation.
    pub fn recompute_status(&mut self) {
        self.status = if self.weight < self.relation_type.death_threshold() {
            BridgeStatus::Invalid
        } else if self.weight < WEAK_THRESHOLD {
            BridgeStatus::Weak
        } else {
            BridgeStatus::Active
        };
    }

    pub fn clamp_weight(&mut self) {
        self.weight = self.weight.clamp(0.0, 1.0);
        self.recompute_status();
    }

    pub fn boost(&mut self, amount: f64) {
        self.weight += amount;
        self.clamp_weight();
        self.use_count += 1;
        self.last_used = Some(Utc::now());
    }

    pub fn is_dead(&self) -> bool {
        self.weight < self.relation_type.death_threshold()
    }

    /// Unordered pair key so (A, B) and (B, A) are treated as the same edge.
    pub fn pair_key(&self) -> (String, String) {
        if self.source_id <= self.target_id {
            (self.source_id.clone(), self.target_id.clone())
        } else {
            (self.target_id.clone(), self.source_id.clone())
        }
    }

    pub fn connects(&self, a: &str, b: &str) -> bool {
        (self.source_id == a && self.target_id == b) || (self.source_id == b && self.target_id == a)
    }

    pub fn other_end(&self, known: &str) -> Option<&str> {
        if self.source_id == known {
            Some(&self.target_id)
        } else if self.target_id == known {
            Some(&self.source_id)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weak_status_below_0_3() {
        let mut b = ThinkBridge::new("b1".into(), "a".into(), "b".into(), BridgeType::Extends, 0.6);
        b.weight = 0.2;
        b.recompute_status();
        assert_eq!(b.status, BridgeStatus::Weak);
    }

    #[test]
    fn child_of_survives_below_normal_death_threshold() {
        let mut b = ThinkBridge::new("b1".into(), "a".into(), "b".into(), BridgeType::ChildOf, 0.6);
        b.weight = 0.03;
        assert!(!b.is_dead());
        b.weight = 0.005;
        assert!(b.is_dead());
    }

    #[test]
    fn pair_key_is_order_independent() {
        let b1 = ThinkBridge::new("b1".into(), "a".into(), "b".into(), BridgeType::Extends, 0.5);
        let b2 = ThinkBridge::new("b2".into(), "b".into(), "a".into(), BridgeType::Extends, 0.5);
        assert_eq!(b1.pair_key(), b2.pair_key());
    }
}
