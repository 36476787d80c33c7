//! Topic index — hash-based O(1) candidate pre-filter for the Retriever.
//!
//! A pure in-memory optimization over Classifier/Retriever scanning: it
//! narrows the set of threads worth running `sim()` against, but never
//! changes the ranking math itself (see SPEC_FULL.md §4.8).

use std::collections::{HashMap, HashSet};

use crate::thread::Thread;

#[derive(Debug, Default)]
pub struct TopicIndex {
    index: HashMap<String, HashSet<String>>,
}

impl TopicIndex {
    pub fn build(threads: &[Thread]) -> Self {
        let mut idx = Self::default();
        for t in threads {
            idx.insert(&t.id, &t.topics);
        }
        idx
    }

    pub fn insert(&mut self, thread_id: &str, topics: &[String]) {
        for topic in topics {
            self.index
                .entry(topic.to_lowercase())
                .or_default()
                .insert(thread_id.to_string());
        }
    }

    pub fn remove(&mut self, thread_id: &str) {
        for ids in self.index.values_mut() {
            ids.remove(thread_id);
        }
        self.index.retain(|_, v| !v.is_empty());
    }

    pub fn update(&mut self, thread_id: &str, topics: &[String]) {
        self.remove(thread_id);
        self.insert(thread_id, topics);
    }

    /// Candidate thread ids sharing at least one topic with `query_topics`.
    pub fn lookup(&self, query_topics: &[String]) -> HashSet<String> {
        let mut candidates = HashSet::new();
        for topic in query_topics {
            if let Some(ids) = self.index.get(&topic.to_lowercase()) {
                candidates.extend(ids.iter().cloned());
            }
        }
        candidates
    }

    pub fn topic_count(&self) -> usize {
        self.index.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_finds_shared_topic() {
        let mut idx = TopicIndex::default();
        idx.insert("t1", &["rust".to_string(), "async".to_string()]);
        idx.insert("t2", &["python".to_string()]);
        let candidates = idx.lookup(&["Rust".to_string()]);
        assert!(candidates.contains("t1"));
        assert!(!candidates.contains("t2"));
    }

    #[test]
    fn update_replaces_prior_topics() {
        let mut idx = TopicIndex::default();
        idx.insert("t1", &["rust".to_string()]);
        idx.update("t1", &["python".to_string()]);
        assert!(idx.lookup(&["rust".to_string()]).is_empty());
        assert!(idx.lookup(&["python".to_string()]).contains("t1"));
    }
}
