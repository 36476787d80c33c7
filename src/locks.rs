//! Per-entity mutex registry (SPEC_FULL.md §5): serializes mutations keyed
//! by thread id or by an unordered bridge-endpoint pair, so two requests
//! touching the same thread never interleave while requests touching
//! unrelated threads still run concurrently. Grounded on the teacher's
//! `ConnectionPool`'s per-key `Mutex` map, generalized from per-agent
//! connections to per-thread-id/per-bridge-pair guards. A lock from this
//! registry is only ever held across an in-memory mutate + atomic write —
//! never across an LLM subprocess call (see `merge_evaluator.rs`'s
//! equivalent rule in the teacher).
//!
//! Lives at the crate root (rather than under `daemon::`) because both the
//! IPC server and `intelligence::thread_manager`'s capture pipeline need
//! it, and `intelligence` must not depend on `daemon`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct LockRegistry {
    threads: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    bridges: Mutex<HashMap<(String, String), Arc<Mutex<()>>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, id: &str) -> Arc<Mutex<()>> {
        let mut map = self.threads.lock().expect("thread lock registry poisoned");
        map.entry(id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    fn bridge_entry(&self, a: &str, b: &str) -> Arc<Mutex<()>> {
        let key = if a <= b { (a.to_string(), b.to_string()) } else { (b.to_string(), a.to_string()) };
        let mut map = self.bridges.lock().expect("bridge lock registry poisoned");
        map.entry(key).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Lock a single thread id for the duration of the returned guard.
    pub fn lock_thread(&self, id: &str) -> Arc<Mutex<()>> {
        self.entry(id)
    }

    /// Lock two thread ids at once (merge, split-parent/child operations),
    /// always acquiring in sorted order so two requests naming the same
    /// pair in opposite order never deadlock.
    pub fn lock_thread_pair(&self, a: &str, b: &str) -> (Arc<Mutex<()>>, Arc<Mutex<()>>) {
        if a <= b {
            (self.entry(a), self.entry(b))
        } else {
            (self.entry(b), self.entry(a))
        }
    }

    /// Lock a bridge's unordered endpoint pair.
    pub fn lock_bridge(&self, a: &str, b: &str) -> Arc<Mutex<()>> {
        self.bridge_entry(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_thread_id_returns_same_lock() {
        let reg = LockRegistry::new();
        let a = reg.lock_thread("t1");
        let b = reg.lock_thread("t1");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn bridge_pair_is_order_independent() {
        let reg = LockRegistry::new();
        let a = reg.lock_bridge("x", "y");
        let b = reg.lock_bridge("y", "x");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn distinct_threads_get_distinct_locks() {
        let reg = LockRegistry::new();
        let a = reg.lock_thread("t1");
        let b = reg.lock_thread("t2");
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
