//! Bridge CRUD, backed by one JSON file per bridge under `db/bridges/`.

use std::path::Path;

use crate::bridge::ThinkBridge;
use crate::storage::{path_utils, store};
use crate::{AiError, AiResult};

pub struct BridgeStore<'a> {
    project_root: &'a Path,
}

impl<'a> BridgeStore<'a> {
    pub fn new(project_root: &'a Path) -> Self {
        Self { project_root }
    }

    pub fn put(&self, bridge: &ThinkBridge) -> AiResult<()> {
        let path = path_utils::bridge_path(self.project_root, &bridge.id);
        store::atomic_write_json(&path, bridge)
    }

    pub fn get(&self, id: &str) -> AiResult<ThinkBridge> {
        let path = path_utils::bridge_path(self.project_root, id);
        store::load_json(&path)?.ok_or_else(|| AiError::BridgeNotFound(id.to_string()))
    }

    pub fn delete(&self, id: &str) -> AiResult<()> {
        let path = path_utils::bridge_path(self.project_root, id);
        store::delete(&path)
    }

    pub fn list_all(&self) -> AiResult<Vec<ThinkBridge>> {
        let dir = path_utils::bridges_dir(self.project_root);
        let ids = store::list_ids(&dir)?;
        let mut bridges = Vec::with_capacity(ids.len());
        for id in ids {
            let path = path_utils::bridge_path(self.project_root, &id);
            match store::load_json(&path) {
                Ok(Some(b)) => bridges.push(b),
                Ok(None) => {}
                Err(e) => tracing::warn!(bridge_id = %id, error = %e, "skipping unreadable bridge"),
            }
        }
        Ok(bridges)
    }

    /// All bridges touching `thread_id`, either end.
    pub fn list_for_thread(&self, thread_id: &str) -> AiResult<Vec<ThinkBridge>> {
        Ok(self
            .list_all()?
            .into_iter()
            .filter(|b| b.source_id == thread_id || b.target_id == thread_id)
            .collect())
    }
}
