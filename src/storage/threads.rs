//! Thread CRUD, backed by one JSON file per thread under `db/threads/`.

use std::path::Path;

use crate::storage::{path_utils, store};
use crate::thread::{Thread, ThreadStatus};
use crate::{AiError, AiResult};

pub struct ThreadStore<'a> {
    project_root: &'a Path,
}

impl<'a> ThreadStore<'a> {
    pub fn new(project_root: &'a Path) -> Self {
        Self { project_root }
    }

    pub fn put(&self, thread: &Thread) -> AiResult<()> {
        let path = path_utils::thread_path(self.project_root, &thread.id);
        store::atomic_write_json(&path, thread)
    }

    pub fn get(&self, id: &str) -> AiResult<Thread> {
        let path = path_utils::thread_path(self.project_root, id);
        store::load_json(&path)?.ok_or_else(|| AiError::ThreadNotFound(id.to_string()))
    }

    pub fn try_get(&self, id: &str) -> AiResult<Option<Thread>> {
        let path = path_utils::thread_path(self.project_root, id);
        store::load_json(&path)
    }

    pub fn delete(&self, id: &str) -> AiResult<()> {
        let path = path_utils::thread_path(self.project_root, id);
        store::delete(&path)
    }

    /// List every stored thread, skipping (and logging) quarantined records
    /// so one corrupt file doesn't take down the whole listing.
    pub fn list_all(&self) -> AiResult<Vec<Thread>> {
        let dir = path_utils::threads_dir(self.project_root);
        let ids = store::list_ids(&dir)?;
        let mut threads = Vec::with_capacity(ids.len());
        for id in ids {
            match self.try_get(&id) {
                Ok(Some(t)) => threads.push(t),
                Ok(None) => {}
                Err(e) => tracing::warn!(thread_id = %id, error = %e, "skipping unreadable thread"),
            }
        }
        Ok(threads)
    }

    pub fn list_by_status(&self, status: &ThreadStatus) -> AiResult<Vec<Thread>> {
        Ok(self
            .list_all()?
            .into_iter()
            .filter(|t| &t.status == status)
            .collect())
    }

    pub fn stats(&self) -> AiResult<store::StoreStats> {
        store::stats(&path_utils::threads_dir(self.project_root))
    }
}
