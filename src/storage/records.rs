//! Single-file JSON records: heartbeat, focus, user rules, synthesis.

use std::path::Path;

use crate::records::{FocusEntry, Heartbeat, Synthesis, UserRule};
use crate::storage::{path_utils, store};
use crate::AiResult;

pub fn load_heartbeat(project_root: &Path) -> AiResult<Heartbeat> {
    let path = path_utils::heartbeat_path(project_root);
    Ok(store::load_json(&path)?.unwrap_or_default())
}

pub fn save_heartbeat(project_root: &Path, hb: &Heartbeat) -> AiResult<()> {
    store::atomic_write_json(&path_utils::heartbeat_path(project_root), hb)
}

pub fn load_focus(project_root: &Path) -> AiResult<Vec<FocusEntry>> {
    let path = path_utils::focus_path(project_root);
    Ok(store::load_json(&path)?.unwrap_or_default())
}

pub fn save_focus(project_root: &Path, entries: &[FocusEntry]) -> AiResult<()> {
    store::atomic_write_json(&path_utils::focus_path(project_root), &entries)
}

pub fn load_user_rules(project_root: &Path) -> AiResult<Vec<UserRule>> {
    let path = path_utils::user_rules_path(project_root);
    Ok(store::load_json(&path)?.unwrap_or_default())
}

pub fn save_user_rules(project_root: &Path, rules: &[UserRule]) -> AiResult<()> {
    store::atomic_write_json(&path_utils::user_rules_path(project_root), &rules)
}

pub fn put_synthesis(project_root: &Path, synth: &Synthesis) -> AiResult<()> {
    let path = path_utils::synthesis_path(project_root, &synth.id);
    store::atomic_write_json(&path, synth)
}

pub fn get_synthesis(project_root: &Path, id: &str) -> AiResult<Option<Synthesis>> {
    store::load_json(&path_utils::synthesis_path(project_root, id))
}

/// Most recently generated synthesis, if any, regardless of freshness.
pub fn latest_synthesis(project_root: &Path) -> AiResult<Option<Synthesis>> {
    let dir = path_utils::synthesis_dir(project_root);
    let ids = store::list_ids(&dir)?;
    let mut latest: Option<Synthesis> = None;
    for id in ids {
        if let Ok(Some(s)) = get_synthesis(project_root, &id) {
            if latest.as_ref().map_or(true, |l| s.generated_at > l.generated_at) {
                latest = Some(s);
            }
        }
    }
    Ok(latest)
}
