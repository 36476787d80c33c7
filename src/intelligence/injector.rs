//! Injector — assembles the context block added ahead of a user prompt
//! (SPEC_FULL.md §4.8): onboarding, synthesis, focus, user rules, ranked
//! threads, shared snapshots and heartbeat metadata, trimmed to a char
//! budget and wrapped in a system-reminder marker. Also formats the
//! stand-alone `recall` payload used by the `recall` RPC op and CLI command.

use std::path::Path;
use std::process::Command;
use std::sync::OnceLock;

use regex::Regex;

use crate::config::AiConfig;
use crate::constants::SESSION_GAP_THRESHOLD_SECS;
use crate::intelligence::retriever;
use crate::storage::{records as record_store, shared, BridgeStore, ThreadStore};
use crate::thread::{Thread, ThreadStatus};
use crate::time_utils::humanize_age;
use crate::AiResult;

const SYSTEM_REMINDER_OPEN: &str = "<system-reminder>";
const SYSTEM_REMINDER_CLOSE: &str = "</system-reminder>";

/// CLI verbs the hook recognizes and passes straight through to the binary,
/// bypassing the rest of the injection pipeline entirely.
fn cli_passthrough_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^ai\s+(status|threads?|bridges?|search|reindex|health|daemon|mode|help)(?:\s+.*)?$").unwrap()
    })
}

/// Build the context block to prepend to `prompt`, or `None` if nothing is
/// worth injecting (empty graph, no focus, no fresh synthesis, no rules).
pub fn build_injection(
    project_root: &Path,
    prompt: &str,
    session_id: Option<&str>,
    cfg: &AiConfig,
) -> AiResult<Option<String>> {
    if let Some(captures) = cli_passthrough_re().captures(prompt.trim()) {
        let verb = &captures[0];
        return Ok(Some(wrap(&run_cli_passthrough(verb))));
    }

    let threads = ThreadStore::new(project_root);
    let active = threads.list_by_status(&ThreadStatus::Active)?;
    let focus = record_store::load_focus(project_root)?;
    let user_rules = record_store::load_user_rules(project_root)?;
    let heartbeat = record_store::load_heartbeat(project_root)?;
    let synthesis = record_store::latest_synthesis(project_root)?;

    let ranked = retriever::rank(prompt, &active, &focus, &cfg.injection);
    let is_new_session = session_id.map_or(false, |s| heartbeat.last_session_id.as_deref() != Some(s))
        || (crate::time_utils::now() - heartbeat.last_interaction_at).num_seconds() > SESSION_GAP_THRESHOLD_SECS;

    let mut sections: Vec<String> = Vec::new();

    if is_new_session {
        if let Some(section) = onboarding_section(&active, heartbeat.last_thread_id.as_deref()) {
            sections.push(section);
        }
    }

    if let Some(s) = synthesis.as_ref().filter(|s| s.is_fresh()) {
        sections.push(format!(
            "## Recent synthesis\n{}\n{}",
            s.summary,
            s.active_thread_states
                .iter()
                .map(|line| format!("- {}: {}", line.title, line.one_line_state))
                .collect::<Vec<_>>()
                .join("\n")
        ));
    }

    if !focus.is_empty() {
        let lines: Vec<String> = focus.iter().map(|f| format!("- {} (weight {:.2})", f.topic, f.weight)).collect();
        sections.push(format!("## Active focus\n{}", lines.join("\n")));
    }

    if !user_rules.is_empty() {
        let lines: Vec<String> = user_rules.iter().map(|r| format!("- {}", r.text)).collect();
        sections.push(format!("## User rules\n{}", lines.join("\n")));
    }

    let subscriptions = shared::list_subscriptions(project_root)?;
    if !subscriptions.is_empty() {
        let lines: Vec<String> = subscriptions
            .iter()
            .map(|s| format!("- {} ({} topics)", s.title, s.topics.len()))
            .collect();
        sections.push(format!("## Shared from other projects\n{}", lines.join("\n")));
    }

    if !ranked.is_empty() {
        let lines: Vec<String> = ranked
            .iter()
            .map(|r| {
                let summary = crate::constants::truncate_safe(&r.thread.summary, 100);
                format!("- [{}] {} — {} (priority {:.2})", r.thread.id, r.thread.title, summary, r.priority)
            })
            .collect();
        sections.push(format!("## Relevant threads\n{}", lines.join("\n")));
    }

    sections.push(format!(
        "## Heartbeat\nbeat {} · {} since last interaction",
        heartbeat.beat,
        heartbeat.since_last()
    ));

    if sections.is_empty() {
        return Ok(None);
    }

    let trimmed = trim_to_budget(sections, cfg.injection.budget_chars);
    record_store::save_heartbeat(project_root, &{
        let mut hb = heartbeat;
        let current = ranked.first().map(|r| &r.thread);
        hb.record_interaction(session_id, current.map(|t| t.id.as_str()), current.map(|t| t.title.as_str()));
        hb
    })?;

    Ok(Some(wrap(&trimmed.join("\n\n"))))
}

/// Per spec §4.8, the new-session "hot thread" is the one the heartbeat
/// actually tracked as last-touched (`heartbeat.last_thread_id`), not
/// whichever thread happens to carry the most weight right now — those
/// diverge whenever something else gets boosted (gossip, a rating) after
/// the agent moved on. Fall back to max-weight only when nothing is
/// tracked yet (e.g. the very first session).
fn onboarding_section(active: &[Thread], last_thread_id: Option<&str>) -> Option<String> {
    let hottest = last_thread_id
        .and_then(|id| active.iter().find(|t| t.id == id))
        .or_else(|| active.iter().max_by(|a, b| a.weight.partial_cmp(&b.weight).unwrap_or(std::cmp::Ordering::Equal)))?;
    Some(format!(
        "## New session\nCLI available as `ai <status|threads|bridges|search|recall|health>`.\nHottest thread: [{}] {} (weight {:.2}).\nConsider `ai recall <query>` if this continues earlier work.",
        hottest.id, hottest.title, hottest.weight
    ))
}

/// Drop sections bottom-up — lowest priority first — until the joined text
/// fits the budget (spec §4.8 / E2E scenario 6). `sections` is assembled
/// above in priority order (onboarding highest, then synthesis, focus, user
/// rules, shared, relevance, heartbeat last); the heartbeat entry is always
/// kept, so each round removes the last eligible (second-to-last) section
/// regardless of its byte length — a small high-priority section must
/// survive a large low-priority one, never the other way around.
fn trim_to_budget(mut sections: Vec<String>, budget_chars: usize) -> Vec<String> {
    loop {
        let joined_len: usize = sections.iter().map(|s| s.len() + 2).sum();
        if joined_len <= budget_chars || sections.len() <= 1 {
            return sections;
        }
        sections.remove(sections.len() - 2);
    }
}

fn wrap(body: &str) -> String {
    format!("{SYSTEM_REMINDER_OPEN}\n{body}\n{SYSTEM_REMINDER_CLOSE}")
}

fn run_cli_passthrough(verb: &str) -> String {
    let args: Vec<&str> = verb.split_whitespace().skip(1).collect();
    match Command::new("ai").args(&args).output() {
        Ok(out) => String::from_utf8_lossy(&out.stdout).into_owned(),
        Err(e) => format!("ai CLI unavailable: {e}"),
    }
}

/// Markdown block describing the results of an explicit recall, including
/// each thread's related bridges (SPEC_FULL.md §4.8).
pub fn format_recall(project_root: &Path, matches: &[Thread], budget_chars: usize) -> AiResult<String> {
    let bridges = BridgeStore::new(project_root);
    let mut blocks = Vec::new();

    for t in matches {
        let mut block = format!(
            "### {} ({})\nweight: {:.2} · topics: {}\n{}\nlast active: {}",
            t.title,
            t.status,
            t.weight,
            t.topics.join(", "),
            crate::constants::truncate_safe(&t.summary, 200),
            humanize_age(&t.last_active),
        );

        let mut related = bridges.list_for_thread(&t.id)?;
        related.sort_by(|a, b| b.weight.partial_cmp(&a.weight).unwrap_or(std::cmp::Ordering::Equal));
        related.truncate(5);
        if !related.is_empty() {
            let lines: Vec<String> = related
                .iter()
                .map(|b| format!("  - {} ({:.2})", b.relation_type, b.weight))
                .collect();
            block.push_str(&format!("\nrelated bridges:\n{}", lines.join("\n")));
        }
        blocks.push(block);
    }

    let mut text = blocks.join("\n\n");
    while text.len() > budget_chars && !blocks.is_empty() {
        blocks.pop();
        text = blocks.join("\n\n");
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_passthrough_regex_matches_known_verbs() {
        assert!(cli_passthrough_re().is_match("ai status"));
        assert!(cli_passthrough_re().is_match("ai threads --status active"));
        assert!(cli_passthrough_re().is_match("ai search foo bar"));
        assert!(!cli_passthrough_re().is_match("aip status"));
        assert!(!cli_passthrough_re().is_match("tell me about ai status"));
    }

    #[test]
    fn trim_to_budget_drops_lowest_priority_first_even_if_smaller() {
        // Last section ("heartbeat") is always kept; among the rest, the
        // one pushed last (lowest priority) must go first regardless of
        // size — here that's the small "c" section, not the large "b" one.
        let sections = vec!["a".repeat(10), "b".repeat(100), "c".repeat(5), "heartbeat".to_string()];
        let trimmed = trim_to_budget(sections, 130);
        assert!(!trimmed.iter().any(|s| s.len() == 5));
        assert!(trimmed.iter().any(|s| s.len() == 100));
        assert!(trimmed.last().map(|s| s == "heartbeat").unwrap_or(false));
    }

    #[test]
    fn wrap_uses_system_reminder_marker() {
        let wrapped = wrap("hello");
        assert!(wrapped.starts_with(SYSTEM_REMINDER_OPEN));
        assert!(wrapped.trim_end().ends_with(SYSTEM_REMINDER_CLOSE));
    }
}
