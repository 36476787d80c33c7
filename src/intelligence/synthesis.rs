//! Synthesis — generates `Synthesis` records: a heuristic fallback plus the
//! LLM-backed compaction path (SPEC_FULL.md §4.10). Grounded on the
//! teacher's `synthesis.rs` summarizer, extended to produce a full
//! [`crate::records::Synthesis`] record instead of a bare string.

use crate::config::SynthesisConfig;
use crate::constants::truncate_safe;
use crate::id_gen;
use crate::processing::llm_subprocess;
use crate::records::{Synthesis, ThreadStateLine};
use crate::thread::{Message, Thread};
use crate::AiResult;

/// Heuristic summary from a thread's messages — first message truncated,
/// plus the latest if there are more than a handful.
pub fn summarize_messages(messages: &[Message]) -> String {
    if messages.is_empty() {
        return String::new();
    }

    let first = truncate_safe(&messages[0].content, 200).to_string();
    if messages.len() <= 3 {
        return first;
    }

    let last = truncate_safe(&messages[messages.len() - 1].content, 100).to_string();
    format!("Origin: {} Latest: {}", first, last)
}

/// Build a compaction `Synthesis` record from the current active threads,
/// using the LLM when enabled and falling back to a heuristic roll-up of
/// per-thread one-liners otherwise. Never fails the compaction turn: on any
/// error this returns a heuristic synthesis rather than propagating.
pub fn compact(active_threads: &[Thread], cfg: &SynthesisConfig) -> Synthesis {
    let state_lines: Vec<ThreadStateLine> = active_threads
        .iter()
        .take(cfg.max_messages)
        .map(|t| ThreadStateLine {
            thread_id: t.id.clone(),
            title: t.title.clone(),
            one_line_state: truncate_safe(&t.summary, 120).to_string(),
        })
        .collect();

    let summary = if cfg.llm.enabled {
        match build_llm_summary(active_threads, cfg) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "synthesis LLM call failed, using heuristic summary");
                heuristic_summary(active_threads, cfg)
            }
        }
    } else {
        heuristic_summary(active_threads, cfg)
    };

    Synthesis {
        id: id_gen::synthesis_id(),
        generated_at: crate::time_utils::now(),
        summary: truncate_safe(&summary, cfg.max_output_chars).to_string(),
        active_thread_states: state_lines,
        decisions: Vec::new(),
        open_questions: Vec::new(),
    }
}

fn heuristic_summary(active_threads: &[Thread], cfg: &SynthesisConfig) -> String {
    let titles: Vec<&str> = active_threads.iter().take(cfg.max_messages).map(|t| t.title.as_str()).collect();
    format!("Active work: {}", titles.join("; "))
}

fn build_llm_summary(active_threads: &[Thread], cfg: &SynthesisConfig) -> AiResult<String> {
    let lines: Vec<String> = active_threads
        .iter()
        .take(cfg.max_messages)
        .map(|t| format!("- {} ({}): {}", t.title, t.topics.join(", "), truncate_safe(&t.summary, cfg.max_message_chars)))
        .collect();

    let prompt = format!(
        "Summarize the current working state in {} from these active threads. Return prose, no markdown headers.\n\n{}",
        cfg.language,
        lines.join("\n"),
    );

    let model = cfg.llm.model.as_cli_flag();
    llm_subprocess::call_claude_with_model(&prompt, model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::OriginType;

    #[test]
    fn heuristic_summary_lists_titles() {
        let mut a = Thread::new("a".into(), "Fix auth bug".into(), OriginType::Prompt);
        a.summary = "working on auth".into();
        let cfg = SynthesisConfig {
            llm: crate::config::TaskLlmConfig { enabled: false, ..Default::default() },
            ..Default::default()
        };
        let synthesis = compact(&[a], &cfg);
        assert!(synthesis.summary.contains("Fix auth bug"));
        assert_eq!(synthesis.active_thread_states.len(), 1);
    }

    #[test]
    fn summarize_messages_short_list_uses_first_only() {
        let messages = vec![Message {
            id: "m1".into(),
            content: "hello world".into(),
            source: "prompt".into(),
            timestamp: crate::time_utils::now(),
            metadata: serde_json::Value::Null,
            is_truncated: false,
        }];
        assert_eq!(summarize_messages(&messages), "hello world");
    }
}
