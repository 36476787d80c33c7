//! Extraction — LLM-based content extraction with a heuristic fallback.
//!
//! Config-driven: model, truncation, prompt quality all from `ExtractionConfig`.

use crate::config::{ExtractionConfig, ImportanceRatingConfig, LabelSuggestionConfig};
use crate::constants::{filter_topic_noise, truncate_safe};
use crate::AiResult;
use serde::{Deserialize, Serialize};

/// Extraction result from LLM or heuristics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Extraction {
    pub title: String,
    pub subjects: Vec<String>,
    pub summary: String,
    pub confidence: f64,
    pub labels: Vec<String>,
    pub importance: f64,
    /// Short imperative clause describing what the content is asking for.
    #[serde(default)]
    pub intent: String,
    /// Up to 3 questions lifted verbatim from the content.
    #[serde(default)]
    pub questions: Vec<String>,
}

/// Source type for extraction prompts.
#[derive(Debug, Clone, Copy)]
pub enum ExtractionSource {
    Prompt,
    FileRead,
    FileWrite,
    Task,
    Fetch,
    Response,
    Command,
}

impl ExtractionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prompt => "prompt",
            Self::FileRead => "file_read",
            Self::FileWrite => "file_write",
            Self::Task => "task",
            Self::Fetch => "fetch",
            Self::Response => "response",
            Self::Command => "command",
        }
    }

    fn guidance(&self) -> &'static str {
        match self {
            Self::Prompt => "This is a user prompt/message. Focus on the intent and requested action.",
            Self::FileRead => "This is file content that was read. Focus on what the file implements, its purpose, and key structures.",
            Self::FileWrite => "This is file content being written/modified. Focus on what changed and why.",
            Self::Task => "This is a delegated task result. Focus on the outcome and findings.",
            Self::Fetch => "This is fetched web content. Focus on the key information retrieved.",
            Self::Response => "This is an AI response. Focus on decisions made and actions taken.",
            Self::Command => "This is command output (shell/terminal). Focus on the result and any errors or significant output.",
        }
    }
}

/// Extract structured data from content, falling back to heuristics if the
/// LLM is disabled or the call fails.
pub fn extract(
    content: &str,
    source: ExtractionSource,
    extraction_cfg: &ExtractionConfig,
    label_cfg: &LabelSuggestionConfig,
    importance_cfg: &ImportanceRatingConfig,
) -> AiResult<Extraction> {
    if !extraction_cfg.llm.enabled {
        let extraction = extract_heuristic(content);
        tracing::info!(mode = "heuristic", title = %extraction.title, "Extraction (LLM disabled)");
        return Ok(post_process(extraction));
    }

    match extract_via_llm(content, source, extraction_cfg, label_cfg, importance_cfg) {
        Ok(extraction) => {
            tracing::info!(mode = "llm", title = %extraction.title, confidence = extraction.confidence, "Extraction complete");
            Ok(post_process(extraction))
        }
        Err(_) => {
            let extraction = extract_heuristic(content);
            tracing::info!(mode = "heuristic", title = %extraction.title, confidence = extraction.confidence, "Extraction complete (fallback)");
            Ok(post_process(extraction))
        }
    }
}

/// Apply the topic-noise denylist/token-shape filter to both LLM and
/// heuristic output paths.
fn post_process(mut e: Extraction) -> Extraction {
    e.subjects = filter_topic_noise(&e.subjects);
    e
}

fn extract_via_llm(
    content: &str,
    source: ExtractionSource,
    extraction_cfg: &ExtractionConfig,
    label_cfg: &LabelSuggestionConfig,
    importance_cfg: &ImportanceRatingConfig,
) -> AiResult<Extraction> {
    let prompt = build_extraction_prompt(content, source, extraction_cfg, label_cfg, importance_cfg);
    let model = extraction_cfg.llm.model.as_cli_flag();

    match super::llm_subprocess::call_claude_with_model(&prompt, model) {
        Ok(response) => parse_extraction_response(&response),
        Err(e) => {
            tracing::warn!(model = %model, "LLM extraction failed: {}", e);
            Err(e)
        }
    }
}

/// Heuristic fallback extraction — no LLM needed.
fn extract_heuristic(content: &str) -> Extraction {
    tracing::debug!(content_len = content.len(), "Heuristic extraction");
    let clean = super::cleaner::clean_text(content);
    let words: Vec<&str> = clean.split_whitespace().collect();

    let title = truncate_safe(&clean, 57).to_string();
    let title = if clean.len() > 60 { format!("{}...", title) } else { title };

    let subjects = super::cleaner::extract_topics(content);

    let summary = truncate_safe(&clean, 197).to_string();
    let summary = if clean.len() > 200 { format!("{}...", summary) } else { summary };

    let importance = if words.len() > 100 {
        0.6
    } else if words.len() > 30 {
        0.5
    } else {
        0.4
    };

    let intent = clean
        .split(|c| c == '.' || c == '\n')
        .find(|s| !s.trim().is_empty())
        .map(|s| s.trim().to_string())
        .unwrap_or_default();

    let questions: Vec<String> = clean
        .split(|c| c == '.' || c == '\n')
        .filter(|s| s.trim_end().ends_with('?'))
        .map(|s| s.trim().to_string())
        .take(3)
        .collect();

    Extraction {
        title,
        subjects,
        summary,
        confidence: 0.3,
        labels: vec![],
        importance,
        intent,
        questions,
    }
}

fn build_extraction_prompt(
    content: &str,
    source: ExtractionSource,
    extraction_cfg: &ExtractionConfig,
    label_cfg: &LabelSuggestionConfig,
    importance_cfg: &ImportanceRatingConfig,
) -> String {
    let truncated = truncate_safe(content, extraction_cfg.max_content_chars);

    let label_vocab: Vec<&str> = label_cfg.label_vocabulary.iter().map(|s| s.as_str()).collect();
    let noise_words: Vec<&str> = extraction_cfg.topic_noise_words.iter().map(|s| s.as_str()).collect();
    let score_map = &importance_cfg.score_map;

    format!(
        r#"You are a memory extraction system. Analyze this {source_type} content and return structured metadata as JSON only.

## Source context
{guidance}

## Output format (JSON only, no markdown, no explanation)
{{"title":"...","subjects":["..."],"summary":"...","confidence":0.0-1.0,"labels":["..."],"importance":0.0-1.0,"intent":"...","questions":["..."]}}

## Rules

### Title (max 50 chars)
- Be SPECIFIC and descriptive. Capture the core subject.
- Never start with generic prefixes like "Content:", "File:", "Analysis:", "Code:", "Output:".
- Good: "SQLite bridge storage insert logic", "Gossip cycle embedding similarity phase"
- Bad: "Code analysis", "File content", "Output review"

### Subjects (topics, 2-5 items)
- Extract concrete technical topics, concepts, or entities.
- Exclude noise words: {noise_words}
- Prefer specific terms (e.g. "rusqlite", "TF-IDF cosine") over generic ones ("code", "data").

### Confidence (0.0-1.0)
- Set 0.0 for noise that should NOT become a memory thread:
  build logs, test runner output, binary/encoded content, boilerplate < 3 meaningful phrases,
  repetitive output, dependency lists, lock files, auto-generated content.
- 0.3-0.5: low-value but potentially useful (short exchanges, routine operations).
- 0.6-0.8: substantial content worth remembering (implementations, decisions, debugging).
- 0.9-1.0: critical content (architecture decisions, bug root causes, key insights).

### Labels (from vocabulary)
Choose from: [{label_vocab}]
You may add 1 custom label if none fit.

### Importance (0.0-1.0)
- {critical:.1} = critical (architecture decisions, blockers, breaking changes)
- {high:.1} = high (implementation details, bug fixes, configuration)
- {normal:.1} = normal (exploration, questions, learning)
- {low:.1} = low (chit-chat, meta-discussion, routine)
- {disposable:.1} = disposable (one-off debug, transient logs, ephemeral)

### Intent
One short imperative clause describing what the content is asking for or trying to accomplish. Empty string if none.

### Questions
Up to 3 literal questions present in the content, verbatim.

### Summary (max 200 chars)
Concise description of what this content contains and why it matters.

## Content ({source_type}):
{content}"#,
        source_type = source.as_str(),
        guidance = source.guidance(),
        noise_words = noise_words.join(", "),
        label_vocab = label_vocab.join(", "),
        critical = score_map.critical,
        high = score_map.high,
        normal = score_map.normal,
        low = score_map.low,
        disposable = score_map.disposable,
        content = truncated,
    )
}

fn parse_extraction_response(response: &str) -> AiResult<Extraction> {
    let json_str = if let Some(start) = response.find('{') {
        if let Some(end) = response.rfind('}') {
            &response[start..=end]
        } else {
            response
        }
    } else {
        response
    };

    serde_json::from_str(json_str).map_err(|e| {
        crate::AiError::InvalidInput(format!("Failed to parse extraction: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heuristic_extracts_questions() {
        let e = extract_heuristic("What is the bridge weight decay rate? It is 1.0 day half-life.");
        assert!(e.questions.iter().any(|q| q.contains("bridge weight decay rate")));
    }

    #[test]
    fn heuristic_title_truncates_on_char_boundary() {
        let content = "caf\u{00e9} ".repeat(20);
        let e = extract_heuristic(&content);
        assert!(e.title.is_char_boundary(e.title.len()));
    }
}
