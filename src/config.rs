//! Project configuration — loaded leniently from `.ai/config.json`: any
//! field that fails to parse or is absent falls back to its default and a
//! warning is logged, rather than refusing to start.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::*;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClaudeModel {
    Haiku,
    Sonnet,
    Opus,
}

impl ClaudeModel {
    pub fn as_cli_flag(&self) -> &'static str {
        match self {
            Self::Haiku => "haiku",
            Self::Sonnet => "sonnet",
            Self::Opus => "opus",
        }
    }
}

impl Default for ClaudeModel {
    fn default() -> Self {
        Self::Haiku
    }
}

fn parse_model(s: &str) -> ClaudeModel {
    match s.to_lowercase().as_str() {
        "sonnet" => ClaudeModel::Sonnet,
        "opus" => ClaudeModel::Opus,
        _ => ClaudeModel::Haiku,
    }
}

/// What to do when an LLM-backed task call fails or times out.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LlmFailureMode {
    RetryWithHaiku,
    Skip,
    HeuristicRegex,
}

impl Default for LlmFailureMode {
    fn default() -> Self {
        Self::RetryWithHaiku
    }
}

/// Per-task LLM configuration shared by extraction, coherence,
/// reactivation, synthesis and label suggestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskLlmConfig {
    pub model: ClaudeModel,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub enabled: bool,
    pub failure_mode: LlmFailureMode,
}

impl Default for TaskLlmConfig {
    fn default() -> Self {
        Self {
            model: ClaudeModel::Haiku,
            timeout_secs: EXTRACTION_TIMEOUT_SECS,
            max_retries: 1,
            enabled: true,
            failure_mode: LlmFailureMode::RetryWithHaiku,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingMode {
    OnnxWithFallback,
    OnnxOnly,
    TfidfOnly,
    Disabled,
}

impl Default for EmbeddingMode {
    fn default() -> Self {
        Self::OnnxWithFallback
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSystemConfig {
    pub mode: EmbeddingMode,
    /// Similarity threshold when ONNX embeddings are active.
    pub onnx_threshold: f64,
    /// Similarity threshold when the TF-IDF fallback is active (coarser
    /// vectors need a lower bar).
    pub tfidf_threshold: f64,
}

impl Default for EmbeddingSystemConfig {
    fn default() -> Self {
        Self {
            mode: EmbeddingMode::OnnxWithFallback,
            onnx_threshold: BRIDGE_CREATE_THRESHOLD,
            tfidf_threshold: BRIDGE_CREATE_THRESHOLD - 0.1,
        }
    }
}

impl EmbeddingSystemConfig {
    pub fn active_threshold(&self, use_onnx: bool) -> f64 {
        if use_onnx {
            self.onnx_threshold
        } else {
            self.tfidf_threshold
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    pub llm: TaskLlmConfig,
    pub max_content_chars: usize,
    pub min_capture_length: usize,
    pub topic_noise_words: Vec<String>,
    pub topic_aliases: HashMap<String, String>,
    pub min_topic_frequency: usize,
    pub skip_tools: Vec<String>,
    pub enable_skip_signal: bool,
    pub pending_context_ttl_secs: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            llm: TaskLlmConfig::default(),
            max_content_chars: EXTRACTION_MAX_CONTENT_CHARS,
            min_capture_length: MIN_CAPTURE_LENGTH,
            topic_noise_words: TOPIC_NOISE_WORDS.iter().map(|s| s.to_string()).collect(),
            topic_aliases: HashMap::new(),
            min_topic_frequency: 2,
            skip_tools: vec!["TodoWrite".to_string()],
            enable_skip_signal: true,
            pending_context_ttl_secs: PENDING_CONTEXT_TTL_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoherenceConfig {
    pub llm: TaskLlmConfig,
    pub max_context_chars: usize,
    pub child_threshold: f64,
    pub orphan_threshold: f64,
    pub fallback_score: f64,
}

impl Default for CoherenceConfig {
    fn default() -> Self {
        Self {
            llm: TaskLlmConfig::default(),
            max_context_chars: 1500,
            child_threshold: COHERENCE_CHILD_THRESHOLD,
            orphan_threshold: COHERENCE_ORPHAN_THRESHOLD,
            fallback_score: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactivationConfig {
    pub llm: TaskLlmConfig,
    pub auto_threshold: f64,
    pub borderline_threshold: f64,
    pub max_context_chars: usize,
    pub max_topics: usize,
    pub max_summary_chars: usize,
}

impl Default for ReactivationConfig {
    fn default() -> Self {
        Self {
            llm: TaskLlmConfig::default(),
            auto_threshold: REACTIVATE_AUTO_THRESHOLD,
            borderline_threshold: REACTIVATE_BORDERLINE_THRESHOLD,
            max_context_chars: 500,
            max_topics: 5,
            max_summary_chars: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    pub llm: TaskLlmConfig,
    pub max_messages: usize,
    pub max_message_chars: usize,
    pub max_output_chars: usize,
    pub language: String,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            llm: TaskLlmConfig::default(),
            max_messages: 10,
            max_message_chars: 500,
            max_output_chars: 1000,
            language: "en".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelSuggestionConfig {
    pub llm: TaskLlmConfig,
    pub auto_suggest_on_extraction: bool,
    pub label_vocabulary: Vec<String>,
    pub label_blocklist: Vec<String>,
    pub allow_custom_labels: bool,
    pub batch_size: usize,
}

impl Default for LabelSuggestionConfig {
    fn default() -> Self {
        Self {
            llm: TaskLlmConfig::default(),
            auto_suggest_on_extraction: true,
            label_vocabulary: [
                "architecture", "bugfix", "feature", "refactor", "config",
                "investigation", "decision", "documentation", "testing",
                "performance", "security", "dependency", "question", "todo",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            label_blocklist: LABEL_BLOCKLIST.iter().map(|s| s.to_string()).collect(),
            allow_custom_labels: true,
            batch_size: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportanceScoreMap {
    pub critical: f64,
    pub high: f64,
    pub normal: f64,
    pub low: f64,
    pub disposable: f64,
}

impl Default for ImportanceScoreMap {
    fn default() -> Self {
        Self { critical: 1.0, high: 0.8, normal: 0.5, low: 0.3, disposable: 0.1 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportanceRatingConfig {
    pub score_map: ImportanceScoreMap,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ThreadMatchingMode {
    EmbeddingOnly,
    EmbeddingPlusLlm,
}

impl Default for ThreadMatchingMode {
    fn default() -> Self {
        Self::EmbeddingOnly
    }
}

/// Classifier thresholds (§4.4's 4-step decision policy).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadMatchingConfig {
    pub mode: ThreadMatchingMode,
    pub embedding: EmbeddingSystemConfig,
    pub continue_threshold: f64,
    pub reactivate_threshold: f64,
    pub capacity_suspend_threshold: f64,
}

impl Default for ThreadMatchingConfig {
    fn default() -> Self {
        Self {
            mode: ThreadMatchingMode::EmbeddingOnly,
            embedding: EmbeddingSystemConfig::default(),
            continue_threshold: CONTINUE_THRESHOLD,
            reactivate_threshold: RECALL_REACTIVATION_THRESHOLD,
            capacity_suspend_threshold: 0.85,
        }
    }
}

/// GossipPropagator configuration (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GossipConfig {
    pub embedding: EmbeddingSystemConfig,
    pub create_threshold: f64,
    pub propagation_enabled: bool,
    pub propagation_max_depth: u32,
    pub propagation_neighbor_min_weight: f64,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            embedding: EmbeddingSystemConfig::default(),
            create_threshold: BRIDGE_CREATE_THRESHOLD,
            propagation_enabled: true,
            propagation_max_depth: BRIDGE_PROPAGATION_MAX_DEPTH,
            propagation_neighbor_min_weight: BRIDGE_PROPAGATION_NEIGHBOR_MIN_WEIGHT,
        }
    }
}

/// Decay & lifecycle configuration (§3 invariants, §4.5/§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecayConfig {
    pub thread_suspend_threshold: f64,
    pub thread_half_life_days: f64,
    pub thread_use_boost: f64,
    pub bridge_half_life_days: f64,
    pub bridge_death_threshold: f64,
    pub bridge_child_death_threshold: f64,
    pub bridge_use_boost: f64,
    pub archive_after_beats: u64,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            thread_suspend_threshold: THREAD_SUSPEND_THRESHOLD,
            thread_half_life_days: THREAD_HALF_LIFE_DAYS,
            thread_use_boost: THREAD_USE_BOOST,
            bridge_half_life_days: BRIDGE_HALF_LIFE_DAYS,
            bridge_death_threshold: BRIDGE_DEATH_THRESHOLD,
            bridge_child_death_threshold: BRIDGE_CHILD_DEATH_THRESHOLD,
            bridge_use_boost: BRIDGE_USE_BOOST,
            archive_after_beats: ARCHIVE_AFTER_BEATS,
        }
    }
}

/// Single-project daemon configuration — no connection pool or capture
/// workers, unlike the teacher's multi-agent daemon: one project, one
/// socket, one maintenance ticker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    pub maintenance_tick_secs: u64,
    pub rpc_timeout_secs: u64,
    pub shutdown_drain_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            maintenance_tick_secs: MAINTENANCE_TICK_SECS,
            rpc_timeout_secs: RPC_REQUEST_TIMEOUT_SECS,
            shutdown_drain_secs: SHUTDOWN_DRAIN_SECS,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ThreadMode {
    Light,
    Normal,
    Heavy,
    Max,
}

impl Default for ThreadMode {
    fn default() -> Self {
        Self::Normal
    }
}

impl ThreadMode {
    pub fn quota(&self) -> usize {
        match self {
            Self::Light => QUOTA_LIGHT,
            Self::Normal => QUOTA_NORMAL,
            Self::Heavy => QUOTA_HEAVY,
            Self::Max => QUOTA_MAX,
        }
    }
}

/// Advisory token budgets surfaced to callers planning recall/injection
/// payloads — informational only, the actual enforcement is `InjectionConfig`'s
/// `budget_chars`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenLimitsConfig {
    pub recall: usize,
    pub injection: usize,
}

impl Default for TokenLimitsConfig {
    fn default() -> Self {
        Self {
            recall: (INJECT_BUDGET_CHARS as f64 / INJECT_CHARS_PER_TOKEN) as usize,
            injection: (INJECT_BUDGET_CHARS as f64 / INJECT_CHARS_PER_TOKEN) as usize,
        }
    }
}

impl std::str::FromStr for ThreadMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "light" => Ok(Self::Light),
            "normal" => Ok(Self::Normal),
            "heavy" => Ok(Self::Heavy),
            "max" => Ok(Self::Max),
            _ => Err(format!("Unknown thread mode: {}", s)),
        }
    }
}

/// Injection budget configuration (§4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectionConfig {
    pub budget_chars: usize,
    pub chars_per_token_estimate: f64,
    pub max_results: usize,
}

impl Default for InjectionConfig {
    fn default() -> Self {
        Self {
            budget_chars: INJECT_BUDGET_CHARS,
            chars_per_token_estimate: INJECT_CHARS_PER_TOKEN,
            max_results: RETRIEVAL_MAX_RESULTS,
        }
    }
}

/// Aggregate project configuration, persisted at `.ai/config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub enabled: bool,
    pub mode: ThreadMode,
    /// Informational project label surfaced by `ai status`; has no effect
    /// on behavior.
    pub project_name: Option<String>,
    /// When `false`, the capture pipeline is disabled: `CaptureProcessor`
    /// still accepts RPC calls but declines to run `process_input`.
    pub auto_capture: bool,
    /// Explicit override of `mode.quota()` — when set, `enforce_quota` uses
    /// this instead of the mode-derived quota.
    pub active_threads_limit: Option<usize>,
    pub token_limits: TokenLimitsConfig,
    pub extraction: ExtractionConfig,
    pub coherence: CoherenceConfig,
    pub reactivation: ReactivationConfig,
    pub synthesis: SynthesisConfig,
    pub label_suggestion: LabelSuggestionConfig,
    pub importance: ImportanceRatingConfig,
    pub thread_matching: ThreadMatchingConfig,
    pub gossip: GossipConfig,
    pub decay: DecayConfig,
    pub daemon: DaemonConfig,
    pub injection: InjectionConfig,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: ThreadMode::default(),
            project_name: None,
            auto_capture: true,
            active_threads_limit: None,
            token_limits: TokenLimitsConfig::default(),
            extraction: ExtractionConfig::default(),
            coherence: CoherenceConfig::default(),
            reactivation: ReactivationConfig::default(),
            synthesis: SynthesisConfig::default(),
            label_suggestion: LabelSuggestionConfig::default(),
            importance: ImportanceRatingConfig::default(),
            thread_matching: ThreadMatchingConfig::default(),
            gossip: GossipConfig::default(),
            decay: DecayConfig::default(),
            daemon: DaemonConfig::default(),
            injection: InjectionConfig::default(),
        }
    }
}

impl AiConfig {
    /// Load from `.ai/config.json`, falling back to defaults if absent or
    /// malformed — never refuses to start over a bad config file.
    pub fn load(project_root: &Path) -> Self {
        let path = crate::storage::path_utils::config_path(project_root);
        let raw = match std::fs::read_to_string(&path) {
            Ok(s) => s,
            Err(_) => return Self::default(),
        };
        let value: serde_json::Value = match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "config.json invalid JSON, using defaults");
                return Self::default();
            }
        };
        Self::from_value(&value)
    }

    pub fn save(&self, project_root: &Path) -> crate::AiResult<()> {
        let path = crate::storage::path_utils::config_path(project_root);
        crate::storage::store::atomic_write_json(&path, self)
    }

    /// Lenient parse: fields that deserialize cleanly override defaults
    /// field-by-field, missing/malformed fields keep their default value.
    pub fn from_value(value: &serde_json::Value) -> Self {
        let mut cfg = Self::default();
        match serde_json::from_value::<Self>(value.clone()) {
            Ok(parsed) => return parsed,
            Err(e) => tracing::warn!(error = %e, "config.json partially invalid, merging field-by-field"),
        }

        // Field-by-field fallback for partially-valid documents.
        if let Some(v) = value.get("enabled").and_then(|v| v.as_bool()) {
            cfg.enabled = v;
        }
        if let Some(v) = value.get("mode").and_then(|v| v.as_str()) {
            if let Ok(m) = v.parse() {
                cfg.mode = m;
            }
        }
        cfg.validate();
        cfg
    }

    pub fn validate(&mut self) {
        clamp_01(&mut self.thread_matching.continue_threshold, "thread_matching.continue_threshold");
        clamp_01(&mut self.thread_matching.reactivate_threshold, "thread_matching.reactivate_threshold");
        clamp_01(&mut self.thread_matching.capacity_suspend_threshold, "thread_matching.capacity_suspend_threshold");
        if self.thread_matching.continue_threshold >= self.thread_matching.reactivate_threshold {
            std::mem::swap(
                &mut self.thread_matching.continue_threshold,
                &mut self.thread_matching.reactivate_threshold,
            );
        }
        if self.thread_matching.reactivate_threshold >= self.thread_matching.capacity_suspend_threshold {
            std::mem::swap(
                &mut self.thread_matching.reactivate_threshold,
                &mut self.thread_matching.capacity_suspend_threshold,
            );
        }
        clamp_01(&mut self.coherence.child_threshold, "coherence.child_threshold");
        clamp_01(&mut self.coherence.orphan_threshold, "coherence.orphan_threshold");
        if self.coherence.orphan_threshold >= self.coherence.child_threshold {
            std::mem::swap(&mut self.coherence.orphan_threshold, &mut self.coherence.child_threshold);
        }
        clamp_01(&mut self.decay.thread_suspend_threshold, "decay.thread_suspend_threshold");
        clamp_01(&mut self.decay.bridge_death_threshold, "decay.bridge_death_threshold");
        if self.decay.thread_half_life_days <= 0.0 {
            tracing::warn!("decay.thread_half_life_days must be > 0, resetting to default");
            self.decay.thread_half_life_days = THREAD_HALF_LIFE_DAYS;
        }
        if self.decay.bridge_half_life_days <= 0.0 {
            tracing::warn!("decay.bridge_half_life_days must be > 0, resetting to default");
            self.decay.bridge_half_life_days = BRIDGE_HALF_LIFE_DAYS;
        }
    }
}

fn clamp_01(val: &mut f64, name: &str) {
    if !(0.0..=1.0).contains(val) {
        tracing::warn!(field = name, value = *val, "config value out of [0,1] — clamping");
        *val = val.clamp(0.0, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_corrected_thresholds() {
        let cfg = AiConfig::default();
        assert_eq!(cfg.thread_matching.continue_threshold, 0.35);
        assert_eq!(cfg.thread_matching.reactivate_threshold, 0.5);
        assert_eq!(cfg.gossip.create_threshold, 0.50);
        assert_eq!(cfg.decay.bridge_half_life_days, 1.0);
        assert_eq!(cfg.decay.thread_half_life_days, 1.5);
        assert_eq!(cfg.coherence.child_threshold, 0.6);
        assert_eq!(cfg.coherence.orphan_threshold, 0.30);
    }

    #[test]
    fn validate_swaps_inverted_thresholds() {
        let mut cfg = AiConfig::default();
        cfg.thread_matching.continue_threshold = 0.8;
        cfg.thread_matching.reactivate_threshold = 0.2;
        cfg.validate();
        assert!(cfg.thread_matching.continue_threshold < cfg.thread_matching.reactivate_threshold);
    }

    #[test]
    fn thread_mode_quotas_match_spec() {
        assert_eq!(ThreadMode::Light.quota(), 15);
        assert_eq!(ThreadMode::Normal.quota(), 50);
        assert_eq!(ThreadMode::Heavy.quota(), 100);
        assert_eq!(ThreadMode::Max.quota(), 200);
    }

    #[test]
    fn load_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = AiConfig::load(dir.path());
        assert!(cfg.enabled);
    }

    #[test]
    fn default_config_enables_auto_capture_with_no_quota_override() {
        let cfg = AiConfig::default();
        assert!(cfg.auto_capture);
        assert_eq!(cfg.active_threads_limit, None);
        assert_eq!(cfg.project_name, None);
        assert!(cfg.token_limits.recall > 0);
        assert!(cfg.token_limits.injection > 0);
    }
}
