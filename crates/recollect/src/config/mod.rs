use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{RecollectError, Result};
use crate::memory::types::MemoryTier;
use crate::summarizer::prompts::ARCHIVE_SUMMARY_PROMPT;

/// Main configuration structure for Recollect
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Tier capacities and archival behaviour
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Memory scoring thresholds and bonuses
    #[serde(default)]
    pub scoring: ScoringConfig,
    /// Knowledge base matching
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
    /// Vector-similarity channel
    #[serde(default)]
    pub vector: VectorConfig,
    /// Per-agent turn cache
    #[serde(default)]
    pub cache: CacheConfig,
    /// Background summarization
    #[serde(default)]
    pub summarizer: SummarizerConfig,
    /// Rendering of the injected sections
    #[serde(default)]
    pub injection: InjectionConfig,
}

impl Config {
    /// Load configuration from an explicit path, or search the default
    /// locations and fall back to defaults when nothing is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            tracing::info!("Loading config from: {}", path.display());
            return Self::from_file(path);
        }

        let default_paths = [
            dirs::home_dir().map(|h| h.join(".recollect").join("config.toml")),
            dirs::config_dir().map(|c| c.join("recollect").join("config.toml")),
            Some(PathBuf::from("recollect.toml")),
        ];

        for candidate in default_paths.iter().flatten() {
            if candidate.exists() {
                tracing::info!("Loading config from: {}", candidate.display());
                return Self::from_file(candidate);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Config::default())
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RecollectError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the store and scorers cannot work with
    pub fn validate(&self) -> Result<()> {
        let m = &self.memory;
        if m.active_capacity == 0
            || m.situational_capacity == 0
            || m.event_log_capacity == 0
            || m.archive_capacity == 0
        {
            return Err(RecollectError::Config(
                "tier capacities must be at least 1".to_string(),
            ));
        }
        if !(m.archive_fraction > 0.0 && m.archive_fraction <= 1.0) {
            return Err(RecollectError::Config(format!(
                "archive_fraction must be in (0, 1], got {}",
                m.archive_fraction
            )));
        }
        if self.knowledge.confidence_margin < 0.0 {
            return Err(RecollectError::Config(
                "confidence_margin must not be negative".to_string(),
            ));
        }
        if self.vector.enabled && !self.vector.endpoint.is_empty() {
            url::Url::parse(&self.vector.endpoint).map_err(|e| {
                RecollectError::Config(format!("invalid vector endpoint: {e}"))
            })?;
        }
        if self.summarizer.enabled && !self.summarizer.api_url.is_empty() {
            url::Url::parse(&self.summarizer.api_url).map_err(|e| {
                RecollectError::Config(format!("invalid summarizer api_url: {e}"))
            })?;
        }
        Ok(())
    }
}

/// Tier capacity and archival configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Raw recent history kept for the separate rendering path
    #[serde(default = "default_active_capacity")]
    pub active_capacity: usize,
    /// Legacy mid-term tier
    #[serde(default = "default_situational_capacity")]
    pub situational_capacity: usize,
    /// Primary mid-term tier
    #[serde(default = "default_event_log_capacity")]
    pub event_log_capacity: usize,
    /// Long-term compacted tier
    #[serde(default = "default_archive_capacity")]
    pub archive_capacity: usize,
    /// Share of a tier's capacity handed to archival on overflow
    #[serde(default = "default_archive_fraction")]
    pub archive_fraction: f32,
    /// Importance added to an aggregated entry when it changes tier
    #[serde(default = "default_archive_importance_bonus")]
    pub archive_importance_bonus: f32,
    /// Upper bound on summaries waiting for the background summarizer
    #[serde(default = "default_max_pending_summaries")]
    pub max_pending_summaries: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            active_capacity: default_active_capacity(),
            situational_capacity: default_situational_capacity(),
            event_log_capacity: default_event_log_capacity(),
            archive_capacity: default_archive_capacity(),
            archive_fraction: default_archive_fraction(),
            archive_importance_bonus: default_archive_importance_bonus(),
            max_pending_summaries: default_max_pending_summaries(),
        }
    }
}

impl MemoryConfig {
    /// Capacity of a tier
    pub fn capacity(&self, tier: MemoryTier) -> usize {
        match tier {
            MemoryTier::Active => self.active_capacity,
            MemoryTier::Situational => self.situational_capacity,
            MemoryTier::EventLog => self.event_log_capacity,
            MemoryTier::Archive => self.archive_capacity,
        }
    }

    /// Builder-style capacity override
    pub fn with_capacity(mut self, tier: MemoryTier, capacity: usize) -> Self {
        match tier {
            MemoryTier::Active => self.active_capacity = capacity,
            MemoryTier::Situational => self.situational_capacity = capacity,
            MemoryTier::EventLog => self.event_log_capacity = capacity,
            MemoryTier::Archive => self.archive_capacity = capacity,
        }
        self
    }
}

fn default_active_capacity() -> usize {
    6
}

fn default_situational_capacity() -> usize {
    20
}

fn default_event_log_capacity() -> usize {
    30
}

fn default_archive_capacity() -> usize {
    60
}

fn default_archive_fraction() -> f32 {
    0.25
}

fn default_archive_importance_bonus() -> f32 {
    0.1
}

fn default_max_pending_summaries() -> usize {
    256
}

/// Memory scoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Candidates scoring below this are rejected
    #[serde(default = "default_memory_score_threshold")]
    pub memory_score_threshold: f32,
    /// Budget of memories injected per turn
    #[serde(default = "default_max_injected_memories")]
    pub max_injected_memories: usize,
    #[serde(default = "default_archive_tier_bonus")]
    pub archive_tier_bonus: f32,
    #[serde(default = "default_event_log_tier_bonus")]
    pub event_log_tier_bonus: f32,
    #[serde(default = "default_situational_tier_bonus")]
    pub situational_tier_bonus: f32,
    #[serde(default = "default_pinned_bonus")]
    pub pinned_bonus: f32,
    #[serde(default = "default_user_edited_bonus")]
    pub user_edited_bonus: f32,
    /// Multiplier applied to an entry's activity signal
    #[serde(default = "default_activity_bonus")]
    pub activity_bonus: f32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            memory_score_threshold: default_memory_score_threshold(),
            max_injected_memories: default_max_injected_memories(),
            archive_tier_bonus: default_archive_tier_bonus(),
            event_log_tier_bonus: default_event_log_tier_bonus(),
            situational_tier_bonus: default_situational_tier_bonus(),
            pinned_bonus: default_pinned_bonus(),
            user_edited_bonus: default_user_edited_bonus(),
            activity_bonus: default_activity_bonus(),
        }
    }
}

fn default_memory_score_threshold() -> f32 {
    0.3
}

fn default_max_injected_memories() -> usize {
    8
}

fn default_archive_tier_bonus() -> f32 {
    0.15
}

fn default_event_log_tier_bonus() -> f32 {
    0.1
}

fn default_situational_tier_bonus() -> f32 {
    0.05
}

fn default_pinned_bonus() -> f32 {
    0.3
}

fn default_user_edited_bonus() -> f32 {
    0.1
}

fn default_activity_bonus() -> f32 {
    0.1
}

/// A named piece of context concatenated into the match text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSource {
    /// Source name, e.g. "context" or "personality"
    pub name: String,
    /// Render this source once per agent in the conversation
    #[serde(default)]
    pub per_agent: bool,
}

impl MatchSource {
    pub fn shared(name: &str) -> Self {
        Self {
            name: name.to_string(),
            per_agent: false,
        }
    }

    pub fn per_agent(name: &str) -> Self {
        Self {
            name: name.to_string(),
            per_agent: true,
        }
    }
}

/// Knowledge base matching configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// Budget of knowledge entries injected per turn
    #[serde(default = "default_max_injected_knowledge")]
    pub max_injected_knowledge: usize,
    /// Reward for a keyword-channel match
    #[serde(default = "default_keyword_match_bonus")]
    pub keyword_match_bonus: f32,
    /// Candidates scoring below this are rejected
    #[serde(default = "default_knowledge_score_threshold")]
    pub knowledge_score_threshold: f32,
    /// Minimum gap between the last accepted and first rejected candidate
    #[serde(default = "default_confidence_margin")]
    pub confidence_margin: f32,
    /// Sources concatenated into the match text
    #[serde(default = "default_match_sources")]
    pub match_sources: Vec<MatchSource>,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            max_injected_knowledge: default_max_injected_knowledge(),
            keyword_match_bonus: default_keyword_match_bonus(),
            knowledge_score_threshold: default_knowledge_score_threshold(),
            confidence_margin: default_confidence_margin(),
            match_sources: default_match_sources(),
        }
    }
}

fn default_max_injected_knowledge() -> usize {
    6
}

fn default_keyword_match_bonus() -> f32 {
    0.5
}

fn default_knowledge_score_threshold() -> f32 {
    0.1
}

fn default_confidence_margin() -> f32 {
    0.05
}

fn default_match_sources() -> Vec<MatchSource> {
    vec![MatchSource::shared("context")]
}

/// How vector hits that duplicate keyword hits are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FusionPolicy {
    /// Keyword channel wins; duplicate vector hits are dropped
    #[default]
    Exclude,
    /// Scores are summed and the entry is relabelled as a mixed match
    Merge,
}

/// Vector-similarity channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Endpoint of the remote similarity service
    #[serde(default)]
    pub endpoint: String,
    #[serde(default = "default_vector_top_k")]
    pub top_k: usize,
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f32,
    /// Multiplier applied to similarity when scoring vector hits
    #[serde(default = "default_similarity_weight")]
    pub similarity_weight: f32,
    /// Deadline for the synchronous wait on the vector channel
    #[serde(default = "default_vector_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub fusion: FusionPolicy,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: String::new(),
            top_k: default_vector_top_k(),
            min_similarity: default_min_similarity(),
            similarity_weight: default_similarity_weight(),
            timeout_ms: default_vector_timeout_ms(),
            fusion: FusionPolicy::default(),
        }
    }
}

fn default_vector_top_k() -> usize {
    10
}

fn default_min_similarity() -> f32 {
    0.6
}

fn default_similarity_weight() -> f32 {
    0.5
}

fn default_vector_timeout_ms() -> u64 {
    5000
}

/// Turn cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    /// Game ticks after which a cached turn is recomputed
    #[serde(default = "default_cache_ttl_ticks")]
    pub ttl_ticks: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            ttl_ticks: default_cache_ttl_ticks(),
        }
    }
}

fn default_cache_enabled() -> bool {
    true
}

// ~2 seconds of game time at 60 ticks per second
fn default_cache_ttl_ticks() -> u64 {
    120
}

/// Remote summarizer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerConfig {
    #[serde(default)]
    pub enabled: bool,
    /// OpenAI-compatible API base URL
    #[serde(default)]
    pub api_url: String,
    /// Environment variable name for API key
    #[serde(default = "default_summarizer_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_summarizer_model")]
    pub model: String,
    #[serde(default = "default_summarizer_timeout_secs")]
    pub timeout_secs: u64,
    /// Template with {agent}, {kind}, {tier} and {entries} placeholders
    #[serde(default = "default_prompt_template")]
    pub prompt_template: String,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: String::new(),
            api_key_env: default_summarizer_api_key_env(),
            model: default_summarizer_model(),
            timeout_secs: default_summarizer_timeout_secs(),
            prompt_template: default_prompt_template(),
        }
    }
}

fn default_summarizer_api_key_env() -> String {
    "SUMMARIZER_API_KEY".to_string()
}

fn default_summarizer_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_summarizer_timeout_secs() -> u64 {
    30
}

fn default_prompt_template() -> String {
    ARCHIVE_SUMMARY_PROMPT.to_string()
}

/// Section headers used when rendering the injected text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectionConfig {
    #[serde(default = "default_memory_header")]
    pub memory_header: String,
    #[serde(default = "default_knowledge_header")]
    pub knowledge_header: String,
}

impl Default for InjectionConfig {
    fn default() -> Self {
        Self {
            memory_header: default_memory_header(),
            knowledge_header: default_knowledge_header(),
        }
    }
}

fn default_memory_header() -> String {
    "[Memories]".to_string()
}

fn default_knowledge_header() -> String {
    "[Knowledge]".to_string()
}
