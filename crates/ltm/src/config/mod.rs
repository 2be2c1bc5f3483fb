use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{LtmError, Result};

/// Main configuration structure for ltm
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Database location
    #[serde(default)]
    pub storage: StorageConfig,
    /// Identity of the primary agent
    #[serde(default)]
    pub agent: AgentConfig,
    /// Context injection budget
    #[serde(default)]
    pub budget: BudgetConfig,
    /// Decay horizons and compaction sizes
    #[serde(default)]
    pub decay: DecayConfig,
    /// Auto-linking policy
    #[serde(default)]
    pub linking: LinkingConfig,
    /// Recall defaults
    #[serde(default)]
    pub search: SearchConfig,
    /// Curiosity queue scoring
    #[serde(default)]
    pub curiosity: CuriosityConfig,
    /// Embedding model configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Optional memory caps
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Signing key lookup
    #[serde(default)]
    pub signing: SigningConfig,
}

impl Config {
    /// Load configuration from an explicit path, or search the default
    /// locations (`~/.ltm/config.toml`, `<config_dir>/ltm/config.toml`,
    /// `./ltm.toml`) and fall back to defaults when none exists.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::from_file(path);
        }

        let default_paths = [
            dirs::home_dir().map(|h| h.join(".ltm").join("config.toml")),
            dirs::config_dir().map(|c| c.join("ltm").join("config.toml")),
            Some(PathBuf::from("ltm.toml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                return Self::from_file(path);
            }
        }

        tracing::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        tracing::info!("Loading config from: {}", path.display());
        let content = std::fs::read_to_string(path).map_err(|e| {
            LtmError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        toml::from_str(&content)
            .map_err(|e| LtmError::Config(format!("Failed to parse config: {e}")))
    }
}

/// Database location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path of the SQLite database file
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".ltm"))
        .unwrap_or_else(|| PathBuf::from(".ltm"))
        .join("memories.db")
}

/// Identity of the primary agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Stable agent id used as the owner of memories
    #[serde(default = "default_agent_id")]
    pub id: String,
    /// Display name used in the context header
    #[serde(default = "default_agent_name")]
    pub name: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            id: default_agent_id(),
            name: default_agent_name(),
        }
    }
}

fn default_agent_id() -> String {
    "default".to_string()
}

fn default_agent_name() -> String {
    "Agent".to_string()
}

/// Context injection budget
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Total context window of the host model, in tokens
    #[serde(default = "default_context_window")]
    pub context_window: usize,
    /// Share of the context window available to memories
    #[serde(default = "default_context_fraction")]
    pub context_fraction: f64,
    /// Explicit token budget; overrides the fraction when set
    #[serde(default)]
    pub max_tokens: Option<usize>,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            context_window: default_context_window(),
            context_fraction: default_context_fraction(),
            max_tokens: None,
        }
    }
}

fn default_context_window() -> usize {
    200_000
}

fn default_context_fraction() -> f64 {
    0.10
}

/// Decay horizons (days) and confidence steps per impact level
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecayConfig {
    #[serde(default = "default_low_horizon_days")]
    pub low_horizon_days: i64,
    #[serde(default = "default_medium_horizon_days")]
    pub medium_horizon_days: i64,
    #[serde(default = "default_high_horizon_days")]
    pub high_horizon_days: i64,
    #[serde(default = "default_low_confidence_step")]
    pub low_confidence_step: f64,
    #[serde(default = "default_medium_confidence_step")]
    pub medium_confidence_step: f64,
    #[serde(default = "default_high_confidence_step")]
    pub high_confidence_step: f64,
    /// Confidence never decays below this value
    #[serde(default = "default_confidence_floor")]
    pub confidence_floor: f64,
    /// Maximum characters of a one-line summary (LOW impact)
    #[serde(default = "default_one_line_max_chars")]
    pub one_line_max_chars: usize,
    /// Maximum sentences of a paragraph summary (MEDIUM impact)
    #[serde(default = "default_paragraph_max_sentences")]
    pub paragraph_max_sentences: usize,
    /// Maximum characters of a technical summary (HIGH impact)
    #[serde(default = "default_technical_max_chars")]
    pub technical_max_chars: usize,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            low_horizon_days: default_low_horizon_days(),
            medium_horizon_days: default_medium_horizon_days(),
            high_horizon_days: default_high_horizon_days(),
            low_confidence_step: default_low_confidence_step(),
            medium_confidence_step: default_medium_confidence_step(),
            high_confidence_step: default_high_confidence_step(),
            confidence_floor: default_confidence_floor(),
            one_line_max_chars: default_one_line_max_chars(),
            paragraph_max_sentences: default_paragraph_max_sentences(),
            technical_max_chars: default_technical_max_chars(),
        }
    }
}

fn default_low_horizon_days() -> i64 {
    1
}

fn default_medium_horizon_days() -> i64 {
    7
}

fn default_high_horizon_days() -> i64 {
    30
}

fn default_low_confidence_step() -> f64 {
    0.3
}

fn default_medium_confidence_step() -> f64 {
    0.2
}

fn default_high_confidence_step() -> f64 {
    0.1
}

fn default_confidence_floor() -> f64 {
    0.1
}

fn default_one_line_max_chars() -> usize {
    80
}

fn default_paragraph_max_sentences() -> usize {
    3
}

fn default_technical_max_chars() -> usize {
    400
}

/// Auto-linking policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkingConfig {
    /// Minimum cosine similarity for a RELATES_TO link
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    /// Maximum auto-links created for one memory
    #[serde(default = "default_max_links")]
    pub max_links: usize,
}

impl Default for LinkingConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            max_links: default_max_links(),
        }
    }
}

fn default_similarity_threshold() -> f32 {
    0.5
}

fn default_max_links() -> usize {
    10
}

/// Recall defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_limit")]
    pub default_limit: usize,
    /// Semantic hits below this score are dropped
    #[serde(default = "default_min_score")]
    pub min_score: f32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_search_limit(),
            min_score: default_min_score(),
        }
    }
}

fn default_search_limit() -> usize {
    10
}

fn default_min_score() -> f32 {
    0.3
}

/// Curiosity queue scoring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CuriosityConfig {
    /// Points per recurrence
    #[serde(default = "default_recurrence_weight")]
    pub recurrence_weight: i64,
    /// Bonus for items seen within the recency window
    #[serde(default = "default_recency_bonus")]
    pub recency_bonus: i64,
    #[serde(default = "default_recency_window_days")]
    pub recency_window_days: i64,
    /// Word-overlap ratio at which two questions count as the same
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f64,
}

impl Default for CuriosityConfig {
    fn default() -> Self {
        Self {
            recurrence_weight: default_recurrence_weight(),
            recency_bonus: default_recency_bonus(),
            recency_window_days: default_recency_window_days(),
            match_threshold: default_match_threshold(),
        }
    }
}

fn default_recurrence_weight() -> i64 {
    10
}

fn default_recency_bonus() -> i64 {
    5
}

fn default_recency_window_days() -> i64 {
    7
}

fn default_match_threshold() -> f64 {
    0.85
}

/// Embedding model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Disable to run in keyword-only mode
    #[serde(default = "default_embedding_enabled")]
    pub enabled: bool,
    /// Model tag stored next to every vector
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            enabled: default_embedding_enabled(),
            model: default_embedding_model(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_embedding_enabled() -> bool {
    true
}

fn default_embedding_model() -> String {
    "BAAI/bge-small-en-v1.5".to_string()
}

fn default_batch_size() -> usize {
    32
}

/// Optional caps on stored memories. `None` means unlimited.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default)]
    pub max_per_agent: Option<usize>,
    #[serde(default)]
    pub max_per_project: Option<usize>,
    #[serde(default)]
    pub max_per_kind: Option<usize>,
}

/// Signing key lookup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningConfig {
    /// Environment variable that holds the agent's signing key
    #[serde(default = "default_key_env")]
    pub key_env: String,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            key_env: default_key_env(),
        }
    }
}

fn default_key_env() -> String {
    "LTM_SIGNING_KEY".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(config.storage.db_path.ends_with("memories.db"));
        assert_eq!(config.agent.id, "default");
        assert_eq!(config.budget.context_window, 200_000);
        assert_eq!(config.budget.context_fraction, 0.10);
        assert!(config.budget.max_tokens.is_none());
        assert_eq!(config.decay.low_horizon_days, 1);
        assert_eq!(config.decay.medium_horizon_days, 7);
        assert_eq!(config.decay.high_horizon_days, 30);
        assert_eq!(config.decay.confidence_floor, 0.1);
        assert_eq!(config.linking.similarity_threshold, 0.5);
        assert_eq!(config.curiosity.recurrence_weight, 10);
        assert!(config.embedding.enabled);
        assert!(config.limits.max_per_agent.is_none());
        assert_eq!(config.signing.key_env, "LTM_SIGNING_KEY");
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
[storage]
db_path = "/tmp/ltm/test.db"

[agent]
id = "anima"
name = "Anima"

[budget]
context_window = 100000
context_fraction = 0.05
max_tokens = 1500

[decay]
low_horizon_days = 2
confidence_floor = 0.2

[linking]
similarity_threshold = 0.75
max_links = 3

[embedding]
enabled = false

[limits]
max_per_agent = 500
"#;

        let config: Config = toml::from_str(toml_str).expect("Failed to parse TOML");

        assert_eq!(config.storage.db_path, PathBuf::from("/tmp/ltm/test.db"));
        assert_eq!(config.agent.name, "Anima");
        assert_eq!(config.budget.context_window, 100_000);
        assert_eq!(config.budget.max_tokens, Some(1500));
        assert_eq!(config.decay.low_horizon_days, 2);
        assert_eq!(config.decay.medium_horizon_days, 7);
        assert_eq!(config.decay.confidence_floor, 0.2);
        assert_eq!(config.linking.similarity_threshold, 0.75);
        assert_eq!(config.linking.max_links, 3);
        assert!(!config.embedding.enabled);
        assert_eq!(config.limits.max_per_agent, Some(500));
        assert!(config.limits.max_per_kind.is_none());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str("[agent]\nname = \"Nova\"\n").expect("parse");
        assert_eq!(config.agent.name, "Nova");
        assert_eq!(config.agent.id, "default");
        assert_eq!(config.search.default_limit, 10);
        assert_eq!(config.curiosity.recency_window_days, 7);
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[budget]\nmax_tokens = 42\n").expect("write");

        let config = Config::load(Some(&path)).expect("load");
        assert_eq!(config.budget.max_tokens, Some(42));
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let result = Config::load(Some(Path::new("/nonexistent/ltm/config.toml")));
        assert!(matches!(result, Err(LtmError::Config(_))));
    }
}
