//! Configuration parsing and validation.
//!
//! Folio is configured via a TOML file (default: `config/folio.toml`).
//! Every section is optional; an empty file yields a working configuration
//! with the vector index disabled, in which every answer is generated
//! without retrieved context.
//!
//! # Example Configuration
//!
//! ```toml
//! [llm]
//! model = "gpt-4o-mini"
//! api_key_env = "OPENAI_API_KEY"
//!
//! [embedding]
//! model = "text-embedding-3-small"
//!
//! [vector]
//! provider = "chroma"
//! url = "http://localhost:8000"
//! collection = "portfolio"
//!
//! [retrieval]
//! rerank = true
//!
//! [retrieval.fusion]
//! strategy = "weighted"
//! semantic_weight = 0.7
//! keyword_weight = 0.3
//! keyword_scale = 10.0
//!
//! [context]
//! max_context_tokens = 2000
//! max_history_tokens = 500
//!
//! [cache]
//! ttl_secs = 1800
//! max_size = 100
//!
//! [pricing."gpt-4o-mini"]
//! input_per_million = 0.15
//! output_per_million = 0.60
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use folio_rag_core::context::ContextBudget;
use folio_rag_core::ledger::{ModelPricing, PriceTable};
use folio_rag_core::merge::FusionStrategy;

/// Top-level configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub context: ContextBudget,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub session: SessionConfig,
    /// Per-model price overrides, USD per million tokens.
    #[serde(default)]
    pub pricing: BTreeMap<String, ModelPricing>,
    #[serde(default)]
    pub prompts: PromptsConfig,
}

/// Chat-completion service settings.
#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_response_tokens")]
    pub max_response_tokens: usize,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    /// Retries after the first attempt, with 1s, 2s, 4s, ... between them.
    #[serde(default = "default_llm_max_retries")]
    pub max_retries: usize,
    /// `llm` asks the model for the intent and falls back to rules; `rules` never calls the model.
    #[serde(default = "default_intent_classifier")]
    pub intent_classifier: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            model: default_chat_model(),
            temperature: default_temperature(),
            max_response_tokens: default_max_response_tokens(),
            timeout_secs: default_llm_timeout_secs(),
            max_retries: default_llm_max_retries(),
            intent_classifier: default_intent_classifier(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_response_tokens() -> usize {
    600
}
fn default_llm_timeout_secs() -> u64 {
    60
}
fn default_llm_max_retries() -> usize {
    3
}
fn default_intent_classifier() -> String {
    "llm".to_string()
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn uses_llm_classifier(&self) -> bool {
        self.intent_classifier == "llm"
    }
}

/// Embedding service settings.
#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Defaults to `llm.base_url`.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_embedding_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            base_url: None,
            max_retries: default_embedding_max_retries(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_embedding_max_retries() -> u32 {
    5
}
fn default_embedding_timeout_secs() -> u64 {
    30
}

/// Vector index settings.
#[derive(Debug, Deserialize, Clone)]
pub struct VectorConfig {
    /// `chroma` or `disabled`.
    #[serde(default = "default_vector_provider")]
    pub provider: String,
    #[serde(default = "default_vector_url")]
    pub url: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_vector_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            provider: default_vector_provider(),
            url: default_vector_url(),
            collection: default_collection(),
            timeout_secs: default_vector_timeout_secs(),
        }
    }
}

fn default_vector_provider() -> String {
    "disabled".to_string()
}
fn default_vector_url() -> String {
    "http://localhost:8000".to_string()
}
fn default_collection() -> String {
    "portfolio".to_string()
}
fn default_vector_timeout_secs() -> u64 {
    10
}

impl VectorConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

/// Fusion and reranking settings.
#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default)]
    pub fusion: FusionStrategy,
    #[serde(default = "default_rerank")]
    pub rerank: bool,
    #[serde(default = "default_rerank_window")]
    pub rerank_window: usize,
    #[serde(default = "default_rerank_timeout_secs")]
    pub rerank_timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            fusion: FusionStrategy::default(),
            rerank: default_rerank(),
            rerank_window: default_rerank_window(),
            rerank_timeout_secs: default_rerank_timeout_secs(),
        }
    }
}

fn default_rerank() -> bool {
    true
}
fn default_rerank_window() -> usize {
    5
}
fn default_rerank_timeout_secs() -> u64 {
    10
}

/// Response cache settings.
#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_cache_max_size")]
    pub max_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            ttl_secs: default_cache_ttl_secs(),
            max_size: default_cache_max_size(),
        }
    }
}

fn default_cache_enabled() -> bool {
    true
}
fn default_cache_ttl_secs() -> u64 {
    1800
}
fn default_cache_max_size() -> usize {
    100
}

/// Conversation session settings.
#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    #[serde(default = "default_max_history_length")]
    pub max_history_length: usize,
    #[serde(default = "default_session_expiry_secs")]
    pub expiry_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_history_length: default_max_history_length(),
            expiry_secs: default_session_expiry_secs(),
        }
    }
}

fn default_max_history_length() -> usize {
    5
}
fn default_session_expiry_secs() -> u64 {
    3600
}

/// Prompt overrides.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct PromptsConfig {
    /// Replaces the built-in assistant persona.
    #[serde(default)]
    pub persona: Option<String>,
    /// Heading placed above the retrieved context.
    #[serde(default)]
    pub context_heading: Option<String>,
}

impl Config {
    /// The API key from `llm.api_key_env`.
    pub fn api_key(&self) -> Result<String> {
        let name = &self.llm.api_key_env;
        match std::env::var(name) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => bail!("{} environment variable not set", name),
        }
    }

    pub fn embedding_base_url(&self) -> &str {
        self.embedding
            .base_url
            .as_deref()
            .unwrap_or(&self.llm.base_url)
    }

    /// Built-in prices with the `[pricing]` overrides applied.
    pub fn price_table(&self) -> PriceTable {
        self.pricing
            .iter()
            .fold(PriceTable::default(), |table, (model, pricing)| {
                table.with_model(model.clone(), *pricing)
            })
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate llm
    if config.llm.model.trim().is_empty() {
        bail!("llm.model must not be empty");
    }
    if !(0.0..=2.0).contains(&config.llm.temperature) {
        bail!("llm.temperature must be in [0.0, 2.0]");
    }
    if config.llm.max_response_tokens == 0 {
        bail!("llm.max_response_tokens must be > 0");
    }
    match config.llm.intent_classifier.as_str() {
        "llm" | "rules" => {}
        other => bail!(
            "Unknown intent classifier: '{}'. Must be llm or rules.",
            other
        ),
    }

    // Validate vector
    match config.vector.provider.as_str() {
        "disabled" | "chroma" => {}
        other => bail!(
            "Unknown vector provider: '{}'. Must be disabled or chroma.",
            other
        ),
    }
    if config.vector.is_enabled() && config.vector.collection.trim().is_empty() {
        bail!(
            "vector.collection must be specified when provider is '{}'",
            config.vector.provider
        );
    }

    // Validate retrieval
    let (semantic_weight, keyword_weight) = match config.retrieval.fusion {
        FusionStrategy::Weighted {
            semantic_weight,
            keyword_weight,
            keyword_scale,
        } => {
            if keyword_scale < 0.0 {
                bail!("retrieval.fusion.keyword_scale must be >= 0.0");
            }
            (semantic_weight, keyword_weight)
        }
        FusionStrategy::ReciprocalRank {
            semantic_weight,
            keyword_weight,
        } => (semantic_weight, keyword_weight),
    };
    if !(0.0..=1.0).contains(&semantic_weight) || !(0.0..=1.0).contains(&keyword_weight) {
        bail!("retrieval.fusion weights must be in [0.0, 1.0]");
    }
    if config.retrieval.rerank_window == 0 {
        bail!("retrieval.rerank_window must be >= 1");
    }

    // Validate context
    if config.context.max_context_tokens == 0 {
        bail!("context.max_context_tokens must be > 0");
    }
    if config.context.truncation_buffer >= config.context.max_context_tokens {
        bail!("context.truncation_buffer must be smaller than context.max_context_tokens");
    }

    // Validate cache
    if config.cache.enabled {
        if config.cache.max_size == 0 {
            bail!("cache.max_size must be >= 1 when the cache is enabled");
        }
        if config.cache.ttl_secs == 0 {
            bail!("cache.ttl_secs must be > 0 when the cache is enabled");
        }
    }

    // Validate session
    if config.session.max_history_length == 0 {
        bail!("session.max_history_length must be >= 1");
    }

    for (model, pricing) in &config.pricing {
        if pricing.input_per_million < 0.0 || pricing.output_per_million < 0.0 {
            bail!("pricing.{} must not be negative", model);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        validate(&config).unwrap();

        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm.max_response_tokens, 600);
        assert_eq!(config.embedding.model, "text-embedding-3-small");
        assert!(!config.vector.is_enabled());
        assert_eq!(config.cache.ttl_secs, 1800);
        assert_eq!(config.cache.max_size, 100);
        assert_eq!(config.context.max_context_tokens, 2000);
        assert_eq!(config.context.max_history_tokens, 500);
        assert_eq!(config.session.max_history_length, 5);
        assert_eq!(config.session.expiry_secs, 3600);
        assert_eq!(config.retrieval.fusion, FusionStrategy::default());
    }

    #[test]
    fn test_partial_context_section_keeps_other_defaults() {
        let config: Config = toml::from_str("[context]\nmax_context_tokens = 800\n").unwrap();
        assert_eq!(config.context.max_context_tokens, 800);
        assert_eq!(config.context.truncation_buffer, 50);
    }

    #[test]
    fn test_reciprocal_rank_fusion_parses() {
        let config: Config = toml::from_str(
            r#"
[retrieval.fusion]
strategy = "reciprocal_rank"
semantic_weight = 0.6
keyword_weight = 0.4
"#,
        )
        .unwrap();
        assert_eq!(
            config.retrieval.fusion,
            FusionStrategy::ReciprocalRank {
                semantic_weight: 0.6,
                keyword_weight: 0.4
            }
        );
    }

    #[test]
    fn test_unknown_vector_provider_rejected() {
        let config: Config = toml::from_str("[vector]\nprovider = \"pinecone\"\n").unwrap();
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("Unknown vector provider"));
    }

    #[test]
    fn test_pricing_overrides_apply() {
        let config: Config = toml::from_str(
            r#"
[pricing."gpt-4o-mini"]
input_per_million = 1.0
output_per_million = 2.0
"#,
        )
        .unwrap();
        let prices = config.price_table();
        assert_eq!(prices.pricing("gpt-4o-mini"), ModelPricing::new(1.0, 2.0));
        assert_eq!(prices.pricing("gpt-4o"), ModelPricing::new(2.5, 10.0));
    }

    #[test]
    fn test_embedding_base_url_falls_back_to_llm() {
        let config = Config::default();
        assert_eq!(config.embedding_base_url(), "https://api.openai.com/v1");
    }
}
