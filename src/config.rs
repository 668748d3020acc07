/// Configuration management using figment
///
/// Loads configuration with this precedence (highest wins):
/// 1. Defaults (hardcoded)
/// 2. TOML file: searchcp.toml (in working directory)
/// 3. Environment variables: prefixed SEARCHCP_ (e.g., SEARCHCP_LOG_LEVEL=debug)
///
/// Nested sections use double underscores in env vars:
///   SEARCHCP_EMBEDDING__PROVIDER=openai
///   SEARCHCP_CASCADE__MAX_FINAL_RESULTS=50

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::errors::SearchError;
use crate::scoring::ScoringMethod;

/// Per-stage result caps for the cascade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeConfig {
    /// Stage-1 candidate cap
    #[serde(default = "default_max_layer1")]
    pub max_results_layer1: usize,

    /// Stage-2 scored-result cap
    #[serde(default = "default_max_layer2")]
    pub max_results_layer2: usize,

    /// Stage-3 re-ranked cap
    #[serde(default = "default_max_layer3")]
    pub max_results_layer3: usize,

    /// Final result cap after personalization
    #[serde(default = "default_max_final")]
    pub max_final_results: usize,
}

fn default_max_layer1() -> usize {
    10_000
}

fn default_max_layer2() -> usize {
    1_000
}

fn default_max_layer3() -> usize {
    100
}

fn default_max_final() -> usize {
    20
}

impl Default for CascadeConfig {
    fn default() -> Self {
        CascadeConfig {
            max_results_layer1: default_max_layer1(),
            max_results_layer2: default_max_layer2(),
            max_results_layer3: default_max_layer3(),
            max_final_results: default_max_final(),
        }
    }
}

/// Stage-2 relevance scoring parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// "bm25" (default) or "tfidf"
    #[serde(default)]
    pub method: ScoringMethod,

    /// BM25 term-frequency saturation
    #[serde(default = "default_k1")]
    pub k1: f64,

    /// BM25 length normalization strength
    #[serde(default = "default_b")]
    pub b: f64,
}

fn default_k1() -> f64 {
    1.2
}

fn default_b() -> f64 {
    0.75
}

impl Default for ScoringConfig {
    fn default() -> Self {
        ScoringConfig {
            method: ScoringMethod::default(),
            k1: default_k1(),
            b: default_b(),
        }
    }
}

/// Stage-4 boost weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonalizationConfig {
    #[serde(default = "default_user_profile_weight")]
    pub user_profile_weight: f64,

    #[serde(default = "default_context_weight")]
    pub context_weight: f64,

    #[serde(default = "default_temporal_weight")]
    pub temporal_weight: f64,
}

fn default_user_profile_weight() -> f64 {
    0.3
}

fn default_context_weight() -> f64 {
    0.2
}

fn default_temporal_weight() -> f64 {
    0.1
}

impl Default for PersonalizationConfig {
    fn default() -> Self {
        PersonalizationConfig {
            user_profile_weight: default_user_profile_weight(),
            context_weight: default_context_weight(),
            temporal_weight: default_temporal_weight(),
        }
    }
}

/// Configuration for the embedding provider subsystem.
///
/// Provider selection is explicit — having an API key does NOT auto-switch
/// from local.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Which provider to use: "local" (fastembed) or "openai"
    /// Default: "local" — no API key required
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// Expected embedding dimension. Validated against the model's actual
    /// output at load time; a mismatch fails the load.
    #[serde(default = "default_vector_dimension")]
    pub vector_dimension: usize,

    /// Directory for caching model weights (fastembed downloads)
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,

    /// OpenAI API key — only required when provider = "openai"
    #[serde(default)]
    pub openai_api_key: Option<String>,
}

fn default_embedding_provider() -> String {
    "local".to_string()
}

fn default_vector_dimension() -> usize {
    384
}

fn default_cache_dir() -> String {
    dirs::cache_dir()
        .map(|p| p.join("searchcp").join("models").to_string_lossy().into_owned())
        .unwrap_or_else(|| "/tmp/searchcp_models".to_string())
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        EmbeddingConfig {
            provider: default_embedding_provider(),
            vector_dimension: default_vector_dimension(),
            cache_dir: default_cache_dir(),
            openai_api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Optional file path for log output (reserved; stderr-only for now)
    #[serde(default)]
    pub log_file: Option<String>,

    #[serde(default)]
    pub cascade: CascadeConfig,

    #[serde(default)]
    pub scoring: ScoringConfig,

    #[serde(default)]
    pub personalization: PersonalizationConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: default_log_level(),
            log_file: None,
            cascade: CascadeConfig::default(),
            scoring: ScoringConfig::default(),
            personalization: PersonalizationConfig::default(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from defaults, TOML file, and environment variables
    ///
    /// Environment variables override TOML file values.
    pub fn load() -> Result<Config, SearchError> {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file("searchcp.toml"))
            // Double underscore handles nested: SEARCHCP_EMBEDDING__PROVIDER=openai
            .merge(Env::prefixed("SEARCHCP_").split("__"))
            .extract()
            .map_err(|e| SearchError::Validation {
                message: format!("Failed to load config: {}", e),
                field: None,
            })
    }
}
