//! Typed configuration for the retrieval core.
//!
//! Loaded with priority: explicit path → `MEMNON_CONFIG` env var →
//! `memnon.toml` in the working directory → built-in defaults. Parse
//! failures log a warning and fall back to defaults rather than aborting;
//! semantic validation happens at init time.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::models::QueryType;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    /// Embedding models keyed by model key (e.g. "bge-large").
    pub models: BTreeMap<String, ModelConfig>,
    pub retrieval: RetrievalConfig,
    pub query: QueryConfig,
    pub idf: IdfConfig,
    pub analysis: AnalysisConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration with the standard priority chain.
    pub fn load(explicit_path: Option<&Path>) -> Self {
        let candidates: Vec<PathBuf> = explicit_path
            .map(|p| vec![p.to_path_buf()])
            .or_else(|| std::env::var("MEMNON_CONFIG").ok().map(|p| vec![p.into()]))
            .unwrap_or_else(|| vec![PathBuf::from("memnon.toml")]);

        for path in candidates {
            if !path.exists() {
                continue;
            }
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(config) => {
                        info!("Loaded configuration from {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    }
                },
                Err(e) => {
                    warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                }
            }
        }

        Config::default()
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string.
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/memnon".to_string(),
            max_connections: 5,
            acquire_timeout_ms: 5_000,
        }
    }
}

/// Per-model embedding configuration. A model loads from `local_path` when
/// it exists, otherwise from `remote_path` (HuggingFace repo id).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub local_path: Option<PathBuf>,
    pub remote_path: Option<String>,
    pub dimensions: usize,
    /// Relative weight in [0, 1] for multi-model score fusion.
    pub weight: f32,
    pub is_active: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            local_path: None,
            remote_path: None,
            dimensions: 1024,
            weight: 0.33,
            is_active: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub max_results: usize,
    pub entity_boost_factor: f32,
    pub relevance_threshold: f32,
    /// Accepted for compatibility; not applied post-fusion (see DESIGN.md).
    pub source_weights: BTreeMap<String, f32>,
    pub structured_data_enabled: bool,
    /// Per-strategy time budget for planned searches.
    pub strategy_timeout_ms: u64,
    pub hybrid_search: HybridSearchConfig,
    pub cross_encoder_reranking: CrossEncoderConfig,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_results: 50,
            entity_boost_factor: 1.2,
            relevance_threshold: 0.7,
            source_weights: BTreeMap::new(),
            structured_data_enabled: true,
            strategy_timeout_ms: 10_000,
            hybrid_search: HybridSearchConfig::default(),
            cross_encoder_reranking: CrossEncoderConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyWeights {
    pub vector: f32,
    pub text: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridSearchConfig {
    pub enabled: bool,
    pub vector_weight_default: f32,
    pub text_weight_default: f32,
    /// Share of the final score given to narrative-position match for
    /// temporal queries.
    pub temporal_boost_factor: f32,
    pub use_query_type_temporal_factors: bool,
    pub temporal_boost_factors: BTreeMap<QueryType, f32>,
    pub use_query_type_weights: bool,
    pub weights_by_query_type: BTreeMap<QueryType, StrategyWeights>,
    /// IDF above which a query term counts as rare.
    pub rare_term_idf_threshold: f32,
    /// Floor for the text weight when a rare term is present.
    pub rare_term_min_text_weight: f32,
    pub rare_term_excluded_query_types: Vec<QueryType>,
    /// Optional single model to prefer for hybrid search.
    pub target_model: Option<String>,
}

impl Default for HybridSearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            vector_weight_default: 0.6,
            text_weight_default: 0.4,
            temporal_boost_factor: 0.3,
            use_query_type_temporal_factors: false,
            temporal_boost_factors: BTreeMap::new(),
            use_query_type_weights: false,
            weights_by_query_type: BTreeMap::new(),
            rare_term_idf_threshold: 3.0,
            rare_term_min_text_weight: 0.5,
            rare_term_excluded_query_types: Vec::new(),
            target_model: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossEncoderConfig {
    pub enabled: bool,
    /// Local model directory or HuggingFace repo id.
    pub model_path: String,
    /// Fused score's share in the blended final score.
    pub blend_weight: f32,
    pub top_k: usize,
    pub batch_size: usize,
    pub use_sliding_window: bool,
    /// Model context length in tokens; the window character budget is
    /// derived from it.
    pub max_length: usize,
    /// Overlap size for bridge windows between adjacent chunks.
    pub window_overlap: usize,
    pub use_query_type_weights: bool,
    pub weights_by_query_type: BTreeMap<QueryType, f32>,
    /// Accepted for compatibility; the candle backend loads full precision.
    pub use_8bit: bool,
}

impl Default for CrossEncoderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model_path: "BAAI/bge-reranker-base".to_string(),
            blend_weight: 0.3,
            top_k: 10,
            batch_size: 8,
            use_sliding_window: true,
            max_length: 512,
            window_overlap: 128,
            use_query_type_weights: false,
            weights_by_query_type: BTreeMap::new(),
            use_8bit: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub default_limit: usize,
    pub min_similarity: f32,
    pub highlight_matches: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            min_similarity: 0.7,
            highlight_matches: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdfConfig {
    /// Cache file path; defaults to `{cache_dir}/memnon/idf_cache.json`.
    pub cache_path: Option<PathBuf>,
    pub cache_ttl_secs: u64,
}

impl Default for IdfConfig {
    fn default() -> Self {
        Self {
            cache_path: None,
            cache_ttl_secs: 86_400,
        }
    }
}

impl IdfConfig {
    pub fn resolved_cache_path(&self) -> PathBuf {
        self.cache_path.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("memnon")
                .join("idf_cache.json")
        })
    }
}

/// Query-analysis knobs. Empty pattern lists fall back to the built-in
/// vocabularies in `analysis`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub character_patterns: Vec<String>,
    pub location_patterns: Vec<String>,
    pub event_patterns: Vec<String>,
    pub relationship_patterns: Vec<String>,
    pub theme_patterns: Vec<String>,
    /// Point-of-view character; second-person pronouns resolve to them.
    pub pov_character: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<PathBuf>,
    pub console: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            console: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_from_empty_toml() {
        let config = Config::from_toml_str("").expect("empty config parses");
        assert_eq!(config.query.default_limit, 10);
        assert!(config.retrieval.hybrid_search.enabled);
        assert_eq!(config.retrieval.hybrid_search.vector_weight_default, 0.6);
        assert_eq!(config.retrieval.hybrid_search.text_weight_default, 0.4);
        assert!(!config.retrieval.cross_encoder_reranking.enabled);
        assert!(config.models.is_empty());
    }

    #[test]
    fn parses_model_and_hybrid_sections() {
        let toml = r#"
            [database]
            url = "postgresql://reader@db/story"

            [models.bge-large]
            remote_path = "BAAI/bge-large-en-v1.5"
            dimensions = 1024
            weight = 0.4

            [models.e5-large]
            remote_path = "intfloat/e5-large-v2"
            dimensions = 1024
            weight = 0.4
            is_active = false

            [retrieval.hybrid_search]
            vector_weight_default = 0.8
            text_weight_default = 0.2
            rare_term_excluded_query_types = ["theme"]

            [retrieval.hybrid_search.weights_by_query_type.character]
            vector = 0.5
            text = 0.5
        "#;
        let config = Config::from_toml_str(toml).expect("config parses");
        assert_eq!(config.database.url, "postgresql://reader@db/story");
        assert_eq!(config.models.len(), 2);
        assert!(!config.models["e5-large"].is_active);
        assert_eq!(config.models["bge-large"].dimensions, 1024);
        let hybrid = &config.retrieval.hybrid_search;
        assert_eq!(hybrid.vector_weight_default, 0.8);
        assert_eq!(
            hybrid.rare_term_excluded_query_types,
            vec![QueryType::Theme]
        );
        assert_eq!(
            hybrid.weights_by_query_type[&QueryType::Character],
            StrategyWeights {
                vector: 0.5,
                text: 0.5
            }
        );
    }

    #[test]
    fn idf_cache_path_falls_back_to_cache_dir() {
        let explicit = IdfConfig {
            cache_path: Some(PathBuf::from("/tmp/idf.json")),
            ..IdfConfig::default()
        };
        assert_eq!(explicit.resolved_cache_path(), PathBuf::from("/tmp/idf.json"));

        let derived = IdfConfig::default().resolved_cache_path();
        assert!(derived.ends_with("memnon/idf_cache.json"));
    }
}
