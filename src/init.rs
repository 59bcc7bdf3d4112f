//! Startup wiring shared by the binary and embedding callers.
//!
//! Hard errors at init: unreachable database, missing pgvector extension,
//! and an empty corpus with no IDF cache. Everything else degrades: models
//! that fail to load are skipped, alias loading failures leave entity
//! extraction empty, and the reranker is only touched on first use.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::analysis::{AliasResolver, QueryAnalyzer};
use crate::config::Config;
use crate::db::{self, MemnonPool};
use crate::embedding::{CandleRerankerService, EmbeddingRegistry, RerankerService};
use crate::idf::IdfDictionary;
use crate::repository::{ChunkRepository, EntityRepository};
use crate::services::RetrievalService;
use crate::MemnonError;

/// Application context: the fully wired retrieval engine plus the handles
/// embedding callers need.
pub struct MemnonContext {
    pub pool: MemnonPool,
    pub chunks: ChunkRepository,
    pub entities: EntityRepository,
    pub registry: Arc<EmbeddingRegistry>,
    pub idf: Arc<IdfDictionary>,
    pub retrieval: Arc<RetrievalService>,
    pub config: Arc<Config>,
}

impl MemnonContext {
    pub async fn init(config: Config) -> Result<Self, MemnonError> {
        let config = Arc::new(config);

        let pool = db::connect(&config.database).await?;
        db::check_vector_capability(&pool).await?;

        let chunks = ChunkRepository::new(pool.clone());
        let entities = EntityRepository::new(pool.clone());

        info!("Initializing embedding models...");
        let registry = Arc::new(EmbeddingRegistry::from_config(&config.models));
        if registry.is_empty() {
            warn!("No embedding models available; vector strategies will be skipped");
        }

        info!("Initializing IDF dictionary for term weighting...");
        let cache_path = config.idf.resolved_cache_path();
        let idf = match IdfDictionary::load_cache(&cache_path, config.idf.cache_ttl_secs) {
            Some(dictionary) => dictionary,
            None => build_idf_dictionary(&chunks, &config).await?,
        };
        let idf = Arc::new(idf);

        let alias_map = match entities.load_alias_map().await {
            Ok(map) => map,
            Err(e) => {
                error!("Error loading character aliases: {}", e);
                Default::default()
            }
        };
        let place_names = entities.load_place_names().await.unwrap_or_else(|e| {
            error!("Error loading place names: {}", e);
            Vec::new()
        });
        let resolver = AliasResolver::new(
            alias_map,
            place_names,
            config.analysis.pov_character.as_deref(),
        );
        let analyzer = QueryAnalyzer::new(&config.analysis, resolver)?;

        let reranker: Arc<dyn RerankerService> = Arc::new(CandleRerankerService::new(
            config.retrieval.cross_encoder_reranking.clone(),
        ));

        let retrieval = Arc::new(RetrievalService::new(
            chunks.clone(),
            entities.clone(),
            registry.clone(),
            idf.clone(),
            analyzer,
            reranker,
            config.clone(),
        ));

        info!("Retrieval engine initialized");
        Ok(Self {
            pool,
            chunks,
            entities,
            registry,
            idf,
            retrieval,
            config,
        })
    }

    /// Force a fresh IDF build from the corpus, replacing the cache file.
    pub async fn rebuild_idf(&self) -> Result<IdfDictionary, MemnonError> {
        build_idf_dictionary(&self.chunks, &self.config).await
    }
}

async fn build_idf_dictionary(
    chunks: &ChunkRepository,
    config: &Config,
) -> Result<IdfDictionary, MemnonError> {
    let total = chunks.total_chunks().await?;
    if total == 0 {
        return Err(MemnonError::Configuration(
            "narrative corpus is empty and no usable IDF cache exists".to_string(),
        ));
    }

    info!("Building IDF dictionary from {} chunks...", total);
    let frequencies = chunks.term_document_frequencies().await?;
    let dictionary = IdfDictionary::from_document_frequencies(frequencies, total);
    info!("Built IDF dictionary with {} terms", dictionary.len());

    let cache_path = config.idf.resolved_cache_path();
    if let Err(e) = dictionary.save_cache(&cache_path) {
        warn!("Could not save IDF cache to {}: {}", cache_path.display(), e);
    }
    Ok(dictionary)
}
