//! Retrieval orchestration: the public `query_memory` entry point.
//!
//! One call walks Analyzing → Retrieving → Fusing → (Reranking) →
//! Returning. Strategies are a closed enum and run concurrently; a failed
//! or timed-out strategy contributes zero candidates and is noted in the
//! diagnostics. The call itself never fails — an empty result list with an
//! annotated diagnostics block is the canonical "no answer".

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tracing::{debug, error, info, warn};

use crate::analysis::{QueryAnalysis, QueryAnalyzer};
use crate::config::Config;
use crate::embedding::{EmbeddingRegistry, RerankerService};
use crate::embedding::reranker::blend_scores;
use crate::idf::IdfDictionary;
use crate::models::{
    Candidate, EntityKind, Filters, QueryType, ResponseMetadata, RetrievalResponse, SearchStats,
};
use crate::repository::{ChunkRepository, EntityRepository};
use crate::services::{fusion, temporal};
use crate::MemnonError;

/// A planned retrieval strategy for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SearchStrategy {
    Hybrid,
    Vector,
    Text,
    Structured,
}

impl SearchStrategy {
    fn label(&self) -> &'static str {
        match self {
            SearchStrategy::Hybrid => "hybrid_search",
            SearchStrategy::Vector => "vector_search",
            SearchStrategy::Text => "text_search",
            SearchStrategy::Structured => "structured_search",
        }
    }
}

/// The retrieval engine. Read-only and idempotent per call; all shared
/// state (models, IDF table, pool) is initialized once and never mutated.
pub struct RetrievalService {
    chunks: ChunkRepository,
    entities: EntityRepository,
    registry: Arc<EmbeddingRegistry>,
    idf: Arc<IdfDictionary>,
    analyzer: QueryAnalyzer,
    reranker: Arc<dyn RerankerService>,
    config: Arc<Config>,
}

impl RetrievalService {
    pub fn new(
        chunks: ChunkRepository,
        entities: EntityRepository,
        registry: Arc<EmbeddingRegistry>,
        idf: Arc<IdfDictionary>,
        analyzer: QueryAnalyzer,
        reranker: Arc<dyn RerankerService>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            chunks,
            entities,
            registry,
            idf,
            analyzer,
            reranker,
            config,
        }
    }

    /// Execute a query against narrative memory and return ranked results.
    ///
    /// Partial failures never surface as errors: each failed strategy is
    /// logged, recorded in diagnostics, and contributes nothing.
    pub async fn query_memory(
        &self,
        query: &str,
        query_type: Option<QueryType>,
        filters: &Filters,
        k: Option<usize>,
        use_hybrid: bool,
    ) -> RetrievalResponse {
        info!("Querying memory: {}", query);
        let started = Instant::now();

        if let Some(rest) = query.strip_prefix("chunk_id:") {
            match rest.trim().parse::<i64>() {
                Ok(chunk_id) => return self.direct_lookup(query, chunk_id).await,
                Err(_) => {
                    warn!("Invalid chunk_id format in query: {}", query);
                }
            }
        }

        let k = k.unwrap_or(self.config.query.default_limit);
        let analysis = self.analyzer.analyze(query);
        let query_type = query_type.unwrap_or(analysis.query_type);
        debug!(
            "Query type: {}, temporal intent: {:.2}",
            query_type, analysis.temporal_intent
        );

        let mut stats = SearchStats {
            temporal_intent: Some(analysis.temporal_intent),
            ..SearchStats::default()
        };

        let strategies = self.plan_strategies(use_hybrid, &analysis);
        for strategy in &strategies {
            stats.strategies_used.push(strategy.label().to_string());
        }

        let budget = Duration::from_millis(self.config.retrieval.strategy_timeout_ms);
        let executions = join_all(strategies.iter().map(|&strategy| {
            let analysis = &analysis;
            let mut stats_probe = StrategyDiag::default();
            async move {
                let outcome = tokio::time::timeout(
                    budget,
                    self.run_strategy(strategy, query, query_type, analysis, filters, k, &mut stats_probe),
                )
                .await;
                let result = match outcome {
                    Ok(result) => result,
                    Err(_) => Err(MemnonError::Storage(format!(
                        "strategy timed out after {}ms",
                        budget.as_millis()
                    ))),
                };
                (strategy, result, stats_probe)
            }
        }))
        .await;

        let mut all_candidates = Vec::new();
        for (strategy, result, diag) in executions {
            match result {
                Ok(candidates) => {
                    debug!("{} returned {} candidates", strategy.label(), candidates.len());
                    all_candidates.extend(candidates);
                }
                Err(e) => {
                    error!("Error in {}: {}", strategy.label(), e);
                    stats.failed_strategies.push(strategy.label().to_string());
                }
            }
            if let Some((vector_weight, text_weight, adjusted)) = diag.weights {
                stats.vector_weight = Some(vector_weight);
                stats.text_weight = Some(text_weight);
                stats.rare_term_adjustment = Some(adjusted);
            }
        }

        stats.total_candidate_results = all_candidates.len();
        let mut final_results = fusion::dedup_and_rank(all_candidates, k);

        let rerank_config = &self.config.retrieval.cross_encoder_reranking;
        if rerank_config.enabled && !final_results.is_empty() {
            stats
                .strategies_used
                .push("cross_encoder_reranking".to_string());
            let (reranked, rerank_time) = self.rerank(query, final_results, query_type).await;
            final_results = reranked;
            stats.rerank_time = rerank_time;
        }

        stats.query_time = started.elapsed().as_secs_f64();
        stats.final_result_count = final_results.len();

        let error = if final_results.is_empty() && !stats.failed_strategies.is_empty() {
            Some(format!(
                "all strategies failed: {}",
                stats.failed_strategies.join(", ")
            ))
        } else {
            None
        };

        RetrievalResponse {
            query: query.to_string(),
            query_type,
            metadata: ResponseMetadata {
                search_strategies: stats.strategies_used.clone(),
                result_count: final_results.len(),
                filters_applied: filters.clone(),
                search_stats: stats,
                error,
            },
            results: final_results,
        }
    }

    /// Strategy planning as a closed match: hybrid when enabled and
    /// requested, vector otherwise, text-only when no embedding model
    /// loaded; structured lookup joins in whenever the analyzer surfaced
    /// entity mentions.
    fn plan_strategies(&self, use_hybrid: bool, analysis: &QueryAnalysis) -> Vec<SearchStrategy> {
        let mut strategies = Vec::new();

        if self.registry.is_empty() {
            warn!("No embedding models available; falling back to text search");
            strategies.push(SearchStrategy::Text);
        } else if use_hybrid && self.config.retrieval.hybrid_search.enabled {
            strategies.push(SearchStrategy::Hybrid);
        } else {
            strategies.push(SearchStrategy::Vector);
        }

        if self.config.retrieval.structured_data_enabled
            && (!analysis.characters.is_empty() || !analysis.places.is_empty())
        {
            strategies.push(SearchStrategy::Structured);
        }

        strategies
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_strategy(
        &self,
        strategy: SearchStrategy,
        query: &str,
        query_type: QueryType,
        analysis: &QueryAnalysis,
        filters: &Filters,
        k: usize,
        diag: &mut StrategyDiag,
    ) -> Result<Vec<Candidate>, MemnonError> {
        match strategy {
            SearchStrategy::Hybrid => {
                self.run_hybrid(query, query_type, analysis, filters, k, diag).await
            }
            SearchStrategy::Vector => self.run_vector(query, filters, k).await,
            SearchStrategy::Text => self.chunks.text_search(query, filters, k, &self.idf).await,
            SearchStrategy::Structured => self.run_structured(analysis).await,
        }
    }

    async fn run_hybrid(
        &self,
        query: &str,
        query_type: QueryType,
        analysis: &QueryAnalysis,
        filters: &Filters,
        k: usize,
        diag: &mut StrategyDiag,
    ) -> Result<Vec<Candidate>, MemnonError> {
        let hybrid = &self.config.retrieval.hybrid_search;

        let (vector_weight, text_weight) = if hybrid.use_query_type_weights {
            hybrid
                .weights_by_query_type
                .get(&query_type)
                .map(|weights| (weights.vector, weights.text))
                .unwrap_or((hybrid.vector_weight_default, hybrid.text_weight_default))
        } else {
            (hybrid.vector_weight_default, hybrid.text_weight_default)
        };
        let (vector_weight, text_weight) =
            fusion::normalize_strategy_weights(vector_weight, text_weight);

        let (vector_weight, text_weight, adjusted) = fusion::adjust_weights_for_rare_terms(
            &self.idf,
            hybrid,
            query,
            query_type,
            vector_weight,
            text_weight,
        );
        if adjusted {
            info!(
                "Rare-term adjustment: vector={:.2}, text={:.2}",
                vector_weight, text_weight
            );
        }
        diag.weights = Some((vector_weight, text_weight, adjusted));

        let mut embeddings = self.registry.embed_all(query).await;
        if let Some(target) = &hybrid.target_model {
            if embeddings.contains_key(target) {
                embeddings.retain(|key, _| key == target);
            } else {
                warn!("Target model '{}' unavailable; using all active models", target);
            }
        }
        if embeddings.is_empty() {
            return Err(MemnonError::ModelUnavailable(
                "failed to generate embeddings for any active model".to_string(),
            ));
        }
        let model_weights = self.registry.weights();

        let mut boost_factor = hybrid.temporal_boost_factor;
        if hybrid.use_query_type_temporal_factors {
            if let Some(factor) = hybrid.temporal_boost_factors.get(&query_type) {
                boost_factor = *factor;
            }
        }
        let effective = temporal::effective_boost_factor(analysis.temporal_intent, boost_factor);

        if effective > 0.0 {
            info!(
                "Time-aware search (intent: {:.2}, boost factor: {:.2})",
                analysis.temporal_intent, effective
            );
            // over-fetch, reweight, re-rank, then cut to k
            let mut candidates = self
                .chunks
                .hybrid_search_multi_model(
                    query,
                    &embeddings,
                    &model_weights,
                    vector_weight,
                    text_weight,
                    filters,
                    k * 2,
                    &self.idf,
                )
                .await?;
            let total_chunks = self.chunks.total_chunks().await?;
            temporal::reweight_candidates(
                &mut candidates,
                analysis.temporal_intent,
                effective,
                total_chunks,
            );
            fusion::sort_candidates(&mut candidates);
            candidates.truncate(k);
            Ok(candidates)
        } else {
            self.chunks
                .hybrid_search_multi_model(
                    query,
                    &embeddings,
                    &model_weights,
                    vector_weight,
                    text_weight,
                    filters,
                    k,
                    &self.idf,
                )
                .await
        }
    }

    /// Multi-model vector search: the hybrid path with full vector weight;
    /// the text stage is skipped entirely.
    async fn run_vector(
        &self,
        query: &str,
        filters: &Filters,
        k: usize,
    ) -> Result<Vec<Candidate>, MemnonError> {
        let embeddings = self.registry.embed_all(query).await;
        if embeddings.is_empty() {
            return Err(MemnonError::ModelUnavailable(
                "failed to generate embeddings for any active model".to_string(),
            ));
        }
        let model_weights = self.registry.weights();
        self.chunks
            .hybrid_search_multi_model(
                query,
                &embeddings,
                &model_weights,
                1.0,
                0.0,
                filters,
                k,
                &self.idf,
            )
            .await
    }

    async fn run_structured(
        &self,
        analysis: &QueryAnalysis,
    ) -> Result<Vec<Candidate>, MemnonError> {
        let limit = self.config.query.default_limit;
        let mut candidates = Vec::new();
        for name in &analysis.characters {
            candidates.extend(
                self.entities
                    .entity_search(name, EntityKind::Characters, limit)
                    .await?,
            );
        }
        for name in &analysis.places {
            candidates.extend(
                self.entities
                    .entity_search(name, EntityKind::Places, limit)
                    .await?,
            );
        }
        Ok(candidates)
    }

    async fn direct_lookup(&self, query: &str, chunk_id: i64) -> RetrievalResponse {
        let (results, error) = match self.chunks.chunk_by_id(chunk_id).await {
            Ok(Some(candidate)) => (vec![candidate], None),
            Ok(None) => (
                Vec::new(),
                Some(format!("Chunk with ID {} not found", chunk_id)),
            ),
            Err(e) => {
                error!("Error retrieving chunk by ID {}: {}", chunk_id, e);
                (Vec::new(), Some(e.to_string()))
            }
        };

        let strategies = vec!["direct_id_lookup".to_string()];
        RetrievalResponse {
            query: query.to_string(),
            query_type: QueryType::DirectId,
            metadata: ResponseMetadata {
                search_strategies: strategies.clone(),
                search_stats: SearchStats {
                    strategies_used: strategies,
                    total_candidate_results: results.len(),
                    final_result_count: results.len(),
                    ..SearchStats::default()
                },
                result_count: results.len(),
                filters_applied: Filters::default(),
                error,
            },
            results,
        }
    }

    /// Re-score the fused top slice with the cross-encoder and blend. On
    /// any failure the fused candidates pass through unchanged.
    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<Candidate>,
        query_type: QueryType,
    ) -> (Vec<Candidate>, Option<f64>) {
        let config = &self.config.retrieval.cross_encoder_reranking;
        let alpha = if config.use_query_type_weights {
            config
                .weights_by_query_type
                .get(&query_type)
                .copied()
                .unwrap_or(config.blend_weight)
        } else {
            config.blend_weight
        };

        let passages: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();
        let started = Instant::now();

        match self.reranker.score_batch(query, &passages).await {
            Ok(scores) if scores.len() == candidates.len() => {
                let mut reranked = candidates;
                for (candidate, reranker_score) in reranked.iter_mut().zip(scores) {
                    let fused = candidate.score;
                    candidate.original_score = Some(fused);
                    candidate.reranker_score = Some(reranker_score);
                    candidate.score = blend_scores(alpha, fused, reranker_score);
                }
                fusion::sort_candidates(&mut reranked);
                reranked.truncate(config.top_k.min(reranked.len()).max(1));
                let elapsed = started.elapsed().as_secs_f64();
                info!("Cross-encoder reranking completed in {:.3}s", elapsed);
                (reranked, Some(elapsed))
            }
            Ok(scores) => {
                warn!(
                    "Reranker returned {} scores for {} passages; keeping fused order",
                    scores.len(),
                    candidates.len()
                );
                (candidates, None)
            }
            Err(e) => {
                error!("Error in cross-encoder reranking: {}; keeping fused order", e);
                (candidates, None)
            }
        }
    }
}

/// Per-strategy diagnostics reported back into the call stats.
#[derive(Debug, Default)]
struct StrategyDiag {
    /// (vector_weight, text_weight, rare-term adjustment fired)
    weights: Option<(f32, f32, bool)>,
}
