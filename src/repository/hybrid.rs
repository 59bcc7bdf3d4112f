//! Hybrid vector + full-text search over the chunk corpus.
//!
//! The text stage walks a three-tier query protocol: IDF-weighted
//! `to_tsquery`, then a plain OR of stemmed tokens, then the websearch
//! parser over the raw query. Single-token queries that still match nothing
//! get a substring scan at a fixed low score. Per-model vector stages run
//! concurrently with the text stage; chunks only the vector side found are
//! re-scored against the same text query form so their text scores are
//! comparable.

use std::collections::BTreeMap;

use futures::future::join_all;
use sqlx::{Postgres, QueryBuilder};
use tracing::{debug, error, info};

use crate::idf::{IdfDictionary, DEFAULT_MAX_TERMS};
use crate::models::{Candidate, CandidateMetadata, ContentType, Filters, Source};
use crate::repository::chunks::{ChunkHitRow, ChunkRepository};
use crate::repository::push_filters;
use crate::services::fusion;
use crate::MemnonError;

/// Text score assigned by the last-resort substring scan.
const SUBSTRING_FALLBACK_SCORE: f32 = 0.05;

/// The query form that produced the text stage's rows; vector-only hits are
/// re-scored with the same form.
#[derive(Debug, Clone)]
enum TextQueryForm {
    TsQuery(String),
    Websearch(String),
}

struct TextStageOutcome {
    /// Rows with their per-query normalized text scores.
    hits: Vec<(ChunkHitRow, f32)>,
    form: Option<TextQueryForm>,
    /// Divisor used for normalization (1.0 when no rows scored).
    max_raw: f32,
}

struct CandidateAcc {
    text: String,
    metadata: CandidateMetadata,
    model_scores: BTreeMap<String, f32>,
    /// `None` means the chunk was found by vector search only and still
    /// needs a text score.
    text_score: Option<f32>,
}

impl ChunkRepository {
    /// Hybrid search against a single embedding model.
    #[allow(clippy::too_many_arguments)]
    pub async fn hybrid_search_single_model(
        &self,
        query_text: &str,
        query_embedding: &[f32],
        model_key: &str,
        vector_weight: f32,
        text_weight: f32,
        filters: &Filters,
        top_k: usize,
        idf: &IdfDictionary,
    ) -> Result<Vec<Candidate>, MemnonError> {
        let mut embeddings = BTreeMap::new();
        embeddings.insert(model_key.to_string(), query_embedding.to_vec());
        let mut weights = BTreeMap::new();
        weights.insert(model_key.to_string(), 1.0);

        self.hybrid_search_multi_model(
            query_text,
            &embeddings,
            &weights,
            vector_weight,
            text_weight,
            filters,
            top_k,
            idf,
        )
        .await
    }

    /// Hybrid search blending one text ranking with one vector ranking per
    /// model. Per-chunk vector scores are the weighted mean over the models
    /// that scored the chunk; text scores are normalized by the per-query
    /// maximum. With `text_weight == 0` the text stage is skipped entirely
    /// and the result is the pure multi-model vector ranking.
    #[allow(clippy::too_many_arguments)]
    pub async fn hybrid_search_multi_model(
        &self,
        query_text: &str,
        query_embeddings: &BTreeMap<String, Vec<f32>>,
        model_weights: &BTreeMap<String, f32>,
        vector_weight: f32,
        text_weight: f32,
        filters: &Filters,
        top_k: usize,
        idf: &IdfDictionary,
    ) -> Result<Vec<Candidate>, MemnonError> {
        let (vector_weight, text_weight) =
            fusion::normalize_strategy_weights(vector_weight, text_weight);
        let model_weights = fusion::normalize_model_weights(model_weights);
        debug!(
            "Hybrid search weights: vector={:.3}, text={:.3}, models={:?}",
            vector_weight, text_weight, model_weights
        );

        let fetch = top_k * 3;
        let run_text = text_weight > 0.0;

        let text_future = async {
            if run_text {
                self.text_stage(query_text, filters, fetch, idf).await.map(Some)
            } else {
                Ok(None)
            }
        };
        let vector_futures = join_all(
            query_embeddings
                .iter()
                .filter(|(key, _)| model_weights.get(key.as_str()).copied().unwrap_or(0.0) > 0.0)
                .map(|(key, embedding)| async move {
                    (key.clone(), self.vector_hits(embedding, key, filters, fetch).await)
                }),
        );

        let (text_outcome, vector_outcomes) = tokio::join!(text_future, vector_futures);
        let text_outcome = text_outcome?;

        let mut merged: BTreeMap<i64, CandidateAcc> = BTreeMap::new();

        if let Some(stage) = &text_outcome {
            for (row, normalized) in &stage.hits {
                merged.entry(row.id).or_insert_with(|| CandidateAcc {
                    text: row.raw_text.clone(),
                    metadata: row.metadata(),
                    model_scores: BTreeMap::new(),
                    text_score: Some(*normalized),
                });
            }
        }

        for (model_key, outcome) in vector_outcomes {
            match outcome {
                Ok(rows) => {
                    for row in rows {
                        let score = row.score.clamp(0.0, 1.0);
                        let entry = merged.entry(row.id).or_insert_with(|| CandidateAcc {
                            text: row.raw_text.clone(),
                            metadata: row.metadata(),
                            model_scores: BTreeMap::new(),
                            text_score: None,
                        });
                        entry.model_scores.insert(model_key.clone(), score);
                    }
                }
                // one model failing leaves the others contributing
                Err(e) => error!("Vector stage failed for model '{}': {}", model_key, e),
            }
        }

        if let Some(stage) = &text_outcome {
            self.fill_missing_text_scores(&mut merged, stage).await;
        }

        let source = if run_text {
            Source::HybridSearch
        } else {
            Source::VectorSearch
        };

        let mut candidates: Vec<Candidate> = merged
            .into_iter()
            .map(|(id, acc)| {
                let vector_score = fusion::weighted_model_average(&acc.model_scores, &model_weights);
                let text_score = acc.text_score.unwrap_or(0.0);
                Candidate {
                    id: id.to_string(),
                    chunk_id: Some(id),
                    content_type: ContentType::Narrative,
                    text: acc.text,
                    metadata: acc.metadata,
                    score: fusion::fuse_scores(vector_score, text_score, vector_weight, text_weight),
                    vector_score: Some(vector_score),
                    text_score: Some(text_score),
                    model_scores: acc.model_scores,
                    reranker_score: None,
                    original_score: None,
                    temporal_position: None,
                    source,
                }
            })
            .collect();

        fusion::sort_candidates(&mut candidates);
        candidates.truncate(top_k);
        Ok(candidates)
    }

    /// Text-only candidates; used when no embedding model is available.
    pub async fn text_search(
        &self,
        query_text: &str,
        filters: &Filters,
        top_k: usize,
        idf: &IdfDictionary,
    ) -> Result<Vec<Candidate>, MemnonError> {
        let stage = self.text_stage(query_text, filters, top_k, idf).await?;
        let mut candidates: Vec<Candidate> = stage
            .hits
            .into_iter()
            .map(|(row, normalized)| {
                let mut candidate =
                    Candidate::narrative(row.id, row.raw_text.clone(), normalized, Source::TextSearch);
                candidate.metadata = row.metadata();
                candidate.text_score = Some(normalized);
                candidate
            })
            .collect();
        fusion::sort_candidates(&mut candidates);
        candidates.truncate(top_k);
        Ok(candidates)
    }

    async fn text_stage(
        &self,
        query_text: &str,
        filters: &Filters,
        limit: usize,
        idf: &IdfDictionary,
    ) -> Result<TextStageOutcome, MemnonError> {
        let mut rows: Vec<ChunkHitRow> = Vec::new();
        let mut form = None;

        let weighted = idf.weighted_query(query_text, DEFAULT_MAX_TERMS);
        if !weighted.is_empty() {
            debug!("Text search using weighted to_tsquery: '{}'", weighted);
            rows = self.text_hits_tsquery(&weighted, filters, limit).await?;
            form = Some(TextQueryForm::TsQuery(weighted));
        }

        if rows.is_empty() {
            let fallback = idf.fallback_or_query(query_text);
            if !fallback.is_empty() {
                info!("Text search using OR-based fallback query: '{}'", fallback);
                rows = self.text_hits_tsquery(&fallback, filters, limit).await?;
                form = Some(TextQueryForm::TsQuery(fallback));
            }
        }

        if rows.is_empty() {
            info!("Text search using websearch fallback: '{}'", query_text);
            rows = self.text_hits_websearch(query_text, filters, limit).await?;
            form = Some(TextQueryForm::Websearch(query_text.to_string()));
        }

        let max_raw = rows.iter().map(|r| r.score).fold(0.0f32, f32::max);
        let divisor = if max_raw > 0.0 { max_raw } else { 1.0 };
        let mut hits: Vec<(ChunkHitRow, f32)> = rows
            .into_iter()
            .map(|row| {
                let normalized = row.score / divisor;
                (row, normalized)
            })
            .collect();

        if hits.is_empty() {
            let single = query_text.trim();
            if !single.is_empty() && single.split_whitespace().count() == 1 {
                info!("Text search using substring scan for single token '{}'", single);
                hits = self
                    .substring_hits(single, filters, limit)
                    .await?
                    .into_iter()
                    .map(|row| (row, SUBSTRING_FALLBACK_SCORE))
                    .collect();
            }
        }

        Ok(TextStageOutcome {
            hits,
            form,
            max_raw: divisor,
        })
    }

    /// Give vector-only chunks a text score computed with the same query
    /// form the text stage used, normalized by the same maximum.
    async fn fill_missing_text_scores(
        &self,
        merged: &mut BTreeMap<i64, CandidateAcc>,
        stage: &TextStageOutcome,
    ) {
        let pending: Vec<i64> = merged
            .iter()
            .filter(|(_, acc)| acc.text_score.is_none())
            .map(|(id, _)| *id)
            .collect();
        if pending.is_empty() {
            return;
        }
        let Some(form) = &stage.form else {
            return;
        };

        match self.rescore_text(&pending, form).await {
            Ok(scores) => {
                for (id, raw) in scores {
                    if let Some(acc) = merged.get_mut(&id) {
                        acc.text_score = Some((raw / stage.max_raw).clamp(0.0, 1.0));
                    }
                }
            }
            Err(e) => error!("Text re-scoring of vector-only hits failed: {}", e),
        }
    }

    async fn text_hits_tsquery(
        &self,
        tsquery: &str,
        filters: &Filters,
        limit: usize,
    ) -> Result<Vec<ChunkHitRow>, MemnonError> {
        let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(
            "SELECT nc.id, nc.raw_text, cm.season, cm.episode, cm.scene, \
             nv.world_time::text AS world_time, \
             ts_rank(to_tsvector('english', nc.raw_text), to_tsquery('english', ",
        );
        builder.push_bind(tsquery.to_string());
        builder.push(
            "))::float4 AS score \
             FROM narrative_chunks nc \
             JOIN chunk_metadata cm ON nc.id = cm.chunk_id \
             LEFT JOIN narrative_view nv ON nc.id = nv.id \
             WHERE to_tsvector('english', nc.raw_text) @@ to_tsquery('english', ",
        );
        builder.push_bind(tsquery.to_string());
        builder.push(")");
        push_filters(&mut builder, filters, "cm");
        builder.push(" ORDER BY score DESC LIMIT ");
        builder.push_bind(limit as i64);

        Ok(builder.build_query_as().fetch_all(&self.pool).await?)
    }

    async fn text_hits_websearch(
        &self,
        query_text: &str,
        filters: &Filters,
        limit: usize,
    ) -> Result<Vec<ChunkHitRow>, MemnonError> {
        let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(
            "SELECT nc.id, nc.raw_text, cm.season, cm.episode, cm.scene, \
             nv.world_time::text AS world_time, \
             ts_rank(to_tsvector('english', nc.raw_text), websearch_to_tsquery('english', ",
        );
        builder.push_bind(query_text.to_string());
        builder.push(
            "))::float4 AS score \
             FROM narrative_chunks nc \
             JOIN chunk_metadata cm ON nc.id = cm.chunk_id \
             LEFT JOIN narrative_view nv ON nc.id = nv.id \
             WHERE to_tsvector('english', nc.raw_text) @@ websearch_to_tsquery('english', ",
        );
        builder.push_bind(query_text.to_string());
        builder.push(")");
        push_filters(&mut builder, filters, "cm");
        builder.push(" ORDER BY score DESC LIMIT ");
        builder.push_bind(limit as i64);

        Ok(builder.build_query_as().fetch_all(&self.pool).await?)
    }

    async fn substring_hits(
        &self,
        token: &str,
        filters: &Filters,
        limit: usize,
    ) -> Result<Vec<ChunkHitRow>, MemnonError> {
        let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(
            "SELECT nc.id, nc.raw_text, cm.season, cm.episode, cm.scene, \
             nv.world_time::text AS world_time, 0.0::float4 AS score \
             FROM narrative_chunks nc \
             JOIN chunk_metadata cm ON nc.id = cm.chunk_id \
             LEFT JOIN narrative_view nv ON nc.id = nv.id \
             WHERE nc.raw_text ILIKE '%' || ",
        );
        builder.push_bind(token.to_string());
        builder.push(" || '%'");
        push_filters(&mut builder, filters, "cm");
        builder.push(" LIMIT ");
        builder.push_bind(limit as i64);

        Ok(builder.build_query_as().fetch_all(&self.pool).await?)
    }

    async fn rescore_text(
        &self,
        ids: &[i64],
        form: &TextQueryForm,
    ) -> Result<Vec<(i64, f32)>, MemnonError> {
        let (parser, value) = match form {
            TextQueryForm::TsQuery(q) => ("to_tsquery", q.as_str()),
            TextQueryForm::Websearch(q) => ("websearch_to_tsquery", q.as_str()),
        };
        let sql = format!(
            "SELECT id, ts_rank(to_tsvector('english', raw_text), \
             {parser}('english', $1))::float4 AS score \
             FROM narrative_chunks WHERE id = ANY($2)"
        );
        let rows: Vec<(i64, f32)> = sqlx::query_as(&sql)
            .bind(value.to_string())
            .bind(ids.to_vec())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}
