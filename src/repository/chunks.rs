//! Chunk-level search and corpus statistics.

use pgvector::Vector;
use sqlx::{FromRow, Postgres, QueryBuilder};

use crate::db::{resolve_dimension_table, MemnonPool};
use crate::models::{Candidate, CandidateMetadata, Filters, Source};
use crate::repository::push_filters;
use crate::MemnonError;

/// Read-only access to narrative chunks, their metadata, and the
/// per-dimension embedding tables.
#[derive(Clone)]
pub struct ChunkRepository {
    pub(crate) pool: MemnonPool,
}

/// One scored chunk row, shared by vector and text searches.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct ChunkHitRow {
    pub id: i64,
    pub raw_text: String,
    pub season: Option<i32>,
    pub episode: Option<i32>,
    pub scene: Option<i32>,
    pub world_time: Option<String>,
    pub score: f32,
}

#[derive(Debug, FromRow)]
struct ChunkDetailRow {
    id: i64,
    raw_text: String,
    season: Option<i32>,
    episode: Option<i32>,
    scene: Option<i32>,
    world_layer: Option<String>,
    perspective: Option<String>,
    location: Option<String>,
}

impl ChunkHitRow {
    pub(crate) fn metadata(&self) -> CandidateMetadata {
        CandidateMetadata {
            season: self.season,
            episode: self.episode,
            scene: self.scene,
            world_time: self.world_time.clone(),
            ..CandidateMetadata::default()
        }
    }
}

impl ChunkRepository {
    pub fn new(pool: MemnonPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &MemnonPool {
        &self.pool
    }

    /// Cosine-ranked rows from the embedding table matching the vector's
    /// dimensionality, restricted to one model.
    pub(crate) async fn vector_hits(
        &self,
        embedding: &[f32],
        model_key: &str,
        filters: &Filters,
        limit: usize,
    ) -> Result<Vec<ChunkHitRow>, MemnonError> {
        let table = resolve_dimension_table(embedding.len()).ok_or_else(|| {
            MemnonError::InvalidInput(format!(
                "no embedding table for {}-dimensional vectors",
                embedding.len()
            ))
        })?;

        let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(
            "SELECT nc.id, nc.raw_text, cm.season, cm.episode, cm.scene, \
             nv.world_time::text AS world_time, \
             (1 - (ce.embedding <=> ",
        );
        builder.push_bind(Vector::from(embedding.to_vec()));
        builder.push(format!(
            "))::float4 AS score \
             FROM narrative_chunks nc \
             JOIN {table} ce ON nc.id = ce.chunk_id \
             JOIN chunk_metadata cm ON nc.id = cm.chunk_id \
             LEFT JOIN narrative_view nv ON nc.id = nv.id \
             WHERE ce.model = "
        ));
        builder.push_bind(model_key.to_string());
        push_filters(&mut builder, filters, "cm");
        builder.push(" ORDER BY score DESC LIMIT ");
        builder.push_bind(limit as i64);

        Ok(builder.build_query_as().fetch_all(&self.pool).await?)
    }

    /// Similarity-ranked candidates for one model. Similarity is
    /// `1 − cosine_distance`, clamped to [0, 1].
    pub async fn vector_search(
        &self,
        embedding: &[f32],
        model_key: &str,
        filters: &Filters,
        top_k: usize,
    ) -> Result<Vec<Candidate>, MemnonError> {
        let rows = self.vector_hits(embedding, model_key, filters, top_k).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let score = row.score.clamp(0.0, 1.0);
                let mut candidate =
                    Candidate::narrative(row.id, row.raw_text.clone(), score, Source::VectorSearch);
                candidate.metadata = row.metadata();
                candidate.vector_score = Some(score);
                candidate.model_scores.insert(model_key.to_string(), score);
                candidate
            })
            .collect())
    }

    /// Direct lookup for the reserved `chunk_id:` query form.
    pub async fn chunk_by_id(&self, chunk_id: i64) -> Result<Option<Candidate>, MemnonError> {
        let row: Option<ChunkDetailRow> = sqlx::query_as(
            "SELECT nc.id, nc.raw_text, cm.season, cm.episode, cm.scene, \
             cm.world_layer, cm.perspective, cm.location \
             FROM narrative_chunks nc \
             LEFT JOIN chunk_metadata cm ON nc.id = cm.chunk_id \
             WHERE nc.id = $1",
        )
        .bind(chunk_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| {
            let mut candidate =
                Candidate::narrative(row.id, row.raw_text, 1.0, Source::DirectIdLookup);
            candidate.metadata = CandidateMetadata {
                season: row.season,
                episode: row.episode,
                scene: row.scene,
                world_layer: row.world_layer,
                perspective: row.perspective,
                location: row.location,
                ..CandidateMetadata::default()
            };
            candidate
        }))
    }

    /// Total corpus size; chunk ids are dense and chronological, so this
    /// also normalizes temporal positions.
    pub async fn total_chunks(&self) -> Result<i64, MemnonError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM narrative_chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Per-lexeme document frequencies from the full-text engine, used to
    /// build the IDF dictionary.
    pub async fn term_document_frequencies(&self) -> Result<Vec<(String, i64)>, MemnonError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT word, ndoc::int8 FROM ts_stat(\
             'SELECT to_tsvector(''english'', raw_text) FROM narrative_chunks')",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
