//! Structured entity lookup over the character and place tables.

use std::collections::BTreeMap;

use crate::db::MemnonPool;
use crate::models::{
    Candidate, CandidateMetadata, CharacterRow, ContentType, EntityKind, PlaceRow, Source,
};
use crate::MemnonError;

/// Score for partial matches that hit only the summary text.
const SUMMARY_MATCH_SCORE: f32 = 0.3;

/// Read-only access to the `characters` and `places` tables.
#[derive(Clone)]
pub struct EntityRepository {
    pool: MemnonPool,
}

impl EntityRepository {
    pub fn new(pool: MemnonPool) -> Self {
        Self { pool }
    }

    /// Case-insensitive exact name/alias match first (score 1.0); partial
    /// matches on name or summary follow, scored by name similarity with a
    /// fixed floor for summary-only hits.
    pub async fn entity_search(
        &self,
        name: &str,
        kind: EntityKind,
        limit: usize,
    ) -> Result<Vec<Candidate>, MemnonError> {
        match kind {
            EntityKind::Characters => self.character_search(name, limit).await,
            EntityKind::Places => self.place_search(name, limit).await,
        }
    }

    async fn character_search(
        &self,
        name: &str,
        limit: usize,
    ) -> Result<Vec<Candidate>, MemnonError> {
        let exact: Vec<CharacterRow> = sqlx::query_as(
            "SELECT c.id, c.name, c.summary, c.current_activity, c.current_location, \
             array_remove(array_agg(DISTINCT ca.alias), NULL) AS aliases \
             FROM characters c \
             LEFT JOIN character_aliases ca ON c.id = ca.character_id \
             WHERE LOWER(c.name) = LOWER($1) \
                OR EXISTS (SELECT 1 FROM character_aliases ca2 \
                           WHERE ca2.character_id = c.id AND LOWER(ca2.alias) = LOWER($1)) \
             GROUP BY c.id, c.name, c.summary, c.current_activity, c.current_location",
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await?;

        if !exact.is_empty() {
            return Ok(exact
                .into_iter()
                .map(|row| character_candidate(row, 1.0))
                .collect());
        }

        let partial: Vec<CharacterRow> = sqlx::query_as(
            "SELECT c.id, c.name, c.summary, c.current_activity, c.current_location, \
             array_remove(array_agg(DISTINCT ca.alias), NULL) AS aliases \
             FROM characters c \
             LEFT JOIN character_aliases ca ON c.id = ca.character_id \
             WHERE c.name ILIKE '%' || $1 || '%' OR c.summary ILIKE '%' || $1 || '%' \
                OR EXISTS (SELECT 1 FROM character_aliases ca3 \
                           WHERE ca3.character_id = c.id AND ca3.alias ILIKE '%' || $1 || '%') \
             GROUP BY c.id, c.name, c.summary, c.current_activity, c.current_location \
             LIMIT $2",
        )
        .bind(name)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut candidates: Vec<Candidate> = partial
            .into_iter()
            .map(|row| {
                let score = partial_match_score(name, &row.name);
                character_candidate(row, score)
            })
            .collect();
        candidates.sort_by(|a, b| match b.score.partial_cmp(&a.score) {
            Some(std::cmp::Ordering::Equal) | None => a.id.cmp(&b.id),
            Some(ordering) => ordering,
        });
        Ok(candidates)
    }

    async fn place_search(&self, name: &str, limit: usize) -> Result<Vec<Candidate>, MemnonError> {
        let exact: Vec<PlaceRow> = sqlx::query_as(
            "SELECT id, name, type, zone, summary, inhabitants, current_status \
             FROM places WHERE LOWER(name) = LOWER($1)",
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await?;

        if !exact.is_empty() {
            return Ok(exact.into_iter().map(|row| place_candidate(row, 1.0)).collect());
        }

        let partial: Vec<PlaceRow> = sqlx::query_as(
            "SELECT id, name, type, zone, summary, inhabitants, current_status \
             FROM places \
             WHERE name ILIKE '%' || $1 || '%' OR summary ILIKE '%' || $1 || '%' \
             LIMIT $2",
        )
        .bind(name)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut candidates: Vec<Candidate> = partial
            .into_iter()
            .map(|row| {
                let score = partial_match_score(name, &row.name);
                place_candidate(row, score)
            })
            .collect();
        candidates.sort_by(|a, b| match b.score.partial_cmp(&a.score) {
            Some(std::cmp::Ordering::Equal) | None => a.id.cmp(&b.id),
            Some(ordering) => ordering,
        });
        Ok(candidates)
    }

    /// Canonical-name → alias map for the analyzer, aggregated from the
    /// alias table. The canonical name is always part of its own alias set.
    pub async fn load_alias_map(&self) -> Result<BTreeMap<String, Vec<String>>, MemnonError> {
        let rows: Vec<(String, Option<Vec<String>>)> = sqlx::query_as(
            "SELECT c.name, array_remove(array_agg(DISTINCT ca.alias), NULL) AS aliases \
             FROM characters c \
             LEFT JOIN character_aliases ca ON c.id = ca.character_id \
             GROUP BY c.id, c.name",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut map = BTreeMap::new();
        for (name, aliases) in rows {
            let mut aliases = aliases.unwrap_or_default();
            if !aliases.iter().any(|a| a.eq_ignore_ascii_case(&name)) {
                aliases.push(name.clone());
            }
            map.insert(name, aliases);
        }
        Ok(map)
    }

    /// Canonical place names for mention extraction.
    pub async fn load_place_names(&self) -> Result<Vec<String>, MemnonError> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT name FROM places")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }
}

/// Similarity-derived score for a name partial match; summary-only hits
/// fall back to a fixed floor.
fn partial_match_score(query: &str, name: &str) -> f32 {
    let query_lower = query.to_lowercase();
    let name_lower = name.to_lowercase();
    if name_lower.contains(&query_lower) {
        let similarity = rapidfuzz::distance::levenshtein::normalized_similarity(
            query_lower.chars(),
            name_lower.chars(),
        ) as f32;
        similarity.max(SUMMARY_MATCH_SCORE)
    } else {
        SUMMARY_MATCH_SCORE
    }
}

fn character_candidate(row: CharacterRow, score: f32) -> Candidate {
    let aliases = row.aliases.unwrap_or_default();
    Candidate {
        id: format!("character:{}", row.id),
        chunk_id: None,
        content_type: ContentType::Character,
        text: row.summary.clone().unwrap_or_else(|| row.name.clone()),
        metadata: CandidateMetadata {
            name: Some(row.name),
            aliases,
            current_activity: row.current_activity,
            current_location: row.current_location,
            ..CandidateMetadata::default()
        },
        score,
        vector_score: None,
        text_score: None,
        model_scores: BTreeMap::new(),
        reranker_score: None,
        original_score: None,
        temporal_position: None,
        source: Source::StructuredData,
    }
}

fn place_candidate(row: PlaceRow, score: f32) -> Candidate {
    Candidate {
        id: format!("place:{}", row.id),
        chunk_id: None,
        content_type: ContentType::Place,
        text: row.summary.clone().unwrap_or_else(|| row.name.clone()),
        metadata: CandidateMetadata {
            name: Some(row.name),
            place_type: row.place_type,
            zone: row.zone,
            inhabitants: row.inhabitants.unwrap_or_default(),
            current_status: row.current_status,
            ..CandidateMetadata::default()
        },
        score,
        vector_score: None,
        text_score: None,
        model_scores: BTreeMap::new(),
        reranker_score: None,
        original_score: None,
        temporal_position: None,
        source: Source::StructuredData,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_substring_name_scores_by_similarity() {
        let score = partial_match_score("emilia", "Emilia Rodriguez");
        assert!(score > 0.3 && score < 1.0);
    }

    #[test]
    fn summary_only_match_gets_the_floor() {
        assert_eq!(partial_match_score("smuggler", "Emilia"), SUMMARY_MATCH_SCORE);
    }

    #[test]
    fn identical_names_score_one() {
        assert!((partial_match_score("Emilia", "emilia") - 1.0).abs() < 1e-6);
    }
}
