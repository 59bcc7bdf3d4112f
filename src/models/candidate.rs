//! The intermediate and final result record.
//!
//! A [`Candidate`] keeps every sub-score that contributed to its aggregate
//! score so that fusion, temporal reweighting, and reranking stay inspectable
//! from the diagnostics of a single call.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Which generator produced (or last transformed) a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    DirectIdLookup,
    VectorSearch,
    TextSearch,
    HybridSearch,
    TimeAwareSearch,
    StructuredData,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::DirectIdLookup => "direct_id_lookup",
            Source::VectorSearch => "vector_search",
            Source::TextSearch => "text_search",
            Source::HybridSearch => "hybrid_search",
            Source::TimeAwareSearch => "time_aware_search",
            Source::StructuredData => "structured_data",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Narrative,
    Character,
    Place,
}

/// Descriptive fields carried alongside a candidate. Narrative chunks fill
/// the chronology fields; entity results fill the name/attribute fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidateMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub season: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub world_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub world_layer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub perspective: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub place_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zone: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inhabitants: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_activity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_location: Option<String>,
}

/// A scored retrieval result. `id` is unique within one response; narrative
/// chunks use the bare chunk id, entities a `kind:id` form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<i64>,
    pub content_type: ContentType,
    pub text: String,
    pub metadata: CandidateMetadata,
    /// Aggregated relevance in [0, 1]; higher is more relevant.
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_score: Option<f32>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub model_scores: BTreeMap<String, f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reranker_score: Option<f32>,
    /// Pre-rerank / pre-reweight score, kept for diagnostics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporal_position: Option<f32>,
    pub source: Source,
}

impl Candidate {
    /// Minimal narrative candidate; search paths fill in the rest.
    pub fn narrative(chunk_id: i64, text: String, score: f32, source: Source) -> Self {
        Self {
            id: chunk_id.to_string(),
            chunk_id: Some(chunk_id),
            content_type: ContentType::Narrative,
            text,
            metadata: CandidateMetadata::default(),
            score,
            vector_score: None,
            text_score: None,
            model_scores: BTreeMap::new(),
            reranker_score: None,
            original_score: None,
            temporal_position: None,
            source,
        }
    }
}
