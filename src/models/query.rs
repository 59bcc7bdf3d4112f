//! Query and response types for the public retrieval interface.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::Candidate;

/// Rule-based query classification. First matching pattern set wins,
/// evaluated character → location → event → relationship → theme.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Character,
    Location,
    Event,
    Relationship,
    Theme,
    #[default]
    General,
    /// Reserved `chunk_id:<int>` lookups; never produced by classification.
    DirectId,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Character => "character",
            QueryType::Location => "location",
            QueryType::Event => "event",
            QueryType::Relationship => "relationship",
            QueryType::Theme => "theme",
            QueryType::General => "general",
            QueryType::DirectId => "direct_id",
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "character" => Ok(QueryType::Character),
            "location" => Ok(QueryType::Location),
            "event" => Ok(QueryType::Event),
            "relationship" => Ok(QueryType::Relationship),
            "theme" => Ok(QueryType::Theme),
            "general" => Ok(QueryType::General),
            other => Err(format!("unknown query type: '{}'", other)),
        }
    }
}

/// Metadata filters applied to chunk searches. All values are bound
/// parameters; there is no free-form filter surface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub season: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub world_layer: Option<String>,
}

impl Filters {
    pub fn is_empty(&self) -> bool {
        self.season.is_none() && self.episode.is_none() && self.world_layer.is_none()
    }
}

/// Timing and volume diagnostics for one retrieval call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchStats {
    /// Wall-clock seconds for the whole call.
    pub query_time: f64,
    pub total_candidate_results: usize,
    pub final_result_count: usize,
    pub strategies_used: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_weight: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_weight: Option<f32>,
    /// Set when the rare-term rule lifted the text weight.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rare_term_adjustment: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporal_intent: Option<f32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_strategies: Vec<String>,
}

/// Diagnostics block attached to every response.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResponseMetadata {
    pub search_strategies: Vec<String>,
    pub search_stats: SearchStats,
    pub result_count: usize,
    pub filters_applied: Filters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Final output of `query_memory`: the query echo, its classified type,
/// the ranked candidates, and diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResponse {
    pub query: String,
    pub query_type: QueryType,
    pub results: Vec<Candidate>,
    pub metadata: ResponseMetadata,
}
