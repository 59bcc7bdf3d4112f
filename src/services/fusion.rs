//! Score fusion across strategies and embedding models.
//!
//! All functions here are pure; the repository and orchestrator call into
//! them so the math stays testable without a database.

use std::collections::BTreeMap;

use crate::config::HybridSearchConfig;
use crate::idf::IdfDictionary;
use crate::models::{Candidate, QueryType};

/// Normalize the vector/text weight pair to sum to 1. A degenerate pair
/// (zero or negative total) becomes an even split.
pub fn normalize_strategy_weights(vector_weight: f32, text_weight: f32) -> (f32, f32) {
    let total = vector_weight + text_weight;
    if total <= 0.0 {
        return (0.5, 0.5);
    }
    (vector_weight / total, text_weight / total)
}

/// Normalize per-model weights to sum to 1; an all-zero map is returned
/// unchanged.
pub fn normalize_model_weights(weights: &BTreeMap<String, f32>) -> BTreeMap<String, f32> {
    let total: f32 = weights.values().sum();
    if total <= 0.0 {
        return weights.clone();
    }
    weights
        .iter()
        .map(|(model, weight)| (model.clone(), weight / total))
        .collect()
}

/// Weighted mean over the models that actually scored this chunk, with the
/// weights re-normalized to that subset. A chunk scored by no model gets 0.
pub fn weighted_model_average(
    scores: &BTreeMap<String, f32>,
    weights: &BTreeMap<String, f32>,
) -> f32 {
    let mut accumulated = 0.0;
    let mut total_weight = 0.0;
    for (model, weight) in weights {
        if let Some(score) = scores.get(model) {
            accumulated += score * weight;
            total_weight += weight;
        }
    }
    if total_weight > 0.0 {
        accumulated / total_weight
    } else {
        0.0
    }
}

/// Blend vector and text scores. Missing sub-scores are passed in as 0.
pub fn fuse_scores(vector_score: f32, text_score: f32, vector_weight: f32, text_weight: f32) -> f32 {
    vector_score * vector_weight + text_score * text_weight
}

/// Lift the text weight when the query hinges on a rare term, so dense
/// similarity cannot drown an exact rare-name match. Returns the adjusted
/// pair and whether an adjustment fired.
pub fn adjust_weights_for_rare_terms(
    idf: &IdfDictionary,
    hybrid: &HybridSearchConfig,
    query_text: &str,
    query_type: QueryType,
    vector_weight: f32,
    text_weight: f32,
) -> (f32, f32, bool) {
    if hybrid
        .rare_term_excluded_query_types
        .contains(&query_type)
    {
        return (vector_weight, text_weight, false);
    }

    let rare_terms = idf.high_idf_terms(query_text, hybrid.rare_term_idf_threshold);
    if rare_terms.is_empty() {
        return (vector_weight, text_weight, false);
    }

    let lifted_text = text_weight.max(hybrid.rare_term_min_text_weight);
    if (lifted_text - text_weight).abs() < f32::EPSILON {
        return (vector_weight, text_weight, false);
    }
    (1.0 - lifted_text, lifted_text, true)
}

/// Sort by score descending, ties broken by id ascending for determinism.
pub fn sort_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| match b.score.partial_cmp(&a.score) {
        Some(std::cmp::Ordering::Equal) | None => a.id.cmp(&b.id),
        Some(ordering) => ordering,
    });
}

/// Deduplicate by id keeping the highest-scoring copy, then rank and
/// truncate to `k`.
pub fn dedup_and_rank(candidates: Vec<Candidate>, k: usize) -> Vec<Candidate> {
    let mut best: BTreeMap<String, Candidate> = BTreeMap::new();
    for candidate in candidates {
        match best.get(&candidate.id) {
            Some(existing) if existing.score >= candidate.score => {}
            _ => {
                best.insert(candidate.id.clone(), candidate);
            }
        }
    }
    let mut ranked: Vec<Candidate> = best.into_values().collect();
    sort_candidates(&mut ranked);
    ranked.truncate(k);
    ranked
}
