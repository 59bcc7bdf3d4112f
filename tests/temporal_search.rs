//! Temporal intent and reweighting behavior across the analysis and
//! services layers.

mod common;

use common::chunk_candidate;
use memnon::analysis::temporal::score_temporal_intent;
use memnon::services::{fusion, temporal};

#[test]
fn early_query_ranks_early_chunks_first() {
    // two otherwise-equal candidates at opposite ends of the corpus
    let mut candidates = vec![chunk_candidate(950, 0.6), chunk_candidate(50, 0.6)];

    let intent = score_temporal_intent("How did the story begin?");
    assert!(intent <= 0.2, "early intent expected, got {intent}");

    temporal::reweight_candidates(&mut candidates, intent, 0.3, 1_000);
    fusion::sort_candidates(&mut candidates);

    assert_eq!(candidates[0].chunk_id, Some(50));
    assert_eq!(candidates[1].chunk_id, Some(950));
}

#[test]
fn recent_query_ranks_recent_chunks_first() {
    let mut candidates = vec![chunk_candidate(50, 0.6), chunk_candidate(950, 0.6)];

    let intent = score_temporal_intent("What is the most recent development?");
    assert!(intent >= 0.8, "recent intent expected, got {intent}");

    temporal::reweight_candidates(&mut candidates, intent, 0.3, 1_000);
    fusion::sort_candidates(&mut candidates);

    assert_eq!(candidates[0].chunk_id, Some(950));
}

#[test]
fn zero_boost_factor_preserves_the_fused_ranking() {
    let mut candidates = vec![chunk_candidate(10, 0.9), chunk_candidate(990, 0.4)];
    temporal::reweight_candidates(&mut candidates, 1.0, 0.0, 1_000);

    assert_eq!(candidates[0].score, 0.9);
    assert_eq!(candidates[1].score, 0.4);
    assert!(candidates[0].original_score.is_none());
    assert!(candidates[1].temporal_position.is_none());
}

#[test]
fn reweighted_candidates_carry_diagnostics() {
    let mut candidates = vec![chunk_candidate(250, 0.7)];
    temporal::reweight_candidates(&mut candidates, 0.9, 0.3, 1_000);

    let candidate = &candidates[0];
    assert_eq!(candidate.original_score, Some(0.7));
    assert_eq!(candidate.temporal_position, Some(0.25));
    assert!((0.0..=1.0).contains(&candidate.score));
}

#[test]
fn neutral_queries_disable_the_boost() {
    let intent = score_temporal_intent("Who is Emilia?");
    assert_eq!(temporal::effective_boost_factor(intent, 0.3), 0.0);
}

#[test]
fn a_relevance_gap_survives_moderate_boosting() {
    // a much better fused score should not be overturned by a mild
    // positional mismatch
    let mut candidates = vec![chunk_candidate(900, 0.9), chunk_candidate(100, 0.3)];
    temporal::reweight_candidates(&mut candidates, 0.2, 0.3, 1_000);
    fusion::sort_candidates(&mut candidates);
    assert_eq!(candidates[0].chunk_id, Some(900));
}
