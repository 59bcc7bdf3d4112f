//! Blending reranker scores into fused candidates.

mod common;

use common::chunk_candidate;
use memnon::embedding::reranker::{blend_scores, normalize_score, passage_windows};
use memnon::services::fusion;

#[test]
fn reranker_can_reorder_fused_results() {
    let alpha = 0.3;

    // fused order: 1 > 2; the reranker strongly prefers chunk 2
    let mut candidates = vec![chunk_candidate(1, 0.8), chunk_candidate(2, 0.6)];
    let reranker_scores = [0.1_f32, 0.95_f32];

    for (candidate, reranker_score) in candidates.iter_mut().zip(reranker_scores) {
        let fused = candidate.score;
        candidate.original_score = Some(fused);
        candidate.reranker_score = Some(reranker_score);
        candidate.score = blend_scores(alpha, fused, reranker_score);
    }
    fusion::sort_candidates(&mut candidates);

    assert_eq!(candidates[0].chunk_id, Some(2));
    // blended scores stay in range and both diagnostics are attached
    for candidate in &candidates {
        assert!((0.0..=1.0).contains(&candidate.score));
        assert!(candidate.reranker_score.is_some());
        assert!(candidate.original_score.is_some());
    }
}

#[test]
fn alpha_one_keeps_the_fused_ranking() {
    let mut candidates = vec![chunk_candidate(1, 0.8), chunk_candidate(2, 0.6)];
    for (candidate, reranker_score) in candidates.iter_mut().zip([0.0_f32, 1.0_f32]) {
        candidate.score = blend_scores(1.0, candidate.score, reranker_score);
    }
    fusion::sort_candidates(&mut candidates);
    assert_eq!(candidates[0].chunk_id, Some(1));
}

#[test]
fn logits_are_normalized_before_blending() {
    let blended = blend_scores(0.3, 0.5, normalize_score(8.0));
    assert!((0.0..=1.0).contains(&blended));
    assert!(blended > 0.5);
}

#[test]
fn window_expansion_only_triggers_for_long_passages() {
    let short = passage_windows("A short scene.", 2_048, 12);
    assert_eq!(short.len(), 1);

    let long = (0..120)
        .map(|i| format!("Sentence {i} keeps the night market scene going."))
        .collect::<Vec<_>>()
        .join(" ");
    let windows = passage_windows(&long, 2_048, 12);
    assert!(windows.len() > 1);
    // every window respects a loose version of the character budget
    for window in &windows {
        assert!(window.len() <= 2_048 + 64);
    }
}
