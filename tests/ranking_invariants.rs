//! Property checks over the pure ranking math: scores stay in [0, 1],
//! orderings are weakly decreasing and deterministic, ids stay unique.

mod common;

use common::chunk_candidate;
use memnon::embedding::reranker::{blend_scores, normalize_score};
use memnon::services::{fusion, temporal};
use proptest::prelude::*;

proptest! {
    #[test]
    fn temporal_boost_stays_in_range(
        base in 0.0f32..=1.0,
        position in 0.0f32..=1.0,
        intent in 0.0f32..=1.0,
        factor in 0.0f32..=1.0,
    ) {
        let boosted = temporal::apply_temporal_boost(base, position, intent, factor);
        prop_assert!((0.0..=1.0).contains(&boosted));
    }

    #[test]
    fn blended_scores_stay_in_range(
        alpha in 0.0f32..=1.0,
        fused in 0.0f32..=1.0,
        reranker in -10.0f32..=10.0,
    ) {
        let blended = blend_scores(alpha, fused, normalize_score(reranker));
        prop_assert!((0.0..=1.0).contains(&blended));
    }

    #[test]
    fn fused_scores_stay_in_range_for_normalized_weights(
        vector in 0.0f32..=1.0,
        text in 0.0f32..=1.0,
        raw_vector_weight in 0.01f32..=2.0,
        raw_text_weight in 0.0f32..=2.0,
    ) {
        let (vw, tw) = fusion::normalize_strategy_weights(raw_vector_weight, raw_text_weight);
        let fused = fusion::fuse_scores(vector, text, vw, tw);
        prop_assert!((0.0..=1.0 + 1e-6).contains(&fused));
    }

    #[test]
    fn dedup_and_rank_invariants(
        scores in proptest::collection::vec((0i64..50, 0.0f32..=1.0), 0..60),
        k in 1usize..20,
    ) {
        let candidates = scores
            .iter()
            .map(|(id, score)| chunk_candidate(*id, *score))
            .collect();
        let ranked = fusion::dedup_and_rank(candidates, k);

        prop_assert!(ranked.len() <= k);

        let mut seen = std::collections::HashSet::new();
        for candidate in &ranked {
            prop_assert!(seen.insert(candidate.id.clone()), "duplicate id {}", candidate.id);
            prop_assert!((0.0..=1.0).contains(&candidate.score));
        }

        for window in ranked.windows(2) {
            prop_assert!(window[0].score >= window[1].score);
        }
    }

    #[test]
    fn ranking_is_stable_across_input_order(
        scores in proptest::collection::vec((0i64..30, 0.0f32..=1.0), 0..40),
    ) {
        let forward: Vec<_> = scores.iter().map(|(id, s)| chunk_candidate(*id, *s)).collect();
        let mut reversed = forward.clone();
        reversed.reverse();

        let ranked_forward = fusion::dedup_and_rank(forward, 10);
        let ranked_reversed = fusion::dedup_and_rank(reversed, 10);

        let ids_forward: Vec<_> = ranked_forward.iter().map(|c| c.id.clone()).collect();
        let ids_reversed: Vec<_> = ranked_reversed.iter().map(|c| c.id.clone()).collect();
        prop_assert_eq!(ids_forward, ids_reversed);
    }
}
