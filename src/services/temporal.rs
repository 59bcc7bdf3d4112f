//! Temporal reweighting of fused scores.
//!
//! Chunk ids are dense and chronological, so `chunk_id / total_chunks` is a
//! chunk's normalized position in the story. A query's temporal intent
//! (see `analysis::temporal`) is compared against that position and the
//! fused score is blended toward the match.

use crate::models::{Candidate, Source};

/// Normalized chronological position of a chunk in [0, 1].
pub fn temporal_position(chunk_id: i64, total_chunks: i64) -> f32 {
    let total = total_chunks.max(1);
    let clamped = chunk_id.clamp(0, total);
    clamped as f32 / total as f32
}

/// Blend a base score with how well the chunk's position matches the
/// query's temporal intent. Strong intents (|intent − 0.5| > 0.5 after
/// doubling) get a sharper falloff.
pub fn apply_temporal_boost(
    base_score: f32,
    position: f32,
    intent: f32,
    boost_factor: f32,
) -> f32 {
    let mut match_score = 1.0 - (intent - position).abs();

    let intent_strength = (intent - 0.5).abs() * 2.0;
    if intent_strength > 0.5 {
        match_score = match_score.powf(1.5);
    }

    (base_score * (1.0 - boost_factor) + match_score * boost_factor).clamp(0.0, 1.0)
}

/// Boost factor actually applied for a query: weakly temporal queries
/// (within 0.1 of neutral) halve it, essentially neutral queries (within
/// 0.05) or a vanishing factor disable reweighting.
pub fn effective_boost_factor(intent: f32, configured: f32) -> f32 {
    let distance = (intent - 0.5).abs();
    if distance < 0.05 {
        return 0.0;
    }
    let factor = if distance > 0.1 {
        configured
    } else {
        configured * 0.5
    };
    if factor < 0.01 {
        0.0
    } else {
        factor
    }
}

/// Reweight narrative candidates in place, attaching the original score and
/// temporal position for diagnostics. Entity candidates have no position
/// and pass through untouched.
pub fn reweight_candidates(
    candidates: &mut [Candidate],
    intent: f32,
    boost_factor: f32,
    total_chunks: i64,
) {
    if boost_factor <= 0.0 {
        return;
    }
    for candidate in candidates.iter_mut() {
        let Some(chunk_id) = candidate.chunk_id else {
            continue;
        };
        let position = temporal_position(chunk_id, total_chunks);
        let original = candidate.score;
        candidate.score = apply_temporal_boost(original, position, intent, boost_factor);
        candidate.original_score = Some(original);
        candidate.temporal_position = Some(position);
        candidate.source = Source::TimeAwareSearch;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Candidate;

    #[test]
    fn positions_are_normalized_and_clamped() {
        assert_eq!(temporal_position(0, 100), 0.0);
        assert_eq!(temporal_position(50, 100), 0.5);
        assert_eq!(temporal_position(100, 100), 1.0);
        assert_eq!(temporal_position(150, 100), 1.0);
        assert_eq!(temporal_position(10, 0), 1.0);
    }

    #[test]
    fn zero_boost_factor_is_a_no_op() {
        assert_eq!(apply_temporal_boost(0.42, 0.9, 0.0, 0.0), 0.42);

        let mut candidates = vec![Candidate::narrative(
            5,
            String::new(),
            0.42,
            crate::models::Source::HybridSearch,
        )];
        reweight_candidates(&mut candidates, 0.0, 0.0, 100);
        assert_eq!(candidates[0].score, 0.42);
        assert!(candidates[0].temporal_position.is_none());
    }

    #[test]
    fn early_intent_prefers_early_chunks() {
        let early = apply_temporal_boost(0.5, 0.05, 0.1, 0.3);
        let late = apply_temporal_boost(0.5, 0.95, 0.1, 0.3);
        assert!(early > late);
    }

    #[test]
    fn strong_intent_gets_a_sharper_falloff() {
        // intent 0.95 is strong; a mid-corpus chunk is penalized more than
        // the linear curve would
        let linear_match = 1.0 - (0.95f32 - 0.5).abs();
        let boosted = apply_temporal_boost(0.0, 0.5, 0.95, 1.0);
        assert!(boosted < linear_match);
        assert!((boosted - linear_match.powf(1.5)).abs() < 1e-6);
    }

    #[test]
    fn effective_factor_gates_on_intent_distance() {
        // essentially neutral: disabled
        assert_eq!(effective_boost_factor(0.52, 0.3), 0.0);
        // weakly temporal: halved
        assert!((effective_boost_factor(0.42, 0.3) - 0.15).abs() < 1e-6);
        // clearly temporal: full factor
        assert!((effective_boost_factor(0.1, 0.3) - 0.3).abs() < 1e-6);
        // vanishing configured factor: disabled
        assert_eq!(effective_boost_factor(0.1, 0.005), 0.0);
    }

    #[test]
    fn reweighting_attaches_diagnostics() {
        let mut candidates = vec![
            Candidate::narrative(10, String::new(), 0.6, crate::models::Source::HybridSearch),
            Candidate::narrative(990, String::new(), 0.6, crate::models::Source::HybridSearch),
        ];
        reweight_candidates(&mut candidates, 0.1, 0.3, 1_000);

        for candidate in &candidates {
            assert_eq!(candidate.original_score, Some(0.6));
            let position = candidate.temporal_position.expect("position attached");
            assert!((0.0..=1.0).contains(&position));
            assert!((0.0..=1.0).contains(&candidate.score));
        }
        // early chunk now outranks the late one for an early-intent query
        assert!(candidates[0].score > candidates[1].score);
    }
}
