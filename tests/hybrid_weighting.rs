//! Weight handling for hybrid search: normalization, query-type overrides,
//! and the rare-term text-weight lift.

mod common;

use common::idf_with;
use memnon::config::HybridSearchConfig;
use memnon::models::QueryType;
use memnon::services::fusion;
use pretty_assertions::assert_eq;

fn hybrid_config() -> HybridSearchConfig {
    HybridSearchConfig {
        rare_term_min_text_weight: 0.5,
        rare_term_idf_threshold: 3.0,
        ..HybridSearchConfig::default()
    }
}

#[test]
fn rare_term_lifts_text_weight_to_the_floor() {
    let idf = idf_with(&[("resurrection", 3.2)]);
    let (vector, text, adjusted) = fusion::adjust_weights_for_rare_terms(
        &idf,
        &hybrid_config(),
        "Sullivan karaoke resurrection",
        QueryType::Character,
        0.8,
        0.2,
    );
    assert!(adjusted);
    assert!((text - 0.5).abs() < 1e-6);
    assert!((vector - 0.5).abs() < 1e-6);
}

#[test]
fn common_terms_leave_weights_unchanged() {
    let idf = idf_with(&[]);
    let (vector, text, adjusted) = fusion::adjust_weights_for_rare_terms(
        &idf,
        &hybrid_config(),
        "common words only",
        QueryType::General,
        0.7,
        0.3,
    );
    assert!(!adjusted);
    assert!((vector - 0.7).abs() < 1e-6);
    assert!((text - 0.3).abs() < 1e-6);
}

#[test]
fn excluded_query_types_skip_the_lift() {
    let idf = idf_with(&[("resurrection", 3.2)]);
    let config = HybridSearchConfig {
        rare_term_excluded_query_types: vec![QueryType::Theme],
        ..hybrid_config()
    };
    let (vector, text, adjusted) = fusion::adjust_weights_for_rare_terms(
        &idf,
        &config,
        "resurrection symbolism",
        QueryType::Theme,
        0.8,
        0.2,
    );
    assert!(!adjusted);
    assert!((vector - 0.8).abs() < 1e-6);
    assert!((text - 0.2).abs() < 1e-6);
}

#[test]
fn already_text_heavy_weights_are_not_lowered() {
    let idf = idf_with(&[("resurrection", 3.2)]);
    let (vector, text, adjusted) = fusion::adjust_weights_for_rare_terms(
        &idf,
        &hybrid_config(),
        "resurrection",
        QueryType::General,
        0.3,
        0.7,
    );
    // the floor is 0.5; a heavier text weight stays as it is
    assert!(!adjusted);
    assert!((text - 0.7).abs() < 1e-6);
    assert!((vector - 0.3).abs() < 1e-6);
}

#[test]
fn rare_terms_below_threshold_do_not_fire() {
    let idf = idf_with(&[("karaoke", 2.4)]);
    let (_, _, adjusted) = fusion::adjust_weights_for_rare_terms(
        &idf,
        &hybrid_config(),
        "karaoke night",
        QueryType::General,
        0.8,
        0.2,
    );
    assert!(!adjusted);
}

#[test]
fn weighted_query_prefers_the_rare_set_for_rare_queries() {
    let idf = idf_with(&[
        ("resurrection", 3.2),
        ("sullivan", 2.8),
        ("karaoke", 2.4),
        ("night", 1.6),
    ]);
    let query = idf.weighted_query("Sullivan karaoke resurrection night", 12);
    let terms: Vec<&str> = query.split(" | ").collect();
    assert_eq!(terms.len(), 3);
    assert_eq!(terms[0], idf.stem_term("resurrection"));
    assert!(!terms.contains(&idf.stem_term("night").as_str()));
}

#[test]
fn strategy_weights_always_sum_to_one() {
    for (vector, text) in [(0.8, 0.4), (3.0, 1.0), (0.0, 0.2), (0.6, 0.4)] {
        let (v, t) = fusion::normalize_strategy_weights(vector, text);
        assert!((v + t - 1.0).abs() < 1e-6, "({vector}, {text}) -> ({v}, {t})");
    }
}
