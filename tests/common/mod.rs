//! Shared builders for integration tests.
#![allow(dead_code)]

use memnon::idf::IdfDictionary;
use memnon::models::{Candidate, Source};

/// A narrative candidate with the given chunk id and fused score.
pub fn chunk_candidate(chunk_id: i64, score: f32) -> Candidate {
    Candidate::narrative(
        chunk_id,
        format!("chunk {chunk_id} text"),
        score,
        Source::HybridSearch,
    )
}

/// Dictionary over surface-form terms (stemmed on insert) with a fixed
/// corpus size.
pub fn idf_with(entries: &[(&str, f32)]) -> IdfDictionary {
    IdfDictionary::from_terms(
        entries.iter().map(|(term, idf)| (term.to_string(), *idf)),
        1_000,
    )
}
