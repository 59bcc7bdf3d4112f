//! Inverse-document-frequency dictionary for full-text query weighting.
//!
//! Built once from a corpus scan (`ts_stat` over the chunk table), cached to
//! disk with a timestamp, and held read-only in memory afterwards. English
//! stemming is applied identically at build time and lookup so that terms
//! line up with the full-text engine's lexemes.

use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

use chrono::Utc;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::MemnonError;

/// Stopwords excluded from emitted full-text queries. They may still exist
/// in the dictionary itself; low IDF keeps them out of weighted queries.
pub const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have", "in",
    "into", "is", "it", "of", "on", "or", "that", "the", "their", "this", "to", "with",
];

/// Default number of terms a weighted query may carry.
pub const DEFAULT_MAX_TERMS: usize = 12;

/// Terms above this IDF trigger the aggressive selection branch.
const VERY_RARE_IDF: f32 = 3.0;
/// Terms at or above this IDF are preferred over common fallback terms.
const HIGH_VALUE_IDF: f32 = 1.5;

/// Term rarity buckets used by weighting heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightClass {
    A,
    B,
    C,
    D,
}

#[derive(Serialize, Deserialize)]
struct IdfCacheFile {
    built_at: i64,
    total_docs: i64,
    terms: HashMap<String, f32>,
}

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[a-z0-9]+").expect("token pattern is valid"))
}

fn loose_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[a-z0-9']+").expect("token pattern is valid"))
}

/// Corpus-wide IDF table over stemmed tokens.
pub struct IdfDictionary {
    terms: HashMap<String, f32>,
    total_docs: i64,
    stemmer: Stemmer,
}

impl IdfDictionary {
    /// Build from per-term document frequencies. The frequencies come from
    /// the full-text engine and are already lexemized; they are stored as-is.
    pub fn from_document_frequencies(
        frequencies: impl IntoIterator<Item = (String, i64)>,
        total_docs: i64,
    ) -> Self {
        let total = total_docs.max(1) as f64;
        let terms = frequencies
            .into_iter()
            .map(|(word, ndoc)| (word, (total / (ndoc + 1) as f64).ln() as f32))
            .collect();
        Self {
            terms,
            total_docs,
            stemmer: Stemmer::create(Algorithm::English),
        }
    }

    /// Build from explicit term→IDF pairs. Keys are stemmed on insert so
    /// callers can pass surface forms.
    pub fn from_terms(terms: impl IntoIterator<Item = (String, f32)>, total_docs: i64) -> Self {
        let stemmer = Stemmer::create(Algorithm::English);
        let terms = terms
            .into_iter()
            .map(|(term, idf)| (stemmer.stem(&term.to_lowercase()).into_owned(), idf))
            .collect();
        Self {
            terms,
            total_docs,
            stemmer,
        }
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn total_docs(&self) -> i64 {
        self.total_docs
    }

    /// Load the dictionary from its cache file if the cache is younger than
    /// `ttl_secs`. Returns `None` on any miss: absent file, parse failure,
    /// or stale timestamp.
    pub fn load_cache(path: &Path, ttl_secs: u64) -> Option<Self> {
        let contents = std::fs::read_to_string(path).ok()?;
        let cache: IdfCacheFile = match serde_json::from_str(&contents) {
            Ok(cache) => cache,
            Err(e) => {
                warn!("Failed to parse IDF cache {}: {}", path.display(), e);
                return None;
            }
        };

        let age = Utc::now().timestamp() - cache.built_at;
        if age < 0 || age as u64 >= ttl_secs {
            info!("IDF cache is older than {}s, rebuilding", ttl_secs);
            return None;
        }

        info!(
            "Loaded IDF dictionary from cache with {} terms",
            cache.terms.len()
        );
        Some(Self {
            terms: cache.terms,
            total_docs: cache.total_docs,
            stemmer: Stemmer::create(Algorithm::English),
        })
    }

    /// Persist the dictionary next to a build timestamp.
    pub fn save_cache(&self, path: &Path) -> Result<(), MemnonError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let cache = IdfCacheFile {
            built_at: Utc::now().timestamp(),
            total_docs: self.total_docs,
            terms: self.terms.clone(),
        };
        std::fs::write(path, serde_json::to_string(&cache)?)?;
        info!("Saved IDF dictionary to cache at {}", path.display());
        Ok(())
    }

    /// Stem a term the way lookups do. Exposed so callers can relate query
    /// surface forms to dictionary entries.
    pub fn stem_term(&self, term: &str) -> String {
        self.stemmer.stem(&term.to_lowercase()).into_owned()
    }

    /// IDF for a term; unknown terms score 1.0.
    pub fn idf(&self, term: &str) -> f32 {
        self.terms.get(&self.stem_term(term)).copied().unwrap_or(1.0)
    }

    /// Rarity bucket for a term.
    pub fn weight_class(&self, term: &str) -> WeightClass {
        let idf = self.idf(term);
        if idf > 2.5 {
            WeightClass::A
        } else if idf > 2.0 {
            WeightClass::B
        } else if idf > 1.0 {
            WeightClass::C
        } else {
            WeightClass::D
        }
    }

    /// Stemmed, stopword-filtered tokens of the text, deduplicated in order.
    fn tokenize(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        let mut seen = Vec::new();
        for found in token_re().find_iter(&lowered) {
            let raw = found.as_str();
            if raw.len() < 2 || STOPWORDS.contains(&raw) {
                continue;
            }
            let stemmed = self.stemmer.stem(raw).into_owned();
            if !seen.contains(&stemmed) {
                seen.push(stemmed);
            }
        }
        seen
    }

    /// Generate a weighted OR tsquery prioritizing rare terms.
    ///
    /// Terms are ranked by IDF descending. If any term is very rare
    /// (IDF > 3.0), selection turns aggressive: only the IDF ≥ 2.0 set is
    /// kept, capped at five terms. Otherwise up to `max_terms` are chosen,
    /// favoring IDF ≥ 1.5 and filling the remainder from common terms.
    pub fn weighted_query(&self, text: &str, max_terms: usize) -> String {
        let tokens = self.tokenize(text);
        if tokens.is_empty() {
            return String::new();
        }

        let mut ranked: Vec<(String, f32)> = tokens
            .into_iter()
            .map(|t| {
                let idf = self.terms.get(&t).copied().unwrap_or(1.0);
                (t, idf)
            })
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let has_very_rare = ranked.iter().any(|(_, idf)| *idf > VERY_RARE_IDF);
        let selected: Vec<&(String, f32)> = if has_very_rare {
            ranked.iter().filter(|(_, idf)| *idf >= 2.0).take(5).collect()
        } else {
            let high_value: Vec<&(String, f32)> = ranked
                .iter()
                .filter(|(_, idf)| *idf >= HIGH_VALUE_IDF)
                .take(max_terms)
                .collect();
            let mut selected = high_value;
            if selected.len() < max_terms {
                let remaining = max_terms - selected.len();
                selected.extend(
                    ranked
                        .iter()
                        .filter(|(_, idf)| *idf < HIGH_VALUE_IDF)
                        .take(remaining),
                );
            }
            selected
        };

        let selected = if selected.is_empty() {
            ranked.iter().take(1).collect()
        } else {
            selected
        };

        selected
            .iter()
            .map(|(term, _)| term.as_str())
            .collect::<Vec<_>>()
            .join(" | ")
    }

    /// Plain OR query over every stemmed non-stopword token. Used as the
    /// second tier of the full-text fallback protocol.
    pub fn fallback_or_query(&self, text: &str) -> String {
        self.tokenize(text).join(" | ")
    }

    /// Unique rare terms present in the query, normalized the way the
    /// dictionary stores them. Possessives are stripped (`alex's` → `alex`).
    pub fn high_idf_terms(&self, text: &str, threshold: f32) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }

        let lowered = text.to_lowercase();
        let mut terms = Vec::new();
        for found in loose_token_re().find_iter(&lowered) {
            let mut token = found.as_str();
            if let Some(stripped) = token.strip_suffix("'s") {
                token = stripped;
            }
            let token = token.trim_matches('\'');
            if token.is_empty() || STOPWORDS.contains(&token) {
                continue;
            }
            let normalized = self.stemmer.stem(token).into_owned();
            let idf = self.terms.get(&normalized).copied().unwrap_or(1.0);
            if idf >= threshold && !terms.contains(&normalized) {
                terms.push(normalized);
            }
        }
        terms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict(entries: &[(&str, f32)]) -> IdfDictionary {
        IdfDictionary::from_terms(
            entries.iter().map(|(t, i)| (t.to_string(), *i)),
            1_000,
        )
    }

    #[test]
    fn unknown_terms_default_to_one() {
        let dict = dict(&[("resurrection", 3.2)]);
        assert_eq!(dict.idf("nonexistent"), 1.0);
        assert!(dict.idf("resurrection") > 3.0);
    }

    #[test]
    fn weight_classes_follow_thresholds() {
        let dict = dict(&[
            ("rarest", 2.6),
            ("rare", 2.2),
            ("uncommon", 1.4),
            ("common", 0.4),
        ]);
        assert_eq!(dict.weight_class("rarest"), WeightClass::A);
        assert_eq!(dict.weight_class("rare"), WeightClass::B);
        assert_eq!(dict.weight_class("uncommon"), WeightClass::C);
        assert_eq!(dict.weight_class("common"), WeightClass::D);
    }

    #[test]
    fn document_frequencies_use_log_formula() {
        let dict = IdfDictionary::from_document_frequencies(
            vec![("sword".to_string(), 9), ("rain".to_string(), 499)],
            1_000,
        );
        // ln(1000 / 10) and ln(1000 / 500)
        assert!((dict.idf("sword") - 100f32.ln()).abs() < 1e-4);
        assert!((dict.idf("rain") - 2f32.ln()).abs() < 1e-4);
    }

    #[test]
    fn weighted_query_empty_inputs() {
        let dict = dict(&[]);
        assert_eq!(dict.weighted_query("", DEFAULT_MAX_TERMS), "");
        assert_eq!(dict.weighted_query("the and of", DEFAULT_MAX_TERMS), "");
    }

    #[test]
    fn weighted_query_orders_by_idf() {
        let dict = dict(&[("karaoke", 2.4), ("night", 1.6), ("walk", 0.3)]);
        let query = dict.weighted_query("walk night karaoke", DEFAULT_MAX_TERMS);
        let terms: Vec<&str> = query.split(" | ").collect();
        assert_eq!(terms[0], dict.stem_term("karaoke"));
        assert_eq!(terms[1], dict.stem_term("night"));
        assert_eq!(terms[2], dict.stem_term("walk"));
    }

    #[test]
    fn very_rare_terms_trigger_aggressive_selection() {
        let dict = dict(&[
            ("resurrection", 3.4),
            ("karaoke", 2.4),
            ("night", 1.6),
            ("walk", 0.3),
        ]);
        let query = dict.weighted_query("resurrection karaoke night walk", DEFAULT_MAX_TERMS);
        let terms: Vec<&str> = query.split(" | ").collect();
        // only the >= 2.0 set survives
        assert_eq!(terms.len(), 2);
        assert!(terms.contains(&dict.stem_term("resurrection").as_str()));
        assert!(terms.contains(&dict.stem_term("karaoke").as_str()));
        assert!(!query.contains(&dict.stem_term("night")));
    }

    #[test]
    fn high_idf_terms_strip_possessives_and_dedup() {
        let dict = dict(&[("emilia", 2.8), ("walk", 0.3)]);
        let terms = dict.high_idf_terms("Emilia's walk with Emilia", 2.0);
        assert_eq!(terms, vec![dict.stem_term("emilia")]);
    }

    #[test]
    fn high_idf_terms_respect_threshold() {
        let dict = dict(&[("karaoke", 2.4), ("night", 1.6)]);
        assert_eq!(
            dict.high_idf_terms("karaoke night", 2.0),
            vec![dict.stem_term("karaoke")]
        );
        assert!(dict.high_idf_terms("night", 2.0).is_empty());
        assert!(dict.high_idf_terms("", 2.0).is_empty());
    }

    #[test]
    fn fallback_query_filters_stopwords() {
        let dict = dict(&[]);
        let query = dict.fallback_or_query("the neon rain of Night City");
        let terms: Vec<&str> = query.split(" | ").collect();
        assert!(!terms.iter().any(|t| STOPWORDS.contains(t)));
        assert!(terms.contains(&dict.stem_term("neon").as_str()));
        assert!(terms.contains(&dict.stem_term("rain").as_str()));
    }

    #[test]
    fn cache_round_trip_and_ttl() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("idf_cache.json");

        let dict = dict(&[("resurrection", 3.2)]);
        dict.save_cache(&path).expect("cache saved");

        let loaded = IdfDictionary::load_cache(&path, 3_600).expect("fresh cache loads");
        assert_eq!(loaded.len(), dict.len());
        assert!((loaded.idf("resurrection") - 3.2).abs() < 1e-6);

        // zero TTL means any cache is stale
        assert!(IdfDictionary::load_cache(&path, 0).is_none());
        assert!(IdfDictionary::load_cache(&tmp.path().join("missing.json"), 3_600).is_none());
    }
}
