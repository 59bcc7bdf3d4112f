//! Rule-based query analysis: type classification, temporal intent, keyword
//! extraction, and alias-aware entity mentions. No model inference.

pub mod aliases;
pub mod temporal;

use regex::{Regex, RegexBuilder};
use rust_stemmers::{Algorithm, Stemmer};
use serde::Serialize;

use crate::config::AnalysisConfig;
use crate::idf::STOPWORDS;
use crate::models::QueryType;
use crate::MemnonError;

pub use aliases::AliasResolver;
pub use temporal::score_temporal_intent;

const CHARACTER_PATTERNS: &[&str] = &[r"\bwho is\b", r"\bwho was\b", r"\bcharacter\b", r"\bperson\b"];
const LOCATION_PATTERNS: &[&str] = &[
    r"\bwhere\b",
    r"\blocation\b",
    r"\bplace\b",
    r"\bcity\b",
    r"\bdistrict\b",
    r"\barea\b",
];
const EVENT_PATTERNS: &[&str] = &[
    r"\bwhat happened\b",
    r"\bevent\b",
    r"\boccurred\b",
    r"\btook place\b",
    r"\bwhen did\b",
];
const RELATIONSHIP_PATTERNS: &[&str] = &[
    r"\brelationship\b",
    r"\bfeel about\b",
    r"\bthink about\b",
    r"\bfeel towards\b",
    r"\bthink of\b",
];
const THEME_PATTERNS: &[&str] = &[r"\btheme\b", r"\bmotif\b", r"\bsymbolism\b", r"\bmeaning\b"];

/// Signals extracted from one query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryAnalysis {
    pub query_type: QueryType,
    /// 0 favors earliest chunks, 0.5 neutral, 1 favors latest.
    pub temporal_intent: f32,
    /// Stopword-filtered, stemmed tokens.
    pub keywords: Vec<String>,
    pub characters: Vec<String>,
    pub places: Vec<String>,
}

/// Classifies queries and extracts retrieval signals.
pub struct QueryAnalyzer {
    character_patterns: Vec<Regex>,
    location_patterns: Vec<Regex>,
    event_patterns: Vec<Regex>,
    relationship_patterns: Vec<Regex>,
    theme_patterns: Vec<Regex>,
    aliases: AliasResolver,
    stemmer: Stemmer,
}

impl QueryAnalyzer {
    pub fn new(config: &AnalysisConfig, aliases: AliasResolver) -> Result<Self, MemnonError> {
        Ok(Self {
            character_patterns: compile(&config.character_patterns, CHARACTER_PATTERNS)?,
            location_patterns: compile(&config.location_patterns, LOCATION_PATTERNS)?,
            event_patterns: compile(&config.event_patterns, EVENT_PATTERNS)?,
            relationship_patterns: compile(&config.relationship_patterns, RELATIONSHIP_PATTERNS)?,
            theme_patterns: compile(&config.theme_patterns, THEME_PATTERNS)?,
            aliases,
            stemmer: Stemmer::create(Algorithm::English),
        })
    }

    pub fn analyze(&self, query: &str) -> QueryAnalysis {
        QueryAnalysis {
            query_type: self.classify(query),
            temporal_intent: score_temporal_intent(query),
            keywords: self.keywords(query),
            characters: self.aliases.resolve_characters(query),
            places: self.aliases.resolve_places(query),
        }
    }

    /// First matching pattern set wins, evaluated character → location →
    /// event → relationship → theme; default general.
    pub fn classify(&self, query: &str) -> QueryType {
        let groups: [(&[Regex], QueryType); 5] = [
            (&self.character_patterns, QueryType::Character),
            (&self.location_patterns, QueryType::Location),
            (&self.event_patterns, QueryType::Event),
            (&self.relationship_patterns, QueryType::Relationship),
            (&self.theme_patterns, QueryType::Theme),
        ];
        for (patterns, query_type) in groups {
            if patterns.iter().any(|p| p.is_match(query)) {
                return query_type;
            }
        }
        QueryType::General
    }

    fn keywords(&self, query: &str) -> Vec<String> {
        let lowered = query.to_lowercase();
        let mut keywords = Vec::new();
        for token in lowered.split(|c: char| !c.is_ascii_alphanumeric()) {
            if token.len() < 2 || STOPWORDS.contains(&token) {
                continue;
            }
            let stemmed = self.stemmer.stem(token).into_owned();
            if !keywords.contains(&stemmed) {
                keywords.push(stemmed);
            }
        }
        keywords
    }
}

fn compile(configured: &[String], defaults: &[&str]) -> Result<Vec<Regex>, MemnonError> {
    let sources: Vec<String> = if configured.is_empty() {
        defaults.iter().map(|s| s.to_string()).collect()
    } else {
        configured.to_vec()
    };

    sources
        .iter()
        .map(|source| {
            RegexBuilder::new(source)
                .case_insensitive(true)
                .build()
                .map_err(|e| {
                    MemnonError::Configuration(format!("invalid analysis pattern '{}': {}", source, e))
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> QueryAnalyzer {
        QueryAnalyzer::new(&AnalysisConfig::default(), AliasResolver::empty())
            .expect("built-in patterns compile")
    }

    #[test]
    fn classification_order_is_fixed() {
        let analyzer = analyzer();
        assert_eq!(analyzer.classify("Who is Alex?"), QueryType::Character);
        assert_eq!(analyzer.classify("Where is the clinic?"), QueryType::Location);
        assert_eq!(
            analyzer.classify("What happened at the docks?"),
            QueryType::Event
        );
        assert_eq!(
            analyzer.classify("How does Pete feel about Emilia?"),
            QueryType::Relationship
        );
        assert_eq!(
            analyzer.classify("What is the central theme?"),
            QueryType::Theme
        );
        assert_eq!(analyzer.classify("Tell me more."), QueryType::General);
    }

    #[test]
    fn character_wins_over_location_when_both_match() {
        // "who is" (character) and "city" (location) both fire; character is
        // evaluated first.
        assert_eq!(
            analyzer().classify("Who is the fixer in the city?"),
            QueryType::Character
        );
    }

    #[test]
    fn custom_patterns_override_defaults() {
        let config = AnalysisConfig {
            theme_patterns: vec![r"\bundercurrent\b".to_string()],
            ..AnalysisConfig::default()
        };
        let analyzer = QueryAnalyzer::new(&config, AliasResolver::empty()).expect("valid config");
        assert_eq!(
            analyzer.classify("trace the undercurrent of dread"),
            QueryType::Theme
        );
        // default theme vocabulary no longer applies
        assert_eq!(analyzer.classify("name a motif"), QueryType::General);
    }

    #[test]
    fn invalid_pattern_is_a_configuration_error() {
        let config = AnalysisConfig {
            event_patterns: vec!["([unclosed".to_string()],
            ..AnalysisConfig::default()
        };
        assert!(matches!(
            QueryAnalyzer::new(&config, AliasResolver::empty()),
            Err(MemnonError::Configuration(_))
        ));
    }

    #[test]
    fn keywords_are_stemmed_and_filtered() {
        let keywords = analyzer().keywords("The flooded districts and the flood");
        assert!(!keywords.iter().any(|k| STOPWORDS.contains(&k.as_str())));
        // "flooded" and "flood" collapse to one stem
        assert_eq!(keywords, vec!["flood".to_string(), "district".to_string()]);
    }

    #[test]
    fn analyze_fills_every_field() {
        let analysis = analyzer().analyze("What happened at the very beginning?");
        assert_eq!(analysis.query_type, QueryType::Event);
        assert!(analysis.temporal_intent < 0.5);
        assert!(!analysis.keywords.is_empty());
        assert!(analysis.characters.is_empty());
    }
}
