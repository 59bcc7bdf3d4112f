//! Alias-aware entity mention resolution.
//!
//! The corpus is narrated in the second person, so `you`/`your` refer to the
//! configured point-of-view character. The resolver folds the second-person
//! pronouns into that character's alias set at construction time; a query
//! containing any alias surfaces the canonical entity.

use std::collections::BTreeMap;

use regex::{Regex, RegexBuilder};
use tracing::warn;

pub const SECOND_PERSON_PRONOUNS: &[&str] = &["You", "Your", "Yours", "Yourself"];

struct EntityPattern {
    canonical: String,
    pattern: Regex,
}

/// Maps surface forms in a query to canonical entity names.
pub struct AliasResolver {
    characters: Vec<EntityPattern>,
    places: Vec<EntityPattern>,
}

impl AliasResolver {
    /// Build from canonical-name → alias lists. The canonical name is always
    /// part of its own alias set; when `pov_character` names a known
    /// character, the second-person pronouns join their aliases.
    pub fn new(
        characters: BTreeMap<String, Vec<String>>,
        places: Vec<String>,
        pov_character: Option<&str>,
    ) -> Self {
        let pov_lower = pov_character.map(str::to_lowercase);

        let character_patterns = characters
            .into_iter()
            .filter_map(|(canonical, mut aliases)| {
                if !aliases.iter().any(|a| a.eq_ignore_ascii_case(&canonical)) {
                    aliases.push(canonical.clone());
                }
                if pov_lower.as_deref() == Some(canonical.to_lowercase().as_str()) {
                    for pronoun in SECOND_PERSON_PRONOUNS {
                        if !aliases.iter().any(|a| a.eq_ignore_ascii_case(pronoun)) {
                            aliases.push(pronoun.to_string());
                        }
                    }
                }
                compile_pattern(&aliases).map(|pattern| EntityPattern { canonical, pattern })
            })
            .collect();

        let place_patterns = places
            .into_iter()
            .filter_map(|name| {
                compile_pattern(std::slice::from_ref(&name))
                    .map(|pattern| EntityPattern { canonical: name, pattern })
            })
            .collect();

        Self {
            characters: character_patterns,
            places: place_patterns,
        }
    }

    /// Resolver with no known entities; extraction returns nothing.
    pub fn empty() -> Self {
        Self {
            characters: Vec::new(),
            places: Vec::new(),
        }
    }

    /// Canonical character names mentioned (directly or via alias) in the
    /// query, deduplicated in first-mention order.
    pub fn resolve_characters(&self, query: &str) -> Vec<String> {
        resolve(&self.characters, query)
    }

    /// Canonical place names mentioned in the query.
    pub fn resolve_places(&self, query: &str) -> Vec<String> {
        resolve(&self.places, query)
    }
}

fn resolve(patterns: &[EntityPattern], query: &str) -> Vec<String> {
    let mut found = Vec::new();
    for entity in patterns {
        if entity.pattern.is_match(query) && !found.contains(&entity.canonical) {
            found.push(entity.canonical.clone());
        }
    }
    found
}

/// One case-insensitive word-boundary pattern covering all aliases.
fn compile_pattern(aliases: &[String]) -> Option<Regex> {
    let alternatives: Vec<String> = aliases
        .iter()
        .filter(|a| !a.trim().is_empty())
        .map(|a| regex::escape(a.trim()))
        .collect();
    if alternatives.is_empty() {
        return None;
    }
    let source = format!(r"\b(?:{})\b", alternatives.join("|"));
    match RegexBuilder::new(&source).case_insensitive(true).build() {
        Ok(pattern) => Some(pattern),
        Err(e) => {
            warn!("Failed to compile alias pattern {:?}: {}", aliases, e);
            None
        }
    }
}
