//! Related-term expansion for search phrases.

use std::collections::HashSet;

/// Maps a search phrase to an ordered set of terms to embed.
///
/// Implementations must be deterministic: the same phrase always yields the
/// same terms in the same order, with the phrase itself first.
pub trait QueryExpander: Send + Sync {
    /// Expand `phrase` into related terms
    fn expand(&self, phrase: &str) -> Vec<String>;
}

/// Expander that returns the phrase unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExpansion;

impl QueryExpander for NoExpansion {
    fn expand(&self, phrase: &str) -> Vec<String> {
        vec![phrase.trim().to_owned()]
    }
}

/// Keyword table mapping a word to related terms
#[derive(Debug, Clone)]
pub struct StaticExpansionTable {
    entries: Vec<(String, Vec<String>)>,
    max_terms: usize,
}

const BUILTIN_TABLE: &[(&str, &[&str])] = &[
    ("drawing", &["drawing", "sketching", "art", "painting", "illustration"]),
    ("painting", &["painting", "art", "drawing", "canvas"]),
    ("cooking", &["cooking", "baking", "preparing food"]),
    ("eating", &["eating", "dining", "meal", "food"]),
    ("exercising", &["exercising", "working out", "fitness", "sports"]),
    ("reading", &["reading", "book", "study"]),
    ("sleeping", &["sleeping", "rest", "bed"]),
    ("talking", &["talking", "speaking", "conversation", "chatting"]),
    ("outdoor", &["outdoor", "outside", "nature", "park", "garden"]),
    ("indoor", &["indoor", "inside", "home", "room"]),
    ("dog", &["dog", "puppy", "canine", "pet"]),
    ("cat", &["cat", "kitten", "feline", "pet"]),
];

impl StaticExpansionTable {
    /// Create a table from `(keyword, related terms)` entries, in match order
    pub fn new(entries: Vec<(String, Vec<String>)>, max_terms: usize) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(key, terms)| (key.to_lowercase(), terms))
                .collect(),
            max_terms: max_terms.max(1),
        }
    }

    /// Built-in table for everyday photo subjects and activities
    pub fn builtin(max_terms: usize) -> Self {
        Self::new(
            BUILTIN_TABLE
                .iter()
                .map(|(key, terms)| {
                    (
                        (*key).to_owned(),
                        terms.iter().map(|term| (*term).to_owned()).collect(),
                    )
                })
                .collect(),
            max_terms,
        )
    }

    fn tokens(phrase: &str) -> Vec<String> {
        phrase
            .split(|character: char| !character.is_alphanumeric())
            .filter(|token| !token.is_empty())
            .map(str::to_lowercase)
            .collect()
    }

    fn matches(key: &str, tokens: &[String]) -> bool {
        tokens
            .iter()
            .any(|token| token == key || token.strip_suffix('s') == Some(key))
    }
}

impl Default for StaticExpansionTable {
    fn default() -> Self {
        Self::builtin(5)
    }
}

impl QueryExpander for StaticExpansionTable {
    fn expand(&self, phrase: &str) -> Vec<String> {
        let phrase = phrase.trim();
        let tokens = Self::tokens(phrase);

        let mut seen = HashSet::new();
        let mut terms = Vec::with_capacity(self.max_terms);
        seen.insert(phrase.to_lowercase());
        terms.push(phrase.to_owned());

        for (key, related) in &self.entries {
            if !Self::matches(key, &tokens) {
                continue;
            }
            for term in related {
                if terms.len() >= self.max_terms {
                    return terms;
                }
                if seen.insert(term.to_lowercase()) {
                    terms.push(term.clone());
                }
            }
        }
        terms
    }
}
