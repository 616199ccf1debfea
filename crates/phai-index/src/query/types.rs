//! Query and result types for semantic search.

use phai_core::{Error, MediaKind, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::time::SystemTime;

/// A free-text search request
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Natural-language phrase
    pub text: String,
    /// Maximum results; the engine default applies when unset
    pub limit: Option<usize>,
    /// Minimum score; no filtering when unset and none is configured
    pub threshold: Option<f32>,
}

impl Query {
    /// Create a query with engine defaults for limit and threshold
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            limit: None,
            threshold: None,
        }
    }

    /// Set the result limit
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set the similarity threshold
    #[must_use]
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = Some(threshold);
        self
    }

    /// Reject queries that cannot produce a meaningful search
    ///
    /// # Errors
    /// Returns `InvalidQuery` for blank text, a zero limit or a non-finite threshold
    pub fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(Error::InvalidQuery("query text is empty".to_owned()));
        }
        if self.limit == Some(0) {
            return Err(Error::InvalidQuery("result limit must be at least 1".to_owned()));
        }
        if let Some(threshold) = self.threshold
            && !threshold.is_finite()
        {
            return Err(Error::InvalidQuery(format!(
                "threshold must be a finite number, got {threshold}"
            )));
        }
        Ok(())
    }
}

/// One ranked match
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredItem {
    /// Canonical path of the matching item
    pub path: PathBuf,
    /// Image or video
    pub kind: MediaKind,
    /// Cosine similarity in `[-1, 1]`
    pub score: f32,
    /// Capture timestamp carried from the index
    pub created_at: Option<SystemTime>,
}

/// Ranked answer to a [`Query`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResult {
    /// Matches sorted by descending score, ties by ascending path
    pub items: Vec<ScoredItem>,
    /// Records scored before filtering
    pub scanned: usize,
    /// Prompts embedded for the query
    pub prompts: Vec<String>,
}

impl SearchResult {
    /// Number of matches
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing matched
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
