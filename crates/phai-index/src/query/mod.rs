//! Semantic search over an index snapshot.
//!
//! A query is expanded into related terms, wrapped in descriptive prompt
//! templates and embedded. Prompt vectors are reduced to one query vector by
//! a weighted mean (prompts from the raw phrase weigh more), re-normalized.
//! Each item scores the best cosine similarity across its stored vectors, so
//! per-frame video records compete through their best frame.

mod expansion;
mod prompts;
mod types;

pub use expansion::{NoExpansion, QueryExpander, StaticExpansionTable};
pub use prompts::{Prompt, PromptTemplates};
pub use types::{Query, ScoredItem, SearchResult};

use phai_core::vector::{cosine_similarity, weighted_mean};
use phai_core::{Embedding, Error, MediaItem, QueryConfig, Result};
use std::sync::Arc;
use tracing::{debug, info};

use crate::embedding::EmbeddingProvider;
use crate::jobs::{Progress, StopFlag};
use crate::store::StoreSnapshot;

/// Items scored between cancellation checks
pub const SCORING_BATCH: usize = 256;

/// Ranks stored media against free-text queries
pub struct QueryEngine<E: EmbeddingProvider> {
    provider: Arc<E>,
    expander: Arc<dyn QueryExpander>,
    templates: PromptTemplates,
    config: QueryConfig,
}

impl<E: EmbeddingProvider> QueryEngine<E> {
    /// Create an engine with the built-in expansion table and configured templates
    pub fn new(provider: Arc<E>, config: QueryConfig) -> Self {
        let expander: Arc<dyn QueryExpander> = if config.expand {
            Arc::new(StaticExpansionTable::builtin(config.max_terms))
        } else {
            Arc::new(NoExpansion)
        };
        let templates = PromptTemplates::new(config.templates.clone(), config.max_prompts);
        Self {
            provider,
            expander,
            templates,
            config,
        }
    }

    /// Replace the term expander
    #[must_use]
    pub fn with_expander(mut self, expander: Arc<dyn QueryExpander>) -> Self {
        self.expander = expander;
        self
    }

    /// Replace the prompt templates
    #[must_use]
    pub fn with_templates(mut self, templates: PromptTemplates) -> Self {
        self.templates = templates;
        self
    }

    /// Prompts embedded for `query`, in order
    pub fn prompts(&self, query: &Query) -> Vec<Prompt> {
        let terms = self.expander.expand(&query.text);
        self.templates.compose(&terms)
    }

    /// Embed the prompts of `query` and reduce them to one unit vector
    ///
    /// # Errors
    /// Returns provider errors, or `InvalidQuery` if the prompts embed to
    /// vectors that cannot be averaged
    pub async fn embed_query(&self, query: &Query) -> Result<(Embedding, Vec<Prompt>)> {
        let prompts = self.prompts(query);
        let texts = prompts.iter().map(|prompt| prompt.text.clone()).collect();
        let vectors = self.provider.embed_texts(texts).await?;
        if vectors.len() != prompts.len() {
            return Err(Error::Provider(format!(
                "Expected {} prompt embeddings, got {}",
                prompts.len(),
                vectors.len()
            )));
        }

        let weighted: Vec<(Embedding, f32)> = vectors
            .into_iter()
            .zip(&prompts)
            .map(|(vector, prompt)| {
                let weight = if prompt.primary {
                    self.config.primary_weight
                } else {
                    1.0
                };
                (vector, weight)
            })
            .collect();

        let query_vector = weighted_mean(&weighted).ok_or_else(|| {
            Error::InvalidQuery(format!(
                "Prompt embeddings for '{}' cannot be combined",
                query.text
            ))
        })?;
        Ok((query_vector, prompts))
    }

    /// Best similarity between `query_vector` and any vector of `item`.
    ///
    /// `None` when no stored vector shares the query's dimension.
    pub fn score_item(query_vector: &[f32], item: &MediaItem) -> Option<f32> {
        item.embeddings
            .iter()
            .filter_map(|vector| cosine_similarity(query_vector, vector))
            .reduce(f32::max)
    }

    /// Score every item of `snapshot`, filter by threshold and keep the top results.
    ///
    /// # Errors
    /// Returns `Cancelled` if `stop` is set at a batch boundary
    pub fn rank(
        &self,
        query: &Query,
        query_vector: &[f32],
        snapshot: &StoreSnapshot,
        stop: &StopFlag,
        on_progress: &dyn Fn(Progress),
    ) -> Result<SearchResult> {
        let limit = query.limit.unwrap_or(self.config.default_limit);
        let threshold = query.threshold.or(self.config.threshold);
        let total = snapshot.len();
        let mut scored = Vec::new();
        let mut mismatched = 0usize;

        for (position, item) in snapshot.iter().enumerate() {
            if position % SCORING_BATCH == 0 {
                stop.check()?;
                if position > 0 {
                    on_progress(Progress {
                        processed: position,
                        total,
                        current: None,
                    });
                }
            }

            let Some(score) = Self::score_item(query_vector, item) else {
                mismatched += 1;
                continue;
            };
            if threshold.is_some_and(|minimum| score < minimum) {
                continue;
            }
            scored.push((Arc::clone(item), score));
        }
        on_progress(Progress {
            processed: total,
            total,
            current: None,
        });

        if mismatched > 0 {
            debug!("{mismatched} items skipped: dimension differs from the query");
        }

        scored.sort_by(|(item_a, score_a), (item_b, score_b)| {
            score_b
                .total_cmp(score_a)
                .then_with(|| item_a.path().cmp(item_b.path()))
        });
        scored.truncate(limit);

        Ok(SearchResult {
            items: scored
                .into_iter()
                .map(|(item, score)| ScoredItem {
                    path: item.identity.path.clone(),
                    kind: item.kind,
                    score,
                    created_at: item.created_at,
                })
                .collect(),
            scanned: total,
            prompts: Vec::new(),
        })
    }

    /// Run `query` against `snapshot`
    ///
    /// # Errors
    /// Returns `InvalidQuery` for malformed queries, provider errors from
    /// embedding the prompts, or `Cancelled` if `stop` is set
    pub async fn search(
        &self,
        query: &Query,
        snapshot: &StoreSnapshot,
        stop: &StopFlag,
    ) -> Result<SearchResult> {
        self.search_with_progress(query, snapshot, stop, &|_| {})
            .await
    }

    /// Run `query` against `snapshot`, reporting scoring progress per batch
    ///
    /// # Errors
    /// Same as [`QueryEngine::search`]
    pub async fn search_with_progress(
        &self,
        query: &Query,
        snapshot: &StoreSnapshot,
        stop: &StopFlag,
        on_progress: &(dyn Fn(Progress) + Send + Sync),
    ) -> Result<SearchResult> {
        query.validate()?;
        stop.check()?;

        let (query_vector, prompts) = self.embed_query(query).await?;
        let mut result = self.rank(query, &query_vector, snapshot, stop, on_progress)?;
        result.prompts = prompts.into_iter().map(|prompt| prompt.text).collect();

        info!(
            "Search '{}' matched {} of {} items",
            query.text,
            result.len(),
            result.scanned
        );
        Ok(result)
    }
}
