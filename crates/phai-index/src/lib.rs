//! Indexing and semantic-search engine for personal photo and video collections.
//!
//! The write path walks a directory, embeds new or changed media (videos via
//! sampled frames) and commits records to a durable [`IndexStore`]. The read
//! path expands a text query into prompts, embeds them and ranks stored items
//! by cosine similarity. [`JobController`] runs both as cancellable background
//! jobs with progress reporting.
#![cfg_attr(
    test,
    allow(
        dead_code,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::missing_errors_doc,
        clippy::float_cmp,
        reason = "Test allows"
    )
)]

/// Embedding provider trait and HTTP client
pub mod embedding;
/// Directory walking and incremental indexing
pub mod indexer;
/// Background jobs, progress and cancellation
pub mod jobs;
/// Query expansion, prompt templating and ranking
pub mod query;
/// Video frame sampling and aggregation
pub mod sampler;
/// Persistent index store
pub mod store;

pub use embedding::{EmbeddingProvider, HttpEmbeddingClient, ImageData};
pub use indexer::{IndexMode, IndexReport, Indexer, SkippedItem};
pub use jobs::{
    JobController, JobId, JobKind, JobOutcome, JobSnapshot, JobState, Progress,
    RETAINED_FINISHED_JOBS, StopFlag,
};
pub use query::{
    PromptTemplates, Query, QueryEngine, QueryExpander, ScoredItem, SearchResult,
    StaticExpansionTable,
};
pub use sampler::{FfmpegFrameSource, FrameSampler, FrameSource};
pub use store::{IndexStats, IndexStore, SharedIndex, StoreSnapshot};
