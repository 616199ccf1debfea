//! Core types and traits for the personal media search engine.
//!
//! This crate provides the media data model, error handling, configuration
//! and vector helpers shared by the indexing engine and its callers.
#![cfg_attr(
    test,
    allow(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::float_cmp,
        reason = "Test allows"
    )
)]

/// Engine configuration loaded from TOML and the environment.
pub mod config;
/// Error types and result definitions.
pub mod error;
/// Synchronization helpers for lock poisoning.
pub mod sync;
/// Media data model shared across the engine.
pub mod types;
/// Embedding vector math.
pub mod vector;

pub use config::{
    EngineConfig, IndexConfig, IndexerConfig, PROMPT_PLACEHOLDER, ProviderConfig, QueryConfig,
    SamplerConfig, SamplingPolicy, VideoAggregation,
};
pub use error::{Error, Result};
pub use sync::{IgnoreLock, IgnoreRwLock};
pub use types::{Embedding, Fingerprint, MediaIdentity, MediaItem, MediaKind};
