//! Configuration types for the index store, frame sampler, indexer, query engine and provider.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::{Error, Result};

/// Complete engine configuration.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Index store configuration
    pub index: IndexConfig,
    /// Video frame sampling configuration
    pub sampler: SamplerConfig,
    /// Directory walk configuration
    pub indexer: IndexerConfig,
    /// Search configuration
    pub query: QueryConfig,
    /// Embedding provider configuration
    pub provider: ProviderConfig,
}

impl EngineConfig {
    /// Load configuration from a TOML file, then apply environment overrides.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed, or fails validation
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        let config = config.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply environment overrides on top of this configuration.
    ///
    /// Env variables:
    /// - `PHAI_FOLDER`: directory for all engine state; the index lives at `{PHAI_FOLDER}/index`
    /// - `PHAI_EMBEDDING_URL`: base URL of the embedding service
    /// - `PHAI_EMBEDDING_MODEL`: model name sent to the embedding service
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(folder) = env::var("PHAI_FOLDER") {
            let path = PathBuf::from(folder).join("index");
            info!("Using PHAI_FOLDER: {}", path.display());
            self.index.dir = Some(path);
        }
        if let Ok(endpoint) = env::var("PHAI_EMBEDDING_URL") {
            self.provider.endpoint = endpoint;
        }
        if let Ok(model) = env::var("PHAI_EMBEDDING_MODEL") {
            self.provider.model = model;
        }
        self
    }

    /// Check value ranges that serde cannot express
    ///
    /// # Errors
    /// Returns a configuration error naming the first invalid value
    pub fn validate(&self) -> Result<()> {
        if self.sampler.frames == 0 {
            return Err(Error::Config("sampler.frames must be at least 1".to_owned()));
        }
        if self.sampler.candidate_multiplier == 0 {
            return Err(Error::Config(
                "sampler.candidate_multiplier must be at least 1".to_owned(),
            ));
        }
        if self.query.default_limit == 0 {
            return Err(Error::Config("query.default_limit must be at least 1".to_owned()));
        }
        if let Some(threshold) = self.query.threshold
            && !(-1.0..=1.0).contains(&threshold)
        {
            return Err(Error::Config(format!(
                "query.threshold must be within [-1, 1], got {threshold}"
            )));
        }
        if self.query.templates.is_empty() {
            return Err(Error::Config("query.templates must not be empty".to_owned()));
        }
        if let Some(template) = self
            .query
            .templates
            .iter()
            .find(|template| !template.contains(PROMPT_PLACEHOLDER))
        {
            return Err(Error::Config(format!(
                "query template '{template}' has no '{}' placeholder",
                PROMPT_PLACEHOLDER
            )));
        }
        if !(0.0..=1.0).contains(&self.index.compaction_ratio) {
            return Err(Error::Config(
                "index.compaction_ratio must be within [0, 1]".to_owned(),
            ));
        }
        Ok(())
    }

    /// Resolve the index bundle directory.
    ///
    /// Falls back to the platform data directory, then to `./data/index`.
    pub fn resolve_index_dir(&self) -> PathBuf {
        if let Some(dir) = &self.index.dir {
            return dir.clone();
        }
        dirs::data_dir().map_or_else(
            || PathBuf::from("data").join("index"),
            |data| data.join("phai").join("index"),
        )
    }
}

/// Placeholder substituted with a query term inside prompt templates.
pub const PROMPT_PLACEHOLDER: &str = "{}";

/// Index store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Directory of the index bundle (resolved from the environment when unset)
    pub dir: Option<PathBuf>,
    /// Whether each committed record is flushed to stable storage
    pub sync_writes: bool,
    /// Share of superseded log frames that triggers compaction on persist
    pub compaction_ratio: f32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dir: None,
            sync_writes: true,
            compaction_ratio: 0.5,
        }
    }
}

/// How sample timestamps are chosen inside a video.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingPolicy {
    /// K timestamps evenly spaced across the duration
    #[default]
    Uniform,
    /// Oversample, then keep the frames with the largest visual change
    KeyframeBiased,
}

/// How per-frame vectors become the stored vectors of a video.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoAggregation {
    /// One vector: element-wise mean, re-normalized
    #[default]
    Mean,
    /// One vector per sampled frame, reduced by max at query time
    PerFrame,
}

impl VideoAggregation {
    /// Label stored in the index manifest
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::PerFrame => "per_frame",
        }
    }
}

/// Video frame sampling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Number of frames sampled per video
    pub frames: usize,
    /// Timestamp selection policy
    pub policy: SamplingPolicy,
    /// Storage aggregation of per-frame vectors
    pub aggregation: VideoAggregation,
    /// Candidates scanned per kept frame by the keyframe-biased policy
    pub candidate_multiplier: usize,
    /// `ffmpeg` executable
    pub ffmpeg_path: PathBuf,
    /// `ffprobe` executable
    pub ffprobe_path: PathBuf,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            frames: 8,
            policy: SamplingPolicy::Uniform,
            aggregation: VideoAggregation::Mean,
            candidate_multiplier: 3,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
        }
    }
}

/// Directory walk configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Drop records under the root whose files disappeared (incremental mode)
    pub prune_missing: bool,
    /// Follow symbolic links while walking
    pub follow_links: bool,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            prune_missing: true,
            follow_links: false,
        }
    }
}

/// Search configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Result limit when a query does not set one
    pub default_limit: usize,
    /// Similarity threshold when a query does not set one (`None` keeps everything)
    pub threshold: Option<f32>,
    /// Whether related-term expansion runs
    pub expand: bool,
    /// Maximum terms kept after expansion, original phrase included
    pub max_terms: usize,
    /// Maximum prompts embedded per query
    pub max_prompts: usize,
    /// Weight of prompts built from the raw phrase relative to expanded terms
    pub primary_weight: f32,
    /// Prompt templates; `{}` is replaced by a term
    pub templates: Vec<String>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            threshold: None,
            expand: true,
            max_terms: 5,
            max_prompts: 16,
            primary_weight: 2.0,
            templates: vec![
                "{}".to_owned(),
                "a photo of {}".to_owned(),
                "a video of {}".to_owned(),
                "an image showing {}".to_owned(),
            ],
        }
    }
}

/// Embedding provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Base URL of the embedding service
    pub endpoint: String,
    /// Model name sent with each request
    pub model: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:7860".to_owned(),
            model: "ViT-B/32".to_owned(),
            timeout_seconds: 120,
        }
    }
}
