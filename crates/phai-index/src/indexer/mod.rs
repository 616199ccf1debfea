//! Incremental indexing of a directory tree into the index store.

mod scan;

pub use scan::{Candidate, IMAGE_EXTENSIONS, VIDEO_EXTENSIONS, classify, collect_candidates};

use phai_core::{
    Embedding, Error, Fingerprint, IgnoreRwLock as _, IndexerConfig, MediaIdentity, MediaItem,
    MediaKind, Result,
};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::fs as async_fs;
use tokio::task::spawn_blocking;
use tracing::{debug, info, warn};

use crate::embedding::{EmbeddingProvider, ImageData};
use crate::jobs::{Progress, StopFlag};
use crate::sampler::{FrameSampler, FrameSource};
use crate::store::{SharedIndex, UpsertOutcome};

/// Callback invoked after every processed file
pub type ProgressCallback = Arc<dyn Fn(Progress) + Send + Sync>;

/// How an indexing run treats the existing store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexMode {
    /// Clear the store, then index every file
    Full,
    /// Add new and changed files to the existing store
    #[default]
    Incremental,
}

/// A file that could not be indexed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedItem {
    /// File that was skipped
    pub path: PathBuf,
    /// Human-readable cause
    pub reason: String,
}

/// Summary of one indexing run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    /// Supported files found under the root
    pub discovered: usize,
    /// Records written (new or changed files)
    pub embedded: usize,
    /// Files already present with the same fingerprint
    pub unchanged: usize,
    /// Files that failed with an item-level error
    pub skipped: Vec<SkippedItem>,
    /// Records dropped because their file disappeared
    pub removed: usize,
    /// Whether the run stopped early on request
    pub cancelled: bool,
}

impl IndexReport {
    fn skip(&mut self, path: &Path, error: &Error) {
        warn!("Skipping {}: {error}", path.display());
        self.skipped.push(SkippedItem {
            path: path.to_path_buf(),
            reason: error.to_string(),
        });
    }
}

/// Walks a root directory and brings the store up to date with it
pub struct Indexer<E: EmbeddingProvider, F: FrameSource> {
    provider: Arc<E>,
    sampler: Arc<FrameSampler<F>>,
    config: IndexerConfig,
    progress_callback: Option<ProgressCallback>,
}

impl<E: EmbeddingProvider, F: FrameSource> Indexer<E, F> {
    /// Create an indexer over a shared provider and sampler
    pub fn new(provider: Arc<E>, sampler: Arc<FrameSampler<F>>, config: IndexerConfig) -> Self {
        Self {
            provider,
            sampler,
            config,
            progress_callback: None,
        }
    }

    /// Set progress callback
    #[must_use]
    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    fn report_progress(&self, processed: usize, total: usize, current: Option<&Path>) {
        if let Some(callback) = &self.progress_callback {
            callback(Progress {
                processed,
                total,
                current: current.map(Path::to_path_buf),
            });
        }
    }

    /// Index every supported file under `root`.
    ///
    /// Stops between files once `stop` is set; the file in flight is either
    /// fully committed or discarded.
    ///
    /// # Errors
    /// Returns `RootNotFound` for a missing root and store errors as fatal;
    /// per-file failures are reported in [`IndexReport::skipped`]
    pub async fn run(
        &self,
        root: &Path,
        mode: IndexMode,
        store: &SharedIndex,
        stop: &StopFlag,
    ) -> Result<IndexReport> {
        let root = async_fs::canonicalize(root)
            .await
            .map_err(|_| Error::RootNotFound(root.display().to_string()))?;
        info!("Indexing {} ({mode:?})", root.display());

        {
            let mut guard = store.write_ignore_poison();
            if mode == IndexMode::Full {
                guard.clear()?;
            }
            guard.note_aggregation(self.sampler.aggregation());
        }

        let follow_links = self.config.follow_links;
        let walk_root = root.clone();
        let candidates = spawn_blocking(move || collect_candidates(&walk_root, follow_links))
            .await
            .map_err(|error| Error::Other(format!("Directory walk failed: {error}")))?;

        let total = candidates.len();
        let mut report = IndexReport {
            discovered: total,
            ..IndexReport::default()
        };
        self.report_progress(0, total, None);

        for (position, candidate) in candidates.iter().enumerate() {
            if stop.is_requested() {
                report.cancelled = true;
                break;
            }

            match self.process(candidate, store, stop, &mut report).await {
                Ok(()) => {}
                Err(Error::Cancelled) => {
                    report.cancelled = true;
                    break;
                }
                Err(error) => return Err(error),
            }

            self.report_progress(position + 1, total, Some(&candidate.path));
        }

        if mode == IndexMode::Incremental && self.config.prune_missing && !report.cancelled {
            let discovered: HashSet<&Path> = candidates
                .iter()
                .map(|candidate| candidate.path.as_path())
                .collect();
            report.removed = Self::prune_missing(&root, &discovered, store, stop)?;
        }

        info!(
            "Indexing {} finished: {} discovered, {} embedded, {} unchanged, {} skipped, {} removed{}",
            root.display(),
            report.discovered,
            report.embedded,
            report.unchanged,
            report.skipped.len(),
            report.removed,
            if report.cancelled { " (cancelled)" } else { "" }
        );
        Ok(report)
    }

    /// Bring one file up to date.
    ///
    /// Item-level failures are recorded in `report`; only cancellation and
    /// store failures are returned.
    async fn process(
        &self,
        candidate: &Candidate,
        store: &SharedIndex,
        stop: &StopFlag,
        report: &mut IndexReport,
    ) -> Result<()> {
        let item = match self.prepare(candidate, store, stop).await {
            Ok(Some(item)) => item,
            Ok(None) => {
                report.unchanged += 1;
                return Ok(());
            }
            Err(error) if error.is_item_level() => {
                report.skip(&candidate.path, &error);
                return Ok(());
            }
            Err(error) => return Err(error),
        };

        let committed = store.write_ignore_poison().upsert(item);
        match committed {
            Ok(UpsertOutcome::Unchanged) => report.unchanged += 1,
            Ok(UpsertOutcome::Inserted | UpsertOutcome::Replaced) => report.embedded += 1,
            Err(error @ (Error::DimensionMismatch { .. } | Error::Provider(_))) => {
                report.skip(&candidate.path, &error);
            }
            Err(error) => return Err(error),
        }
        Ok(())
    }

    /// Fingerprint and embed one file; `None` when the stored record is current
    async fn prepare(
        &self,
        candidate: &Candidate,
        store: &SharedIndex,
        stop: &StopFlag,
    ) -> Result<Option<MediaItem>> {
        let path = candidate.path.as_path();
        let metadata = async_fs::metadata(path).await?;
        let fingerprint = Fingerprint::from_metadata(&metadata)?;

        if store
            .read_ignore_poison()
            .contains_unchanged(path, &fingerprint)
        {
            debug!("Unchanged: {}", path.display());
            return Ok(None);
        }

        let embeddings = self.embed(candidate, stop).await?;
        let created_at = metadata
            .created()
            .or_else(|_| metadata.modified())
            .ok()
            .filter(|time| *time > SystemTime::UNIX_EPOCH);

        Ok(Some(MediaItem::new(
            MediaIdentity {
                path: path.to_path_buf(),
                fingerprint,
            },
            candidate.kind,
            embeddings,
            created_at,
        )))
    }

    async fn embed(&self, candidate: &Candidate, stop: &StopFlag) -> Result<Vec<Embedding>> {
        match candidate.kind {
            MediaKind::Image => {
                let bytes = async_fs::read(&candidate.path).await?;
                let image = ImageData::new(bytes).with_origin(&candidate.path);
                Ok(vec![self.provider.embed_image(&image).await?])
            }
            MediaKind::Video => {
                self.sampler
                    .embed_video(&candidate.path, self.provider.as_ref(), stop)
                    .await
            }
        }
    }

    fn prune_missing(
        root: &Path,
        discovered: &HashSet<&Path>,
        store: &SharedIndex,
        stop: &StopFlag,
    ) -> Result<usize> {
        let stale: Vec<PathBuf> = store
            .read_ignore_poison()
            .paths_under(root)
            .into_iter()
            .filter(|path| !discovered.contains(path.as_path()) && !path.exists())
            .collect();

        let mut removed = 0;
        for path in stale {
            if stop.is_requested() {
                break;
            }
            if store.write_ignore_poison().remove(&path)? {
                debug!("Pruned missing file {}", path.display());
                removed += 1;
            }
        }
        Ok(removed)
    }
}
