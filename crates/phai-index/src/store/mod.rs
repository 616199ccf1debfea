//! Persistent index of media records keyed by canonical path.
//!
//! A store is a directory bundle holding `manifest.json` and an append-only
//! `records.log`. Every [`IndexStore::upsert`] appends one checksummed frame
//! before the in-memory map changes, so a crash or cancellation leaves only
//! fully committed records behind. [`IndexStore::persist`] rewrites the manifest
//! and compacts the log once superseded frames pile up.

mod log;
mod manifest;

pub use log::{LogRecord, RecordLog, Replay};
pub use manifest::{FORMAT_VERSION, MANIFEST_FILE, Manifest};

use phai_core::{
    Error, Fingerprint, IndexConfig, MediaItem, MediaKind, Result, VideoAggregation,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::iter;
use std::path::{Path, PathBuf};
use std::slice;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Record log file name inside the bundle directory
pub const RECORDS_FILE: &str = "records.log";

/// Index store shared between the indexer and concurrent searches
pub type SharedIndex = Arc<RwLock<IndexStore>>;

/// Outcome of a single upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No record existed under the path
    Inserted,
    /// An older record under the path was superseded
    Replaced,
    /// An identical record was already stored; nothing was written
    Unchanged,
}

/// Counts reported by [`IndexStore::stats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    /// Live records
    pub total: usize,
    /// Image records
    pub images: usize,
    /// Video records
    pub videos: usize,
    /// Vector dimension shared by the records
    pub dimension: Option<usize>,
}

/// Point-in-time view of the stored records, in path order.
///
/// Cheap to clone and unaffected by writes that happen after it was taken.
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    items: Arc<[Arc<MediaItem>]>,
}

impl StoreSnapshot {
    /// Iterate over the records
    pub fn iter(&self) -> impl Iterator<Item = &Arc<MediaItem>> {
        self.items.iter()
    }

    /// Number of records in the snapshot
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the snapshot holds no records
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<'snapshot> IntoIterator for &'snapshot StoreSnapshot {
    type Item = &'snapshot Arc<MediaItem>;
    type IntoIter = slice::Iter<'snapshot, Arc<MediaItem>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Durable mapping from canonical path to [`MediaItem`]
pub struct IndexStore {
    dir: PathBuf,
    records: BTreeMap<PathBuf, Arc<MediaItem>>,
    log: RecordLog,
    frames: usize,
    dimension: Option<usize>,
    aggregation: Option<VideoAggregation>,
    compaction_ratio: f32,
}

impl IndexStore {
    /// Open the bundle in `dir`, creating an empty one if needed.
    ///
    /// # Errors
    /// Returns `StoreCorrupt` if the manifest or a committed record is damaged
    pub fn open(dir: &Path, config: &IndexConfig) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let manifest = Manifest::load(dir)?.unwrap_or_default();
        let (log, replayed) = RecordLog::open(&dir.join(RECORDS_FILE), config.sync_writes)?;
        let frames = replayed.len();

        let mut records = BTreeMap::new();
        for record in replayed {
            match record {
                LogRecord::Put(item) => {
                    records.insert(item.identity.path.clone(), Arc::new(item));
                }
                LogRecord::Remove(path) => {
                    records.remove(&path);
                }
            }
        }

        let dimension = Self::check_dimensions(&records)?;
        info!(
            "Loaded index from {} ({} records, {} log frames)",
            dir.display(),
            records.len(),
            frames
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            records,
            log,
            frames,
            dimension,
            aggregation: manifest.aggregation,
            compaction_ratio: config.compaction_ratio,
        })
    }

    fn check_dimensions(records: &BTreeMap<PathBuf, Arc<MediaItem>>) -> Result<Option<usize>> {
        let mut dimension = None;
        for item in records.values() {
            let Some(actual) = item.dimension() else {
                continue;
            };
            match dimension {
                Some(expected) if expected != actual => {
                    return Err(Error::StoreCorrupt(format!(
                        "Record {} has dimension {actual}, index uses {expected}",
                        item.path().display()
                    )));
                }
                Some(_) => {}
                None => dimension = Some(actual),
            }
        }
        Ok(dimension)
    }

    /// Wrap the store for sharing across tasks
    pub fn into_shared(self) -> SharedIndex {
        Arc::new(RwLock::new(self))
    }

    /// Bundle directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Insert or replace the record for `item`'s path.
    ///
    /// Storing an identical record twice is a no-op.
    ///
    /// # Errors
    /// Returns `DimensionMismatch` if the item disagrees with the index
    /// dimension, or an I/O error if the record cannot be committed
    pub fn upsert(&mut self, item: MediaItem) -> Result<UpsertOutcome> {
        item.validate()?;
        if let (Some(expected), Some(actual)) = (self.dimension, item.dimension())
            && expected != actual
        {
            return Err(Error::DimensionMismatch { expected, actual });
        }

        let existing = self.records.get(item.path());
        if existing.is_some_and(|stored| **stored == item) {
            return Ok(UpsertOutcome::Unchanged);
        }
        let outcome = if existing.is_some() {
            UpsertOutcome::Replaced
        } else {
            UpsertOutcome::Inserted
        };

        self.log.append(&LogRecord::Put(item.clone()))?;
        self.frames += 1;

        if self.dimension.is_none() {
            self.dimension = item.dimension();
        }
        debug!("Committed {} ({})", item.path().display(), item.kind);
        self.records.insert(item.identity.path.clone(), Arc::new(item));
        Ok(outcome)
    }

    /// Whether a record exists for `path` with exactly this fingerprint
    pub fn contains_unchanged(&self, path: &Path, fingerprint: &Fingerprint) -> bool {
        self.records
            .get(path)
            .is_some_and(|item| item.identity.fingerprint == *fingerprint)
    }

    /// Stored record for `path`
    pub fn get(&self, path: &Path) -> Option<Arc<MediaItem>> {
        self.records.get(path).cloned()
    }

    /// Drop the record for `path`; returns whether one existed
    ///
    /// # Errors
    /// Returns an error if the removal cannot be committed
    pub fn remove(&mut self, path: &Path) -> Result<bool> {
        if !self.records.contains_key(path) {
            return Ok(false);
        }
        self.log.append(&LogRecord::Remove(path.to_path_buf()))?;
        self.frames += 1;
        self.records.remove(path);
        if self.records.is_empty() {
            self.dimension = None;
        }
        Ok(true)
    }

    /// Paths of stored records that live under `root`
    pub fn paths_under(&self, root: &Path) -> Vec<PathBuf> {
        self.records
            .keys()
            .filter(|path| path.starts_with(root))
            .cloned()
            .collect()
    }

    /// Drop every record, atomically replacing the log with an empty one
    ///
    /// # Errors
    /// Returns an error if the log cannot be rewritten
    pub fn clear(&mut self) -> Result<()> {
        self.log.rewrite(iter::empty())?;
        self.records.clear();
        self.frames = 0;
        self.dimension = None;
        self.aggregation = None;
        info!("Cleared index at {}", self.dir.display());
        self.write_manifest()
    }

    /// Remember the aggregation mode videos are stored with
    pub fn note_aggregation(&mut self, mode: VideoAggregation) {
        match self.aggregation {
            Some(current) if current != mode && self.has_videos() => {
                warn!(
                    "Index holds videos aggregated as '{}'; new videos use '{}'",
                    current.as_str(),
                    mode.as_str()
                );
                self.aggregation = Some(mode);
            }
            _ => self.aggregation = Some(mode),
        }
    }

    fn has_videos(&self) -> bool {
        self.records
            .values()
            .any(|item| item.kind == MediaKind::Video)
    }

    /// Every record in path order, each exactly once
    pub fn scan(&self) -> impl Iterator<Item = &Arc<MediaItem>> {
        self.records.values()
    }

    /// Detached copy of the current records for lock-free reading
    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            items: self.records.values().cloned().collect(),
        }
    }

    /// Flush the manifest, compacting the log first when mostly superseded.
    ///
    /// # Errors
    /// Returns an error if compaction or the manifest write fails
    pub fn persist(&mut self) -> Result<()> {
        let live = self.records.len();
        let garbage = self.frames.saturating_sub(live);
        let ratio = if self.frames == 0 {
            0.0
        } else {
            garbage as f32 / self.frames as f32
        };

        if garbage > 0 && ratio > self.compaction_ratio {
            let before = self.log.len();
            self.frames = self.log.rewrite(self.records.values().map(AsRef::as_ref))?;
            info!(
                "Compacted record log: {} superseded frames dropped, {before} -> {} bytes",
                garbage,
                self.log.len()
            );
        }

        self.write_manifest()
    }

    fn write_manifest(&self) -> Result<()> {
        Manifest {
            dimension: self.dimension,
            aggregation: self.aggregation,
            records: self.records.len(),
            ..Manifest::default()
        }
        .save(&self.dir)
    }

    /// Live record count
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Vector dimension of the stored records
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Aggregation mode recorded for stored videos
    pub fn aggregation(&self) -> Option<VideoAggregation> {
        self.aggregation
    }

    /// Record counts by kind
    pub fn stats(&self) -> IndexStats {
        let videos = self
            .records
            .values()
            .filter(|item| item.kind == MediaKind::Video)
            .count();
        IndexStats {
            total: self.records.len(),
            images: self.records.len() - videos,
            videos,
            dimension: self.dimension,
        }
    }
}
