use core::fmt;
use serde::Serialize;
use std::path::PathBuf;
use uuid::Uuid;

use crate::indexer::IndexReport;
use crate::query::SearchResult;

/// Unique identifier for a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct JobId(Uuid);

impl JobId {
    /// Create a fresh random identifier
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What a job does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    /// Directory indexing
    Index,
    /// Semantic search
    Search,
}

/// `(processed, total, current)` progress of a job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    /// Units finished so far (files for indexing, items for search)
    pub processed: usize,
    /// Estimated total units
    pub total: usize,
    /// Item being worked on, if any
    pub current: Option<PathBuf>,
}

/// Result carried by a completed job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum JobOutcome {
    /// Indexing finished
    Indexed(IndexReport),
    /// Search finished
    Searched(SearchResult),
}

/// Lifecycle: `Pending -> Running -> {Completed, Cancelled, Failed}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum JobState {
    /// Accepted, waiting for its turn
    Pending,
    /// Executing in the background
    Running,
    /// Finished normally
    Completed(JobOutcome),
    /// Stopped on request at a checkpoint
    Cancelled,
    /// Ended by an infrastructure failure
    Failed(String),
}

impl JobState {
    /// Whether the job can no longer change state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Cancelled | Self::Failed(_))
    }

    /// Short lowercase label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed(_) => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed(_) => "failed",
        }
    }
}

/// Point-in-time view of a job published to subscribers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSnapshot {
    /// Job identifier
    pub id: JobId,
    /// Index or search
    pub kind: JobKind,
    /// Lifecycle state
    pub state: JobState,
    /// Latest progress
    pub progress: Progress,
}

impl JobSnapshot {
    pub(crate) fn pending(id: JobId, kind: JobKind) -> Self {
        Self {
            id,
            kind,
            state: JobState::Pending,
            progress: Progress::default(),
        }
    }
}
