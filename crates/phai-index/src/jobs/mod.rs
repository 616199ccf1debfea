//! Background indexing and search jobs with progress and cooperative stop.
//!
//! Index jobs run one at a time per controller (single writer); a second index
//! job stays `Pending` until the first ends. Search jobs score a snapshot of
//! the store and may run while an index job is committing records.
//!
//! Finished jobs stay queryable until [`JobController::forget`] drops them or
//! more than [`RETAINED_FINISHED_JOBS`] newer jobs have finished.

mod state;
mod stop;

pub use state::{JobId, JobKind, JobOutcome, JobSnapshot, JobState, Progress};
pub use stop::StopFlag;

use phai_core::{EngineConfig, Error, IgnoreLock as _, IgnoreRwLock as _, Result};
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::spawn;
use tokio::sync::{Mutex as AsyncMutex, OnceCell, watch};
use tokio::task::{JoinHandle, spawn_blocking};
use tracing::{info, warn};

use crate::embedding::EmbeddingProvider;
use crate::indexer::{IndexMode, Indexer, ProgressCallback};
use crate::query::{Query, QueryEngine, SearchResult};
use crate::sampler::{FrameSampler, FrameSource};
use crate::store::{IndexStats, IndexStore, SharedIndex};

/// Finished jobs kept for polling before the oldest are dropped
pub const RETAINED_FINISHED_JOBS: usize = 64;

/// Controller-side handle of one job
struct JobHandle {
    sequence: u64,
    stop: StopFlag,
    snapshot: watch::Sender<JobSnapshot>,
}

impl JobHandle {
    fn is_terminal(&self) -> bool {
        self.snapshot.borrow().state.is_terminal()
    }

    fn transition(&self, state: JobState) {
        self.snapshot.send_modify(|snapshot| {
            info!(
                "Job {} ({:?}): {} -> {}",
                snapshot.id,
                snapshot.kind,
                snapshot.state.label(),
                state.label()
            );
            snapshot.state = state;
        });
    }

    fn report(&self, progress: Progress) {
        self.snapshot.send_modify(|snapshot| snapshot.progress = progress);
    }

    fn fail(&self, error: &Error) {
        warn!("Job failed: {error}");
        self.transition(JobState::Failed(error.to_string()));
    }

    /// Fail the job if its task ended without reaching a terminal state
    async fn supervise(self: Arc<Self>, task: JoinHandle<()>) {
        match task.await {
            Err(error) if !self.is_terminal() => {
                self.fail(&Error::Other(format!("Job task aborted: {error}")));
            }
            _ => {}
        }
    }
}

struct Inner<E: EmbeddingProvider, F: FrameSource> {
    provider: Arc<E>,
    sampler: Arc<FrameSampler<F>>,
    engine: QueryEngine<E>,
    config: EngineConfig,
    store: OnceCell<SharedIndex>,
    writer_gate: Arc<AsyncMutex<()>>,
    jobs: Mutex<HashMap<JobId, Arc<JobHandle>>>,
    next_sequence: AtomicU64,
}

/// Starts, tracks and stops indexing and search jobs over one index store
pub struct JobController<E: EmbeddingProvider + 'static, F: FrameSource + 'static> {
    inner: Arc<Inner<E, F>>,
}

impl<E: EmbeddingProvider + 'static, F: FrameSource + 'static> Clone for JobController<E, F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: EmbeddingProvider + 'static, F: FrameSource + 'static> JobController<E, F> {
    /// Create a controller; the store at the configured location is opened by the first job
    pub fn new(provider: E, frame_source: F, config: EngineConfig) -> Self {
        Self::build(provider, frame_source, config, None)
    }

    /// Create a controller over an already opened store
    pub fn with_store(
        provider: E,
        frame_source: F,
        config: EngineConfig,
        store: SharedIndex,
    ) -> Self {
        Self::build(provider, frame_source, config, Some(store))
    }

    fn build(
        provider: E,
        frame_source: F,
        config: EngineConfig,
        store: Option<SharedIndex>,
    ) -> Self {
        let provider = Arc::new(provider);
        let sampler = Arc::new(FrameSampler::new(frame_source, config.sampler.clone()));
        let engine = QueryEngine::new(Arc::clone(&provider), config.query.clone());
        Self {
            inner: Arc::new(Inner {
                provider,
                sampler,
                engine,
                config,
                store: OnceCell::new_with(store),
                writer_gate: Arc::new(AsyncMutex::new(())),
                jobs: Mutex::new(HashMap::new()),
                next_sequence: AtomicU64::new(0),
            }),
        }
    }

    /// Shared index store, opening it on first use
    ///
    /// # Errors
    /// Returns `StoreCorrupt` or an I/O error if the store cannot be loaded
    pub async fn store(&self) -> Result<SharedIndex> {
        self.inner.store().await
    }

    /// Record counts of the index store
    ///
    /// # Errors
    /// Returns an error if the store cannot be loaded
    pub async fn stats(&self) -> Result<IndexStats> {
        Ok(self.store().await?.read_ignore_poison().stats())
    }

    fn register(&self, kind: JobKind) -> (JobId, Arc<JobHandle>) {
        let id = JobId::new();
        let (sender, _) = watch::channel(JobSnapshot::pending(id, kind));
        let handle = Arc::new(JobHandle {
            sequence: self.inner.next_sequence.fetch_add(1, Ordering::Relaxed),
            stop: StopFlag::new(),
            snapshot: sender,
        });
        let mut jobs = self.inner.jobs.lock_ignore_poison();
        Self::evict_finished(&mut jobs);
        jobs.insert(id, Arc::clone(&handle));
        (id, handle)
    }

    /// Drop the oldest finished jobs beyond the retention limit
    fn evict_finished(jobs: &mut HashMap<JobId, Arc<JobHandle>>) {
        let mut finished: Vec<(u64, JobId)> = jobs
            .iter()
            .filter(|(_, handle)| handle.is_terminal())
            .map(|(id, handle)| (handle.sequence, *id))
            .collect();
        let Some(excess) = finished.len().checked_sub(RETAINED_FINISHED_JOBS) else {
            return;
        };
        finished.sort_unstable_by_key(|(sequence, _)| *sequence);
        for (_, id) in finished.into_iter().take(excess) {
            jobs.remove(&id);
        }
    }

    /// Start `task` for `handle` under a supervisor that fails the job if the task dies
    fn launch<T>(handle: Arc<JobHandle>, task: T)
    where
        T: Future<Output = ()> + Send + 'static,
    {
        let task = spawn(task);
        spawn(handle.supervise(task));
    }

    fn handle(&self, id: JobId) -> Result<Arc<JobHandle>> {
        self.inner
            .jobs
            .lock_ignore_poison()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::JobNotFound(id.to_string()))
    }

    /// Start indexing `root` in the background. Must be called within a tokio runtime.
    ///
    /// # Errors
    /// Returns `RootNotFound` if `root` is not an existing directory; no job is created
    pub fn start_index(&self, root: impl AsRef<Path>, mode: IndexMode) -> Result<JobId> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(Error::RootNotFound(root.display().to_string()));
        }

        let (id, handle) = self.register(JobKind::Index);
        let inner = Arc::clone(&self.inner);
        let root = root.to_path_buf();
        let job = Arc::clone(&handle);
        Self::launch(handle, async move { inner.run_index(job, root, mode).await });
        Ok(id)
    }

    /// Start a search in the background. Must be called within a tokio runtime.
    ///
    /// # Errors
    /// Returns `InvalidQuery` for an empty query or zero limit; no job is created
    pub fn start_search(&self, query: Query) -> Result<JobId> {
        query.validate()?;

        let (id, handle) = self.register(JobKind::Search);
        let inner = Arc::clone(&self.inner);
        let job = Arc::clone(&handle);
        Self::launch(handle, async move { inner.run_search(job, query).await });
        Ok(id)
    }

    /// Ask a job to stop at its next checkpoint
    ///
    /// # Errors
    /// Returns `JobNotFound` for an unknown id
    pub fn stop(&self, id: JobId) -> Result<()> {
        let handle = self.handle(id)?;
        if !handle.is_terminal() {
            info!("Stop requested for job {id}");
            handle.stop.request();
        }
        Ok(())
    }

    /// Latest state and progress of a job
    ///
    /// # Errors
    /// Returns `JobNotFound` for an unknown id
    pub fn poll_progress(&self, id: JobId) -> Result<JobSnapshot> {
        Ok(self.handle(id)?.snapshot.borrow().clone())
    }

    /// Receiver that observes every state and progress change of a job
    ///
    /// # Errors
    /// Returns `JobNotFound` for an unknown id
    pub fn subscribe(&self, id: JobId) -> Result<watch::Receiver<JobSnapshot>> {
        Ok(self.handle(id)?.snapshot.subscribe())
    }

    /// Wait until a job reaches a terminal state
    ///
    /// # Errors
    /// Returns `JobNotFound` for an unknown id
    pub async fn wait(&self, id: JobId) -> Result<JobSnapshot> {
        let mut receiver = self.subscribe(id)?;
        let snapshot = receiver
            .wait_for(|snapshot| snapshot.state.is_terminal())
            .await
            .map_err(|_| Error::JobNotFound(id.to_string()))?
            .clone();
        Ok(snapshot)
    }

    /// Drop a finished job and return its final snapshot
    ///
    /// # Errors
    /// Returns `JobNotFound` for an unknown id, or `JobRunning` if the job has
    /// not reached a terminal state
    pub fn forget(&self, id: JobId) -> Result<JobSnapshot> {
        let mut jobs = self.inner.jobs.lock_ignore_poison();
        let handle = jobs
            .get(&id)
            .ok_or_else(|| Error::JobNotFound(id.to_string()))?;
        if !handle.is_terminal() {
            return Err(Error::JobRunning(id.to_string()));
        }
        let snapshot = handle.snapshot.borrow().clone();
        jobs.remove(&id);
        Ok(snapshot)
    }

    /// Snapshots of the jobs this controller still tracks
    pub fn jobs(&self) -> Vec<JobSnapshot> {
        self.inner
            .jobs
            .lock_ignore_poison()
            .values()
            .map(|handle| handle.snapshot.borrow().clone())
            .collect()
    }

    /// Run a search job to completion
    ///
    /// # Errors
    /// Returns `InvalidQuery` before starting, `Cancelled` if the job was
    /// stopped, or `JobFailed` with the recorded cause
    pub async fn search(&self, query: Query) -> Result<SearchResult> {
        let id = self.start_search(query)?;
        let finished = self.wait(id).await?;
        self.inner.jobs.lock_ignore_poison().remove(&id);
        match finished.state {
            JobState::Completed(JobOutcome::Searched(result)) => Ok(result),
            JobState::Cancelled => Err(Error::Cancelled),
            JobState::Failed(cause) => Err(Error::JobFailed(cause)),
            other => Err(Error::Other(format!(
                "Search job {id} ended in unexpected state {}",
                other.label()
            ))),
        }
    }
}

impl<E: EmbeddingProvider + 'static, F: FrameSource + 'static> Inner<E, F> {
    fn index_dir(&self) -> PathBuf {
        self.config.resolve_index_dir()
    }

    async fn store(&self) -> Result<SharedIndex> {
        let store = self
            .store
            .get_or_try_init(|| async {
                let dir = self.index_dir();
                let index_config = self.config.index.clone();
                let store = spawn_blocking(move || IndexStore::open(&dir, &index_config))
                    .await
                    .map_err(|error| Error::Other(format!("Store load task failed: {error}")))??;
                Ok::<_, Error>(store.into_shared())
            })
            .await?;
        Ok(Arc::clone(store))
    }

    /// Open the store and check the provider; failures fail the job
    async fn prepare(&self, handle: &JobHandle) -> Option<SharedIndex> {
        let store = match self.store().await {
            Ok(store) => store,
            Err(error) => {
                handle.fail(&error);
                return None;
            }
        };
        if let Err(error) = self.provider.ensure_available().await {
            handle.fail(&error);
            return None;
        }
        Some(store)
    }

    async fn run_index(&self, handle: Arc<JobHandle>, root: PathBuf, mode: IndexMode) {
        let _writer = Arc::clone(&self.writer_gate).lock_owned().await;
        if handle.stop.is_requested() {
            handle.transition(JobState::Cancelled);
            return;
        }
        handle.transition(JobState::Running);

        let Some(store) = self.prepare(&handle).await else {
            return;
        };

        let progress_handle = Arc::clone(&handle);
        let callback: ProgressCallback =
            Arc::new(move |progress: Progress| progress_handle.report(progress));
        let indexer = Indexer::new(
            Arc::clone(&self.provider),
            Arc::clone(&self.sampler),
            self.config.indexer.clone(),
        )
        .with_progress_callback(callback);

        let outcome = indexer.run(&root, mode, &store, &handle.stop).await;
        let persisted = store.write_ignore_poison().persist();

        match (outcome, persisted) {
            (Ok(report), Ok(())) if report.cancelled => handle.transition(JobState::Cancelled),
            (Ok(report), Ok(())) => {
                handle.transition(JobState::Completed(JobOutcome::Indexed(report)));
            }
            (Err(Error::Cancelled), Ok(())) => handle.transition(JobState::Cancelled),
            (Err(error), _) | (Ok(_), Err(error)) => handle.fail(&error),
        }
    }

    async fn run_search(&self, handle: Arc<JobHandle>, query: Query) {
        if handle.stop.is_requested() {
            handle.transition(JobState::Cancelled);
            return;
        }
        handle.transition(JobState::Running);

        let Some(store) = self.prepare(&handle).await else {
            return;
        };
        let snapshot = store.read_ignore_poison().snapshot();

        let progress_handle = Arc::clone(&handle);
        let on_progress = move |progress: Progress| progress_handle.report(progress);
        let outcome = self
            .engine
            .search_with_progress(&query, &snapshot, &handle.stop, &on_progress)
            .await;

        match outcome {
            Ok(result) => handle.transition(JobState::Completed(JobOutcome::Searched(result))),
            Err(Error::Cancelled) => handle.transition(JobState::Cancelled),
            Err(error) => handle.fail(&error),
        }
    }
}
