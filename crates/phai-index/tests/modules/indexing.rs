//! Incremental indexing through the job controller.

use crate::common::{FakeFrames, FakeProvider, Library};
use filetime::{FileTime, set_file_mtime};
use phai_core::{IgnoreRwLock as _, IndexConfig, MediaKind, VideoAggregation};
use phai_index::{IndexMode, IndexReport, IndexStore, JobController, JobOutcome, JobState};
use std::fs;
use std::path::Path;

async fn index(
    controller: &JobController<FakeProvider, FakeFrames>,
    root: &Path,
    mode: IndexMode,
) -> IndexReport {
    let id = controller.start_index(root, mode).unwrap();
    match controller.wait(id).await.unwrap().state {
        JobState::Completed(JobOutcome::Indexed(report)) => report,
        other => panic!("index job ended as {other:?}"),
    }
}

#[tokio::test]
async fn test_full_index_scenario_mean_aggregation() {
    let library = Library::new().with_scenario();
    let frames = FakeFrames::default();
    let controller = library.controller(FakeProvider::default(), frames.clone(), library.config());

    let report = index(&controller, &library.root(), IndexMode::Full).await;
    assert_eq!(report.discovered, 4);
    assert_eq!(report.embedded, 4);
    assert!(report.skipped.is_empty());

    let store = controller.store().await.unwrap();
    let store = store.read_ignore_poison();
    assert_eq!(store.len(), 4);
    assert_eq!(store.stats().videos, 1);
    assert_eq!(frames.calls.frames(), 8);

    let video = store
        .scan()
        .find(|item| item.kind == MediaKind::Video)
        .unwrap();
    assert_eq!(video.embeddings.len(), 1);
}

#[tokio::test]
async fn test_full_index_scenario_per_frame_aggregation() {
    let library = Library::new().with_scenario();
    let mut config = library.config();
    config.sampler.aggregation = VideoAggregation::PerFrame;
    let controller = library.controller(FakeProvider::default(), FakeFrames::default(), config);

    index(&controller, &library.root(), IndexMode::Full).await;

    let store = controller.store().await.unwrap();
    let store = store.read_ignore_poison();
    let video = store
        .scan()
        .find(|item| item.kind == MediaKind::Video)
        .unwrap();
    assert_eq!(video.embeddings.len(), 8);
    assert_eq!(store.aggregation(), Some(VideoAggregation::PerFrame));
}

#[tokio::test]
async fn test_incremental_rerun_is_idempotent() {
    let library = Library::new().with_scenario();
    let provider = FakeProvider::default();
    let controller = library.controller(provider.clone(), FakeFrames::default(), library.config());

    index(&controller, &library.root(), IndexMode::Full).await;
    let calls_after_first = provider.calls.images();

    let report = index(&controller, &library.root(), IndexMode::Incremental).await;
    assert_eq!(report.embedded, 0);
    assert_eq!(report.unchanged, 4);
    assert_eq!(report.removed, 0);
    assert_eq!(provider.calls.images(), calls_after_first);
}

#[tokio::test]
async fn test_changed_file_updates_only_its_record() {
    let library = Library::new().with_scenario();
    let controller =
        library.controller(FakeProvider::default(), FakeFrames::default(), library.config());
    index(&controller, &library.root(), IndexMode::Full).await;

    let store = controller.store().await.unwrap();
    let before: Vec<_> = store.read_ignore_poison().scan().cloned().collect();

    let cat = library.image("cat.png", &[0.0, 0.6, 0.8]);
    set_file_mtime(&cat, FileTime::from_unix_time(2_000_000_000, 0)).unwrap();

    let report = index(&controller, &library.root(), IndexMode::Incremental).await;
    assert_eq!(report.embedded, 1);
    assert_eq!(report.unchanged, 3);

    let guard = store.read_ignore_poison();
    let canonical_cat = fs::canonicalize(&cat).unwrap();
    for old in &before {
        let current = guard.get(old.path()).unwrap();
        if old.path() == canonical_cat {
            assert_ne!(current.embeddings, old.embeddings);
        } else {
            assert_eq!(&current, old);
        }
    }
}

#[tokio::test]
async fn test_adding_one_image_yields_five_records() {
    let library = Library::new().with_scenario();
    let controller =
        library.controller(FakeProvider::default(), FakeFrames::default(), library.config());
    index(&controller, &library.root(), IndexMode::Full).await;

    let store = controller.store().await.unwrap();
    let before: Vec<_> = store.read_ignore_poison().scan().cloned().collect();

    library.image("nested/park.webp", &[0.5, 0.5, 0.0]);
    let report = index(&controller, &library.root(), IndexMode::Incremental).await;
    assert_eq!(report.embedded, 1);

    let guard = store.read_ignore_poison();
    assert_eq!(guard.len(), 5);
    for old in &before {
        assert_eq!(&guard.get(old.path()).unwrap(), old);
    }
}

#[tokio::test]
async fn test_bad_files_are_skipped_not_fatal() {
    let library = Library::new().with_scenario();
    fs::write(library.root().join("broken.jpg"), b"\xff\xd8 garbage").unwrap();
    fs::write(library.root().join("broken.mov"), b"not a video").unwrap();
    fs::write(library.root().join("notes.txt"), b"ignored").unwrap();
    let controller =
        library.controller(FakeProvider::default(), FakeFrames::default(), library.config());

    let report = index(&controller, &library.root(), IndexMode::Full).await;
    assert_eq!(report.discovered, 6);
    assert_eq!(report.embedded, 4);
    assert_eq!(report.skipped.len(), 2);
    assert_eq!(controller.stats().await.unwrap().total, 4);
}

#[tokio::test]
async fn test_deleted_files_are_pruned() {
    let library = Library::new().with_scenario();
    let controller =
        library.controller(FakeProvider::default(), FakeFrames::default(), library.config());
    index(&controller, &library.root(), IndexMode::Full).await;

    fs::remove_file(library.root().join("sunset.jpeg")).unwrap();
    let report = index(&controller, &library.root(), IndexMode::Incremental).await;
    assert_eq!(report.removed, 1);
    assert_eq!(controller.stats().await.unwrap().total, 3);
}

#[tokio::test]
async fn test_index_survives_new_process() {
    let library = Library::new().with_scenario();
    let controller =
        library.controller(FakeProvider::default(), FakeFrames::default(), library.config());
    index(&controller, &library.root(), IndexMode::Full).await;
    drop(controller);

    let store = IndexStore::open(&library.index_dir(), &IndexConfig::default()).unwrap();
    assert_eq!(store.len(), 4);
    assert_eq!(store.dimension(), Some(3));

    let provider = FakeProvider::default();
    let reopened = library.controller(provider.clone(), FakeFrames::default(), library.config());
    let report = index(&reopened, &library.root(), IndexMode::Incremental).await;
    assert_eq!(report.unchanged, 4);
    assert_eq!(provider.calls.images(), 0);
}
