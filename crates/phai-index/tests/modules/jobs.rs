//! Job lifecycle: progress, cancellation and failure handling.

use crate::common::{FakeFrames, FakeProvider, Library};
use phai_core::{Error, IndexConfig};
use phai_index::{
    IndexMode, IndexStore, JobId, JobKind, JobOutcome, JobState, Query, RETAINED_FINISHED_JOBS,
};
use std::fs;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::time::sleep;

fn library_with_images(count: usize) -> Library {
    let library = Library::new();
    for index in 0..count {
        library.image(&format!("photo_{index:02}.jpg"), &[1.0, 0.0, 0.0]);
    }
    library
}

#[tokio::test]
async fn test_index_job_completes_with_full_progress() {
    let library = Library::new().with_scenario();
    let controller =
        library.controller(FakeProvider::default(), FakeFrames::default(), library.config());

    let id = controller
        .start_index(library.root(), IndexMode::Incremental)
        .unwrap();
    let snapshot = controller.wait(id).await.unwrap();

    assert_eq!(snapshot.kind, JobKind::Index);
    assert_eq!(snapshot.progress.processed, 4);
    assert_eq!(snapshot.progress.total, 4);
    assert!(matches!(
        snapshot.state,
        JobState::Completed(JobOutcome::Indexed(_))
    ));
    assert_eq!(controller.poll_progress(id).unwrap(), snapshot);
}

#[tokio::test]
async fn test_progress_is_monotonic() {
    let library = library_with_images(6);
    let controller = library.controller(
        FakeProvider::with_delay(Duration::from_millis(5)),
        FakeFrames::default(),
        library.config(),
    );

    let id = controller
        .start_index(library.root(), IndexMode::Full)
        .unwrap();
    let mut receiver = controller.subscribe(id).unwrap();
    let mut last = 0;
    loop {
        let snapshot = receiver.borrow_and_update().clone();
        assert!(snapshot.progress.processed >= last);
        last = snapshot.progress.processed;
        if snapshot.state.is_terminal() {
            break;
        }
        if receiver.changed().await.is_err() {
            break;
        }
    }
    assert_eq!(controller.wait(id).await.unwrap().progress.processed, 6);
}

#[tokio::test]
async fn test_cancelled_job_leaves_loadable_store() {
    let library = library_with_images(12);
    let provider = FakeProvider::with_delay(Duration::from_millis(40));
    let controller = library.controller(provider, FakeFrames::default(), library.config());

    let id = controller
        .start_index(library.root(), IndexMode::Full)
        .unwrap();
    let mut receiver = controller.subscribe(id).unwrap();
    receiver
        .wait_for(|snapshot| snapshot.progress.processed >= 2)
        .await
        .unwrap();
    controller.stop(id).unwrap();

    let snapshot = controller.wait(id).await.unwrap();
    assert_eq!(snapshot.state, JobState::Cancelled);
    drop(controller);

    let store = IndexStore::open(&library.index_dir(), &IndexConfig::default()).unwrap();
    assert!(store.len() >= 2);
    assert!(store.len() < 12);
    for item in store.scan() {
        item.validate().unwrap();
    }
}

#[tokio::test]
async fn test_missing_root_rejected_before_job() {
    let library = Library::new();
    let controller =
        library.controller(FakeProvider::default(), FakeFrames::default(), library.config());

    let result = controller.start_index(library.root().join("missing"), IndexMode::Full);
    assert!(matches!(result, Err(Error::RootNotFound(_))));
    assert!(controller.jobs().is_empty());
}

#[tokio::test]
async fn test_unavailable_provider_fails_job() {
    let library = Library::new().with_scenario();
    let provider = FakeProvider::default();
    provider.unavailable.store(true, Ordering::SeqCst);
    let controller = library.controller(provider, FakeFrames::default(), library.config());

    let id = controller
        .start_index(library.root(), IndexMode::Full)
        .unwrap();
    let JobState::Failed(cause) = controller.wait(id).await.unwrap().state else {
        panic!("expected a failed job");
    };
    assert!(cause.contains("model not loaded"));

    let search = controller.search(Query::new("dog")).await;
    assert!(matches!(search, Err(Error::JobFailed(_))));
}

#[tokio::test]
async fn test_corrupt_store_fails_then_recovers() {
    let library = Library::new().with_scenario();
    fs::create_dir_all(library.index_dir()).unwrap();
    let log = library.index_dir().join("records.log");
    let mut frame = vec![0u8; 12];
    frame[4] = 1;
    fs::write(&log, &frame).unwrap();

    let controller =
        library.controller(FakeProvider::default(), FakeFrames::default(), library.config());
    let id = controller
        .start_index(library.root(), IndexMode::Incremental)
        .unwrap();
    let JobState::Failed(cause) = controller.wait(id).await.unwrap().state else {
        panic!("expected a failed job");
    };
    assert!(cause.contains("corrupt"));

    fs::remove_file(&log).unwrap();
    let retry = controller
        .start_index(library.root(), IndexMode::Incremental)
        .unwrap();
    assert!(matches!(
        controller.wait(retry).await.unwrap().state,
        JobState::Completed(_)
    ));
}

#[tokio::test]
async fn test_second_index_job_waits_for_first() {
    let library = library_with_images(4);
    let controller = library.controller(
        FakeProvider::with_delay(Duration::from_millis(20)),
        FakeFrames::default(),
        library.config(),
    );

    let first = controller
        .start_index(library.root(), IndexMode::Full)
        .unwrap();
    let mut receiver = controller.subscribe(first).unwrap();
    receiver
        .wait_for(|snapshot| snapshot.state == JobState::Running)
        .await
        .unwrap();

    let second = controller
        .start_index(library.root(), IndexMode::Incremental)
        .unwrap();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(controller.poll_progress(second).unwrap().state, JobState::Pending);

    controller.wait(first).await.unwrap();
    let JobState::Completed(JobOutcome::Indexed(report)) =
        controller.wait(second).await.unwrap().state
    else {
        panic!("expected the second job to complete");
    };
    assert_eq!(report.unchanged, 4);
}

#[tokio::test]
async fn test_stopping_pending_job_cancels_it() {
    let library = library_with_images(4);
    let controller = library.controller(
        FakeProvider::with_delay(Duration::from_millis(20)),
        FakeFrames::default(),
        library.config(),
    );

    let first = controller
        .start_index(library.root(), IndexMode::Full)
        .unwrap();
    let second = controller
        .start_index(library.root(), IndexMode::Incremental)
        .unwrap();
    controller.stop(second).unwrap();

    assert_eq!(controller.wait(second).await.unwrap().state, JobState::Cancelled);
    assert!(matches!(
        controller.wait(first).await.unwrap().state,
        JobState::Completed(_)
    ));
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let library = Library::new();
    let controller =
        library.controller(FakeProvider::default(), FakeFrames::default(), library.config());

    let unknown = JobId::new();
    assert!(matches!(controller.stop(unknown), Err(Error::JobNotFound(_))));
    assert!(matches!(
        controller.poll_progress(unknown),
        Err(Error::JobNotFound(_))
    ));
}

#[tokio::test]
async fn test_search_during_index_sees_committed_records() {
    let library = library_with_images(12);
    let controller = library.controller(
        FakeProvider::with_delay(Duration::from_millis(50)),
        FakeFrames::default(),
        library.config(),
    );

    let index = controller
        .start_index(library.root(), IndexMode::Full)
        .unwrap();
    let mut receiver = controller.subscribe(index).unwrap();
    receiver
        .wait_for(|snapshot| snapshot.progress.processed >= 2)
        .await
        .unwrap();

    let result = controller.search(Query::new("dog")).await.unwrap();
    assert!(result.scanned >= 2);
    assert!(result.scanned < 12);
    assert!(result.len() <= result.scanned);
    for item in &result.items {
        assert!(item.path.starts_with(library.root().canonicalize().unwrap()));
        assert!(item.path.exists());
    }

    assert!(matches!(
        controller.wait(index).await.unwrap().state,
        JobState::Completed(_)
    ));
    let after = controller.search(Query::new("dog")).await.unwrap();
    assert_eq!(after.scanned, 12);
}

#[tokio::test]
async fn test_stopping_running_search_cancels_it() {
    let library = library_with_images(4);
    let controller = library.controller(
        FakeProvider::with_text_delay(Duration::from_millis(100)),
        FakeFrames::default(),
        library.config(),
    );
    let index = controller
        .start_index(library.root(), IndexMode::Full)
        .unwrap();
    controller.wait(index).await.unwrap();

    let search = controller.start_search(Query::new("dog")).unwrap();
    let mut receiver = controller.subscribe(search).unwrap();
    receiver
        .wait_for(|snapshot| snapshot.state == JobState::Running)
        .await
        .unwrap();
    controller.stop(search).unwrap();

    let snapshot = controller.wait(search).await.unwrap();
    assert_eq!(snapshot.kind, JobKind::Search);
    assert_eq!(snapshot.state, JobState::Cancelled);
}

#[tokio::test]
async fn test_finished_searches_are_not_retained() {
    let library = Library::new().with_scenario();
    let controller =
        library.controller(FakeProvider::default(), FakeFrames::default(), library.config());
    let index = controller
        .start_index(library.root(), IndexMode::Full)
        .unwrap();
    controller.wait(index).await.unwrap();

    for _ in 0..50 {
        controller.search(Query::new("dog")).await.unwrap();
    }

    let jobs = controller.jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].id, index);
}

#[tokio::test]
async fn test_finished_jobs_are_bounded() {
    let library = Library::new().with_scenario();
    let controller =
        library.controller(FakeProvider::default(), FakeFrames::default(), library.config());

    let mut last = None;
    for _ in 0..RETAINED_FINISHED_JOBS + 20 {
        let id = controller.start_search(Query::new("cat")).unwrap();
        controller.wait(id).await.unwrap();
        last = Some(id);
    }

    assert!(controller.jobs().len() <= RETAINED_FINISHED_JOBS + 1);
    let last = last.unwrap();
    assert!(controller.poll_progress(last).unwrap().state.is_terminal());
}

#[tokio::test]
async fn test_forget_drops_only_finished_jobs() {
    let library = library_with_images(4);
    let controller = library.controller(
        FakeProvider::with_delay(Duration::from_millis(30)),
        FakeFrames::default(),
        library.config(),
    );

    let id = controller
        .start_index(library.root(), IndexMode::Full)
        .unwrap();
    assert!(matches!(controller.forget(id), Err(Error::JobRunning(_))));

    controller.wait(id).await.unwrap();
    let snapshot = controller.forget(id).unwrap();
    assert!(matches!(snapshot.state, JobState::Completed(_)));
    assert!(matches!(
        controller.poll_progress(id),
        Err(Error::JobNotFound(_))
    ));
    assert!(matches!(controller.forget(id), Err(Error::JobNotFound(_))));
}

#[tokio::test]
async fn test_panicking_job_fails_and_releases_writer() {
    let library = library_with_images(2);
    let crash = library.root().join("crash.jpg");
    fs::write(&crash, "crash").unwrap();
    let controller =
        library.controller(FakeProvider::default(), FakeFrames::default(), library.config());

    let id = controller
        .start_index(library.root(), IndexMode::Full)
        .unwrap();
    let JobState::Failed(cause) = controller.wait(id).await.unwrap().state else {
        panic!("expected a failed job");
    };
    assert!(cause.contains("panicked"));

    fs::remove_file(&crash).unwrap();
    let retry = controller
        .start_index(library.root(), IndexMode::Incremental)
        .unwrap();
    assert!(matches!(
        controller.wait(retry).await.unwrap().state,
        JobState::Completed(_)
    ));
}
