//! Search scenarios over an indexed library.

use crate::common::{FakeFrames, FakeProvider, Library};
use phai_core::Error;
use phai_index::{IndexMode, JobController, JobState, Query};
use std::path::{Path, PathBuf};

async fn indexed(library: &Library) -> JobController<FakeProvider, FakeFrames> {
    let controller =
        library.controller(FakeProvider::default(), FakeFrames::default(), library.config());
    let id = controller
        .start_index(library.root(), IndexMode::Full)
        .unwrap();
    assert!(matches!(
        controller.wait(id).await.unwrap().state,
        JobState::Completed(_)
    ));
    controller
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .unwrap()
        .to_string_lossy()
        .into_owned()
}

#[tokio::test]
async fn test_dog_photo_ranks_first_above_threshold() {
    let library = Library::new().with_scenario();
    let controller = indexed(&library).await;

    let result = controller
        .search(Query::new("a photo of a dog").with_threshold(0.2))
        .await
        .unwrap();

    assert_eq!(result.len(), 1);
    assert_eq!(file_name(&result.items[0].path), "dog.jpg");
    assert!((result.items[0].score - 0.34).abs() < 1e-4);
}

#[tokio::test]
async fn test_high_threshold_returns_nothing() {
    let library = Library::new().with_scenario();
    let controller = indexed(&library).await;

    let result = controller
        .search(Query::new("a photo of a dog").with_threshold(0.9))
        .await
        .unwrap();
    assert!(result.is_empty());
    assert_eq!(result.scanned, 4);
}

#[tokio::test]
async fn test_without_threshold_everything_is_ranked() {
    let library = Library::new().with_scenario();
    let controller = indexed(&library).await;

    let result = controller.search(Query::new("kitten")).await.unwrap();
    assert_eq!(result.len(), 4);
    assert_eq!(file_name(&result.items[0].path), "cat.png");
    for pair in result.items.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[tokio::test]
async fn test_repeated_search_is_deterministic() {
    let library = Library::new().with_scenario();
    let controller = indexed(&library).await;

    let first = controller.search(Query::new("sunset at the beach")).await.unwrap();
    let second = controller.search(Query::new("sunset at the beach")).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_raising_threshold_keeps_relative_order() {
    let library = Library::new().with_scenario();
    library.image("mixed.jpg", &[0.7, 0.0, 0.7]);
    library.image("puppy.gif", &[0.9, 0.1, 0.0]);
    let controller = indexed(&library).await;

    let mut previous: Option<Vec<PathBuf>> = None;
    for threshold in [-1.0, 0.0, 0.2, 0.5, 0.8, 0.95] {
        let result = controller
            .search(Query::new("dog").with_threshold(threshold))
            .await
            .unwrap();
        let paths: Vec<PathBuf> = result.items.iter().map(|item| item.path.clone()).collect();

        if let Some(previous) = &previous {
            assert!(paths.len() <= previous.len());
            let kept: Vec<&PathBuf> = previous.iter().filter(|path| paths.contains(*path)).collect();
            assert_eq!(kept, paths.iter().collect::<Vec<_>>());
        }
        previous = Some(paths);
    }
}

#[tokio::test]
async fn test_limit_truncates_results() {
    let library = Library::new().with_scenario();
    let controller = indexed(&library).await;

    let result = controller
        .search(Query::new("dog").with_limit(2))
        .await
        .unwrap();
    assert_eq!(result.len(), 2);
    assert_eq!(file_name(&result.items[0].path), "dog.jpg");
}

#[tokio::test]
async fn test_empty_query_rejected_without_job() {
    let library = Library::new().with_scenario();
    let controller =
        library.controller(FakeProvider::default(), FakeFrames::default(), library.config());

    let result = controller.search(Query::new("  ")).await;
    assert!(matches!(result, Err(Error::InvalidQuery(_))));
    assert!(controller.jobs().is_empty());
}

#[tokio::test]
async fn test_search_on_empty_index_is_empty() {
    let library = Library::new();
    let controller =
        library.controller(FakeProvider::default(), FakeFrames::default(), library.config());

    let result = controller.search(Query::new("dog")).await.unwrap();
    assert!(result.is_empty());
    assert_eq!(result.scanned, 0);
}
