//! Integration tests for fetching remote layers into the external cache

use super::test_utils::{list_files, MemoryFetcher, Project};
use layered_files::coordinator::{FetchPolicy, MergeCoordinator, MergePhase};
use layered_files::discovery::LayerOrigin;
use layered_files::error::{FetchErrorKind, MergeError};
use layered_files::source::LayerSource;
use std::fs;
use std::sync::Arc;

/// A fetched premium layer overrides the local core layer
#[tokio::test]
async fn test_premium_layer_scenario() {
    let project = Project::new();
    project.layer_file("1.core", "pages/index.html", "core");
    let fetcher = Arc::new(
        MemoryFetcher::default().with_layer("2.premium", &[("pages/index.html", "premium")]),
    );
    let sources = vec![LayerSource::parse("2.premium", "vcs:acme/premium@v1").unwrap()];
    let coordinator = MergeCoordinator::new(project.paths.clone(), sources, fetcher);

    let report = coordinator.run_merge().await.unwrap();

    assert_eq!(project.output("pages/index.html").as_deref(), Some("premium"));
    assert_eq!(report.layers[1].name, "2.premium");
    assert_eq!(report.layers[1].origin, LayerOrigin::External);
    assert_eq!(
        fs::read_to_string(project.paths.external.join("2.premium.source")).unwrap().trim(),
        "vcs:acme/premium@v1"
    );
}

/// A failed fetch copies nothing, even from layers that are available
#[tokio::test]
async fn test_fetch_failure_short_circuits_copy() {
    let project = Project::new();
    project.layer_file("1.core", "index.html", "core");
    let fetcher = Arc::new(
        MemoryFetcher::default()
            .with_layer("2.ok", &[("ok.txt", "ok")])
            .failing("3.private", FetchErrorKind::Unauthorized),
    );
    let sources = vec![
        LayerSource::parse("2.ok", "registry:@acme/ok").unwrap(),
        LayerSource::parse("3.private", "vcs:acme/private").unwrap(),
    ];
    let coordinator = MergeCoordinator::new(project.paths.clone(), sources, fetcher);

    let err = coordinator.run_merge().await.unwrap_err();

    match err {
        MergeError::Fetch(e) => {
            assert_eq!(e.layer, "3.private");
            assert_eq!(e.kind, FetchErrorKind::Unauthorized);
        }
        other => panic!("expected fetch error, got {other:?}"),
    }
    assert_eq!(coordinator.phase(), MergePhase::Failed);
    assert!(project.output("index.html").is_none());
    assert!(!project.paths.external.join("2.ok").exists());
}

/// A failed re-merge leaves the previous output and cache in place
#[tokio::test]
async fn test_failed_remerge_keeps_previous_output() {
    let project = Project::new();
    let good = Arc::new(MemoryFetcher::default().with_layer("2.theme", &[("theme.css", "v1")]));
    let sources = vec![LayerSource::parse("2.theme", "vcs:acme/theme").unwrap()];
    MergeCoordinator::new(project.paths.clone(), sources.clone(), good)
        .run_merge()
        .await
        .unwrap();
    let before = list_files(&project.paths.output);

    let offline = Arc::new(MemoryFetcher::default().failing("2.theme", FetchErrorKind::Network));
    let coordinator = MergeCoordinator::new(project.paths.clone(), sources, offline);
    assert!(coordinator.run_merge().await.is_err());

    assert_eq!(list_files(&project.paths.output), before);
    assert_eq!(project.output("theme.css").as_deref(), Some("v1"));
}

/// Watcher-style merges reuse the cache; explicit ones refresh it
#[tokio::test]
async fn test_fetch_policies() {
    let project = Project::new();
    let fetcher = Arc::new(MemoryFetcher::default().with_layer("2.theme", &[("a.css", "a")]));
    let sources = vec![LayerSource::parse("2.theme", "npm:@acme/theme@1.2.0").unwrap()];
    let coordinator = MergeCoordinator::new(project.paths.clone(), sources, fetcher.clone());

    coordinator.run_merge_with(FetchPolicy::IfMissing).await.unwrap();
    coordinator.run_merge_with(FetchPolicy::IfMissing).await.unwrap();
    assert_eq!(fetcher.calls(), 1);

    coordinator.run_merge().await.unwrap();
    assert_eq!(fetcher.calls(), 2);
}

/// A changed descriptor invalidates the cache even under `IfMissing`
#[tokio::test]
async fn test_changed_descriptor_refetches() {
    let project = Project::new();
    let fetcher = Arc::new(MemoryFetcher::default().with_layer("2.theme", &[("a.css", "a")]));
    let v1 = vec![LayerSource::parse("2.theme", "vcs:acme/theme@v1").unwrap()];
    let v2 = vec![LayerSource::parse("2.theme", "vcs:acme/theme@v2").unwrap()];

    MergeCoordinator::new(project.paths.clone(), v1, fetcher.clone())
        .run_merge_with(FetchPolicy::IfMissing)
        .await
        .unwrap();
    MergeCoordinator::new(project.paths.clone(), v2, fetcher.clone())
        .run_merge_with(FetchPolicy::IfMissing)
        .await
        .unwrap();

    assert_eq!(fetcher.calls(), 2);
}
