//! Integration tests for overlay precedence, completeness and idempotence

use super::test_utils::{list_files, write_file, MemoryFetcher, Project};
use layered_files::coordinator::MergeCoordinator;
use layered_files::discovery::discover;
use layered_files::overlay::OverlayMerger;
use layered_files::source::LayerSource;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;

fn coordinator(project: &Project) -> MergeCoordinator {
    MergeCoordinator::new(project.paths.clone(), vec![], Arc::new(MemoryFetcher::default()))
}

/// Later-sorted layers win on conflicting paths
#[tokio::test]
async fn test_higher_layer_wins() {
    let project = Project::new();
    project
        .layer_file("1.base", "index.html", "A")
        .layer_file("2.theme", "index.html", "B");

    let report = coordinator(&project).run_merge().await.unwrap();

    assert_eq!(project.output("index.html").as_deref(), Some("B"));
    assert_eq!(report.overrides.len(), 1);
    assert_eq!(report.overrides[0].from_layer, "1.base");
    assert_eq!(report.overrides[0].by_layer, "2.theme");
}

/// Ordering is by code point, not by numeric value of the prefix
#[tokio::test]
async fn test_ordering_is_lexical() {
    let project = Project::new();
    project
        .layer_file("10.late", "a.txt", "ten")
        .layer_file("9.early", "a.txt", "nine");

    coordinator(&project).run_merge().await.unwrap();

    // "9.early" sorts after "10.late"
    assert_eq!(project.output("a.txt").as_deref(), Some("nine"));
}

/// Every file in any layer appears in the output
#[tokio::test]
async fn test_completeness() {
    let project = Project::new();
    project
        .layer_file("1.core", "pages/index.html", "core")
        .layer_file("1.core", "assets/site.css", "css")
        .layer_file("2.blog", "pages/blog/post.md", "post")
        .layer_file("3.site", "robots.txt", "robots");

    coordinator(&project).run_merge().await.unwrap();

    let files: Vec<String> = list_files(&project.paths.output)
        .iter()
        .map(|p| p.to_string_lossy().replace('\\', "/"))
        .collect();
    assert_eq!(
        files,
        vec![
            "assets/site.css",
            "pages/blog/post.md",
            "pages/index.html",
            "robots.txt"
        ]
    );
}

/// Re-running with unchanged inputs leaves identical output
#[tokio::test]
async fn test_idempotent_remerge() {
    let project = Project::new();
    project
        .layer_file("1.core", "a.txt", "a")
        .layer_file("2.site", "a.txt", "b")
        .layer_file("2.site", "nested/c.txt", "c");
    let coordinator = coordinator(&project);

    let first = coordinator.run_merge().await.unwrap();
    let snapshot: Vec<(std::path::PathBuf, Vec<u8>)> = list_files(&project.paths.output)
        .into_iter()
        .map(|p| {
            let bytes = fs::read(project.paths.output.join(&p)).unwrap();
            (p, bytes)
        })
        .collect();
    let second = coordinator.run_merge().await.unwrap();

    assert_eq!(first.files_copied, 3);
    // the overridden path is rewritten twice per pass; nested/c.txt is untouched
    assert_eq!(second.files_unchanged, 1);
    for (path, bytes) in snapshot {
        assert_eq!(fs::read(project.paths.output.join(&path)).unwrap(), bytes);
    }
}

/// No layers root and no remote layers is a successful empty merge
#[tokio::test]
async fn test_empty_input() {
    let project = Project::new();

    let report = coordinator(&project).run_merge().await.unwrap();

    assert!(report.layers.is_empty());
    assert!(project.paths.output.is_dir());
    assert!(list_files(&project.paths.output).is_empty());
}

/// Stale files survive a default merge
#[tokio::test]
async fn test_stale_files_are_kept_by_default() {
    let project = Project::new();
    project.layer_file("1.core", "keep.txt", "keep");
    let coordinator = coordinator(&project);
    coordinator.run_merge().await.unwrap();

    fs::remove_file(project.paths.layers.join("1.core/keep.txt")).unwrap();
    coordinator.run_merge().await.unwrap();

    assert_eq!(project.output("keep.txt").as_deref(), Some("keep"));
}

/// A file in a higher layer replaces a directory from a lower one
#[tokio::test]
async fn test_node_kind_conflict_resolved_by_precedence() {
    let project = Project::new();
    project
        .layer_file("1.core", "docs/readme.md", "dir")
        .layer_file("2.site", "docs", "file");

    coordinator(&project).run_merge().await.unwrap();

    assert_eq!(project.output("docs").as_deref(), Some("file"));
}

#[tokio::test]
async fn test_local_overrides_cached_external_of_same_name() {
    let project = Project::new();
    write_file(&project.paths.external.join("2.x/page.html"), "external");
    project.layer_file("2.x", "page.html", "local");

    let sources = vec![LayerSource::parse("2.x", "vcs:acme/x").unwrap()];
    let fetcher = Arc::new(MemoryFetcher::default().with_layer("2.x", &[("page.html", "external")]));
    let coordinator = MergeCoordinator::new(project.paths.clone(), sources, fetcher);

    coordinator.run_merge().await.unwrap();

    assert_eq!(project.output("page.html").as_deref(), Some("local"));
}

fn layer_name() -> impl Strategy<Value = String> {
    "[0-9]\\.[a-z]{1,6}"
}

fn relative_path() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-z]{1,5}", 1..3).prop_map(|parts| format!("{}.txt", parts.join("/")))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Output at every path equals the content from the last-sorted layer containing it
    #[test]
    fn prop_highest_precedence_content_wins(
        layers in prop::collection::btree_map(
            layer_name(),
            prop::collection::btree_map(relative_path(), "[a-z]{0,8}", 1..5),
            1..5,
        )
    ) {
        let project = Project::new();
        let mut expected: BTreeMap<String, String> = BTreeMap::new();
        for (layer, files) in &layers {
            for (path, content) in files {
                project.layer_file(layer, path, content);
            }
        }
        for files in layers.values() {
            for (path, content) in files {
                expected.insert(path.clone(), content.clone());
            }
        }

        let plan = discover(&project.paths.layers, &project.paths.external).unwrap();
        OverlayMerger::new(project.paths.output.clone()).merge(&plan).unwrap();

        let mut produced: Vec<String> = list_files(&project.paths.output)
            .iter()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .collect();
        produced.sort();
        prop_assert_eq!(produced, expected.keys().cloned().collect::<Vec<_>>());
        for (path, content) in &expected {
            let got = project.output(path);
            prop_assert_eq!(got.as_deref(), Some(content.as_str()));
        }
    }
}
