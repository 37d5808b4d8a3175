//! Integration tests for the host entry points and watch mode

use super::test_utils::{MemoryFetcher, Project};
use layered_files::config::LayeredConfig;
use layered_files::host::{initial_merge, watch, HostOptions, RunMode};
use std::fs;
use std::sync::Arc;
use std::time::Duration;

fn options(project: &Project, mode: RunMode) -> HostOptions {
    let mut config = LayeredConfig::default();
    config.watch.debounce_ms = 30;
    HostOptions::new(project.root())
        .with_mode(mode)
        .with_config(config)
        .with_fetcher(Arc::new(MemoryFetcher::default()))
}

#[tokio::test]
async fn test_initial_merge_accepts_file_location() {
    let project = Project::new();
    project.layer_file("1.core", "index.html", "core");
    let location = format!("file://{}", project.root().display());
    let paths = layered_files::paths::LayerPaths::resolve(&location).unwrap();

    let output = initial_merge(&HostOptions::new(&paths.project_root)).await.unwrap();

    assert_eq!(output, project.paths.output);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dev_watch_remerges_on_change() {
    let project = Project::new();
    project.layer_file("1.core", "index.html", "v1");
    let options = options(&project, RunMode::Dev);

    initial_merge(&options).await.unwrap();
    let handle = watch(&options, options.coordinator().unwrap()).unwrap().unwrap();

    project.layer_file("1.core", "index.html", "v2");
    wait_for_output(&project, "index.html", "v2").await;

    // new layers appearing under the watched root are picked up too
    project.layer_file("2.site", "about.html", "about");
    wait_for_output(&project, "about.html", "about").await;

    handle.stop();
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_remerge_does_not_stop_watching() {
    let project = Project::new();
    project.layer_file("1.core", "index.html", "v1");
    let options = options(&project, RunMode::Dev);
    initial_merge(&options).await.unwrap();
    let handle = watch(&options, options.coordinator().unwrap()).unwrap().unwrap();
    let mut stats = handle.subscribe();

    // a symlink loop makes the walk fail
    let looped = project.paths.layers.join("2.loop");
    fs::create_dir_all(&looped).unwrap();
    std::os::unix::fs::symlink(&looped, looped.join("self")).unwrap();
    tokio::time::timeout(Duration::from_secs(10), stats.wait_for(|s| s.failed >= 1))
        .await
        .unwrap()
        .unwrap();

    fs::remove_file(looped.join("self")).unwrap();
    project.layer_file("2.loop", "fixed.txt", "fixed");
    wait_for_output(&project, "fixed.txt", "fixed").await;

    handle.stop();
}

async fn wait_for_output(project: &Project, relative: &str, expected: &str) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while project.output(relative).as_deref() != Some(expected) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_build_and_preview_do_not_watch() {
    let project = Project::new();
    for mode in [RunMode::Build, RunMode::Preview] {
        let options = options(&project, mode);
        assert!(watch(&options, options.coordinator().unwrap()).unwrap().is_none());
    }
}
