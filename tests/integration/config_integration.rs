//! Integration tests for Configuration System

use super::test_utils::{MemoryFetcher, Project, ENV_MUTEX};
use layered_files::config::ConfigLoader;
use layered_files::coordinator::{FetchPolicy, MergeCoordinator};
use layered_files::error::ConfigError;
use std::sync::Arc;

#[test]
fn test_config_drives_coordinator() {
    let project = Project::new();
    project.write_config(
        r#"
[external]
"2.Premium" = "git:acme/premium@main"
"3.icons" = "npm:@acme/icons"

[merge]
clean_output = true
fetch = "if-missing"
"#,
    );

    let config = ConfigLoader::load(project.root()).unwrap();
    let coordinator = MergeCoordinator::from_config(
        project.paths.clone(),
        &config,
        Arc::new(MemoryFetcher::default()),
    )
    .unwrap();

    let names: Vec<&str> = coordinator.sources().iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["2.Premium", "3.icons"]);
    assert_eq!(
        coordinator.sources()[0].descriptor.to_string(),
        "vcs:acme/premium@main"
    );
    assert_eq!(config.merge.fetch, FetchPolicy::IfMissing);
    assert!(config.merge_options().clean_output);
}

#[test]
fn test_malformed_locator_fails_before_merge() {
    let project = Project::new();
    project.write_config("[external]\n\"2.theme\" = \"vcs:acme-theme\"\n");

    let config = ConfigLoader::load(project.root()).unwrap();
    let err = MergeCoordinator::from_config(
        project.paths.clone(),
        &config,
        Arc::new(MemoryFetcher::default()),
    )
    .err()
    .unwrap();

    match err {
        ConfigError::InvalidLocator { layer, locator, .. } => {
            assert_eq!(layer, "2.theme");
            assert_eq!(locator, "vcs:acme-theme");
        }
        other => panic!("expected invalid locator, got {other:?}"),
    }
}

#[test]
fn test_environment_file_overrides_base() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let project = Project::new();
    project.write_config("[watch]\ndebounce_ms = 400\n\n[external]\n\"2.a\" = \"vcs:o/a\"\n");
    std::fs::write(
        project.root().join("layered.staging.toml"),
        "[watch]\ndebounce_ms = 25\n\n[external]\n\"2.a\" = \"vcs:o/a@v2\"\n",
    )
    .unwrap();

    std::env::set_var("LAYERED_ENV", "staging");
    let loaded = ConfigLoader::load(project.root());
    std::env::remove_var("LAYERED_ENV");

    let config = loaded.unwrap();
    assert_eq!(config.watch.debounce_ms, 25);
    assert_eq!(config.external.get("2.a").map(String::as_str), Some("vcs:o/a@v2"));
}

#[test]
fn test_environment_variables_override_files() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let project = Project::new();
    project.write_config("[merge]\nclean_output = false\n");

    std::env::set_var("LAYERED__MERGE__CLEAN_OUTPUT", "true");
    let loaded = ConfigLoader::load(project.root());
    std::env::remove_var("LAYERED__MERGE__CLEAN_OUTPUT");

    assert!(loaded.unwrap().merge.clean_output);
}

#[test]
fn test_explicit_file_replaces_project_files() {
    let project = Project::new();
    project.write_config("[watch]\ndebounce_ms = 400\n");
    let explicit = project.root().join("ci.toml");
    std::fs::write(&explicit, "[merge]\nfetch = \"always\"\n").unwrap();

    let config = ConfigLoader::load_from_file(&explicit).unwrap();

    assert_eq!(config.watch.debounce_ms, 100);
    assert_eq!(config.merge.fetch, FetchPolicy::Always);
}

#[test]
fn test_invalid_toml_is_a_config_error() {
    let project = Project::new();
    project.write_config("[external\n");

    assert!(matches!(
        ConfigLoader::load(project.root()),
        Err(ConfigError::Load(_))
    ));
}
