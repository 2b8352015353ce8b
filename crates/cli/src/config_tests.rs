// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use super::*;
use tempfile::TempDir;
use yare::parameterized;

#[test]
fn test_missing_config_uses_defaults() {
    let temp = TempDir::new().unwrap();
    let config = Config::load(temp.path()).unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.sync.max_attempts, 8);
    assert_eq!(config.remote.request_timeout_ms, 10_000);
    assert!(config.cache.max_entries.is_none());
}

#[test]
fn test_save_and_load_roundtrip() {
    let temp = TempDir::new().unwrap();
    let mut config = Config::default();
    config.remote.url = "https://api.fitlog.example/v1".to_string();
    config.remote.token = Some("secret".to_string());
    config.cache.max_entries = Some(200);

    config.save(temp.path()).unwrap();

    let loaded = Config::load(temp.path()).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_partial_config_fills_defaults() {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join("fitlog.toml"),
        "[remote]\nurl = \"https://api.example\"\n\n[sync]\nmax_attempts = 3\n",
    )
    .unwrap();

    let config = Config::load(temp.path()).unwrap();
    assert_eq!(config.remote.url, "https://api.example");
    assert_eq!(config.remote.probe_path, "health");
    assert_eq!(config.sync.max_attempts, 3);
    assert_eq!(config.sync.base_delay_ms, 500);
}

#[test]
fn test_unparseable_config_is_config_error() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("fitlog.toml"), "remote = [").unwrap();

    let err = Config::load(temp.path()).unwrap_err();
    assert!(matches!(err, Error::Config(ref msg) if msg.contains("failed to parse config")));
}

#[parameterized(
    http = { "http://localhost:8080", true },
    https = { "https://api.example/v1", true },
    ws = { "ws://localhost:7890", false },
    no_host = { "https://", false },
    bare = { "api.example", false },
)]
fn test_validate_url(url: &str, valid: bool) {
    let remote = RemoteConfig {
        url: url.to_string(),
        ..RemoteConfig::default()
    };
    assert_eq!(remote.validate_url().is_none(), valid);
}

#[test]
fn test_validate_rejects_zero_attempts() {
    let mut config = Config::default();
    config.sync.max_attempts = 0;
    assert!(matches!(config.validate(), Err(Error::Config(_))));
}

#[test]
fn test_validate_rejects_inverted_delays() {
    let mut config = Config::default();
    config.sync.base_delay_ms = 10_000;
    config.sync.max_delay_ms = 100;
    assert!(matches!(config.validate(), Err(Error::Config(_))));
}

#[test]
fn test_validate_rejects_empty_cache_bound() {
    let mut config = Config::default();
    config.cache.max_entries = Some(0);
    assert!(matches!(config.validate(), Err(Error::Config(_))));
}

#[test]
fn test_backoff_from_settings() {
    let settings = SyncSettings {
        base_delay_ms: 100,
        max_delay_ms: 800,
        max_attempts: 4,
        probe_interval_ms: 1_000,
    };
    let policy = settings.backoff();
    assert_eq!(policy.base_delay, Duration::from_millis(100));
    assert_eq!(policy.max_delay, Duration::from_millis(800));
    assert_eq!(policy.max_attempts, 4);
    assert_eq!(settings.probe_interval(), Duration::from_secs(1));
}

#[test]
fn test_explicit_state_dir_wins() {
    let temp = TempDir::new().unwrap();
    assert_eq!(resolve_state_dir(Some(temp.path())), temp.path());
}

#[test]
fn test_state_paths_layout() {
    let paths = StatePaths::new(Path::new("/state/fitlog"));
    assert_eq!(paths.queue, PathBuf::from("/state/fitlog/queue.jsonl"));
    assert_eq!(paths.cache, PathBuf::from("/state/fitlog/cache.db"));
    assert_eq!(paths.config, PathBuf::from("/state/fitlog/fitlog.toml"));
    assert_eq!(paths.log, PathBuf::from("/state/fitlog/fitlog.log"));
}

#[test]
fn test_node_id_is_stable_once_created() {
    let temp = TempDir::new().unwrap();
    let paths = StatePaths::new(&temp.path().join("state"));

    let first = load_or_create_node_id(&paths).unwrap();
    let second = load_or_create_node_id(&paths).unwrap();

    assert_eq!(first, second);
    assert_eq!(first.len(), 12);
    assert!(paths.node.exists());
}
