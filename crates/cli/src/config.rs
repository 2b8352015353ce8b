// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Client configuration and on-disk state layout.
//!
//! Configuration is stored in `fitlog.toml` inside the state directory and
//! includes:
//! - `[remote]`: base URL, bearer token and request timeout
//! - `[sync]`: backoff bounds, retry cap and probe interval
//! - `[cache]`: optional entry bound for the response cache
//!
//! A missing file means defaults. The state directory also holds the queue,
//! the quarantine file, the cache database, the log and the node id.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fl_core::{ClockSource, SystemClock};

use crate::env;
use crate::error::{Error, Result};
use crate::sync::BackoffPolicy;

const STATE_DIR_NAME: &str = "fitlog";
const CONFIG_FILE_NAME: &str = "fitlog.toml";
const QUEUE_FILE_NAME: &str = "queue.jsonl";
const CACHE_FILE_NAME: &str = "cache.db";
const LOG_FILE_NAME: &str = "fitlog.log";
const NODE_FILE_NAME: &str = "node_id";

/// Client configuration stored in `fitlog.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub cache: CacheSettings,
}

/// Remote endpoint configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL; resources live at `{url}/{target}`.
    #[serde(default = "default_url")]
    pub url: String,
    /// Bearer token sent with every request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Per-request timeout in milliseconds (default: 10000).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Path probed to decide reachability (default: "health").
    #[serde(default = "default_probe_path")]
    pub probe_path: String,
}

/// Sync engine tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// First retry delay in milliseconds (default: 500).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Upper bound for the retry delay in milliseconds (default: 60000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Attempts per operation before it is marked failed (default: 8).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Interval between background reachability probes (default: 15000).
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,
}

/// Response cache settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Maximum cached entries; unbounded when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_entries: Option<usize>,
}

fn default_url() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_probe_path() -> String {
    "health".to_string()
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_max_attempts() -> u32 {
    8
}

fn default_probe_interval_ms() -> u64 {
    15_000
}

impl Default for RemoteConfig {
    fn default() -> Self {
        RemoteConfig {
            url: default_url(),
            token: None,
            request_timeout_ms: default_request_timeout_ms(),
            probe_path: default_probe_path(),
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
            probe_interval_ms: default_probe_interval_ms(),
        }
    }
}

impl RemoteConfig {
    /// Validates that the URL is an http(s) URL.
    ///
    /// Returns an error message if the URL is invalid.
    pub fn validate_url(&self) -> Option<String> {
        let url = self.url.trim();
        let rest = url
            .strip_prefix("http://")
            .or_else(|| url.strip_prefix("https://"));
        match rest {
            Some(host) if !host.is_empty() && !host.starts_with('/') => None,
            Some(_) => Some(format!("remote URL '{}' has no host", url)),
            None => Some(format!(
                "invalid remote URL '{}': must start with http:// or https://",
                url
            )),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl SyncSettings {
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            max_attempts: self.max_attempts,
        }
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }
}

impl Config {
    /// Loads configuration from the given state directory.
    ///
    /// A missing `fitlog.toml` yields the defaults.
    pub fn load(state_dir: &Path) -> Result<Self> {
        let config_path = state_dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Ok(Config::default());
        }
        let content = fs::read_to_string(&config_path)
            .map_err(|e| Error::Config(format!("failed to read config: {}", e)))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Saves configuration to the given state directory.
    pub fn save(&self, state_dir: &Path) -> Result<()> {
        fs::create_dir_all(state_dir)?;
        let config_path = state_dir.join(CONFIG_FILE_NAME);
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("failed to serialize config: {}", e)))?;
        fs::write(&config_path, content)?;
        Ok(())
    }

    /// Rejects settings the sync engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if let Some(msg) = self.remote.validate_url() {
            return Err(Error::Config(msg));
        }
        if self.remote.request_timeout_ms == 0 {
            return Err(Error::Config(
                "remote.request_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.sync.max_attempts == 0 {
            return Err(Error::Config(
                "sync.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.sync.probe_interval_ms == 0 {
            return Err(Error::Config(
                "sync.probe_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.sync.base_delay_ms > self.sync.max_delay_ms {
            return Err(Error::Config(format!(
                "sync.base_delay_ms ({}) exceeds sync.max_delay_ms ({})",
                self.sync.base_delay_ms, self.sync.max_delay_ms
            )));
        }
        if self.cache.max_entries == Some(0) {
            return Err(Error::Config(
                "cache.max_entries must be at least 1 when set".to_string(),
            ));
        }
        Ok(())
    }
}

/// Resolves the state directory.
///
/// Order: explicit path, `FITLOG_STATE_DIR`, `XDG_STATE_HOME/fitlog`, then
/// the platform state directory (falling back to `~/.local/state/fitlog`).
pub fn resolve_state_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Some(path) = env::state_dir() {
        return path;
    }
    if let Some(xdg) = env::xdg_state_home() {
        return xdg.join(STATE_DIR_NAME);
    }
    dirs::state_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".local").join("state")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join(STATE_DIR_NAME)
}

/// Paths of every file kept in the state directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePaths {
    pub root: PathBuf,
    pub config: PathBuf,
    pub queue: PathBuf,
    pub cache: PathBuf,
    pub log: PathBuf,
    pub node: PathBuf,
}

impl StatePaths {
    pub fn new(root: &Path) -> Self {
        StatePaths {
            root: root.to_path_buf(),
            config: root.join(CONFIG_FILE_NAME),
            queue: root.join(QUEUE_FILE_NAME),
            cache: root.join(CACHE_FILE_NAME),
            log: root.join(LOG_FILE_NAME),
            node: root.join(NODE_FILE_NAME),
        }
    }
}

/// Reads the node id from the state directory, generating one on first use.
///
/// The node id feeds operation id generation so that ids minted by two
/// installations never collide.
pub fn load_or_create_node_id(paths: &StatePaths) -> Result<String> {
    if let Ok(existing) = fs::read_to_string(&paths.node) {
        let existing = existing.trim();
        if !existing.is_empty() {
            return Ok(existing.to_string());
        }
    }

    fs::create_dir_all(&paths.root)?;
    let seed = paths.root.to_string_lossy();
    let node = fl_core::id::generate_node_id(&seed, SystemClock.now_ms());
    fs::write(&paths.node, format!("{}\n", node))?;
    tracing::info!(node = %node, "generated node id");
    Ok(node)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
