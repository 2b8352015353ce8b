// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

pub mod cache;
pub mod queue;
pub mod read;
pub mod status;
pub mod sync;
pub mod watch;
pub mod write;

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use fl_core::{FileQueue, MutationStore, ResponseCache};

use crate::client::OfflineClient;
use crate::config::{load_or_create_node_id, Config, StatePaths};
use crate::connectivity::ConnectivityMonitor;
use crate::error::Result;
use crate::gateway::{Gateway, HttpGateway};
use crate::sync::{DrainReport, StopReason};

/// Everything a command needs from the state directory.
pub struct Context {
    pub paths: StatePaths,
    pub config: Config,
    pub node: String,
    pub queue: Arc<FileQueue>,
    pub cache: Arc<ResponseCache>,
}

impl Context {
    /// Open the queue and cache in the given state directory, creating it
    /// on first use.
    pub fn open(state_dir: &Path) -> Result<Self> {
        let paths = StatePaths::new(state_dir);
        std::fs::create_dir_all(&paths.root)?;
        let config = Config::load(&paths.root)?;
        let node = load_or_create_node_id(&paths)?;
        let queue = Arc::new(FileQueue::open(&paths.queue, &node)?);
        let cache = Arc::new(
            ResponseCache::open(&paths.cache)?.with_max_entries(config.cache.max_entries),
        );
        Ok(Context {
            paths,
            config,
            node,
            queue,
            cache,
        })
    }

    pub fn queue_len(&self) -> Result<usize> {
        Ok(self.queue.len()?)
    }

    /// Build the HTTP gateway for the configured remote.
    pub fn gateway(&self) -> Result<Arc<dyn Gateway>> {
        Ok(Arc::new(HttpGateway::new(&self.config.remote)?))
    }

    /// Build a client over this context's queue and cache.
    pub fn client(
        &self,
        gateway: Arc<dyn Gateway>,
        monitor: Arc<ConnectivityMonitor>,
    ) -> OfflineClient {
        OfflineClient::new(
            Arc::clone(&self.queue) as Arc<dyn MutationStore>,
            Arc::clone(&self.cache),
            gateway,
            monitor,
            self.config.sync.backoff(),
        )
    }

    /// Build a client against the configured remote and probe it once.
    pub async fn connect(&self) -> Result<OfflineClient> {
        let gateway = self.gateway()?;
        let monitor = Arc::new(ConnectivityMonitor::new(true));
        monitor.report_probe(gateway.probe().await);
        Ok(self.client(gateway, monitor))
    }
}

/// Format a millisecond timestamp for display.
pub fn format_stamp(ms: u64) -> String {
    i64::try_from(ms)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| ms.to_string())
}

/// Print the outcome of a drain and surface a halt as an error.
pub fn report_drain(report: DrainReport, pending: usize) -> Result<()> {
    let summary = match report {
        DrainReport::Coalesced => {
            println!("A sync is already running");
            return Ok(());
        }
        DrainReport::Completed(summary) => summary,
    };

    if !summary.applied.is_empty() {
        println!("Applied {} operation(s)", summary.applied.len());
    }
    for (id, reason) in &summary.quarantined {
        println!("Quarantined {}: {}", id, reason);
    }
    match &summary.stop {
        StopReason::Drained => println!("Queue is empty"),
        StopReason::Unreachable => {
            println!("Remote unreachable; {} operation(s) still pending", pending)
        }
        StopReason::AuthRejected { .. } | StopReason::Exhausted { .. } => {}
    }

    match summary.error() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
