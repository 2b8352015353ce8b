// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Connectivity monitoring.
//!
//! Reachability combines two signals: the platform's network state and the
//! result of the last probe against the remote. Both must agree before the
//! remote counts as reachable. The current value is published on a watch
//! channel so the sync engine can react to transitions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::gateway::Gateway;

/// Whether the remote can currently be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    Reachable,
    Unreachable,
}

impl Reachability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reachability::Reachable => "reachable",
            Reachability::Unreachable => "unreachable",
        }
    }
}

impl std::fmt::Display for Reachability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks reachability of the remote and notifies subscribers on change.
///
/// Reads are lock-free; only transitions go through the watch channel.
pub struct ConnectivityMonitor {
    platform_online: AtomicBool,
    probe_ok: AtomicBool,
    tx: watch::Sender<Reachability>,
}

impl ConnectivityMonitor {
    /// Create a monitor. The remote starts unreachable until a probe succeeds.
    pub fn new(platform_online: bool) -> Self {
        let (tx, _) = watch::channel(Reachability::Unreachable);
        Self {
            platform_online: AtomicBool::new(platform_online),
            probe_ok: AtomicBool::new(false),
            tx,
        }
    }

    /// Current reachability.
    pub fn state(&self) -> Reachability {
        *self.tx.borrow()
    }

    pub fn is_reachable(&self) -> bool {
        self.state() == Reachability::Reachable
    }

    /// Subscribe to reachability transitions.
    pub fn subscribe(&self) -> watch::Receiver<Reachability> {
        self.tx.subscribe()
    }

    /// Record the platform's network signal.
    pub fn report_platform(&self, online: bool) {
        self.platform_online.store(online, Ordering::Release);
        self.recompute("platform");
    }

    /// Record the result of a probe or of a call that said something about
    /// reachability.
    pub fn report_probe(&self, ok: bool) {
        self.probe_ok.store(ok, Ordering::Release);
        self.recompute("probe");
    }

    fn recompute(&self, source: &'static str) {
        self.tx.send_if_modified(|current| {
            let next = if self.platform_online.load(Ordering::Acquire)
                && self.probe_ok.load(Ordering::Acquire)
            {
                Reachability::Reachable
            } else {
                Reachability::Unreachable
            };
            if *current == next {
                return false;
            }
            info!(from = %current, to = %next, source, "reachability changed");
            *current = next;
            true
        });
    }
}

/// Spawn a background task that probes the remote on a fixed interval.
///
/// The first probe runs immediately. The task exits when `cancel` fires.
pub fn spawn_probe_loop(
    monitor: Arc<ConnectivityMonitor>,
    gateway: Arc<dyn Gateway>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("probe loop cancelled");
                    return;
                }
                _ = ticker.tick() => {
                    let ok = tokio::select! {
                        _ = cancel.cancelled() => return,
                        ok = gateway.probe() => ok,
                    };
                    debug!(ok, "probe finished");
                    monitor.report_probe(ok);
                }
            }
        }
    })
}

#[cfg(test)]
#[path = "connectivity_tests.rs"]
mod tests;
