// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Queue drain loop.
//!
//! The engine replays pending mutations against the remote strictly in
//! enqueue order. It only ever works on the head of the queue: a head that
//! cannot be applied blocks everything behind it until it succeeds, is
//! quarantined, or is marked failed and later retried by the user.
//!
//! At most one drain runs at a time, across processes too: a drain holds the
//! store's [`DrainLease`](fl_core::DrainLease) for its whole pass. A trigger
//! that arrives while a drain is in flight returns [`DrainReport::Coalesced`]
//! immediately; the running drain reads the queue head fresh on every step,
//! so it also picks up whatever the coalesced trigger was about.
//!
//! Attempts are counted per operation and survive across passes, so a head
//! that keeps failing is marked failed even if connectivity flaps between
//! attempts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fl_core::{
    duration_ms, ClockSource, FailureMark, MutationKind, MutationOperation, MutationStore,
    ResponseCache, SystemClock,
};
use serde_json::Value;
use tokio::sync::{broadcast, watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::backoff::BackoffPolicy;
use crate::connectivity::{ConnectivityMonitor, Reachability};
use crate::error::{Error, Result};
use crate::gateway::{Gateway, Outcome};

const EVENT_CAPACITY: usize = 64;

/// Observable engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Draining,
    BackingOff,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Idle => "idle",
            SyncState::Draining => "draining",
            SyncState::BackingOff => "backing-off",
        }
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a drain pass stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The queue is empty.
    Drained,
    /// The remote became unreachable.
    Unreachable,
    /// The remote rejected our credentials while applying the head.
    AuthRejected { id: String },
    /// The head is marked failed and waits for a manual retry.
    Exhausted { id: String, attempts: u32 },
}

/// Progress made by one drain pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainSummary {
    /// Ids applied and removed, in order.
    pub applied: Vec<String>,
    /// Ids moved to quarantine, with the reason.
    pub quarantined: Vec<(String, String)>,
    pub stop: StopReason,
}

impl DrainSummary {
    fn new() -> Self {
        DrainSummary {
            applied: Vec::new(),
            quarantined: Vec::new(),
            stop: StopReason::Drained,
        }
    }

    /// The error to surface to the user, if the pass halted on one.
    pub fn error(&self) -> Option<Error> {
        match &self.stop {
            StopReason::AuthRejected { id } => Some(Error::Auth {
                id: Some(id.clone()),
            }),
            StopReason::Exhausted { id, attempts } => Some(Error::ExhaustedRetry {
                id: id.clone(),
                attempts: *attempts,
            }),
            StopReason::Drained | StopReason::Unreachable => None,
        }
    }
}

/// Result of a trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainReport {
    /// Another drain was already running.
    Coalesced,
    Completed(DrainSummary),
}

/// Notifications published while draining.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    StateChanged(SyncState),
    Applied {
        id: String,
        target: String,
    },
    RetryScheduled {
        id: String,
        attempt: u32,
        delay: Duration,
    },
    Quarantined {
        id: String,
        reason: String,
    },
    Stopped(StopReason),
}

/// Clears the in-flight flag when a drain ends, including on early return.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Replays queued mutations against the remote.
pub struct SyncEngine {
    store: Arc<dyn MutationStore>,
    cache: Arc<ResponseCache>,
    gateway: Arc<dyn Gateway>,
    monitor: Arc<ConnectivityMonitor>,
    policy: BackoffPolicy,
    /// Serializes every remote mutation, drained or direct.
    lane: Mutex<()>,
    draining: AtomicBool,
    /// Failed apply attempts per operation id.
    attempts: std::sync::Mutex<HashMap<String, u32>>,
    wake: Notify,
    state_tx: watch::Sender<SyncState>,
    events: broadcast::Sender<SyncEvent>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn MutationStore>,
        cache: Arc<ResponseCache>,
        gateway: Arc<dyn Gateway>,
        monitor: Arc<ConnectivityMonitor>,
        policy: BackoffPolicy,
    ) -> Self {
        let (state_tx, _) = watch::channel(SyncState::Idle);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        SyncEngine {
            store,
            cache,
            gateway,
            monitor,
            policy,
            lane: Mutex::new(()),
            draining: AtomicBool::new(false),
            attempts: std::sync::Mutex::new(HashMap::new()),
            wake: Notify::new(),
            state_tx,
            events,
        }
    }

    pub fn state(&self) -> SyncState {
        *self.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
        self.state_tx.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    pub(crate) fn lane(&self) -> &Mutex<()> {
        &self.lane
    }

    /// Ask the background loop started by [`run`](Self::run) to drain soon.
    pub fn request_drain(&self) {
        self.wake.notify_one();
    }

    /// Drain the queue now, or coalesce into the drain already running.
    pub async fn trigger(&self) -> Result<DrainReport> {
        if self
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("drain already in flight, coalescing trigger");
            return Ok(DrainReport::Coalesced);
        }
        let _guard = DrainGuard(&self.draining);
        let _lane = self.lane.lock().await;
        // In this process the lane already serializes, so a taken lease
        // means another process is draining.
        let Some(_lease) = self.store.try_lease()? else {
            debug!("another process is draining, coalescing trigger");
            return Ok(DrainReport::Coalesced);
        };

        self.set_state(SyncState::Draining);
        let result = self.drain().await;
        self.set_state(SyncState::Idle);

        let summary = result?;
        if !summary.applied.is_empty() || summary.stop != StopReason::Drained {
            info!(
                applied = summary.applied.len(),
                quarantined = summary.quarantined.len(),
                stop = ?summary.stop,
                "drain finished"
            );
        }
        self.emit(SyncEvent::Stopped(summary.stop.clone()));
        Ok(DrainReport::Completed(summary))
    }

    /// Clear the failure mark on an operation and drain again.
    pub async fn retry_failed(&self, id: &str) -> Result<DrainReport> {
        if !self.store.clear_failure(id)? && !self.store.list()?.iter().any(|op| op.id == id) {
            return Err(Error::OpNotFound(id.to_string()));
        }
        self.forget_attempts(id);
        info!(id, "cleared failure mark");
        self.trigger().await
    }

    /// Spawn [`run`](Self::run) on the current runtime.
    pub fn spawn(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(engine.run(cancel))
    }

    /// Drain whenever the remote becomes reachable or a drain is requested.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut reachability = self.monitor.subscribe();
        loop {
            if *reachability.borrow_and_update() == Reachability::Reachable {
                match self.trigger().await {
                    Ok(DrainReport::Completed(summary)) => {
                        if let Some(e) = summary.error() {
                            error!(error = %e, "sync halted");
                        }
                    }
                    Ok(DrainReport::Coalesced) => {}
                    Err(e) => error!(error = %e, "drain failed"),
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("sync engine stopped");
                    return;
                }
                changed = reachability.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
                _ = self.wake.notified() => {}
            }
        }
    }

    async fn drain(&self) -> Result<DrainSummary> {
        let mut summary = DrainSummary::new();

        loop {
            if !self.monitor.is_reachable() {
                summary.stop = StopReason::Unreachable;
                return Ok(summary);
            }

            let Some(op) = self.store.head()? else {
                self.attempts().clear();
                summary.stop = StopReason::Drained;
                return Ok(summary);
            };

            if let Some(mark) = &op.failure {
                debug!(id = %op.id, "head is marked failed");
                summary.stop = StopReason::Exhausted {
                    id: op.id.clone(),
                    attempts: mark.attempts,
                };
                return Ok(summary);
            }

            if let Err(e) = op.encode_body() {
                let reason = e.to_string();
                error!(id = %op.id, resource = %op.target, reason = %reason, "quarantining unencodable operation");
                self.store.quarantine(&op.id, &reason)?;
                self.forget_attempts(&op.id);
                self.emit(SyncEvent::Quarantined {
                    id: op.id.clone(),
                    reason: reason.clone(),
                });
                summary.quarantined.push((op.id, reason));
                continue;
            }

            let attempts = self.record_attempt(&op.id);
            let outcome = self.gateway.apply(&op).await;
            match outcome {
                Outcome::Success(confirmed) => {
                    self.store.remove(&op.id)?;
                    self.forget_attempts(&op.id);
                    reflect_in_cache(&self.cache, &op, confirmed);
                    info!(id = %op.id, kind = %op.kind, resource = %op.target, "applied queued mutation");
                    self.emit(SyncEvent::Applied {
                        id: op.id.clone(),
                        target: op.target.clone(),
                    });
                    summary.applied.push(op.id);
                }
                Outcome::AuthFailure => {
                    warn!(id = %op.id, "remote rejected credentials, halting drain");
                    summary.stop = StopReason::AuthRejected { id: op.id };
                    return Ok(summary);
                }
                Outcome::ConnectivityFailure if self.policy.exhausted(attempts) => {
                    warn!(id = %op.id, attempts, "remote stopped answering, treating as unreachable");
                    self.monitor.report_probe(false);
                    // The next reachable pass gets a fresh budget
                    self.forget_attempts(&op.id);
                    summary.stop = StopReason::Unreachable;
                    return Ok(summary);
                }
                Outcome::RemoteFailure(code) if self.policy.exhausted(attempts) => {
                    error!(id = %op.id, code, attempts, "giving up on operation");
                    self.store.mark_failed(
                        &op.id,
                        FailureMark {
                            reason: format!("remote failed with status {}", code),
                            attempts,
                            marked_at: SystemClock.now_ms(),
                        },
                    )?;
                    self.forget_attempts(&op.id);
                    summary.stop = StopReason::Exhausted {
                        id: op.id,
                        attempts,
                    };
                    return Ok(summary);
                }
                Outcome::ConnectivityFailure | Outcome::RemoteFailure(_) => {
                    let delay = self.policy.delay(attempts - 1);
                    warn!(
                        id = %op.id,
                        attempt = attempts,
                        delay_ms = duration_ms(delay),
                        outcome = ?outcome,
                        "apply failed, backing off"
                    );
                    self.emit(SyncEvent::RetryScheduled {
                        id: op.id.clone(),
                        attempt: attempts,
                        delay,
                    });
                    if !self.back_off(delay).await {
                        summary.stop = StopReason::Unreachable;
                        return Ok(summary);
                    }
                }
            }
        }
    }

    /// Waits out a retry delay. Returns false if the remote became
    /// unreachable in the meantime.
    async fn back_off(&self, delay: Duration) -> bool {
        self.set_state(SyncState::BackingOff);
        let mut reachability = self.monitor.subscribe();
        let completed = tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = wait_unreachable(&mut reachability) => false,
        };
        self.set_state(SyncState::Draining);
        completed
    }

    fn attempts(&self) -> std::sync::MutexGuard<'_, HashMap<String, u32>> {
        self.attempts.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Counts one more apply attempt for `id` and returns the total.
    fn record_attempt(&self, id: &str) -> u32 {
        let mut attempts = self.attempts();
        let count = attempts.entry(id.to_string()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    fn forget_attempts(&self, id: &str) {
        self.attempts().remove(id);
    }

    fn set_state(&self, next: SyncState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        if changed {
            debug!(state = %next, "sync state changed");
            self.emit(SyncEvent::StateChanged(next));
        }
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

async fn wait_unreachable(rx: &mut watch::Receiver<Reachability>) {
    if rx
        .wait_for(|r| *r == Reachability::Unreachable)
        .await
        .is_err()
    {
        std::future::pending::<()>().await;
    }
}

/// Mirrors a confirmed mutation into the response cache.
///
/// Create and update store the remote's confirmed value, or the payload if
/// the remote sent no body. Delete drops the key. Cache failures are logged
/// and do not undo the remote apply.
pub(crate) fn reflect_in_cache(cache: &ResponseCache, op: &MutationOperation, confirmed: Value) {
    let result = match op.kind {
        MutationKind::Delete => cache.remove(&op.target).map(|_| ()),
        MutationKind::Create | MutationKind::Update => {
            let value = if confirmed.is_null() {
                op.payload.clone().unwrap_or(Value::Null)
            } else {
                confirmed
            };
            cache.put(&op.target, &value)
        }
    };
    if let Err(e) = result {
        warn!(id = %op.id, resource = %op.target, error = %e, "failed to refresh cache after apply");
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
