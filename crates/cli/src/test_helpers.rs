// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for engine and client tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fl_core::{ManualClock, MemoryQueue, MutationOperation, MutationStore, ResponseCache};
use serde_json::Value;
use tokio::sync::{Notify, Semaphore};

use crate::connectivity::ConnectivityMonitor;
use crate::gateway::{Gateway, GatewayFuture, Outcome};
use crate::sync::BackoffPolicy;

/// Gateway that replays scripted outcomes and records every call.
pub struct ScriptedGateway {
    /// Outcomes for successive apply calls; the default applies once empty.
    apply_script: Mutex<VecDeque<Outcome>>,
    default_apply: Mutex<Outcome>,
    reads: Mutex<HashMap<String, Outcome>>,
    probe_ok: AtomicBool,
    applied: Mutex<Vec<MutationOperation>>,
    /// When held, apply calls park until released.
    held: AtomicBool,
    gate: Semaphore,
    entered: Notify,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        ScriptedGateway {
            apply_script: Mutex::new(VecDeque::new()),
            default_apply: Mutex::new(Outcome::Success(Value::Null)),
            reads: Mutex::new(HashMap::new()),
            probe_ok: AtomicBool::new(true),
            applied: Mutex::new(Vec::new()),
            held: AtomicBool::new(false),
            gate: Semaphore::new(0),
            entered: Notify::new(),
        }
    }

    /// Queue outcomes for the next apply calls, in order.
    pub fn script(&self, outcomes: impl IntoIterator<Item = Outcome>) {
        self.apply_script.lock().unwrap().extend(outcomes);
    }

    /// Outcome returned once the script is exhausted.
    pub fn set_default_apply(&self, outcome: Outcome) {
        *self.default_apply.lock().unwrap() = outcome;
    }

    pub fn set_read(&self, key: &str, outcome: Outcome) {
        self.reads.lock().unwrap().insert(key.to_string(), outcome);
    }

    pub fn set_probe(&self, ok: bool) {
        self.probe_ok.store(ok, Ordering::SeqCst);
    }

    /// Operations passed to apply, in call order.
    pub fn applied(&self) -> Vec<MutationOperation> {
        self.applied.lock().unwrap().clone()
    }

    pub fn applied_targets(&self) -> Vec<String> {
        self.applied().into_iter().map(|op| op.target).collect()
    }

    pub fn apply_calls(&self) -> usize {
        self.applied.lock().unwrap().len()
    }

    /// Park subsequent apply calls until [`release`](Self::release).
    pub fn hold(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    /// Let `n` parked apply calls proceed.
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    /// Wait until an apply call has started.
    pub async fn wait_entered(&self) {
        tokio::time::timeout(Duration::from_secs(5), self.entered.notified())
            .await
            .expect("apply was never called");
    }
}

impl Gateway for ScriptedGateway {
    fn apply<'a>(&'a self, op: &'a MutationOperation) -> GatewayFuture<'a, Outcome> {
        Box::pin(async move {
            self.applied.lock().unwrap().push(op.clone());
            self.entered.notify_one();
            if self.held.load(Ordering::SeqCst) {
                self.gate.acquire().await.unwrap().forget();
            }
            let scripted = self.apply_script.lock().unwrap().pop_front();
            scripted.unwrap_or_else(|| self.default_apply.lock().unwrap().clone())
        })
    }

    fn read<'a>(&'a self, key: &'a str) -> GatewayFuture<'a, Outcome> {
        Box::pin(async move {
            self.reads
                .lock()
                .unwrap()
                .get(key)
                .cloned()
                .unwrap_or(Outcome::ConnectivityFailure)
        })
    }

    fn probe(&self) -> GatewayFuture<'_, bool> {
        Box::pin(async move { self.probe_ok.load(Ordering::SeqCst) })
    }
}

/// Everything the engine and client need, wired to in-memory backends.
pub struct Harness {
    pub store: Arc<MemoryQueue>,
    pub cache: Arc<ResponseCache>,
    pub gateway: Arc<ScriptedGateway>,
    pub monitor: Arc<ConnectivityMonitor>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    /// A harness whose monitor starts reachable.
    pub fn online() -> Self {
        let harness = Self::offline();
        harness.monitor.report_probe(true);
        harness
    }

    /// A harness whose monitor starts unreachable.
    pub fn offline() -> Self {
        let clock = Arc::new(ManualClock::new(1_000));
        Harness {
            store: Arc::new(MemoryQueue::with_clock("test-node", Arc::clone(&clock))),
            cache: Arc::new(
                ResponseCache::open_in_memory()
                    .unwrap()
                    .with_clock(Arc::clone(&clock)),
            ),
            gateway: Arc::new(ScriptedGateway::new()),
            monitor: Arc::new(ConnectivityMonitor::new(true)),
            clock,
        }
    }

    pub fn store(&self) -> Arc<dyn MutationStore> {
        Arc::clone(&self.store) as Arc<dyn MutationStore>
    }

    pub fn gateway(&self) -> Arc<dyn Gateway> {
        Arc::clone(&self.gateway) as Arc<dyn Gateway>
    }
}

/// Millisecond-scale backoff so retry tests finish quickly.
pub fn fast_policy(max_attempts: u32) -> BackoffPolicy {
    BackoffPolicy {
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(4),
        max_attempts,
    }
}
