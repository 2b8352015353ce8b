// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Offline-resilient client for the fitness log.
//!
//! Provides the entry points the application calls for:
//! - Writes that apply directly when possible and queue otherwise
//! - Reads that fall back to the last cached value
//! - Access to the pending queue and the sync engine

use std::sync::Arc;

use fl_core::{MutationDraft, MutationOperation, MutationStore, ResponseCache};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::connectivity::ConnectivityMonitor;
use crate::error::{Error, Result};
use crate::gateway::{Gateway, Outcome};
use crate::sync::{reflect_in_cache, BackoffPolicy, SyncEngine};

/// What happened to a write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteReceipt {
    /// The remote confirmed the write and returned this value.
    Applied(Value),
    /// The write was queued under this operation id.
    Queued(String),
}

/// Where a read result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSource {
    Remote,
    Cache,
}

/// Result of a read.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadResult {
    pub value: Value,
    pub source: ReadSource,
    /// When the cached value was last refreshed; `None` for remote reads.
    pub last_refreshed: Option<u64>,
}

/// How a direct write attempt ended.
enum Direct {
    Applied(Value),
    /// Attempted and failed; queued under the id it was sent with.
    Requeued(String),
    /// Not attempted.
    Skipped(MutationDraft),
}

/// Ties the queue, cache, gateway and sync engine together.
pub struct OfflineClient {
    store: Arc<dyn MutationStore>,
    cache: Arc<ResponseCache>,
    gateway: Arc<dyn Gateway>,
    monitor: Arc<ConnectivityMonitor>,
    engine: Arc<SyncEngine>,
}

impl OfflineClient {
    pub fn new(
        store: Arc<dyn MutationStore>,
        cache: Arc<ResponseCache>,
        gateway: Arc<dyn Gateway>,
        monitor: Arc<ConnectivityMonitor>,
        policy: BackoffPolicy,
    ) -> Self {
        let engine = Arc::new(SyncEngine::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            Arc::clone(&gateway),
            Arc::clone(&monitor),
            policy,
        ));
        OfflineClient {
            store,
            cache,
            gateway,
            monitor,
            engine,
        }
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    pub fn monitor(&self) -> &Arc<ConnectivityMonitor> {
        &self.monitor
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub async fn create(&self, target: &str, payload: Value) -> Result<WriteReceipt> {
        self.write(MutationDraft::create(target, payload)).await
    }

    pub async fn update(&self, target: &str, payload: Value) -> Result<WriteReceipt> {
        self.write(MutationDraft::update(target, payload)).await
    }

    pub async fn delete(&self, target: &str) -> Result<WriteReceipt> {
        self.write(MutationDraft::delete(target)).await
    }

    /// Apply a write directly if the remote is reachable and nothing is
    /// pending; queue it otherwise.
    ///
    /// Direct writes take the same apply lane and drain lease as the sync
    /// engine, so they never overtake a queued mutation. If either is busy
    /// the write is queued behind whatever is being replayed.
    pub async fn write(&self, draft: MutationDraft) -> Result<WriteReceipt> {
        draft.validate().map_err(|e| Error::Serialization {
            subject: draft.target.clone(),
            reason: e.to_string(),
        })?;

        let kind = draft.kind;
        let target = draft.target.clone();
        let id = match self.try_direct(draft).await? {
            Direct::Applied(confirmed) => return Ok(WriteReceipt::Applied(confirmed)),
            Direct::Requeued(id) => id,
            Direct::Skipped(draft) => self.store.append(draft)?,
        };
        info!(id = %id, kind = %kind, resource = %target, "queued write");
        if self.monitor.is_reachable() {
            self.engine.request_drain();
        }
        Ok(WriteReceipt::Queued(id))
    }

    /// Read a value, preferring the remote and falling back to the cache.
    pub async fn read(&self, key: &str) -> Result<ReadResult> {
        let outcome = if self.monitor.is_reachable() {
            self.gateway.read(key).await
        } else {
            Outcome::ConnectivityFailure
        };

        let failure = match outcome.into_result() {
            Ok(value) => {
                if let Err(e) = self.cache.put(key, &value) {
                    warn!(key, error = %e, "failed to refresh cache after read");
                }
                return Ok(ReadResult {
                    value,
                    source: ReadSource::Remote,
                    last_refreshed: None,
                });
            }
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) => e,
        };

        match self.cache.get(key)? {
            Some(entry) => {
                debug!(key, reason = %failure, "serving cached value");
                Ok(ReadResult {
                    value: entry.value,
                    source: ReadSource::Cache,
                    last_refreshed: Some(entry.last_refreshed),
                })
            }
            None => Err(failure),
        }
    }

    /// Pending operations, oldest first.
    pub fn pending(&self) -> Result<Vec<MutationOperation>> {
        Ok(self.store.list()?)
    }

    /// Drop every cached value.
    pub fn reset(&self) -> Result<()> {
        self.cache.clear()?;
        info!("cache cleared");
        Ok(())
    }

    /// Applies a write directly when the remote is reachable, the queue is
    /// empty and nothing else is applying. The operation's id doubles as
    /// the idempotency key, so it comes from the queue's own sequence and
    /// is kept if the write has to be queued after all.
    async fn try_direct(&self, draft: MutationDraft) -> Result<Direct> {
        if !self.monitor.is_reachable() {
            return Ok(Direct::Skipped(draft));
        }
        let Ok(_lane) = self.engine.lane().try_lock() else {
            return Ok(Direct::Skipped(draft));
        };
        let Some(_lease) = self.store.try_lease()? else {
            return Ok(Direct::Skipped(draft));
        };
        if !self.store.is_empty()? {
            return Ok(Direct::Skipped(draft));
        }

        let op = self.store.reserve(draft)?;
        match self.gateway.apply(&op).await {
            Outcome::Success(confirmed) => {
                reflect_in_cache(&self.cache, &op, confirmed.clone());
                debug!(id = %op.id, resource = %op.target, kind = %op.kind, "applied write directly");
                return Ok(Direct::Applied(confirmed));
            }
            Outcome::AuthFailure => {
                warn!(resource = %op.target, "remote rejected credentials");
                return Err(Error::Auth { id: None });
            }
            Outcome::ConnectivityFailure => {
                self.monitor.report_probe(false);
            }
            Outcome::RemoteFailure(code) => {
                warn!(id = %op.id, resource = %op.target, code, "direct write failed, queueing");
            }
        }
        // Queued while the lease is held so nothing lands ahead of it
        Ok(Direct::Requeued(self.store.append_reserved(op)?))
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
