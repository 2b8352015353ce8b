// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent mutation queue.
//!
//! Writes that could not be confirmed against the remote are appended here
//! and replayed later by the sync engine, oldest first. The contract is:
//!
//! - `append` is durable once it returns and never reorders existing entries
//! - `list` returns entries in `enqueuedAt` order, stable across restarts
//! - `remove` is idempotent
//! - `clear` empties the queue (maintenance only)
//!
//! [`FileQueue`] stores one JSON record per line, fsynced on every write.
//! All access goes through an advisory lock on a sibling `.lock` file so
//! several processes can share one queue. Rewrites go through a temp file
//! and a rename.
//!
//! Stamps come from one sequence per queue, shared by queued operations and
//! by writes applied directly ([`MutationStore::reserve`]), so no two
//! operations ever get the same id. Applying mutations to the remote is
//! serialized by a [`DrainLease`], which `FileQueue` backs with a second
//! lock file so two processes never replay the same queue at once.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::clock::{ClockSource, SequenceClock, SystemClock};
use crate::error::{Error, Result};
use crate::id::generate_unique_id;
use crate::jsonl;
use crate::op::{FailureMark, MutationDraft, MutationOperation};

/// A record in the dead-letter file.
///
/// Either a whole operation that could not be sent, or a raw queue line
/// that could not be decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuarantineRecord {
    pub reason: String,
    pub quarantined_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op: Option<MutationOperation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

/// Exclusive right to apply mutations to the remote. Released on drop.
pub struct DrainLease {
    hold: LeaseHold,
}

enum LeaseHold {
    /// An exclusive lock on the queue's lease file.
    File(#[allow(dead_code)] File),
    /// An in-process flag, cleared on drop.
    Flag(Arc<AtomicBool>),
}

impl Drop for DrainLease {
    fn drop(&mut self) {
        if let LeaseHold::Flag(flag) = &self.hold {
            flag.store(false, Ordering::Release);
        }
    }
}

/// Durable local store for pending mutations.
///
/// Implementations assign the ID and `enqueuedAt` stamp inside `append`,
/// under whatever exclusion they use, so concurrent writers cannot
/// interleave stamps.
pub trait MutationStore: Send + Sync {
    /// Stamps and persists a draft, returning the assigned ID.
    fn append(&self, draft: MutationDraft) -> Result<String>;

    /// Returns all pending operations, oldest first.
    fn list(&self) -> Result<Vec<MutationOperation>>;

    /// Removes an operation. Returns false if it was not present.
    fn remove(&self, id: &str) -> Result<bool>;

    /// Removes every pending operation.
    fn clear(&self) -> Result<()>;

    /// Marks an operation as permanently failed. It stays queued.
    fn mark_failed(&self, id: &str, mark: FailureMark) -> Result<()>;

    /// Clears a failure mark. Returns false if the operation was not marked.
    fn clear_failure(&self, id: &str) -> Result<bool>;

    /// Moves an operation to the dead-letter store.
    ///
    /// Returns false if the operation was not present.
    fn quarantine(&self, id: &str, reason: &str) -> Result<bool>;

    /// Returns everything in the dead-letter store.
    fn quarantined(&self) -> Result<Vec<QuarantineRecord>>;

    /// Stamps a draft in the queue's sequence without persisting it.
    ///
    /// Writes applied directly take their id from here, so a later queued
    /// operation can never reuse it.
    fn reserve(&self, draft: MutationDraft) -> Result<MutationOperation>;

    /// Queues an operation stamped by [`reserve`](Self::reserve), keeping
    /// its id. A no-op if that id is already queued.
    fn append_reserved(&self, op: MutationOperation) -> Result<String>;

    /// Takes the drain lease, or returns `None` while someone else,
    /// possibly another process, holds it.
    fn try_lease(&self) -> Result<Option<DrainLease>>;

    /// Returns the oldest pending operation.
    fn head(&self) -> Result<Option<MutationOperation>> {
        Ok(self.list()?.into_iter().next())
    }

    /// Returns the number of pending operations.
    fn len(&self) -> Result<usize> {
        Ok(self.list()?.len())
    }

    /// Returns true if nothing is pending.
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// Stamps a draft after the current tail.
fn stamp_draft<C: ClockSource>(
    ops: &[MutationOperation],
    draft: MutationDraft,
    node: &str,
    clock: &SequenceClock<C>,
) -> Result<MutationOperation> {
    draft.validate()?;

    if let Some(tail) = ops.last() {
        clock.observe(tail.enqueued_at);
    }
    let stamp = clock.next();
    let id = generate_unique_id(node, &draft.target, stamp, |candidate| {
        ops.iter().any(|op| op.id == candidate)
    });

    Ok(draft.into_operation(id, stamp))
}

fn remove_by_id(ops: &mut Vec<MutationOperation>, id: &str) -> bool {
    let before = ops.len();
    ops.retain(|op| op.id != id);
    ops.len() != before
}

fn find_mut<'a>(ops: &'a mut [MutationOperation], id: &str) -> Result<&'a mut MutationOperation> {
    ops.iter_mut()
        .find(|op| op.id == id)
        .ok_or_else(|| Error::OpNotFound(id.to_string()))
}

/// Sorts by stamp, keeping file order for equal stamps.
fn in_stamp_order(mut ops: Vec<MutationOperation>) -> Vec<MutationOperation> {
    ops.sort_by_key(|op| op.enqueued_at);
    ops
}

/// Holds the advisory queue lock until dropped.
struct QueueLock {
    _file: File,
}

/// JSONL-backed mutation queue shared safely between processes.
pub struct FileQueue {
    path: PathBuf,
    lock_path: PathBuf,
    seq_path: PathBuf,
    lease_path: PathBuf,
    quarantine_path: PathBuf,
    node: String,
    clock: SequenceClock<Box<dyn ClockSource>>,
}

impl FileQueue {
    /// Create or open a queue at the given path.
    ///
    /// `node` identifies this client installation and feeds ID generation.
    pub fn open(path: &Path, node: &str) -> Result<Self> {
        Self::open_with_clock(path, node, SystemClock)
    }

    /// Create or open a queue with a custom clock source.
    pub fn open_with_clock(
        path: &Path,
        node: &str,
        clock: impl ClockSource + 'static,
    ) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // Ensure the file exists (create if not)
        OpenOptions::new().create(true).append(true).open(path)?;

        let clock: Box<dyn ClockSource> = Box::new(clock);
        let queue = FileQueue {
            path: path.to_path_buf(),
            lock_path: sibling(path, "lock"),
            seq_path: sibling(path, "seq"),
            lease_path: sibling(path, "drain"),
            quarantine_path: path.with_file_name("quarantine.jsonl"),
            node: node.to_string(),
            clock: SequenceClock::with_clock(clock),
        };

        // Seed the stamp floor from the persisted tail.
        let _guard = queue.lock()?;
        if let Some(tail) = queue.load()?.last() {
            queue.clock.observe(tail.enqueued_at);
        }

        Ok(queue)
    }

    /// Returns the path to the queue file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path to the dead-letter file.
    pub fn quarantine_path(&self) -> &Path {
        &self.quarantine_path
    }

    fn lock(&self) -> Result<QueueLock> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)?;
        FileExt::lock_exclusive(&file)?;
        Ok(QueueLock { _file: file })
    }

    /// Stamps a draft after both the tail and the last stamp any process
    /// handed out. Must be called with the lock held.
    fn stamp(&self, ops: &[MutationOperation], draft: MutationDraft) -> Result<MutationOperation> {
        if let Some(issued) = fs::read_to_string(&self.seq_path)
            .ok()
            .and_then(|text| text.trim().parse::<u64>().ok())
        {
            self.clock.observe(issued);
        }
        let op = stamp_draft(ops, draft, &self.node, &self.clock)?;
        fs::write(&self.seq_path, op.enqueued_at.to_string())?;
        Ok(op)
    }

    /// Reads the queue. Must be called with the lock held.
    ///
    /// Undecodable lines are moved to the dead-letter file so one corrupt
    /// record cannot block the rest of the queue.
    fn load(&self) -> Result<Vec<MutationOperation>> {
        let (ops, rejected) = jsonl::read_partitioned::<MutationOperation>(&self.path)?;
        if rejected.is_empty() {
            return Ok(in_stamp_order(ops));
        }

        let now = self.clock.now_ms();
        for line in &rejected {
            tracing::warn!(
                line = line.line,
                reason = %line.reason,
                "quarantining undecodable queue record"
            );
            jsonl::append(
                &self.quarantine_path,
                &QuarantineRecord {
                    reason: line.reason.clone(),
                    quarantined_at: now,
                    op: None,
                    raw: Some(line.raw.clone()),
                },
            )?;
        }
        jsonl::write_all(&self.path, &ops)?;

        Ok(in_stamp_order(ops))
    }

    /// Applies `f` to the loaded queue under the lock, rewriting the file
    /// when `f` reports a change.
    fn rewrite<R>(
        &self,
        f: impl FnOnce(&mut Vec<MutationOperation>) -> Result<(R, bool)>,
    ) -> Result<R> {
        let _guard = self.lock()?;
        let mut ops = self.load()?;
        let (result, changed) = f(&mut ops)?;
        if changed {
            jsonl::write_all(&self.path, &ops)?;
        }
        Ok(result)
    }
}

impl MutationStore for FileQueue {
    fn append(&self, draft: MutationDraft) -> Result<String> {
        let _guard = self.lock()?;
        let ops = self.load()?;
        let op = self.stamp(&ops, draft)?;

        jsonl::append(&self.path, &op)?;
        tracing::debug!(id = %op.id, kind = %op.kind, target = %op.target, "queued mutation");

        Ok(op.id)
    }

    fn list(&self) -> Result<Vec<MutationOperation>> {
        let _guard = self.lock()?;
        self.load()
    }

    fn remove(&self, id: &str) -> Result<bool> {
        self.rewrite(|ops| {
            let removed = remove_by_id(ops, id);
            Ok((removed, removed))
        })
    }

    fn clear(&self) -> Result<()> {
        let _guard = self.lock()?;
        // Truncate the file
        let file = File::create(&self.path)?;
        file.sync_all()?;
        Ok(())
    }

    fn mark_failed(&self, id: &str, mark: FailureMark) -> Result<()> {
        self.rewrite(|ops| {
            find_mut(ops, id)?.failure = Some(mark);
            Ok(((), true))
        })
    }

    fn clear_failure(&self, id: &str) -> Result<bool> {
        self.rewrite(|ops| {
            let cleared = find_mut(ops, id)?.failure.take().is_some();
            Ok((cleared, cleared))
        })
    }

    fn quarantine(&self, id: &str, reason: &str) -> Result<bool> {
        let now = self.clock.now_ms();
        let quarantine_path = self.quarantine_path.clone();
        self.rewrite(|ops| {
            let Some(op) = ops.iter().find(|op| op.id == id).cloned() else {
                return Ok((false, false));
            };
            // Dead letter first, so a crash can duplicate but never lose it.
            jsonl::append(
                &quarantine_path,
                &QuarantineRecord {
                    reason: reason.to_string(),
                    quarantined_at: now,
                    op: Some(op),
                    raw: None,
                },
            )?;
            remove_by_id(ops, id);
            Ok((true, true))
        })
    }

    fn quarantined(&self) -> Result<Vec<QuarantineRecord>> {
        let _guard = self.lock()?;
        jsonl::read_all(&self.quarantine_path)
    }

    fn reserve(&self, draft: MutationDraft) -> Result<MutationOperation> {
        let _guard = self.lock()?;
        let ops = self.load()?;
        self.stamp(&ops, draft)
    }

    fn append_reserved(&self, op: MutationOperation) -> Result<String> {
        let _guard = self.lock()?;
        if self.load()?.iter().any(|queued| queued.id == op.id) {
            return Ok(op.id);
        }
        jsonl::append(&self.path, &op)?;
        tracing::debug!(id = %op.id, kind = %op.kind, target = %op.target, "queued reserved mutation");
        Ok(op.id)
    }

    fn try_lease(&self) -> Result<Option<DrainLease>> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lease_path)?;
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => Ok(Some(DrainLease {
                hold: LeaseHold::File(file),
            })),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn sibling(path: &Path, extension: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(extension);
    path.with_file_name(name)
}

/// In-process mutation queue.
///
/// Same ordering contract as [`FileQueue`] but nothing survives the
/// process. Useful for ephemeral sessions and tests.
pub struct MemoryQueue {
    ops: Mutex<Vec<MutationOperation>>,
    dead: Mutex<Vec<QuarantineRecord>>,
    leased: Arc<AtomicBool>,
    node: String,
    clock: SequenceClock<Box<dyn ClockSource>>,
}

impl MemoryQueue {
    pub fn new(node: &str) -> Self {
        Self::with_clock(node, SystemClock)
    }

    pub fn with_clock(node: &str, clock: impl ClockSource + 'static) -> Self {
        let clock: Box<dyn ClockSource> = Box::new(clock);
        MemoryQueue {
            ops: Mutex::new(Vec::new()),
            dead: Mutex::new(Vec::new()),
            leased: Arc::new(AtomicBool::new(false)),
            node: node.to_string(),
            clock: SequenceClock::with_clock(clock),
        }
    }

    fn ops(&self) -> std::sync::MutexGuard<'_, Vec<MutationOperation>> {
        self.ops.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn dead(&self) -> std::sync::MutexGuard<'_, Vec<QuarantineRecord>> {
        self.dead.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl MutationStore for MemoryQueue {
    fn append(&self, draft: MutationDraft) -> Result<String> {
        let mut ops = self.ops();
        let op = stamp_draft(&ops, draft, &self.node, &self.clock)?;
        let id = op.id.clone();
        ops.push(op);
        Ok(id)
    }

    fn list(&self) -> Result<Vec<MutationOperation>> {
        Ok(self.ops().clone())
    }

    fn remove(&self, id: &str) -> Result<bool> {
        Ok(remove_by_id(&mut self.ops(), id))
    }

    fn clear(&self) -> Result<()> {
        self.ops().clear();
        Ok(())
    }

    fn mark_failed(&self, id: &str, mark: FailureMark) -> Result<()> {
        find_mut(&mut self.ops(), id)?.failure = Some(mark);
        Ok(())
    }

    fn clear_failure(&self, id: &str) -> Result<bool> {
        Ok(find_mut(&mut self.ops(), id)?.failure.take().is_some())
    }

    fn quarantine(&self, id: &str, reason: &str) -> Result<bool> {
        let mut ops = self.ops();
        let Some(index) = ops.iter().position(|op| op.id == id) else {
            return Ok(false);
        };
        let op = ops.remove(index);
        self.dead().push(QuarantineRecord {
            reason: reason.to_string(),
            quarantined_at: self.clock.now_ms(),
            op: Some(op),
            raw: None,
        });
        Ok(true)
    }

    fn quarantined(&self) -> Result<Vec<QuarantineRecord>> {
        Ok(self.dead().clone())
    }

    fn reserve(&self, draft: MutationDraft) -> Result<MutationOperation> {
        stamp_draft(&self.ops(), draft, &self.node, &self.clock)
    }

    fn append_reserved(&self, op: MutationOperation) -> Result<String> {
        let mut ops = self.ops();
        if !ops.iter().any(|queued| queued.id == op.id) {
            ops.push(op.clone());
        }
        Ok(op.id)
    }

    fn try_lease(&self) -> Result<Option<DrainLease>> {
        if self
            .leased
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(None);
        }
        Ok(Some(DrainLease {
            hold: LeaseHold::Flag(Arc::clone(&self.leased)),
        }))
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
