// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! fl-core: Storage primitives for the fitlog offline layer.
//!
//! This crate provides the mutation data model, the durable mutation queue,
//! and the response cache used by the `fitlog` client and sync engine.

pub mod cache;
pub mod clock;
pub mod error;
pub mod id;
pub mod jsonl;
pub mod op;
pub mod queue;

pub use cache::{CacheEntry, ResponseCache};
pub use clock::{duration_ms, ClockSource, ManualClock, SequenceClock, SystemClock};
pub use error::{Error, Result};
pub use op::{FailureMark, MutationDraft, MutationKind, MutationOperation};
pub use queue::{DrainLease, FileQueue, MemoryQueue, MutationStore, QuarantineRecord};
