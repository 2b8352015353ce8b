// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Background replay of queued mutations.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ Connectivity │────►│ SyncEngine  │────►│   Gateway   │
//! │   Monitor    │     │  (drain)    │◄────│   (trait)   │
//! └──────────────┘     └─────────────┘     └─────────────┘
//!                        │        │
//!                        ▼        ▼
//!                 ┌───────────┐ ┌───────────┐
//!                 │   Queue   │ │   Cache   │
//!                 └───────────┘ └───────────┘
//! ```
//!
//! # Features
//!
//! - Strict head-of-queue replay in enqueue order
//! - Exponential backoff with an attempt cap
//! - Coalesced triggers, at most one drain in flight
//! - State and event channels for observers

mod backoff;
mod engine;

pub use backoff::BackoffPolicy;
pub use engine::{DrainReport, DrainSummary, StopReason, SyncEngine, SyncEvent, SyncState};

pub(crate) use engine::reflect_in_cache;
