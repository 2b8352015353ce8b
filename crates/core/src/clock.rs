// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Monotonic sequence stamps for queued mutations.
//!
//! Every queued operation carries an `enqueuedAt` stamp. Stamps are derived
//! from wall clock milliseconds but never repeat or go backwards:
//!
//! `next = max(now_ms, last + 1)`
//!
//! The floor can be raised with [`SequenceClock::observe`], which is how a
//! queue reopened after a restart keeps issuing stamps after its tail.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Trait for getting the current wall clock time.
///
/// This allows injecting a controllable clock for testing.
pub trait ClockSource: Send + Sync {
    /// Returns the current time in milliseconds since Unix epoch.
    fn now_ms(&self) -> u64;
}

/// System clock implementation using `std::time::SystemTime`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl ClockSource for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(duration_ms)
            .unwrap_or(0)
    }
}

/// Whole milliseconds in `d`, saturating at `u64::MAX`.
pub fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl<C: ClockSource + ?Sized> ClockSource for &C {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

impl<C: ClockSource + ?Sized> ClockSource for Box<C> {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

impl<C: ClockSource + ?Sized> ClockSource for std::sync::Arc<C> {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

/// A clock whose time only moves when told to.
///
/// Shared behind an `Arc` it lets a test drive several components from the
/// same timeline.
#[derive(Debug, Default)]
pub struct ManualClock {
    time_ms: AtomicU64,
}

impl ManualClock {
    pub fn new(initial_ms: u64) -> Self {
        ManualClock {
            time_ms: AtomicU64::new(initial_ms),
        }
    }

    pub fn set(&self, ms: u64) {
        self.time_ms.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: u64) {
        self.time_ms.fetch_add(ms, Ordering::SeqCst);
    }
}

impl ClockSource for ManualClock {
    fn now_ms(&self) -> u64 {
        self.time_ms.load(Ordering::SeqCst)
    }
}

/// Generator of strictly increasing `enqueuedAt` stamps.
pub struct SequenceClock<C: ClockSource = SystemClock> {
    clock: C,
    last: Mutex<u64>,
}

impl SequenceClock<SystemClock> {
    /// Creates a sequence clock backed by the system clock.
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for SequenceClock<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ClockSource> SequenceClock<C> {
    /// Creates a sequence clock with a custom clock source.
    pub fn with_clock(clock: C) -> Self {
        SequenceClock {
            clock,
            last: Mutex::new(0),
        }
    }

    /// Raises the floor so the next stamp is greater than `stamp`.
    pub fn observe(&self, stamp: u64) {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        if stamp > *last {
            *last = stamp;
        }
    }

    /// Issues the next stamp.
    ///
    /// Guarantees strictly increasing values even if the wall clock stalls
    /// or goes backwards.
    pub fn next(&self) -> u64 {
        let physical = self.clock.now_ms();
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let stamp = if physical > *last {
            physical
        } else {
            last.saturating_add(1)
        };
        *last = stamp;
        stamp
    }

    /// Returns the last issued (or observed) stamp.
    pub fn last(&self) -> u64 {
        *self.last.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns the current wall time of the underlying source.
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
