//! Process-wide crawl counters
//!
//! The listings cap is enforced through a single combined counter of
//! `emitted + pending detail` listings. Workers reserve budget with a
//! compare-and-swap before enqueueing detail tasks, so concurrent search
//! pages can never commit more than `cap` listings between them: the
//! overshoot bound is zero.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Shared counters owned by the coordinator
#[derive(Debug)]
pub struct CrawlState {
    cap: usize,
    /// Listings emitted plus detail tasks holding a reservation
    committed: AtomicUsize,
    emitted: AtomicUsize,
    failed: AtomicU64,
    done: AtomicU64,
    retries: AtomicU64,
}

impl CrawlState {
    /// Creates empty counters for a crawl capped at `cap` listings
    pub fn new(cap: usize) -> Self {
        Self::with_emitted(cap, 0)
    }

    /// Creates counters for a resumed crawl that already emitted listings
    pub fn with_emitted(cap: usize, emitted: usize) -> Self {
        Self {
            cap,
            committed: AtomicUsize::new(emitted),
            emitted: AtomicUsize::new(emitted),
            failed: AtomicU64::new(0),
            done: AtomicU64::new(0),
            retries: AtomicU64::new(0),
        }
    }

    /// Reserves budget for up to `wanted` listings
    ///
    /// # Returns
    ///
    /// The number of reservations granted, between 0 and `wanted`. Each
    /// granted reservation must later be settled by exactly one call to
    /// [`record_emitted`](Self::record_emitted) or [`release`](Self::release).
    pub fn reserve(&self, wanted: usize) -> usize {
        if wanted == 0 {
            return 0;
        }

        let cap = self.cap;
        match self
            .committed
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                if current >= cap {
                    None
                } else {
                    Some(current + wanted.min(cap - current))
                }
            }) {
            Ok(previous) => wanted.min(cap - previous),
            Err(_) => 0,
        }
    }

    /// Returns `n` unused reservations to the budget
    pub fn release(&self, n: usize) {
        if n == 0 {
            return;
        }
        // Never underflow below the emitted count
        let emitted = self.emitted.load(Ordering::Acquire);
        let _ = self
            .committed
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_sub(n).max(emitted))
            });
    }

    /// Converts one reservation into an emitted listing
    pub fn record_emitted(&self) -> usize {
        self.emitted.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Counts a task that reached the Abandoned state
    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::AcqRel);
    }

    /// Counts a task that reached the Delivered state
    pub fn record_done(&self) {
        self.done.fetch_add(1, Ordering::AcqRel);
    }

    /// Counts a retry decision
    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::AcqRel);
    }

    /// Budget not yet emitted or reserved
    pub fn remaining(&self) -> usize {
        self.cap.saturating_sub(self.committed.load(Ordering::Acquire))
    }

    /// True once emitted plus pending listings reach the cap
    pub fn cap_reached(&self) -> bool {
        self.remaining() == 0
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn listings_emitted(&self) -> usize {
        self.emitted.load(Ordering::Acquire)
    }

    /// Detail tasks currently holding a reservation
    pub fn pending_count(&self) -> usize {
        self.committed
            .load(Ordering::Acquire)
            .saturating_sub(self.emitted.load(Ordering::Acquire))
    }

    pub fn failed_count(&self) -> u64 {
        self.failed.load(Ordering::Acquire)
    }

    pub fn done_count(&self) -> u64 {
        self.done.load(Ordering::Acquire)
    }

    pub fn retry_count(&self) -> u64 {
        self.retries.load(Ordering::Acquire)
    }

    /// Abandoned tasks as a fraction of all finished tasks
    pub fn failure_rate(&self) -> f64 {
        let failed = self.failed_count();
        let finished = failed + self.done_count();
        if finished == 0 {
            0.0
        } else {
            failed as f64 / finished as f64
        }
    }
}
