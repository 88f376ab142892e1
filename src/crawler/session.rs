//! Fetcher session pool
//!
//! A session is one fetch identity (a cookie jar and connection pool for
//! the HTTP fetcher, a rendering context for a browser). Workers lease a
//! session for the duration of one fetch; the lease returns the slot on
//! drop, including when the fetch is cancelled.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Identifies the session a fetch should run in
///
/// A fetcher that keeps per-session state must discard it when the
/// generation of a slot changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHint {
    pub slot: usize,
    pub generation: u64,
}

#[derive(Debug)]
struct PoolInner {
    free: Mutex<Vec<usize>>,
    generations: Vec<AtomicU64>,
}

/// Fixed-size pool of fetch sessions
#[derive(Debug, Clone)]
pub struct SessionPool {
    semaphore: Arc<Semaphore>,
    inner: Arc<PoolInner>,
}

impl SessionPool {
    /// Creates a pool with `size` sessions
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(size)),
            inner: Arc::new(PoolInner {
                free: Mutex::new((0..size).rev().collect()),
                generations: (0..size).map(|_| AtomicU64::new(0)).collect(),
            }),
        }
    }

    /// Waits for a free session
    ///
    /// Returns `None` only if the pool has been closed.
    pub async fn acquire(&self) -> Option<SessionLease> {
        let permit = Arc::clone(&self.semaphore).acquire_owned().await.ok()?;
        let slot = self
            .inner
            .free
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop()?;

        Some(SessionLease {
            slot,
            inner: Arc::clone(&self.inner),
            _permit: permit,
        })
    }

    /// Sessions not currently leased
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn close(&self) {
        self.semaphore.close();
    }
}

/// Scoped ownership of one session slot
#[derive(Debug)]
pub struct SessionLease {
    slot: usize,
    inner: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
}

impl SessionLease {
    /// Requests a fresh identity for this slot
    pub fn rotate(&self) -> SessionHint {
        let generation = self.inner.generations[self.slot].fetch_add(1, Ordering::AcqRel) + 1;
        tracing::debug!(slot = self.slot, generation, "Rotated fetch session");
        SessionHint {
            slot: self.slot,
            generation,
        }
    }

    pub fn hint(&self) -> SessionHint {
        SessionHint {
            slot: self.slot,
            generation: self.inner.generations[self.slot].load(Ordering::Acquire),
        }
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        // Slot goes back before the permit is released by field drop
        self.inner
            .free
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(self.slot);
    }
}
