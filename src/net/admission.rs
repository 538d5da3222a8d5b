//! Admission control for new connections.
//!
//! # Responsibilities
//! - Enforce the `max_connections` ceiling via a semaphore
//! - Spend a rate-limit token per admission when limiting is enabled
//! - Keep the active/total counters and their metrics in step
//!
//! # Design Decisions
//! - Check-and-take is a single non-blocking `try_acquire_owned`, so the
//!   ceiling cannot be exceeded by concurrent callers
//! - Slots are RAII guards; release happens on drop, including on panic
//! - This is the only writer of connection metrics

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::observability::metrics;
use crate::security::AdmissionRateLimiter;

/// Why a connection was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Every slot is taken.
    Ceiling,
    /// The admission token bucket is empty.
    RateLimited,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::Ceiling => "ceiling",
            RejectReason::RateLimited => "rate_limited",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of an admission attempt.
#[derive(Debug)]
pub enum Admission {
    Granted(AdmissionSlot),
    Rejected(RejectReason),
}

struct Inner {
    slots: Arc<Semaphore>,
    active: AtomicUsize,
    total: AtomicU64,
    max_connections: usize,
    rate_limiter: Option<AdmissionRateLimiter>,
}

/// Grants or denies connection slots against a fixed ceiling.
///
/// Cheap to clone; clones share the same pool and counters.
#[derive(Clone)]
pub struct AdmissionController {
    inner: Arc<Inner>,
}

impl AdmissionController {
    /// Create a controller with `max_connections` slots.
    pub fn new(max_connections: usize, rate_limiter: Option<AdmissionRateLimiter>) -> Self {
        Self {
            inner: Arc::new(Inner {
                slots: Arc::new(Semaphore::new(max_connections)),
                active: AtomicUsize::new(0),
                total: AtomicU64::new(0),
                max_connections,
                rate_limiter,
            }),
        }
    }

    /// Try to take a slot without waiting.
    pub fn try_admit(&self) -> Admission {
        let Ok(permit) = Arc::clone(&self.inner.slots).try_acquire_owned() else {
            return self.reject(RejectReason::Ceiling);
        };

        if let Some(limiter) = &self.inner.rate_limiter {
            if !limiter.try_acquire() {
                drop(permit);
                return self.reject(RejectReason::RateLimited);
            }
        }

        self.inner.active.fetch_add(1, Ordering::SeqCst);
        self.inner.total.fetch_add(1, Ordering::SeqCst);
        metrics::record_admitted();

        Admission::Granted(AdmissionSlot {
            inner: Arc::clone(&self.inner),
            _permit: permit,
        })
    }

    fn reject(&self, reason: RejectReason) -> Admission {
        metrics::record_rejected(reason.as_str());
        Admission::Rejected(reason)
    }

    /// Get current admitted connection count.
    pub fn active_count(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Get the number of connections admitted since creation.
    pub fn total_admitted(&self) -> u64 {
        self.inner.total.load(Ordering::SeqCst)
    }

    /// Get configured maximum connections.
    pub fn max_connections(&self) -> usize {
        self.inner.max_connections
    }

    /// Get current free slots.
    pub fn available_slots(&self) -> usize {
        self.inner.slots.available_permits()
    }

    /// Wait until every slot has been returned, up to `timeout`.
    ///
    /// Returns `true` if the pool drained in time.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let Ok(wanted) = u32::try_from(self.inner.max_connections) else {
            return false;
        };

        match tokio::time::timeout(timeout, self.inner.slots.acquire_many(wanted)).await {
            Ok(Ok(_all)) => true,
            Ok(Err(_closed)) => false,
            Err(_elapsed) => false,
        }
    }
}

impl std::fmt::Debug for AdmissionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionController")
            .field("active", &self.active_count())
            .field("max_connections", &self.inner.max_connections)
            .field("rate_limiter", &self.inner.rate_limiter)
            .finish()
    }
}

/// A granted connection slot.
///
/// When dropped, the active count is decremented and the slot is returned to
/// the pool, in that order, so the count never exceeds the ceiling.
pub struct AdmissionSlot {
    inner: Arc<Inner>,
    _permit: OwnedSemaphorePermit,
}

impl AdmissionSlot {
    /// Give the slot back explicitly. Equivalent to dropping it.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for AdmissionSlot {
    fn drop(&mut self) {
        self.inner.active.fetch_sub(1, Ordering::SeqCst);
        metrics::record_released();
    }
}

impl std::fmt::Debug for AdmissionSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionSlot").finish_non_exhaustive()
    }
}
