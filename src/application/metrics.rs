//! Process-lifetime admission counters.
//!
//! Monotonic diagnostics only; the counters never feed back into
//! admission decisions. All updates use atomic operations so reads need
//! no lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters tracking admission outcomes over the controller's lifetime.
///
/// Cloning is cheap and clones share the same underlying counters.
#[derive(Debug, Clone)]
pub struct AdmissionMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    /// Total grants recorded in the ledger (selection, external, fallback)
    grants_recorded: AtomicU64,
    /// Total denials returned by non-blocking selection
    denials: AtomicU64,
    /// Grants forced past a saturated pool
    degraded_grants: AtomicU64,
}

impl AdmissionMetrics {
    /// Create a new counter set.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                grants_recorded: AtomicU64::new(0),
                denials: AtomicU64::new(0),
                degraded_grants: AtomicU64::new(0),
            }),
        }
    }

    pub(crate) fn record_grant(&self) {
        self.inner.grants_recorded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_denial(&self) {
        self.inner.denials.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_degraded(&self) {
        self.inner.degraded_grants.fetch_add(1, Ordering::Relaxed);
    }

    /// Total grants ever recorded.
    pub fn grants_recorded(&self) -> u64 {
        self.inner.grants_recorded.load(Ordering::Relaxed)
    }

    /// Total denials returned.
    pub fn denials(&self) -> u64 {
        self.inner.denials.load(Ordering::Relaxed)
    }

    /// Total degraded (over-quota) grants issued.
    pub fn degraded_grants(&self) -> u64 {
        self.inner.degraded_grants.load(Ordering::Relaxed)
    }

    /// Get a point-in-time copy of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            grants_recorded: self.grants_recorded(),
            denials: self.denials(),
            degraded_grants: self.degraded_grants(),
        }
    }
}

impl Default for AdmissionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time copy of the admission counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Total grants recorded in the ledger
    pub grants_recorded: u64,
    /// Total denials returned by non-blocking selection
    pub denials: u64,
    /// Grants forced past a saturated pool
    pub degraded_grants: u64,
}
