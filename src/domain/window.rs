//! The sliding grant window.
//!
//! Each provider owns an ordered sequence of grant timestamps, oldest
//! first. Entries are appended at the tail on every grant and trimmed from
//! the head lazily, whenever the window is read. There is no timer and no
//! explicit deletion; entries only age out.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Length of the rolling window every capacity is counted against.
pub const WINDOW: Duration = Duration::from_secs(60);

/// Grant timestamps for a single provider within the rolling window.
///
/// Invariant: after `purge(now)`, every retained timestamp `ts` satisfies
/// `now - ts < WINDOW`. An entry aged exactly `WINDOW` no longer counts.
#[derive(Debug, Clone, Default)]
pub struct GrantWindow {
    grants: VecDeque<Instant>,
}

impl GrantWindow {
    /// Create an empty window.
    pub fn new() -> Self {
        Self {
            grants: VecDeque::new(),
        }
    }

    /// Drop entries that have aged out of the window.
    ///
    /// Idempotent: repeated calls with the same `now` are no-ops. Returns
    /// the number of entries removed. O(k) in the number of stale entries,
    /// amortized O(1) per entry over its lifetime.
    pub fn purge(&mut self, now: Instant) -> usize {
        let before = self.grants.len();
        while let Some(&oldest) = self.grants.front() {
            if now.saturating_duration_since(oldest) >= WINDOW {
                self.grants.pop_front();
            } else {
                break;
            }
        }
        before - self.grants.len()
    }

    /// Append a grant timestamp at the tail.
    pub fn record(&mut self, at: Instant) {
        self.grants.push_back(at);
    }

    /// Number of grants currently held. Callers wanting the in-window
    /// count must `purge` first.
    pub fn len(&self) -> usize {
        self.grants.len()
    }

    /// Check whether the window holds no grants.
    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    /// The oldest retained grant timestamp, if any.
    pub fn oldest(&self) -> Option<Instant> {
        self.grants.front().copied()
    }

    /// Time until the oldest entry ages out and a slot frees up.
    ///
    /// Returns `None` for an empty window. Returns `Duration::ZERO` when
    /// the oldest entry has already aged out (callers normally `purge`
    /// first, so this only happens on a stale read).
    pub fn time_until_slot(&self, now: Instant) -> Option<Duration> {
        self.oldest()
            .map(|oldest| WINDOW.saturating_sub(now.saturating_duration_since(oldest)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_count() {
        let now = Instant::now();
        let mut window = GrantWindow::new();
        assert!(window.is_empty());

        window.record(now);
        window.record(now);
        assert_eq!(window.len(), 2);
        assert_eq!(window.oldest(), Some(now));
    }

    #[test]
    fn test_purge_removes_aged_entries() {
        let t0 = Instant::now();
        let mut window = GrantWindow::new();
        window.record(t0);
        window.record(t0 + Duration::from_secs(30));

        // Nothing stale yet
        assert_eq!(window.purge(t0 + Duration::from_secs(59)), 0);
        assert_eq!(window.len(), 2);

        // t0 ages out at exactly WINDOW
        assert_eq!(window.purge(t0 + Duration::from_secs(60)), 1);
        assert_eq!(window.len(), 1);
        assert_eq!(window.oldest(), Some(t0 + Duration::from_secs(30)));

        // Both gone well past the window
        assert_eq!(window.purge(t0 + Duration::from_secs(120)), 1);
        assert!(window.is_empty());
    }

    #[test]
    fn test_purge_is_idempotent() {
        let t0 = Instant::now();
        let mut window = GrantWindow::new();
        window.record(t0);

        let later = t0 + Duration::from_secs(61);
        assert_eq!(window.purge(later), 1);
        assert_eq!(window.purge(later), 0);
        assert_eq!(window.purge(later), 0);
    }

    #[test]
    fn test_time_until_slot() {
        let t0 = Instant::now();
        let mut window = GrantWindow::new();
        assert_eq!(window.time_until_slot(t0), None);

        window.record(t0);
        assert_eq!(
            window.time_until_slot(t0 + Duration::from_secs(40)),
            Some(Duration::from_secs(20))
        );

        // Already aged out: slot is free now
        assert_eq!(
            window.time_until_slot(t0 + Duration::from_secs(90)),
            Some(Duration::ZERO)
        );
    }
}
