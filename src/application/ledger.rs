//! The grant ledger.
//!
//! One `GrantWindow` per registered provider, addressed by registry index.
//! The ledger is the only mutable admission state besides the cursor; it
//! lives inside the controller's single lock and is never accessed
//! concurrently.

use crate::domain::provider::Provider;
use crate::domain::window::GrantWindow;
use std::time::{Duration, Instant};

/// Per-provider grant windows plus the cross-provider queries the backoff
/// and status paths need.
#[derive(Debug)]
pub struct GrantLedger {
    windows: Vec<GrantWindow>,
}

impl GrantLedger {
    /// Create a ledger with one empty window per provider.
    pub fn new(provider_count: usize) -> Self {
        Self {
            windows: (0..provider_count).map(|_| GrantWindow::new()).collect(),
        }
    }

    /// Purge a provider's window. Missing slots are ignored.
    pub fn purge(&mut self, index: usize, now: Instant) {
        if let Some(window) = self.windows.get_mut(index) {
            window.purge(now);
        }
    }

    /// Purge, then count the provider's grants remaining in the window.
    ///
    /// Returns 0 for a missing slot so observability paths degrade instead
    /// of failing.
    pub fn utilization(&mut self, index: usize, now: Instant) -> usize {
        match self.windows.get_mut(index) {
            Some(window) => {
                window.purge(now);
                window.len()
            }
            None => 0,
        }
    }

    /// Append a grant for the provider. Missing slots are ignored; callers
    /// validate indices against the registry first.
    pub fn record(&mut self, index: usize, at: Instant) {
        if let Some(window) = self.windows.get_mut(index) {
            window.record(at);
        }
    }

    /// Read access to a provider's window, if the slot exists.
    pub fn window(&self, index: usize) -> Option<&GrantWindow> {
        self.windows.get(index)
    }

    /// Purge every window, then sum the grants remaining across providers.
    pub fn grants_in_window(&mut self, now: Instant) -> usize {
        self.windows
            .iter_mut()
            .map(|window| {
                window.purge(now);
                window.len()
            })
            .sum()
    }

    /// The soonest positive time-to-free-slot among providers currently at
    /// capacity. `None` when no provider is saturated or no saturated
    /// provider holds an entry.
    pub fn soonest_slot(&mut self, providers: &[Provider], now: Instant) -> Option<Duration> {
        let mut soonest: Option<Duration> = None;
        for (index, provider) in providers.iter().enumerate() {
            if self.utilization(index, now) < provider.capacity as usize {
                continue;
            }
            let until = match self.windows.get(index).and_then(|w| w.time_until_slot(now)) {
                Some(until) if until > Duration::ZERO => until,
                _ => continue,
            };
            if soonest.map_or(true, |s| until < s) {
                soonest = Some(until);
            }
        }
        soonest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn providers() -> Vec<Provider> {
        vec![
            Provider::new("alpha", "gemini", 2),
            Provider::new("beta", "groq", 3),
        ]
    }

    #[test]
    fn test_record_and_utilization() {
        let now = Instant::now();
        let mut ledger = GrantLedger::new(2);

        ledger.record(0, now);
        ledger.record(0, now);
        ledger.record(1, now);

        assert_eq!(ledger.utilization(0, now), 2);
        assert_eq!(ledger.utilization(1, now), 1);
        assert_eq!(ledger.grants_in_window(now), 3);
    }

    #[test]
    fn test_utilization_purges_stale_entries() {
        let t0 = Instant::now();
        let mut ledger = GrantLedger::new(2);
        ledger.record(0, t0);
        ledger.record(0, t0 + Duration::from_secs(30));

        assert_eq!(ledger.utilization(0, t0 + Duration::from_secs(61)), 1);
        assert_eq!(ledger.utilization(0, t0 + Duration::from_secs(95)), 0);
    }

    #[test]
    fn test_missing_slot_is_safe() {
        let now = Instant::now();
        let mut ledger = GrantLedger::new(1);

        ledger.record(7, now);
        assert_eq!(ledger.utilization(7, now), 0);
        assert!(ledger.window(7).is_none());
    }

    #[test]
    fn test_soonest_slot_ignores_unsaturated_providers() {
        let t0 = Instant::now();
        let providers = providers();
        let mut ledger = GrantLedger::new(2);

        // alpha saturated at t0, beta has headroom
        ledger.record(0, t0);
        ledger.record(0, t0 + Duration::from_secs(10));
        ledger.record(1, t0);

        let now = t0 + Duration::from_secs(20);
        assert_eq!(
            ledger.soonest_slot(&providers, now),
            Some(Duration::from_secs(40))
        );
    }

    #[test]
    fn test_soonest_slot_takes_minimum_across_saturated() {
        let t0 = Instant::now();
        let providers = providers();
        let mut ledger = GrantLedger::new(2);

        ledger.record(0, t0);
        ledger.record(0, t0);
        for _ in 0..3 {
            ledger.record(1, t0 + Duration::from_secs(25));
        }

        // alpha frees at t0+60, beta at t0+85
        let now = t0 + Duration::from_secs(30);
        assert_eq!(
            ledger.soonest_slot(&providers, now),
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn test_soonest_slot_none_when_capacity_remains() {
        let now = Instant::now();
        let providers = providers();
        let mut ledger = GrantLedger::new(2);
        ledger.record(0, now);

        assert_eq!(ledger.soonest_slot(&providers, now), None);
    }
}
