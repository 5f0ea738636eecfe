//! Admission control across the provider pool.
//!
//! The controller decides which provider serves each call, enforcing every
//! provider's per-window capacity while distributing load fairly across
//! providers of differing capacity. Selection is round-robin with skip: a
//! shared cursor visits providers in cyclic order and passes over any found
//! at capacity. A high-capacity provider stays admissible across more
//! consecutive cursor visits than a low-capacity one, so it accumulates a
//! proportionally larger share of grants without explicit weighting.
//!
//! Every decision (purge, count, compare, record) runs as one critical
//! section under a single lock shared by the whole controller, because the
//! decision compares state across providers and must not race with a
//! concurrent grant. The backoff sleep in the blocking and async acquire
//! paths happens strictly outside the lock.

use crate::application::ledger::GrantLedger;
use crate::application::metrics::AdmissionMetrics;
use crate::application::ports::Clock;
use crate::application::registry::{ConfigError, ProviderRegistry, UnknownProviderError};
use crate::application::status::{round1, AggregateStatus, ProviderStatus, StatusReport};
use crate::domain::provider::Provider;
use crate::infrastructure::clock::SystemClock;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Wait used when denial happens while no provider holds a ledger entry.
/// Only reachable through uncommitted probes or external records racing a
/// purge; still clamped into the caller's retry bounds.
const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

/// Outcome of a non-blocking admission attempt.
///
/// Quota exhaustion is not an error: callers route a `Denied` through
/// normal control flow (e.g. substitute cached or default content).
#[derive(Debug, Clone)]
pub enum Admission {
    /// A provider was selected (and recorded, when committed)
    Granted(ProviderLease),
    /// No provider has spare capacity in the current window
    Denied,
}

impl Admission {
    /// Check if this outcome is a grant.
    pub fn is_granted(&self) -> bool {
        matches!(self, Admission::Granted(_))
    }

    /// Check if this outcome is a denial.
    pub fn is_denied(&self) -> bool {
        matches!(self, Admission::Denied)
    }

    /// Extract the lease, if granted.
    pub fn into_lease(self) -> Option<ProviderLease> {
        match self {
            Admission::Granted(lease) => Some(lease),
            Admission::Denied => None,
        }
    }
}

/// Permission to make one call against a provider's quota.
///
/// A lease flagged `degraded` was forced past a saturated pool; the caller
/// decides whether to proceed or substitute a cached/default response.
#[derive(Debug, Clone)]
pub struct ProviderLease {
    provider: Provider,
    degraded: bool,
}

impl ProviderLease {
    /// The granted provider.
    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    /// The granted provider's name.
    pub fn name(&self) -> &str {
        &self.provider.name
    }

    /// Whether this grant was forced past the provider's stated capacity.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }
}

/// Bounds for the blocking acquire path.
///
/// Constructed through [`RetryConfig::new`], which rejects unusable bounds,
/// so the backoff clamp can never be handed an inverted range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    max_retries: u32,
    min_wait: Duration,
    max_wait: Duration,
}

impl RetryConfig {
    /// Create a retry configuration.
    ///
    /// # Errors
    /// `ConfigError::InvalidRetryBounds` if `max_wait` is zero or below
    /// `min_wait`.
    pub fn new(max_retries: u32, min_wait: Duration, max_wait: Duration) -> Result<Self, ConfigError> {
        if max_wait.is_zero() || min_wait > max_wait {
            return Err(ConfigError::InvalidRetryBounds);
        }
        Ok(Self {
            max_retries,
            min_wait,
            max_wait,
        })
    }

    /// Number of backoff-and-retry rounds before the exhaustion policy applies.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Lower clamp for the computed backoff wait.
    pub fn min_wait(&self) -> Duration {
        self.min_wait
    }

    /// Upper clamp for the computed backoff wait.
    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            min_wait: Duration::from_millis(500),
            max_wait: Duration::from_secs(15),
        }
    }
}

/// What the blocking acquire does once retries are exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExhaustionPolicy {
    /// Force a grant on the largest-capacity provider, flagged degraded,
    /// even though this may push it past its stated capacity. Liveness
    /// over strictness; the recorded call keeps the ledger honest.
    #[default]
    ForceGrant,
    /// Return [`AcquireError::Exhausted`] and let the caller substitute
    /// cached or default content.
    Refuse,
}

/// Error returned by the blocking acquire under [`ExhaustionPolicy::Refuse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireError {
    /// Every provider stayed saturated through all retries
    Exhausted {
        /// Number of backoff rounds performed
        retries: u32,
    },
}

impl std::fmt::Display for AcquireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AcquireError::Exhausted { retries } => {
                write!(f, "all providers saturated after {} retries", retries)
            }
        }
    }
}

impl std::error::Error for AcquireError {}

/// Builder for constructing an [`AdmissionController`].
pub struct AdmissionControllerBuilder {
    providers: Vec<Provider>,
    clock: Option<Arc<dyn Clock>>,
    exhaustion: ExhaustionPolicy,
}

impl AdmissionControllerBuilder {
    fn new() -> Self {
        Self {
            providers: Vec::new(),
            clock: None,
            exhaustion: ExhaustionPolicy::default(),
        }
    }

    /// Add a provider to the pool.
    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.providers.push(provider);
        self
    }

    /// Add several providers to the pool.
    pub fn with_providers(mut self, providers: impl IntoIterator<Item = Provider>) -> Self {
        self.providers.extend(providers);
        self
    }

    /// Override the clock. Defaults to [`SystemClock`]; tests inject a
    /// `MockClock`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Choose what happens when the blocking acquire exhausts its retries.
    pub fn with_exhaustion_policy(mut self, policy: ExhaustionPolicy) -> Self {
        self.exhaustion = policy;
        self
    }

    /// Validate the configuration and build the controller.
    ///
    /// # Errors
    /// `ConfigError` if the provider list is empty, any capacity is zero,
    /// or a name repeats.
    pub fn build(self) -> Result<AdmissionController, ConfigError> {
        let registry = ProviderRegistry::new(self.providers)?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock::new()));
        let ledger = GrantLedger::new(registry.len());

        info!(
            providers = registry.len(),
            total_capacity = registry.total_capacity(),
            "admission controller initialized"
        );
        for provider in registry.providers() {
            debug!(
                provider = %provider.name,
                category = %provider.category,
                capacity = provider.capacity,
                "provider registered"
            );
        }

        Ok(AdmissionController {
            registry,
            clock,
            state: Mutex::new(AdmissionState { ledger, cursor: 0 }),
            metrics: AdmissionMetrics::new(),
            exhaustion: self.exhaustion,
        })
    }
}

/// Mutable admission state guarded by the controller's single lock.
#[derive(Debug)]
struct AdmissionState {
    ledger: GrantLedger,
    cursor: usize,
}

/// Grants at most one provider per call such that no provider's 60-second
/// utilization exceeds its capacity, and degrades gracefully when the whole
/// pool is saturated.
///
/// Construct one value at process start and pass it by reference (or
/// `Arc`) to every call site; the controller carries no global state.
#[derive(Debug)]
pub struct AdmissionController {
    registry: ProviderRegistry,
    clock: Arc<dyn Clock>,
    state: Mutex<AdmissionState>,
    metrics: AdmissionMetrics,
    exhaustion: ExhaustionPolicy,
}

impl AdmissionController {
    /// Build a controller with default clock and exhaustion policy.
    ///
    /// # Errors
    /// `ConfigError` if the list is empty or capacities are non-positive.
    pub fn new(providers: Vec<Provider>) -> Result<Self, ConfigError> {
        Self::builder().with_providers(providers).build()
    }

    /// Start building a controller.
    pub fn builder() -> AdmissionControllerBuilder {
        AdmissionControllerBuilder::new()
    }

    /// The configured provider list.
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Process-lifetime admission counters.
    pub fn metrics(&self) -> &AdmissionMetrics {
        &self.metrics
    }

    fn lock_state(&self) -> MutexGuard<'_, AdmissionState> {
        self.state
            .lock()
            .expect("admission state lock poisoned - a caller panicked while holding the lock")
    }

    /// Attempt to select a provider without blocking.
    ///
    /// Starting at the shared cursor, examines up to `2N` providers in
    /// round-robin order, advancing the cursor on every examination whether
    /// granted or skipped. The first provider found under capacity is
    /// granted; with `commit` the grant is recorded against its window,
    /// without it the call is a pure probe. Two full sweeps guarantee a
    /// provider freed by entries aging out mid-sweep is still considered.
    pub fn try_acquire(&self, commit: bool) -> Admission {
        let now = self.clock.now();
        let mut state = self.lock_state();
        let provider_count = self.registry.len();

        for _ in 0..2 * provider_count {
            let index = state.cursor;
            state.cursor = (index + 1) % provider_count;

            let provider = self.registry.get(index);
            let used = state.ledger.utilization(index, now);
            if used < provider.capacity as usize {
                if commit {
                    state.ledger.record(index, now);
                    self.metrics.record_grant();
                }
                drop(state);
                debug!(
                    provider = %provider.name,
                    used = used + usize::from(commit),
                    capacity = provider.capacity,
                    committed = commit,
                    "admission granted"
                );
                return Admission::Granted(ProviderLease {
                    provider: provider.clone(),
                    degraded: false,
                });
            }
        }

        drop(state);
        self.metrics.record_denial();
        warn!("all providers at capacity in the current window");
        Admission::Denied
    }

    /// Acquire a provider, backing off while the pool is saturated.
    ///
    /// Retries `try_acquire` with a ledger-derived wait between attempts:
    /// the soonest time any saturated provider frees a slot, clamped into
    /// `[min_wait, max_wait]`. The lock is never held while sleeping, and
    /// nothing is retained across a suspension, so abandoning the loop
    /// between attempts leaks no state. After `max_retries` denials the
    /// configured [`ExhaustionPolicy`] applies; under the default
    /// `ForceGrant` this method always returns a lease.
    ///
    /// # Errors
    /// `AcquireError::Exhausted` only under [`ExhaustionPolicy::Refuse`].
    pub fn acquire_or_wait(&self, retry: &RetryConfig) -> Result<ProviderLease, AcquireError> {
        let mut attempt = 0u32;
        loop {
            if let Admission::Granted(lease) = self.try_acquire(true) {
                return Ok(lease);
            }
            if attempt >= retry.max_retries {
                break;
            }
            attempt += 1;
            let wait = self.backoff_wait(retry);
            info!(
                attempt,
                max_retries = retry.max_retries,
                wait_secs = wait.as_secs_f64(),
                "waiting for provider capacity"
            );
            std::thread::sleep(wait);
        }
        self.exhausted(retry)
    }

    /// Async variant of [`acquire_or_wait`](Self::acquire_or_wait).
    ///
    /// Suspends only the calling task; the shared lock is released before
    /// every await and re-acquired fresh on retry, so other callers keep
    /// making progress while this one waits. Cancel-safe: dropping the
    /// future between attempts leaks no state.
    #[cfg(feature = "async")]
    pub async fn acquire_or_wait_async(
        &self,
        retry: &RetryConfig,
    ) -> Result<ProviderLease, AcquireError> {
        let mut attempt = 0u32;
        loop {
            if let Admission::Granted(lease) = self.try_acquire(true) {
                return Ok(lease);
            }
            if attempt >= retry.max_retries {
                break;
            }
            attempt += 1;
            let wait = self.backoff_wait(retry);
            info!(
                attempt,
                max_retries = retry.max_retries,
                wait_secs = wait.as_secs_f64(),
                "waiting for provider capacity"
            );
            tokio::time::sleep(wait).await;
        }
        self.exhausted(retry)
    }

    /// Record a call against a provider the caller already used, bypassing
    /// selection.
    ///
    /// # Errors
    /// `UnknownProviderError` if the name is not registered.
    pub fn record_external_call(&self, name: &str) -> Result<(), UnknownProviderError> {
        self.record_external_call_at(name, self.clock.now())
    }

    /// Record a call against a provider at an explicit timestamp.
    ///
    /// # Errors
    /// `UnknownProviderError` if the name is not registered.
    pub fn record_external_call_at(
        &self,
        name: &str,
        at: Instant,
    ) -> Result<(), UnknownProviderError> {
        let index = self.registry.index_of(name)?;
        let mut state = self.lock_state();
        state.ledger.record(index, at);
        drop(state);
        self.metrics.record_grant();
        debug!(provider = name, "external call recorded");
        Ok(())
    }

    /// Produce a point-in-time snapshot of every provider and the pool
    /// aggregate.
    ///
    /// Defensive by design: a provider whose ledger slot is missing gets a
    /// safe default entry instead of failing the snapshot. Observability
    /// must never be the cause of an outage.
    pub fn status(&self) -> StatusReport {
        let now = self.clock.now();
        let mut state = self.lock_state();

        let mut providers = Vec::with_capacity(self.registry.len());
        let mut active_grants: u64 = 0;
        let mut by_category: BTreeMap<String, usize> = BTreeMap::new();

        for (index, provider) in self.registry.providers().iter().enumerate() {
            *by_category.entry(provider.category.clone()).or_insert(0) += 1;

            state.ledger.purge(index, now);
            let entry = match state.ledger.window(index) {
                Some(window) => {
                    let grants_in_window = window.len();
                    let capacity = provider.capacity;
                    let available = grants_in_window < capacity as usize;
                    let seconds_until_next_slot = if available {
                        0.0
                    } else {
                        window
                            .time_until_slot(now)
                            .unwrap_or(Duration::ZERO)
                            .as_secs_f64()
                    };
                    ProviderStatus {
                        name: provider.name.clone(),
                        category: provider.category.clone(),
                        grants_in_window,
                        capacity,
                        utilization_percent: round1(
                            grants_in_window as f64 / f64::from(capacity) * 100.0,
                        ),
                        available,
                        seconds_until_next_slot: round1(seconds_until_next_slot),
                    }
                }
                None => ProviderStatus::fallback(provider),
            };

            active_grants += entry.grants_in_window as u64;
            providers.push(entry);
        }
        drop(state);

        let total_capacity = self.registry.total_capacity();
        let overall = if total_capacity == 0 {
            0.0
        } else {
            active_grants as f64 / total_capacity as f64 * 100.0
        };
        let counters = self.metrics.snapshot();

        StatusReport {
            providers,
            aggregate: AggregateStatus {
                total_capacity,
                total_active_grants: active_grants,
                overall_utilization_percent: round1(overall),
                total_recorded: counters.grants_recorded,
                denials: counters.denials,
                degraded_grants: counters.degraded_grants,
                providers_by_category: by_category,
            },
        }
    }

    /// Derive the backoff wait from the ledger: the soonest slot among
    /// saturated providers, clamped into the retry bounds.
    fn backoff_wait(&self, retry: &RetryConfig) -> Duration {
        let now = self.clock.now();
        let mut state = self.lock_state();
        let soonest = state.ledger.soonest_slot(self.registry.providers(), now);

        for (index, provider) in self.registry.providers().iter().enumerate() {
            let window = match state.ledger.window(index) {
                Some(window) => window,
                None => continue,
            };
            if window.len() >= provider.capacity as usize {
                if let Some(until) = window.time_until_slot(now) {
                    debug!(
                        provider = %provider.name,
                        free_in_secs = until.as_secs_f64(),
                        "provider saturated"
                    );
                }
            }
        }
        drop(state);

        soonest
            .unwrap_or(DEFAULT_BACKOFF)
            .clamp(retry.min_wait, retry.max_wait)
    }

    fn exhausted(&self, retry: &RetryConfig) -> Result<ProviderLease, AcquireError> {
        match self.exhaustion {
            ExhaustionPolicy::ForceGrant => Ok(self.force_grant()),
            ExhaustionPolicy::Refuse => {
                warn!(
                    retries = retry.max_retries,
                    "refusing admission after exhausting retries"
                );
                Err(AcquireError::Exhausted {
                    retries: retry.max_retries,
                })
            }
        }
    }

    /// Force a grant on the largest-capacity provider, ties broken by the
    /// one soonest to free a slot. The call is recorded even though it may
    /// push the provider past its stated capacity.
    fn force_grant(&self) -> ProviderLease {
        let now = self.clock.now();
        let mut state = self.lock_state();

        state.ledger.purge(0, now);
        let mut best_index = 0usize;
        let mut best_capacity = self.registry.get(0).capacity;
        let mut best_free_in = state
            .ledger
            .window(0)
            .and_then(|w| w.time_until_slot(now))
            .unwrap_or(Duration::ZERO);

        for index in 1..self.registry.len() {
            let provider = self.registry.get(index);
            state.ledger.purge(index, now);
            let free_in = state
                .ledger
                .window(index)
                .and_then(|w| w.time_until_slot(now))
                .unwrap_or(Duration::ZERO);

            if provider.capacity > best_capacity
                || (provider.capacity == best_capacity && free_in < best_free_in)
            {
                best_index = index;
                best_capacity = provider.capacity;
                best_free_in = free_in;
            }
        }

        state.ledger.record(best_index, now);
        drop(state);
        self.metrics.record_grant();
        self.metrics.record_degraded();

        let provider = self.registry.get(best_index).clone();
        warn!(provider = %provider.name, "issuing over-quota fallback grant");
        ProviderLease {
            provider,
            degraded: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mocks::MockClock;
    use std::time::Instant;

    fn two_providers(cap_a: u32, cap_b: u32) -> Vec<Provider> {
        vec![
            Provider::new("alpha", "gemini", cap_a),
            Provider::new("beta", "groq", cap_b),
        ]
    }

    fn controller_with_clock(providers: Vec<Provider>) -> (AdmissionController, Arc<MockClock>) {
        let clock = Arc::new(MockClock::new(Instant::now()));
        let controller = AdmissionController::builder()
            .with_providers(providers)
            .with_clock(clock.clone())
            .build()
            .unwrap();
        (controller, clock)
    }

    #[test]
    fn test_empty_pool_rejected() {
        assert_eq!(
            AdmissionController::new(Vec::new()).unwrap_err(),
            ConfigError::NoProviders
        );
    }

    #[test]
    fn test_round_robin_interleaving_then_denial() {
        let (controller, _clock) = controller_with_clock(two_providers(2, 2));

        let order: Vec<String> = (0..4)
            .map(|_| {
                controller
                    .try_acquire(true)
                    .into_lease()
                    .unwrap()
                    .name()
                    .to_string()
            })
            .collect();
        assert_eq!(order, ["alpha", "beta", "alpha", "beta"]);

        // Pool saturated; a probe at the same instant is denied
        assert!(controller.try_acquire(false).is_denied());
    }

    #[test]
    fn test_probe_does_not_consume_capacity() {
        let (controller, _clock) = controller_with_clock(two_providers(1, 1));

        for _ in 0..5 {
            assert!(controller.try_acquire(false).is_granted());
        }
        assert_eq!(controller.metrics().grants_recorded(), 0);

        // Capacity still fully available after probes
        assert!(controller.try_acquire(true).is_granted());
        assert!(controller.try_acquire(true).is_granted());
        assert!(controller.try_acquire(true).is_denied());
    }

    #[test]
    fn test_probe_advances_cursor() {
        let (controller, _clock) = controller_with_clock(two_providers(2, 2));

        // Probe lands on alpha and moves the cursor past it
        assert_eq!(controller.try_acquire(false).into_lease().unwrap().name(), "alpha");
        assert_eq!(controller.try_acquire(true).into_lease().unwrap().name(), "beta");
    }

    #[test]
    fn test_skip_saturated_provider() {
        let (controller, _clock) = controller_with_clock(two_providers(1, 3));

        assert_eq!(controller.try_acquire(true).into_lease().unwrap().name(), "alpha");
        assert_eq!(controller.try_acquire(true).into_lease().unwrap().name(), "beta");
        // alpha saturated: cursor skips it on both remaining grants
        assert_eq!(controller.try_acquire(true).into_lease().unwrap().name(), "beta");
        assert_eq!(controller.try_acquire(true).into_lease().unwrap().name(), "beta");
        assert!(controller.try_acquire(true).is_denied());
    }

    #[test]
    fn test_capacity_frees_after_window() {
        let (controller, clock) = controller_with_clock(two_providers(1, 1));

        assert!(controller.try_acquire(true).is_granted());
        assert!(controller.try_acquire(true).is_granted());
        assert!(controller.try_acquire(true).is_denied());

        clock.advance(Duration::from_secs(60));
        assert!(controller.try_acquire(true).is_granted());
    }

    #[test]
    fn test_record_external_call_counts_against_window() {
        let (controller, _clock) = controller_with_clock(two_providers(1, 1));

        controller.record_external_call("alpha").unwrap();

        // alpha is saturated by the externally recorded call
        assert_eq!(controller.try_acquire(true).into_lease().unwrap().name(), "beta");
        assert!(controller.try_acquire(true).is_denied());
    }

    #[test]
    fn test_record_external_call_unknown_provider() {
        let (controller, _clock) = controller_with_clock(two_providers(1, 1));

        let err = controller.record_external_call("gamma").unwrap_err();
        assert_eq!(err.name, "gamma");
    }

    #[test]
    fn test_force_grant_prefers_largest_capacity() {
        let (controller, _clock) = controller_with_clock(two_providers(1, 5));

        // Saturate both
        for _ in 0..6 {
            assert!(controller.try_acquire(true).is_granted());
        }

        let retry = RetryConfig::new(0, Duration::from_millis(1), Duration::from_millis(2)).unwrap();
        let lease = controller.acquire_or_wait(&retry).unwrap();
        assert_eq!(lease.name(), "beta");
        assert!(lease.is_degraded());
        assert_eq!(controller.metrics().degraded_grants(), 1);
    }

    #[test]
    fn test_refuse_policy_returns_exhausted() {
        let clock = Arc::new(MockClock::new(Instant::now()));
        let controller = AdmissionController::builder()
            .with_providers(two_providers(1, 1))
            .with_clock(clock)
            .with_exhaustion_policy(ExhaustionPolicy::Refuse)
            .build()
            .unwrap();

        assert!(controller.try_acquire(true).is_granted());
        assert!(controller.try_acquire(true).is_granted());

        let retry = RetryConfig::new(1, Duration::from_millis(1), Duration::from_millis(2)).unwrap();
        assert_eq!(
            controller.acquire_or_wait(&retry).unwrap_err(),
            AcquireError::Exhausted { retries: 1 }
        );
        assert_eq!(controller.metrics().degraded_grants(), 0);
    }

    #[test]
    fn test_retry_config_validation() {
        assert_eq!(
            RetryConfig::new(3, Duration::from_secs(5), Duration::from_secs(1)).unwrap_err(),
            ConfigError::InvalidRetryBounds
        );
        assert_eq!(
            RetryConfig::new(3, Duration::ZERO, Duration::ZERO).unwrap_err(),
            ConfigError::InvalidRetryBounds
        );
        assert!(RetryConfig::new(3, Duration::from_secs(1), Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_no_partial_mutation_on_denial() {
        let (controller, _clock) = controller_with_clock(two_providers(1, 1));

        assert!(controller.try_acquire(true).is_granted());
        assert!(controller.try_acquire(true).is_granted());
        let recorded_before = controller.metrics().grants_recorded();

        assert!(controller.try_acquire(true).is_denied());
        assert_eq!(controller.metrics().grants_recorded(), recorded_before);
        assert_eq!(controller.metrics().denials(), 1);
    }
}
