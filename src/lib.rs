//! # provider-gate
//!
//! Sliding-window admission control for pools of independently rate-limited
//! providers.
//!
//! This crate decides which provider of a heterogeneous pool should serve
//! each outbound call, enforcing every provider's per-window capacity,
//! distributing load fairly across providers of differing capacity, and
//! degrading gracefully when the whole pool is saturated. It grants or
//! withholds permission and tracks consumption; making (and retrying) the
//! downstream call stays with the caller.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use provider_gate::{Admission, AdmissionController, Provider};
//!
//! let controller = AdmissionController::new(vec![
//!     Provider::new("gemini-main", "gemini", 15),
//!     Provider::new("groq-main", "groq", 30).with_metadata("model", "llama-3.1-70b"),
//! ])?;
//!
//! match controller.try_acquire(true) {
//!     Admission::Granted(lease) => {
//!         // call the remote service identified by lease.provider()
//!     }
//!     Admission::Denied => {
//!         // every provider is at capacity; serve cached/default content
//!     }
//! }
//! # Ok::<(), provider_gate::ConfigError>(())
//! ```
//!
//! ## Blocking Acquire
//!
//! When a denial should wait for capacity instead of failing fast, use
//! [`AdmissionController::acquire_or_wait`]. It backs off by the soonest
//! time any saturated provider frees a slot (clamped into the configured
//! bounds), and after `max_retries` denials applies the configured
//! [`ExhaustionPolicy`]: by default a forced, `degraded`-flagged grant on
//! the largest-capacity provider, preferring forward progress over strict
//! quota compliance.
//!
//! ```rust,no_run
//! use provider_gate::{AdmissionController, Provider, RetryConfig};
//! use std::time::Duration;
//!
//! let controller = AdmissionController::new(vec![Provider::new("main", "gemini", 15)])?;
//! let retry = RetryConfig::new(3, Duration::from_secs(1), Duration::from_secs(5))?;
//!
//! let lease = controller.acquire_or_wait(&retry).unwrap();
//! if lease.is_degraded() {
//!     // over quota: proceed anyway, or substitute a default response
//! }
//! # Ok::<(), provider_gate::ConfigError>(())
//! ```
//!
//! With the `async` feature,
//! [`acquire_or_wait_async`](AdmissionController::acquire_or_wait_async)
//! suspends only the calling task and never holds the controller lock
//! across an await.
//!
//! ## Selection Discipline
//!
//! Selection is round-robin with skip: a shared cursor visits providers in
//! cyclic order, passing over any found at capacity, sweeping the list at
//! most twice per attempt. It is deterministic and auditable, and it
//! self-balances: a high-capacity provider stays admissible across more
//! consecutive cursor visits than a low-capacity one, so grant shares track
//! capacities without explicit weighting arithmetic.
//!
//! ## Observability
//!
//! [`AdmissionController::status`] returns a point-in-time
//! [`StatusReport`](application::status::StatusReport) (per-provider
//! windows plus pool aggregate, `serde`-serializable). With the `async`
//! feature, a [`StatusReporter`](application::status::StatusReporter) can
//! emit the snapshot periodically through `tracing`. Process-lifetime
//! counters are available through [`AdmissionController::metrics`].
//!
//! ## Concurrency Model
//!
//! One controller value is shared by every call site. Each admission
//! decision runs as a single critical section under one coarse lock
//! (decisions compare state across all providers, so per-provider locking
//! would race); the critical section does O(N) work over the small, fixed
//! provider count and never blocks on I/O or sleeps. Waiters have no FIFO
//! ordering; under extreme contention a waiter can be out-raced by new
//! arrivals, which the bounded retry-then-fallback path turns into a
//! bounded wait rather than a livelock. State is single-process and
//! in-memory; this is not a distributed rate limiter.

// Domain layer - pure business logic
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - external adapters
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use domain::{
    provider::Provider,
    window::{GrantWindow, WINDOW},
};

pub use application::{
    controller::{
        AcquireError, Admission, AdmissionController, AdmissionControllerBuilder,
        ExhaustionPolicy, ProviderLease, RetryConfig,
    },
    metrics::{AdmissionMetrics, MetricsSnapshot},
    ports::Clock,
    registry::{ConfigError, ProviderRegistry, UnknownProviderError},
    status::{AggregateStatus, ProviderStatus, StatusConfigError, StatusReport, StatusReporter},
};

pub use infrastructure::clock::SystemClock;
