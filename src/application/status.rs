//! Point-in-time status snapshots for observability.
//!
//! Snapshots are read-mostly: collecting one purges aged ledger entries
//! (the sanctioned lazy purge) but changes nothing else. All types derive
//! `Serialize` so a read-only HTTP/JSON endpoint can surface them without
//! further mapping; that wrapper and its transport live outside this crate.

use crate::application::controller::AdmissionController;
use crate::domain::provider::Provider;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "async")]
use tracing::{debug, info};

/// Round to one decimal place, matching the precision status consumers see.
pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Snapshot of a single provider's window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderStatus {
    /// Provider name
    pub name: String,
    /// Provider category
    pub category: String,
    /// Grants remaining in the rolling window
    pub grants_in_window: usize,
    /// Configured capacity per window
    pub capacity: u32,
    /// `grants_in_window / capacity`, as a percentage
    pub utilization_percent: f64,
    /// Whether a grant would succeed right now
    pub available: bool,
    /// Seconds until a slot frees up; 0 while available
    pub seconds_until_next_slot: f64,
}

impl ProviderStatus {
    /// Safe default entry used when a provider's ledger slot is missing.
    /// A snapshot never fails; a malformed record degrades to "idle".
    pub(crate) fn fallback(provider: &Provider) -> Self {
        Self {
            name: provider.name.clone(),
            category: provider.category.clone(),
            grants_in_window: 0,
            capacity: provider.capacity,
            utilization_percent: 0.0,
            available: true,
            seconds_until_next_slot: 0.0,
        }
    }
}

/// Pool-wide aggregate snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateStatus {
    /// Sum of all provider capacities per window
    pub total_capacity: u64,
    /// Grants currently inside any provider's window
    pub total_active_grants: u64,
    /// `total_active_grants / total_capacity`, as a percentage
    pub overall_utilization_percent: f64,
    /// Grants ever recorded (process lifetime)
    pub total_recorded: u64,
    /// Denials ever returned (process lifetime)
    pub denials: u64,
    /// Over-quota grants ever forced (process lifetime)
    pub degraded_grants: u64,
    /// Provider count per category
    pub providers_by_category: BTreeMap<String, usize>,
}

/// Full status snapshot: one entry per provider plus the aggregate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    /// Per-provider snapshots, in configuration order
    pub providers: Vec<ProviderStatus>,
    /// Pool-wide aggregate
    pub aggregate: AggregateStatus,
}

impl StatusReport {
    /// Look up a provider's entry by name.
    pub fn provider(&self, name: &str) -> Option<&ProviderStatus> {
        self.providers.iter().find(|p| p.name == name)
    }
}

/// Error returned when reporter configuration validation fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusConfigError {
    /// Emission interval must be greater than zero
    ZeroInterval,
}

impl std::fmt::Display for StatusConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusConfigError::ZeroInterval => {
                write!(f, "status interval must be greater than 0")
            }
        }
    }
}

impl std::error::Error for StatusConfigError {}

/// Collects status snapshots, optionally on a fixed interval.
#[derive(Debug)]
pub struct StatusReporter {
    controller: Arc<AdmissionController>,
    interval: Duration,
}

impl StatusReporter {
    /// Create a reporter emitting every `interval`.
    ///
    /// # Errors
    /// `StatusConfigError::ZeroInterval` if `interval` is zero.
    pub fn new(
        controller: Arc<AdmissionController>,
        interval: Duration,
    ) -> Result<Self, StatusConfigError> {
        if interval.is_zero() {
            return Err(StatusConfigError::ZeroInterval);
        }
        Ok(Self {
            controller,
            interval,
        })
    }

    /// Collect a snapshot now.
    pub fn collect(&self) -> StatusReport {
        self.controller.status()
    }

    /// The configured emission interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start emitting snapshots periodically through `tracing`.
    ///
    /// Spawns a background task that logs the aggregate at info level and
    /// each provider at debug level, every interval.
    #[cfg(feature = "async")]
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);

            loop {
                ticker.tick().await;
                let report = self.controller.status();
                info!(
                    active_grants = report.aggregate.total_active_grants,
                    total_capacity = report.aggregate.total_capacity,
                    utilization = report.aggregate.overall_utilization_percent,
                    degraded = report.aggregate.degraded_grants,
                    "admission status"
                );
                for provider in &report.providers {
                    debug!(
                        provider = %provider.name,
                        grants = provider.grants_in_window,
                        capacity = provider.capacity,
                        available = provider.available,
                        "provider status"
                    );
                }
            }
        })
    }
}
