//! Application layer - orchestration of domain logic.
//!
//! This layer coordinates the domain logic and manages runtime behavior:
//! - Provider registry (validated immutable configuration)
//! - Grant ledger (per-provider windows behind the controller lock)
//! - Admission controller (selection, backoff, fallback)
//! - Status reporter (observability snapshots)
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters must implement. This keeps the application layer independent
//! from infrastructure details.

pub mod controller;
pub mod ledger;
pub mod metrics;
pub mod ports;
pub mod registry;
pub mod status;
