//! Infrastructure layer - external adapters.
//!
//! This layer provides adapters for:
//! - Clock abstraction (system time vs mock)

pub mod clock;

/// Mock implementations for testing.
///
/// This module is only available when the `test-helpers` feature is
/// enabled, or during test builds. It provides a controllable clock for
/// deterministic testing of window expiry and backoff.
///
/// To use the mocks in integration tests, add to your `Cargo.toml`:
/// ```toml
/// [dev-dependencies]
/// provider-gate = { version = "*", features = ["test-helpers"] }
/// ```
#[cfg(any(test, feature = "test-helpers"))]
pub mod mocks;
