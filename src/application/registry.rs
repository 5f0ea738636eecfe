//! Immutable provider registry.
//!
//! The registry holds the configured provider list, validated once at
//! controller construction and never mutated afterwards. Because it is
//! read-only, it needs no synchronization.

use crate::domain::provider::Provider;
use std::collections::HashMap;

/// Error raised once at construction when no usable providers are
/// configured. Aborts startup; never retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The provider list is empty
    NoProviders,
    /// A provider declares a capacity of zero (name attached)
    ZeroCapacity(String),
    /// Two providers share the same name (name attached)
    DuplicateProvider(String),
    /// Retry bounds are unusable (min_wait above max_wait, or zero max_wait)
    InvalidRetryBounds,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NoProviders => {
                write!(f, "no providers configured")
            }
            ConfigError::ZeroCapacity(name) => {
                write!(f, "provider {:?} has zero capacity", name)
            }
            ConfigError::DuplicateProvider(name) => {
                write!(f, "provider name {:?} configured more than once", name)
            }
            ConfigError::InvalidRetryBounds => {
                write!(f, "min_wait must not exceed max_wait, and max_wait must be non-zero")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Error raised when a caller references a provider name outside the
/// registry. A programming error, surfaced immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownProviderError {
    /// The name that was not found
    pub name: String,
}

impl std::fmt::Display for UnknownProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown provider {:?}", self.name)
    }
}

impl std::error::Error for UnknownProviderError {}

/// Validated, immutable provider list with name lookup.
#[derive(Debug)]
pub struct ProviderRegistry {
    providers: Vec<Provider>,
    by_name: HashMap<String, usize>,
}

impl ProviderRegistry {
    /// Validate and build a registry.
    ///
    /// # Errors
    /// `ConfigError::NoProviders` if the list is empty,
    /// `ConfigError::ZeroCapacity` if any capacity is zero,
    /// `ConfigError::DuplicateProvider` if a name repeats.
    pub fn new(providers: Vec<Provider>) -> Result<Self, ConfigError> {
        if providers.is_empty() {
            return Err(ConfigError::NoProviders);
        }

        let mut by_name = HashMap::with_capacity(providers.len());
        for (index, provider) in providers.iter().enumerate() {
            if provider.capacity == 0 {
                return Err(ConfigError::ZeroCapacity(provider.name.clone()));
            }
            if by_name.insert(provider.name.clone(), index).is_some() {
                return Err(ConfigError::DuplicateProvider(provider.name.clone()));
            }
        }

        Ok(Self { providers, by_name })
    }

    /// Number of configured providers. Always at least one.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// A validated registry is never empty; present for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Provider at a registry index.
    ///
    /// # Panics
    /// Panics on an out-of-range index; indices originate inside the
    /// crate and are always cursor values modulo `len()`.
    pub fn get(&self, index: usize) -> &Provider {
        &self.providers[index]
    }

    /// All providers, in configuration order.
    pub fn providers(&self) -> &[Provider] {
        &self.providers
    }

    /// Resolve a provider name to its registry index.
    pub fn index_of(&self, name: &str) -> Result<usize, UnknownProviderError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| UnknownProviderError {
                name: name.to_string(),
            })
    }

    /// Sum of all provider capacities per window.
    pub fn total_capacity(&self) -> u64 {
        self.providers.iter().map(|p| u64::from(p.capacity)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn providers() -> Vec<Provider> {
        vec![
            Provider::new("alpha", "gemini", 15),
            Provider::new("beta", "groq", 30),
        ]
    }

    #[test]
    fn test_registry_construction() {
        let registry = ProviderRegistry::new(providers()).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(0).name, "alpha");
        assert_eq!(registry.get(1).name, "beta");
        assert_eq!(registry.total_capacity(), 45);
    }

    #[test]
    fn test_empty_list_rejected() {
        assert_eq!(
            ProviderRegistry::new(Vec::new()).unwrap_err(),
            ConfigError::NoProviders
        );
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result = ProviderRegistry::new(vec![
            Provider::new("alpha", "gemini", 15),
            Provider::new("broken", "groq", 0),
        ]);

        assert_eq!(result.unwrap_err(), ConfigError::ZeroCapacity("broken".to_string()));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let result = ProviderRegistry::new(vec![
            Provider::new("alpha", "gemini", 15),
            Provider::new("alpha", "groq", 30),
        ]);

        assert_eq!(
            result.unwrap_err(),
            ConfigError::DuplicateProvider("alpha".to_string())
        );
    }

    #[test]
    fn test_name_lookup() {
        let registry = ProviderRegistry::new(providers()).unwrap();

        assert_eq!(registry.index_of("beta").unwrap(), 1);
        let err = registry.index_of("gamma").unwrap_err();
        assert_eq!(err.name, "gamma");
    }
}
