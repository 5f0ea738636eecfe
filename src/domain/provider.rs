//! Provider identity and capacity.
//!
//! A provider is a named external capability source with a fixed maximum
//! call rate per rolling window. Providers are immutable once the
//! controller is constructed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A configured provider.
///
/// `capacity` is the number of calls the provider accepts per rolling
/// 60-second window. `category` groups providers of the same kind (e.g.
/// different accounts against the same upstream service). `metadata`
/// carries free-form descriptive keys (model identifier, region, ...);
/// the controller never interprets it.
///
/// The type derives `Serialize`/`Deserialize` so provider lists can be
/// loaded from JSON or TOML configuration. Capacity validation happens at
/// controller construction, not at parse time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    /// Unique provider name
    pub name: String,
    /// Provider kind, used for grouping in status reports
    pub category: String,
    /// Calls allowed per rolling 60-second window
    pub capacity: u32,
    /// Free-form descriptive metadata
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Provider {
    /// Create a provider with empty metadata.
    pub fn new(name: impl Into<String>, category: impl Into<String>, capacity: u32) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            capacity,
            metadata: BTreeMap::new(),
        }
    }

    /// Attach a metadata entry, builder-style.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
