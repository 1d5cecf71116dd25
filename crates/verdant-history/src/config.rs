//! History configuration

use crate::error::{HistoryError, Result};
use serde::{Deserialize, Serialize};

/// Configuration shared by the store, the reconciliation engine and
/// offsite output resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Serialized output size above which payloads are stored offsite
    pub offsite_threshold_bytes: usize,
    /// Minimum text similarity for a shifted child to continue a lineage
    pub similarity_threshold: f64,
    /// Maximum number of fetched offsite payloads kept in memory
    pub offsite_cache_capacity: u64,
    /// Whether search keywords match case-sensitively
    pub case_sensitive_search: bool,
}

impl HistoryConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With offsite threshold
    #[inline]
    #[must_use]
    pub fn with_offsite_threshold(mut self, bytes: usize) -> Self {
        self.offsite_threshold_bytes = bytes;
        self
    }

    /// With similarity threshold
    #[inline]
    #[must_use]
    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    /// With offsite cache capacity
    #[inline]
    #[must_use]
    pub fn with_offsite_cache_capacity(mut self, capacity: u64) -> Self {
        self.offsite_cache_capacity = capacity;
        self
    }

    /// With case-sensitive search
    #[inline]
    #[must_use]
    pub fn with_case_sensitive_search(mut self, enabled: bool) -> Self {
        self.case_sensitive_search = enabled;
        self
    }

    /// Parse and validate configuration from TOML
    ///
    /// Missing keys take their default values.
    ///
    /// # Errors
    /// Returns [`HistoryError::Config`] on malformed TOML or invalid values
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: Self = toml::from_str(input).map_err(|e| HistoryError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    /// Returns [`HistoryError::Config`] naming the first invalid value
    pub fn validate(&self) -> Result<()> {
        if !(self.similarity_threshold > 0.0 && self.similarity_threshold <= 1.0) {
            return Err(HistoryError::Config(format!(
                "similarity_threshold must be in (0, 1], got {}",
                self.similarity_threshold
            )));
        }
        if self.offsite_cache_capacity == 0 {
            return Err(HistoryError::Config(
                "offsite_cache_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            offsite_threshold_bytes: 512 * 1024,
            similarity_threshold: 0.6,
            offsite_cache_capacity: 256,
            case_sensitive_search: false,
        }
    }
}
