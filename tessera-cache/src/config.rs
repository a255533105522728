//! Cache configuration.

use tessera_core::IO_BATCH_SIZE;

/// Configuration errors.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue {
        field: &'static str,
        reason: String,
    },
}

/// Configuration for the background I/O behavior of an
/// [`EntryCache`](crate::EntryCache).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum keys per fetch batch and entries per flush batch.
    pub batch_size: usize,
    /// Cumulative cycle failures tolerated before background I/O is
    /// permanently disabled.
    pub failure_budget: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            batch_size: IO_BATCH_SIZE,
            failure_budget: 3,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the fetch/flush batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the cumulative failure budget.
    pub fn with_failure_budget(mut self, failure_budget: u32) -> Self {
        self.failure_budget = failure_budget;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "batch_size",
                reason: "must be > 0".to_string(),
            });
        }
        if self.failure_budget == 0 {
            return Err(ConfigError::InvalidValue {
                field: "failure_budget",
                reason: "must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.failure_budget, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_and_validation() {
        let config = CacheConfig::new()
            .with_batch_size(10)
            .with_failure_budget(1);
        assert!(config.validate().is_ok());

        assert!(config.clone().with_batch_size(0).validate().is_err());
        assert!(config.with_failure_budget(0).validate().is_err());
    }
}
