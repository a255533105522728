//! Client configuration.

use std::time::Duration;

/// Configuration errors.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue {
        field: &'static str,
        reason: String,
    },
}

/// Retry policy for requests that fail at the transport level.
///
/// A failing request is re-issued up to `max_attempts` times total, sleeping
/// `attempt * backoff_step` between attempts (linear backoff). The same step
/// paces the reconnect loop, whose backoff is capped at
/// `max_attempts * backoff_step` because it never gives up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total request attempts before the transport error is surfaced.
    pub max_attempts: u32,
    /// Linear backoff step between attempts.
    pub backoff_step: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            backoff_step: Duration::from_millis(100),
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the total number of request attempts.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the linear backoff step.
    pub fn with_backoff_step(mut self, step: Duration) -> Self {
        self.backoff_step = step;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_attempts",
                reason: "must be > 0".to_string(),
            });
        }
        if self.backoff_step.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "backoff_step",
                reason: "must be > 0".to_string(),
            });
        }
        Ok(())
    }

    /// Delay before re-issuing a request, after `attempt` failed attempts.
    pub fn request_backoff(&self, attempt: u32) -> Duration {
        self.backoff_step * attempt
    }

    /// Delay before the `attempt`-th reconnect try. Linear like the request
    /// backoff, but capped: the reconnect loop runs until it succeeds.
    pub fn reconnect_backoff(&self, attempt: u32) -> Duration {
        self.backoff_step * attempt.min(self.max_attempts)
    }
}
