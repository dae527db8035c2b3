//! Relay settings and validation.
//!
//! Pure values; reading them from the environment happens in the binary.

use std::time::Duration;

use crate::error::ConfigError;

/// Default number of admissions allowed per window.
pub const DEFAULT_RATE_LIMIT: usize = 6;

/// Default sliding-window length in seconds.
pub const DEFAULT_TIME_WINDOW_SECS: u64 = 60;

/// Rate limiter settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSettings {
    /// Maximum in-flight upstream calls, and maximum admissions per window.
    pub limit: usize,
    /// Length of the sliding window.
    pub window: Duration,
    /// Give up on admission after this long. `None` waits indefinitely.
    pub admission_timeout: Option<Duration>,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            limit: DEFAULT_RATE_LIMIT,
            window: Duration::from_secs(DEFAULT_TIME_WINDOW_SECS),
            admission_timeout: None,
        }
    }
}

impl RateLimitSettings {
    #[must_use]
    pub const fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            admission_timeout: None,
        }
    }

    #[must_use]
    pub const fn with_admission_timeout(mut self, timeout: Duration) -> Self {
        self.admission_timeout = Some(timeout);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limit == 0 {
            return Err(ConfigError::Invalid {
                key: "RATE_LIMIT",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.window.is_zero() {
            return Err(ConfigError::Invalid {
                key: "TIME_WINDOW",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.admission_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::Invalid {
                key: "ADMISSION_TIMEOUT",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Everything the relay core needs to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelaySettings {
    pub rate_limit: RateLimitSettings,
    /// Longest allowed gap between two upstream fragments.
    pub fragment_timeout: Option<Duration>,
}

impl RelaySettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.rate_limit.validate()?;
        if self.fragment_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::Invalid {
                key: "UPSTREAM_TIMEOUT",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}
