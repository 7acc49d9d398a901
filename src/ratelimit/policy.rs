//! Rate limit policy for a single limiter instance.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{LimiterError, Result};

/// Poll interval used when a policy does not name one.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_millis(1000);

/// Immutable admission policy: quota, window length and poll interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Maximum admitted requests per window
    pub max_requests: u32,
    /// Length of one counting window
    pub window: Duration,
    /// How long `wait_for_slot` sleeps between checks
    pub retry_after: Duration,
}

impl RateLimitPolicy {
    /// Create a policy with the default one-second retry interval.
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            retry_after: DEFAULT_RETRY_AFTER,
        }
    }

    /// Override the retry interval.
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = retry_after;
        self
    }
}

/// Serialized form of a policy, with millisecond fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Maximum requests per window
    pub max_requests: u32,
    /// Window length in milliseconds
    pub window_ms: u64,
    /// Retry interval in milliseconds
    #[serde(default = "default_retry_after_ms")]
    pub retry_after_ms: u64,
}

fn default_retry_after_ms() -> u64 {
    DEFAULT_RETRY_AFTER.as_millis() as u64
}

impl PolicyConfig {
    /// Create a policy config from millisecond values.
    pub fn new(max_requests: u32, window_ms: u64, retry_after_ms: u64) -> Self {
        Self {
            max_requests,
            window_ms,
            retry_after_ms,
        }
    }

    /// Check that every field is positive.
    pub fn validate(&self, name: &str) -> Result<()> {
        if self.max_requests == 0 {
            return Err(LimiterError::Config(format!(
                "{} max_requests must be greater than 0",
                name
            )));
        }
        if self.window_ms == 0 {
            return Err(LimiterError::Config(format!(
                "{} window_ms must be greater than 0",
                name
            )));
        }
        if self.retry_after_ms == 0 {
            return Err(LimiterError::Config(format!(
                "{} retry_after_ms must be greater than 0",
                name
            )));
        }
        Ok(())
    }
}

impl From<&PolicyConfig> for RateLimitPolicy {
    fn from(config: &PolicyConfig) -> Self {
        RateLimitPolicy::new(config.max_requests, Duration::from_millis(config.window_ms))
            .with_retry_after(Duration::from_millis(config.retry_after_ms))
    }
}
