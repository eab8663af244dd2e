//! Bounded retry policy for a single job.
//!
//! A retry resubmits the same job, with the same credential and fields, after an
//! exponential backoff. Login attempts are safe to repeat, so the only concern is
//! capping the number of attempts.
//!
//! ```rust
//! # use stomper::dispatcher::RetryConfig;
//! let config = RetryConfig {
//!     max_retries: 3,
//!     backoff_ms: 500,       // Start with half a second
//!     backoff_factor: 2,     // Double each time (0.5s, 1s, 2s)
//!     max_backoff_ms: 10000, // Cap at 10 seconds
//! };
//! assert_eq!(config.backoff(2).as_millis(), 2000);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Resubmissions allowed after the first attempt (0 disables retries)
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub backoff_factor: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff_ms: 1000,
            backoff_factor: 2,
            max_backoff_ms: 30000,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `retry_attempt + 1`:
    /// `backoff_ms * (backoff_factor ^ retry_attempt)`, capped at `max_backoff_ms`.
    pub fn backoff(&self, retry_attempt: u32) -> Duration {
        let exponential = self
            .backoff_ms
            .saturating_mul(self.backoff_factor.saturating_pow(retry_attempt));
        Duration::from_millis(exponential.min(self.max_backoff_ms))
    }

    /// Whether another attempt is allowed after `retry_attempt` retries.
    pub fn allows(&self, retry_attempt: u32) -> bool {
        retry_attempt < self.max_retries
    }
}
