//! Backoff delays for retries and bulk job polling
//!
//! Exponential backoff with optional jitter, shared by the retry queue
//! (deterministic `1s · 2^n`) and the bulk poller (jittered, capped).

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use common::{BulkConfigBase, RetryConfigBase};

/// Backoff strategies for retry delays
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed { delay: Duration },

    /// Exponential backoff: initial_delay * base^attempt_number
    Exponential {
        initial_delay: Duration,
        base: f64,
        max_delay: Duration,
        jitter: bool,
    },
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::from_retry_config(&RetryConfigBase::default())
    }
}

impl BackoffStrategy {
    /// Retry queue delays: no jitter, so the n-th retry waits exactly `initial · base^n`
    pub fn from_retry_config(config: &RetryConfigBase) -> Self {
        Self::Exponential {
            initial_delay: config.initial_backoff(),
            base: config.backoff_multiplier,
            max_delay: Duration::from_secs(300),
            jitter: false,
        }
    }

    /// Backoff between consecutive failed bulk status polls
    pub fn from_bulk_config(config: &BulkConfigBase) -> Self {
        Self::Exponential {
            initial_delay: Duration::from_millis(config.error_backoff_initial_ms),
            base: 2.0,
            max_delay: Duration::from_millis(config.error_backoff_max_ms),
            jitter: true,
        }
    }

    /// Calculate delay for given attempt number (0-based)
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        match self {
            Self::Fixed { delay } => *delay,

            Self::Exponential {
                initial_delay,
                base,
                max_delay,
                jitter,
            } => {
                let base_delay = initial_delay.as_millis() as f64 * base.powf(attempt as f64);
                let delay = Duration::from_millis(base_delay as u64).min(*max_delay);

                if *jitter {
                    self.add_jitter(delay)
                } else {
                    delay
                }
            }
        }
    }

    /// Add jitter to delay (±25% random variation)
    fn add_jitter(&self, delay: Duration) -> Duration {
        let mut rng = rand::thread_rng();
        let jitter_factor = rng.gen_range(0.75..=1.25);
        let jittered_millis = (delay.as_millis() as f64 * jitter_factor) as u64;
        Duration::from_millis(jittered_millis)
    }
}
