//! Token bucket in front of the commerce API
//!
//! Credits refill lazily in whole units. The refill clock only advances by
//! the time the added credits represent, so a fractional credit in progress
//! is carried over to the next observation.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

use common::RateLimitConfigBase;

const MIN_REFILL_RATE: f64 = 0.001;

#[derive(Debug)]
struct BucketState {
    credits: u32,
    last_refill: Instant,
}

#[derive(Debug)]
pub struct RateLimiter {
    capacity: u32,
    refill_rate_per_second: f64,
    state: Mutex<BucketState>,
}

impl RateLimiter {
    /// Starts with a full bucket
    pub fn new(bucket_capacity: u32, refill_rate_per_second: f64) -> Self {
        let capacity = bucket_capacity.max(1);
        let refill_rate_per_second = if refill_rate_per_second.is_finite() {
            refill_rate_per_second.max(MIN_REFILL_RATE)
        } else {
            MIN_REFILL_RATE
        };
        Self {
            capacity,
            refill_rate_per_second,
            state: Mutex::new(BucketState {
                credits: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn from_config(config: &RateLimitConfigBase) -> Self {
        Self::new(config.bucket_capacity, config.refill_rate_per_second)
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn refill_rate_per_second(&self) -> f64 {
        self.refill_rate_per_second
    }

    /// Wait until a credit is available, then consume it
    pub async fn throttle(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock();
                self.refill(&mut state);
                if state.credits >= 1 {
                    state.credits -= 1;
                    trace!(credits = state.credits, "rate limit credit consumed");
                    return;
                }
                self.wait_for_next_credit(state.credits)
            };

            debug!(wait_ms = wait.as_millis() as u64, "rate limit bucket empty, waiting");
            tokio::time::sleep(wait).await;
        }
    }

    /// Consume a credit if one is available right now
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock();
        self.refill(&mut state);
        if state.credits >= 1 {
            state.credits -= 1;
            true
        } else {
            false
        }
    }

    /// Current credits after a lazy refill
    pub fn available_credits(&self) -> u32 {
        let mut state = self.state.lock();
        self.refill(&mut state);
        state.credits
    }

    /// Re-synchronise from the remote `used/capacity` call-limit pair
    pub fn sync_from_quota(&self, used: u32, remote_capacity: u32) {
        let remote_available = remote_capacity.saturating_sub(used);
        let mut state = self.state.lock();
        let credits = remote_available.min(self.capacity);
        if credits != state.credits {
            debug!(
                credits_before = state.credits,
                credits_after = credits,
                used,
                remote_capacity,
                "rate limiter synced from API quota"
            );
        }
        state.credits = credits;
        state.last_refill = Instant::now();
    }

    /// `ceil((1 - credits) / rate * 1000)` milliseconds
    fn wait_for_next_credit(&self, credits: u32) -> Duration {
        let missing = (1.0 - f64::from(credits)).max(0.0);
        let millis = (missing / self.refill_rate_per_second * 1000.0).ceil();
        Duration::from_millis(millis.max(1.0) as u64)
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        if state.credits >= self.capacity {
            state.last_refill = now;
            return;
        }

        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        let whole = (elapsed * self.refill_rate_per_second).floor();
        if whole < 1.0 {
            return;
        }

        let headroom = self.capacity - state.credits;
        let added = if whole >= f64::from(headroom) {
            headroom
        } else {
            whole as u32
        };
        state.credits += added;

        if state.credits >= self.capacity {
            state.last_refill = now;
        } else {
            state.last_refill += Duration::from_secs_f64(f64::from(added) / self.refill_rate_per_second);
        }
    }
}
