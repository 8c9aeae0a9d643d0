//! Reliability primitives for calls against the commerce API

pub mod backoff;
pub mod rate_limiter;
pub mod retry_queue;

pub use backoff::BackoffStrategy;
pub use rate_limiter::RateLimiter;
pub use retry_queue::{AttemptFailure, DrainReport, RetryEntry, RetryQueue};
