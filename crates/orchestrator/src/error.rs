use thiserror::Error;
use uuid::Uuid;

use commerce::CommerceApiError;
use domain::{DomainError, ErrorCategory};

/// HTTP statuses worth another attempt
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("migration plan {0} not found")]
    PlanNotFound(Uuid),

    #[error("migration plan {0} has already been executed")]
    AlreadyExecuted(Uuid),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Commerce(#[from] CommerceApiError),
}

impl MigrationError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            MigrationError::Commerce(e) => classify(e),
            _ => ErrorCategory::System,
        }
    }
}

pub type MigrationResult<T> = Result<T, MigrationError>;

/// Status in [`RETRYABLE_STATUSES`], or a message mentioning a rate limit or timeout
pub fn is_retryable(error: &CommerceApiError) -> bool {
    if let Some(status) = error.status() {
        if RETRYABLE_STATUSES.contains(&status) {
            return true;
        }
    }
    is_retryable_message(&error.to_string())
}

pub fn is_retryable_message(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("rate limit") || message.contains("timeout")
}

pub fn classify(error: &CommerceApiError) -> ErrorCategory {
    if is_retryable(error) {
        ErrorCategory::Transient
    } else {
        ErrorCategory::Permanent
    }
}
