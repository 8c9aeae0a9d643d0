//! Domain Errors - Business rule violations
//!
//! Contains ONLY business logic errors, no transport or I/O failures

use thiserror::Error;

/// Domain-specific errors representing business rule violations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// Business rule: at most one mapping per source field
    #[error("Duplicate mapping for source field: {0}")]
    DuplicateSourceField(String),

    /// Business validation: confidence must be within 0..=100
    #[error("Invalid confidence {value} for source field {field}, must be between 0 and 100")]
    InvalidConfidence { field: String, value: u32 },

    /// Business validation: unknown resource kind
    #[error("Invalid resource kind: {0}")]
    InvalidResourceKind(String),

    /// Business validation: unknown migration priority
    #[error("Invalid priority: {0}")]
    InvalidPriority(String),

    /// Business validation: unknown migration strategy
    #[error("Invalid strategy: {0}")]
    InvalidStrategy(String),

    /// Business rule: step lifecycle is monotonic
    #[error("Illegal transition for step {step}: {from} -> {to}")]
    IllegalTransition {
        step: String,
        from: String,
        to: String,
    },

    /// Business rule: completed + failed can never exceed total
    #[error("Progress overflow: completed {completed} + failed {failed} exceeds total {total}")]
    ProgressOverflow {
        total: usize,
        completed: usize,
        failed: usize,
    },

    /// Business validation: stage not part of the plan
    #[error("Stage not found in plan: {0}")]
    StageNotFound(String),
}

/// Result type for domain operations
pub type DomainResult<T> = Result<T, DomainError>;
