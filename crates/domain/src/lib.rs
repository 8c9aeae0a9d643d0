//! Domain Layer - POS migration business model
//!
//! Contains ONLY pure business types without dependencies on:
//! - Infrastructure (HTTP clients, file systems)
//! - Frameworks (CLI, async runtimes)
//! - External systems (LLM services, commerce APIs)
//!
//! Layout:
//! - Entities: objects with identity or lifecycle (Operation, MigrationPlan, MigrationProgress)
//! - Value Objects: immutable classifications (ResourceKind, MigrationStrategy, FieldCoercion)
//! - Errors: business rule violations

pub mod entities;
pub mod errors;
pub mod value_objects;

// Re-export core domain types
pub use entities::{
    ErrorCategory, FieldMapping, FieldMappings, MappingSuggestion, MigrationOptions,
    MigrationPlan, MigrationProgress, MigrationStatus, MigrationStep, Operation, OperationError,
    RecordData, SourceRecord, StageKind, StepStatus,
};
pub use errors::{DomainError, DomainResult};
pub use value_objects::{
    coercion_for, target_fields, ExecutionMode, FieldCoercion, MigrationStrategy, OperationKind,
    Priority, ResourceKind, SKU_MAX_LEN, TITLE_MAX_LEN,
};

/// Domain-specific type aliases
pub type RecordCount = usize;
pub type ConfidenceScore = u8;
