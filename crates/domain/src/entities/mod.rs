//! Entities - migration objects with identity or lifecycle

pub mod field_mapping;
pub mod operation;
pub mod plan;
pub mod progress;
pub mod source_record;

pub use field_mapping::{FieldMapping, FieldMappings, MappingSuggestion};
pub use operation::Operation;
pub use plan::{MigrationOptions, MigrationPlan, MigrationStep, StageKind, StepStatus};
pub use progress::{ErrorCategory, MigrationProgress, MigrationStatus, OperationError};
pub use source_record::{RecordData, SourceRecord};
