//! Value Objects - immutable classifications of the migration domain

pub mod resource_kind;
pub mod strategy;
pub mod target_field;

pub use resource_kind::{OperationKind, ResourceKind};
pub use strategy::{ExecutionMode, MigrationStrategy, Priority};
pub use target_field::{coercion_for, target_fields, FieldCoercion, SKU_MAX_LEN, TITLE_MAX_LEN};
