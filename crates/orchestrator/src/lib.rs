//! Migration execution engine
//!
//! Turns a validated field mapping plus a tagged record set into reliable
//! calls against a rate-limited commerce API.
//!
//! # Architecture
//!
//! - **MigrationOrchestrator**: plan creation and strictly sequential stage execution
//! - **BatchExecutor**: adaptive batches, one throttle credit per batch, concurrent calls
//! - **BulkExecutor**: one asynchronous bulk job per resource, bounded polling
//! - **RateLimiter / RetryQueue**: token bucket and FIFO retry with exponential backoff
//! - **transformer**: mapping application, coercion and target-schema checks
//! - **IntegrityVerifier**: original vs. migrated diff
//! - **analytics**: pure post-run report
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use commerce::InMemoryCommerceStore;
//! use common::MigrationConfig;
//! use domain::{FieldMapping, FieldMappings, MigrationOptions, SourceRecord};
//! use orchestrator::{analytics, MigrationOrchestrator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let api = Arc::new(InMemoryCommerceStore::new());
//!     let orchestrator = MigrationOrchestrator::new(api, MigrationConfig::default());
//!
//!     let records: Vec<SourceRecord> = Vec::new();
//!     let mappings = FieldMappings::new(vec![FieldMapping::new("item_name", "title", 90)])?;
//!     let plan = orchestrator.create_plan(&records, &mappings, &MigrationOptions::default());
//!
//!     let outcome = orchestrator.execute(plan.id, &records, &mappings, None).await?;
//!     let report = analytics::report(&outcome.progress, &outcome.plan);
//!     println!("{}", serde_json::to_string_pretty(&report)?);
//!     Ok(())
//! }
//! ```

pub mod analytics;
pub mod bulk;
pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod planner;
pub mod progress;
pub mod reliability;
pub mod transformer;
pub mod verifier;

pub use analytics::{report, MigrationReport, Recommendation, RecommendationKind};
pub use bulk::BulkExecutor;
pub use error::{classify, is_retryable, MigrationError, MigrationResult};
pub use executor::{BatchExecutor, BatchObserver};
pub use orchestrator::{BackupSnapshot, MigrationOrchestrator, MigrationOutcome};
pub use progress::{ProgressCallback, ProgressHub, ProgressUpdate};
pub use reliability::{BackoffStrategy, DrainReport, RateLimiter, RetryEntry, RetryQueue};
pub use transformer::{
    transform, validate, validate_records, FieldError, RowError, ValidationErrorKind,
    ValidationReport,
};
pub use verifier::{Inconsistency, IntegrityReport, IntegrityVerifier};
