//! MigrationPlan / MigrationStep - ordered stages of one migration run
//!
//! Stage membership is fixed when the plan is created; only the status,
//! progress and error fields of each step change while the run executes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::errors::{DomainError, DomainResult};
use crate::value_objects::{ExecutionMode, MigrationStrategy, Priority, ResourceKind};

/// Stage of the fixed pipeline, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Validation,
    Backup,
    Products,
    Customers,
    Orders,
    Inventory,
    Verification,
}

impl StageKind {
    /// Resource written by this stage, if it writes anything
    pub fn resource(&self) -> Option<ResourceKind> {
        match self {
            StageKind::Products => Some(ResourceKind::Product),
            StageKind::Customers => Some(ResourceKind::Customer),
            StageKind::Orders => Some(ResourceKind::Order),
            StageKind::Inventory => Some(ResourceKind::Inventory),
            StageKind::Validation | StageKind::Backup | StageKind::Verification => None,
        }
    }

    pub fn for_resource(resource: ResourceKind) -> Self {
        match resource {
            ResourceKind::Product => StageKind::Products,
            ResourceKind::Customer => StageKind::Customers,
            ResourceKind::Order => StageKind::Orders,
            ResourceKind::Inventory => StageKind::Inventory,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            StageKind::Validation => "Validate data",
            StageKind::Backup => "Backup existing data",
            StageKind::Products => "Migrate products",
            StageKind::Customers => "Migrate customers",
            StageKind::Orders => "Migrate orders",
            StageKind::Inventory => "Migrate inventory",
            StageKind::Verification => "Verify migration",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageKind::Validation => "validation",
            StageKind::Backup => "backup",
            StageKind::Products => "products",
            StageKind::Customers => "customers",
            StageKind::Orders => "orders",
            StageKind::Inventory => "inventory",
            StageKind::Verification => "verification",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Failed)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::Running => write!(f, "running"),
            StepStatus::Completed => write!(f, "completed"),
            StepStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationStep {
    pub id: Uuid,
    pub kind: StageKind,
    pub name: String,
    pub status: StepStatus,
    /// 0..=100, never decreases
    pub progress: u8,
    pub estimated_time_seconds: u64,
    /// Records handled by this stage
    pub record_count: usize,
    /// Mode actually used; set when the stage starts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_mode: Option<ExecutionMode>,
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl MigrationStep {
    pub fn new(kind: StageKind, record_count: usize, estimated_time_seconds: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            name: kind.display_name().to_string(),
            status: StepStatus::Pending,
            progress: 0,
            estimated_time_seconds,
            record_count,
            execution_mode: None,
            errors: Vec::new(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn start(&mut self) -> DomainResult<()> {
        self.transition(StepStatus::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    pub fn complete(&mut self) -> DomainResult<()> {
        self.transition(StepStatus::Completed)?;
        self.progress = 100;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Terminal failure. The step still counts as fully progressed so the
    /// plan-level mean reaches 100 once every stage has run.
    pub fn fail(&mut self, error: impl Into<String>) -> DomainResult<()> {
        self.transition(StepStatus::Failed)?;
        self.errors.push(error.into());
        self.progress = 100;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Clamped to 100; lower values than the current one are ignored
    pub fn set_progress(&mut self, progress: u8) {
        self.progress = self.progress.max(progress.min(100));
    }

    pub fn push_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    fn transition(&mut self, to: StepStatus) -> DomainResult<()> {
        let allowed = matches!(
            (self.status, to),
            (StepStatus::Pending, StepStatus::Running)
                | (StepStatus::Running, StepStatus::Completed)
                | (StepStatus::Running, StepStatus::Failed)
        );
        if !allowed {
            return Err(DomainError::IllegalTransition {
                step: self.kind.to_string(),
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        Ok(())
    }
}

/// User options for plan creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationOptions {
    /// Requested resource kinds; stages follow `ResourceKind::ALL` order
    pub resources: Vec<ResourceKind>,
    #[serde(default)]
    pub priority: Priority,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            resources: vec![ResourceKind::Product],
            priority: Priority::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationPlan {
    pub id: Uuid,
    pub stages: Vec<MigrationStep>,
    pub total_records: usize,
    pub estimated_duration_seconds: u64,
    pub strategy: MigrationStrategy,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
}

impl MigrationPlan {
    pub fn new(
        stages: Vec<MigrationStep>,
        total_records: usize,
        strategy: MigrationStrategy,
        priority: Priority,
    ) -> Self {
        let estimated_duration_seconds = stages.iter().map(|s| s.estimated_time_seconds).sum();
        Self {
            id: Uuid::new_v4(),
            stages,
            total_records,
            estimated_duration_seconds,
            strategy,
            priority,
            created_at: Utc::now(),
        }
    }

    /// Arithmetic mean of step progress values, not weighted by records
    pub fn overall_progress(&self) -> f64 {
        if self.stages.is_empty() {
            return 0.0;
        }
        let sum: u32 = self.stages.iter().map(|s| u32::from(s.progress)).sum();
        f64::from(sum) / self.stages.len() as f64
    }

    pub fn step(&self, kind: StageKind) -> Option<&MigrationStep> {
        self.stages.iter().find(|s| s.kind == kind)
    }

    pub fn step_mut(&mut self, kind: StageKind) -> DomainResult<&mut MigrationStep> {
        self.stages
            .iter_mut()
            .find(|s| s.kind == kind)
            .ok_or_else(|| DomainError::StageNotFound(kind.to_string()))
    }

    /// Resources written by this plan, in stage order
    pub fn resources(&self) -> Vec<ResourceKind> {
        self.stages.iter().filter_map(|s| s.kind.resource()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> MigrationPlan {
        MigrationPlan::new(
            vec![
                MigrationStep::new(StageKind::Validation, 10, 5),
                MigrationStep::new(StageKind::Products, 10, 60),
                MigrationStep::new(StageKind::Verification, 10, 5),
            ],
            10,
            MigrationStrategy::Batch,
            Priority::Balanced,
        )
    }

    #[test]
    fn test_step_lifecycle_is_monotonic() {
        let mut step = MigrationStep::new(StageKind::Products, 3, 60);
        assert!(step.complete().is_err(), "pending cannot complete");

        step.start().expect("pending -> running");
        step.complete().expect("running -> completed");
        assert_eq!(step.progress, 100);

        let err = step.start().unwrap_err();
        assert!(matches!(err, DomainError::IllegalTransition { .. }));
        assert_eq!(step.status, StepStatus::Completed);
    }

    #[test]
    fn test_progress_never_decreases() {
        let mut step = MigrationStep::new(StageKind::Customers, 3, 60);
        step.set_progress(60);
        step.set_progress(20);
        assert_eq!(step.progress, 60);
        step.set_progress(250);
        assert_eq!(step.progress, 100);
    }

    #[test]
    fn test_overall_progress_is_mean() {
        let mut plan = plan();
        plan.step_mut(StageKind::Validation).expect("stage").set_progress(100);
        plan.step_mut(StageKind::Products).expect("stage").set_progress(50);
        assert!((plan.overall_progress() - 50.0).abs() < f64::EPSILON);
        assert_eq!(plan.estimated_duration_seconds, 70);
        assert_eq!(plan.resources(), vec![ResourceKind::Product]);
    }

    #[test]
    fn test_missing_stage() {
        let mut plan = plan();
        assert!(matches!(
            plan.step_mut(StageKind::Orders),
            Err(DomainError::StageNotFound(_))
        ));
    }
}
