//! Migration Orchestrator - plan creation and staged execution
//!
//! Stages run strictly in sequence:
//!
//! ```text
//! validation → backup → products → customers → orders → inventory → verification
//!                        └──────── only the requested resources ────────┘
//! ```
//!
//! Any invalid record aborts the run at validation with zero completions.
//! Backup and per-resource failures are recorded on their step and the run
//! continues. Every status or progress change is pushed to the optional
//! [`ProgressCallback`] and published on the [`ProgressHub`].

use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use commerce::CommerceApi;
use common::{MigrationConfig, OperationTimer, RunContext};
use domain::{
    DomainResult, ErrorCategory, ExecutionMode, FieldMappings, MigrationOptions, MigrationPlan,
    MigrationProgress, MigrationStatus, Operation, OperationError, RecordData, ResourceKind,
    SourceRecord, StageKind, StepStatus,
};

use crate::bulk::BulkExecutor;
use crate::error::{MigrationError, MigrationResult};
use crate::executor::BatchExecutor;
use crate::planner;
use crate::progress::{ProgressCallback, ProgressHub, ProgressUpdate};
use crate::reliability::{RateLimiter, RetryQueue};
use crate::transformer::{self, FieldError, ValidationReport};
use crate::verifier::{IntegrityReport, IntegrityVerifier};

type PlanStore = Arc<DashMap<Uuid, MigrationPlan>>;

/// Step errors kept per stage; the full list lives in the run progress
const MAX_STEP_ERRORS: usize = 20;

/// Target-store contents captured before the first write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupSnapshot {
    pub taken_at: DateTime<Utc>,
    pub resources: BTreeMap<ResourceKind, Vec<RecordData>>,
}

impl BackupSnapshot {
    pub fn record_count(&self) -> usize {
        self.resources.values().map(Vec::len).sum()
    }
}

/// Final state of one executed plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationOutcome {
    pub plan: MigrationPlan,
    pub progress: MigrationProgress,
    pub backup: Option<BackupSnapshot>,
    pub integrity: Option<IntegrityReport>,
    /// Mapping and duplicate-SKU warnings from the validation stage
    pub warnings: Vec<FieldError>,
}

pub struct MigrationOrchestrator {
    api: Arc<dyn CommerceApi>,
    config: MigrationConfig,
    plans: PlanStore,
    cancellations: DashMap<Uuid, CancellationToken>,
    started: DashSet<Uuid>,
    hub: Arc<ProgressHub>,
}

impl MigrationOrchestrator {
    pub fn new(api: Arc<dyn CommerceApi>, config: MigrationConfig) -> Self {
        Self::with_hub(api, config, Arc::new(ProgressHub::default()))
    }

    pub fn with_hub(api: Arc<dyn CommerceApi>, config: MigrationConfig, hub: Arc<ProgressHub>) -> Self {
        Self {
            api,
            config,
            plans: Arc::new(DashMap::new()),
            cancellations: DashMap::new(),
            started: DashSet::new(),
            hub,
        }
    }

    pub fn hub(&self) -> &Arc<ProgressHub> {
        &self.hub
    }

    /// Build and register a plan. The mapping does not shape the plan; its
    /// duplicate targets are reported early so they can be fixed before execution.
    pub fn create_plan(
        &self,
        records: &[SourceRecord],
        mappings: &FieldMappings,
        options: &MigrationOptions,
    ) -> MigrationPlan {
        for target in mappings.duplicate_targets() {
            warn!(target_field = %target, "several source fields map to the same target");
        }
        let plan = planner::build_plan(records, options);
        self.cancellations.insert(plan.id, CancellationToken::new());
        self.plans.insert(plan.id, plan.clone());
        plan
    }

    /// Latest known state of a plan, including step progress of a running execution
    pub fn get_plan(&self, plan_id: Uuid) -> Option<MigrationPlan> {
        self.plans.get(&plan_id).map(|p| p.value().clone())
    }

    /// Request cancellation; takes effect between batches
    pub fn cancel(&self, plan_id: Uuid) -> bool {
        match self.cancellations.get(&plan_id) {
            Some(token) => {
                info!(%plan_id, "migration cancellation requested");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Drop every record of a plan; returns its last known state
    pub fn forget(&self, plan_id: Uuid) -> Option<MigrationPlan> {
        self.cancellations.remove(&plan_id);
        self.started.remove(&plan_id);
        self.hub.close(plan_id);
        self.plans.remove(&plan_id).map(|(_, plan)| plan)
    }

    pub fn subscribe(&self, plan_id: Uuid) -> broadcast::Receiver<ProgressUpdate> {
        self.hub.subscribe(plan_id)
    }

    /// Run every stage of a plan once. Validation failure and cancellation
    /// end in a FAILED outcome rather than an error.
    pub async fn execute(
        &self,
        plan_id: Uuid,
        records: &[SourceRecord],
        mappings: &FieldMappings,
        callback: Option<ProgressCallback>,
    ) -> MigrationResult<MigrationOutcome> {
        let plan = self.get_plan(plan_id).ok_or(MigrationError::PlanNotFound(plan_id))?;
        if !self.started.insert(plan_id) {
            return Err(MigrationError::AlreadyExecuted(plan_id));
        }
        let cancel = self
            .cancellations
            .entry(plan_id)
            .or_insert_with(CancellationToken::new)
            .clone();

        let context = RunContext::new(plan_id);
        let result = self
            .run(plan, records, mappings, callback, cancel)
            .instrument(context.span())
            .await;

        self.hub.close(plan_id);
        self.cancellations.remove(&plan_id);
        match result {
            Ok(outcome) => {
                self.plans.insert(plan_id, outcome.plan.clone());
                Ok(outcome)
            }
            Err(e) => {
                error!(%plan_id, error = %e, "migration run aborted");
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        plan: MigrationPlan,
        records: &[SourceRecord],
        mappings: &FieldMappings,
        callback: Option<ProgressCallback>,
        cancel: CancellationToken,
    ) -> MigrationResult<MigrationOutcome> {
        let timer = OperationTimer::new("migration_run");
        let resources = plan.resources();
        let scoped: Vec<SourceRecord> = records
            .iter()
            .filter(|r| resources.contains(&r.resource))
            .cloned()
            .collect();
        if scoped.len() != records.len() {
            debug!(skipped = records.len() - scoped.len(), "records of unrequested resources ignored");
        }

        let mut progress = MigrationProgress::new(scoped.len());
        progress.start();
        info!(
            plan_id = %plan.id,
            records = scoped.len(),
            strategy = %plan.strategy,
            "migration run started"
        );
        let tracker = Arc::new(RunTracker::new(
            plan,
            progress,
            callback,
            self.hub.clone(),
            self.plans.clone(),
        ));
        tracker.notify(None);

        // validation
        tracker.update(Some(StageKind::Validation), |s| s.step_start(StageKind::Validation))?;
        let report = transformer::validate_records(&scoped, mappings);
        for warning in &report.warnings {
            warn!(field = %warning.field, message = %warning.message, "validation warning");
        }
        if !report.is_valid() {
            self.abort_on_validation(&tracker, &report)?;
            return Ok(tracker.into_outcome(None, None, report.warnings));
        }
        tracker.update(Some(StageKind::Validation), |s| s.plan.step_mut(StageKind::Validation)?.complete())?;

        // backup
        let backup = self.backup(&tracker, &resources).await?;

        // resource stages
        let rate_limiter = Arc::new(RateLimiter::from_config(&self.config.rate_limit));
        let retry_queue = Arc::new(RetryQueue::from_config(&self.config.retry));
        let mut migrated: Vec<RecordData> = Vec::with_capacity(report.valid_data.len());

        for resource in &resources {
            let resource = *resource;
            if cancel.is_cancelled() {
                break;
            }
            // validation passed, so valid_data lines up with the scoped input
            let stage_records: Vec<(Option<String>, RecordData)> = scoped
                .iter()
                .zip(&report.valid_data)
                .filter(|(original, _)| original.resource == resource)
                .map(|(original, transformed)| (original.external_id(), transformed.data.clone()))
                .collect();
            migrated.extend(stage_records.iter().map(|(_, data)| data.clone()));

            self.run_resource_stage(&tracker, resource, stage_records, &rate_limiter, &retry_queue, &cancel)
                .await?;
        }

        if cancel.is_cancelled() {
            warn!("migration cancelled, remaining stages skipped");
            tracker.update(None, |s| {
                for step in s.plan.stages.iter_mut().filter(|st| st.status == StepStatus::Pending) {
                    step.start()?;
                    step.fail("cancelled")?;
                }
                s.progress.finish(MigrationStatus::Failed);
                Ok::<_, domain::DomainError>(())
            })?;
            timer.finish();
            return Ok(tracker.into_outcome(backup, None, report.warnings));
        }

        // verification
        let integrity = self.verify(&tracker, &resources, &migrated).await?;

        tracker.update(None, |s| s.progress.finish(MigrationStatus::Completed));
        let outcome = tracker.into_outcome(backup, integrity, report.warnings);
        info!(
            plan_id = %outcome.plan.id,
            completed = outcome.progress.completed,
            failed = outcome.progress.failed,
            "migration run finished"
        );
        timer.finish();
        Ok(outcome)
    }

    fn abort_on_validation(&self, tracker: &RunTracker, report: &ValidationReport) -> MigrationResult<()> {
        let invalid = report.invalid_rows();
        error!(invalid_rows = invalid, errors = report.errors.len(), "validation failed, migration aborted");

        tracker.update(Some(StageKind::Validation), |s| {
            let total = s.progress.total;
            let step = s.plan.step_mut(StageKind::Validation)?;
            for row_error in report.errors.iter().take(MAX_STEP_ERRORS) {
                step.push_error(format!("row {}: {}", row_error.row, row_error.error));
            }
            step.fail(format!("{invalid} of {total} records failed validation"))?;

            s.progress.fail_remaining(OperationError::synthetic(
                format!("validation failed: {invalid} of {total} records invalid, nothing was migrated"),
                ErrorCategory::Validation,
            ));
            s.progress.errors.extend(report.errors.iter().map(|row_error| {
                OperationError::synthetic(
                    format!("validation failed at row {}: {}", row_error.row, row_error.error),
                    ErrorCategory::Validation,
                )
            }));
            s.progress.finish(MigrationStatus::Failed);
            Ok::<_, domain::DomainError>(())
        })?;
        Ok(())
    }

    async fn backup(
        &self,
        tracker: &RunTracker,
        resources: &[ResourceKind],
    ) -> MigrationResult<Option<BackupSnapshot>> {
        tracker.update(Some(StageKind::Backup), |s| s.step_start(StageKind::Backup))?;

        let mut snapshot = BackupSnapshot {
            taken_at: Utc::now(),
            resources: BTreeMap::new(),
        };
        let mut failures = Vec::new();

        for (done, resource) in resources.iter().enumerate() {
            match self.api.list_resources(*resource).await {
                Ok(existing) => {
                    debug!(%resource, records = existing.len(), "backed up existing records");
                    snapshot.resources.insert(*resource, existing);
                }
                Err(e) => {
                    warn!(%resource, error = %e, "backup failed, continuing without it");
                    failures.push(format!("{}: {e}", resource.plural()));
                }
            }
            let percent = ((done + 1) * 100 / resources.len().max(1)) as u8;
            tracker.update(Some(StageKind::Backup), |s| {
                s.plan.step_mut(StageKind::Backup).map(|step| step.set_progress(percent))
            })?;
        }

        tracker.update(Some(StageKind::Backup), |s| {
            let step = s.plan.step_mut(StageKind::Backup)?;
            if failures.is_empty() {
                step.complete()
            } else {
                for failure in &failures {
                    step.push_error(failure.clone());
                }
                step.fail(format!("backup failed for {} resource(s)", failures.len()))
            }
        })?;

        if failures.is_empty() {
            info!(records = snapshot.record_count(), "backup taken");
            Ok(Some(snapshot))
        } else {
            Ok(None)
        }
    }

    async fn run_resource_stage(
        &self,
        tracker: &Arc<RunTracker>,
        resource: ResourceKind,
        stage_records: Vec<(Option<String>, RecordData)>,
        rate_limiter: &Arc<RateLimiter>,
        retry_queue: &Arc<RetryQueue>,
        cancel: &CancellationToken,
    ) -> MigrationResult<()> {
        let kind = StageKind::for_resource(resource);
        let strategy = tracker.strategy();
        let mode = planner::resolve_mode(strategy, stage_records.len(), self.config.batch.hybrid_bulk_threshold);
        tracker.update(Some(kind), |s| {
            let step = s.plan.step_mut(kind)?;
            step.execution_mode = Some(mode);
            step.start()
        })?;
        info!(%resource, records = stage_records.len(), %mode, "stage started");

        let stage_progress = match mode {
            ExecutionMode::Batch => {
                let operations: Vec<Operation> = stage_records
                    .into_iter()
                    .map(|(external_id, payload)| Operation::upsert(resource, payload, external_id))
                    .collect();
                let observer_tracker = tracker.clone();
                let executor = BatchExecutor::new(
                    self.api.clone(),
                    rate_limiter.clone(),
                    retry_queue.clone(),
                    &self.config.batch,
                )
                .with_observer(Arc::new(move |stage: &MigrationProgress| {
                    observer_tracker.stage_tick(kind, stage)
                }));
                let mut stage_progress = executor.run(operations, cancel).await?;
                executor.retry_failed(&mut stage_progress, cancel).await;
                stage_progress
            }
            ExecutionMode::Bulk => {
                let payloads: Vec<RecordData> = stage_records
                    .into_iter()
                    .map(|(external_id, mut payload)| {
                        if let Some(id) = external_id {
                            payload.insert("id".into(), id.into());
                        }
                        payload
                    })
                    .collect();
                BulkExecutor::new(self.api.clone(), self.config.bulk.clone())
                    .run_bulk(resource, &payloads, cancel)
                    .await
            }
        };

        tracker.update(Some(kind), |s| {
            s.progress.absorb(&stage_progress)?;
            let step = s.plan.step_mut(kind)?;
            for failure in stage_progress.errors.iter().take(MAX_STEP_ERRORS) {
                step.push_error(failure.error_message.clone());
            }
            if stage_progress.status == MigrationStatus::Failed {
                step.fail(format!(
                    "{} of {} {} not migrated",
                    stage_progress.failed,
                    stage_progress.total,
                    resource.plural()
                ))
            } else {
                step.complete()
            }
        })?;
        info!(
            %resource,
            completed = stage_progress.completed,
            failed = stage_progress.failed,
            "stage finished"
        );
        Ok(())
    }

    async fn verify(
        &self,
        tracker: &RunTracker,
        resources: &[ResourceKind],
        migrated: &[RecordData],
    ) -> MigrationResult<Option<IntegrityReport>> {
        tracker.update(Some(StageKind::Verification), |s| s.step_start(StageKind::Verification))?;

        let mut remote = Vec::new();
        let mut failure = None;
        for resource in resources {
            match self.api.list_resources(*resource).await {
                Ok(records) => remote.extend(records),
                Err(e) => {
                    failure = Some(format!("could not list {}: {e}", resource.plural()));
                    break;
                }
            }
        }

        if let Some(message) = failure {
            warn!(error = %message, "verification skipped");
            tracker.update(Some(StageKind::Verification), |s| {
                s.plan.step_mut(StageKind::Verification)?.fail(message)
            })?;
            return Ok(None);
        }

        let report = IntegrityVerifier::from_config(&self.config.verification).verify(migrated, &remote);
        info!(
            integrity_percent = report.integrity_percent,
            missing = report.missing_records.len(),
            inconsistencies = report.inconsistencies.len(),
            "verification finished"
        );
        tracker.update(Some(StageKind::Verification), |s| {
            let step = s.plan.step_mut(StageKind::Verification)?;
            if !report.missing_records.is_empty() {
                step.push_error(format!("{} records missing in the target store", report.missing_records.len()));
            }
            if !report.inconsistencies.is_empty() {
                step.push_error(format!("{} records differ from the source", report.inconsistencies.len()));
            }
            step.complete()
        })?;
        Ok(Some(report))
    }
}

struct RunState {
    plan: MigrationPlan,
    progress: MigrationProgress,
}

impl RunState {
    fn step_start(&mut self, kind: StageKind) -> DomainResult<()> {
        self.plan.step_mut(kind)?.start()
    }
}

/// Shared run state; the lock is never held across an await or a callback
struct RunTracker {
    state: Mutex<RunState>,
    callback: Option<ProgressCallback>,
    hub: Arc<ProgressHub>,
    plans: PlanStore,
}

impl RunTracker {
    fn new(
        plan: MigrationPlan,
        progress: MigrationProgress,
        callback: Option<ProgressCallback>,
        hub: Arc<ProgressHub>,
        plans: PlanStore,
    ) -> Self {
        Self {
            state: Mutex::new(RunState { plan, progress }),
            callback,
            hub,
            plans,
        }
    }

    fn strategy(&self) -> domain::MigrationStrategy {
        self.state.lock().plan.strategy
    }

    /// Mutate the run state, then push one snapshot
    fn update<R>(&self, stage: Option<StageKind>, f: impl FnOnce(&mut RunState) -> R) -> R {
        let (result, update) = {
            let mut state = self.state.lock();
            let result = f(&mut state);
            self.plans.insert(state.plan.id, state.plan.clone());
            (result, ProgressUpdate::from_plan(&state.plan, stage, &state.progress))
        };
        self.emit(update);
        result
    }

    fn notify(&self, stage: Option<StageKind>) {
        self.update(stage, |_| ());
    }

    /// Batch observer: step progress follows the stage tally, the snapshot
    /// shows run totals including the stage in flight
    fn stage_tick(&self, kind: StageKind, stage: &MigrationProgress) {
        let update = {
            let mut state = self.state.lock();
            if let Ok(step) = state.plan.step_mut(kind) {
                step.set_progress(stage.percent_processed().floor() as u8);
            }
            self.plans.insert(state.plan.id, state.plan.clone());
            let mut snapshot = state.progress.clone();
            if let Err(e) = snapshot.absorb(stage) {
                debug!(error = %e, "stage tally does not fit the run total");
            }
            ProgressUpdate::from_plan(&state.plan, Some(kind), &snapshot)
        };
        self.emit(update);
    }

    fn emit(&self, update: ProgressUpdate) {
        if let Some(callback) = &self.callback {
            callback(&update);
        }
        self.hub.publish(update);
    }

    fn into_outcome(
        &self,
        backup: Option<BackupSnapshot>,
        integrity: Option<IntegrityReport>,
        warnings: Vec<FieldError>,
    ) -> MigrationOutcome {
        let state = self.state.lock();
        MigrationOutcome {
            plan: state.plan.clone(),
            progress: state.progress.clone(),
            backup,
            integrity,
            warnings,
        }
    }
}
