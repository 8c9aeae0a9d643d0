//! Strategy selection, stage layout and advisory time estimates

use std::collections::BTreeMap;
use tracing::info;

use domain::{
    ExecutionMode, MigrationOptions, MigrationPlan, MigrationStep, MigrationStrategy, Priority,
    ResourceKind, SourceRecord, StageKind,
};

/// Above this many records bulk jobs become worthwhile
pub const BULK_RECORD_THRESHOLD: usize = 10_000;
/// Above this many records batching alone gets slow
pub const HYBRID_RECORD_THRESHOLD: usize = 1_000;

const VALIDATION_RECORDS_PER_MINUTE: u64 = 10_000;
const VERIFICATION_RECORDS_PER_MINUTE: u64 = 5_000;
const BACKUP_SECONDS_PER_RESOURCE: u64 = 60;

pub fn select_strategy(record_count: usize, priority: Priority) -> MigrationStrategy {
    if record_count > BULK_RECORD_THRESHOLD {
        if priority == Priority::Speed {
            MigrationStrategy::Bulk
        } else {
            MigrationStrategy::Hybrid
        }
    } else if record_count > HYBRID_RECORD_THRESHOLD {
        if priority == Priority::Reliability {
            MigrationStrategy::Batch
        } else {
            MigrationStrategy::Hybrid
        }
    } else {
        MigrationStrategy::Batch
    }
}

/// Expected throughput in records per minute
pub fn rate_per_minute(strategy: MigrationStrategy, resource: ResourceKind) -> u64 {
    use MigrationStrategy::*;
    use ResourceKind::*;

    match (strategy, resource) {
        (Bulk, Product) => 1_000,
        (Bulk, Customer) => 1_500,
        (Bulk, Order) => 600,
        (Bulk, Inventory) => 2_000,
        (Hybrid, Product) => 400,
        (Hybrid, Customer) => 500,
        (Hybrid, Order) => 250,
        (Hybrid, Inventory) => 800,
        (Batch, Product) => 100,
        (Batch, Customer) => 120,
        (Batch, Order) => 60,
        (Batch, Inventory) => 200,
    }
}

/// `ceil(records / rate_per_minute) · 60` seconds
pub fn estimate_seconds(records: usize, strategy: MigrationStrategy, resource: ResourceKind) -> u64 {
    minutes_at(records, rate_per_minute(strategy, resource)) * 60
}

/// Mode a single stage runs in. HYBRID stages go bulk at `hybrid_bulk_threshold` records.
pub fn resolve_mode(
    strategy: MigrationStrategy,
    stage_records: usize,
    hybrid_bulk_threshold: usize,
) -> ExecutionMode {
    match strategy {
        MigrationStrategy::Bulk => ExecutionMode::Bulk,
        MigrationStrategy::Batch => ExecutionMode::Batch,
        MigrationStrategy::Hybrid if stage_records >= hybrid_bulk_threshold => ExecutionMode::Bulk,
        MigrationStrategy::Hybrid => ExecutionMode::Batch,
    }
}

/// Records per requested resource, in stage order. Records of resources
/// that were not requested are not counted.
pub fn count_by_resource(
    records: &[SourceRecord],
    options: &MigrationOptions,
) -> BTreeMap<ResourceKind, usize> {
    let mut counts: BTreeMap<ResourceKind, usize> = ResourceKind::ALL
        .iter()
        .filter(|kind| options.resources.contains(*kind))
        .map(|kind| (*kind, 0))
        .collect();
    for record in records {
        if let Some(count) = counts.get_mut(&record.resource) {
            *count += 1;
        }
    }
    counts
}

pub fn build_plan(records: &[SourceRecord], options: &MigrationOptions) -> MigrationPlan {
    let counts = count_by_resource(records, options);
    let total: usize = counts.values().sum();
    let strategy = select_strategy(total, options.priority);

    let mut stages = Vec::with_capacity(counts.len() + 3);
    stages.push(MigrationStep::new(
        StageKind::Validation,
        total,
        minutes_at(total, VALIDATION_RECORDS_PER_MINUTE) * 60,
    ));
    stages.push(MigrationStep::new(
        StageKind::Backup,
        total,
        BACKUP_SECONDS_PER_RESOURCE * counts.len() as u64,
    ));
    for (resource, count) in &counts {
        stages.push(MigrationStep::new(
            StageKind::for_resource(*resource),
            *count,
            estimate_seconds(*count, strategy, *resource),
        ));
    }
    stages.push(MigrationStep::new(
        StageKind::Verification,
        total,
        minutes_at(total, VERIFICATION_RECORDS_PER_MINUTE) * 60,
    ));

    let plan = MigrationPlan::new(stages, total, strategy, options.priority);
    info!(
        plan_id = %plan.id,
        records = total,
        %strategy,
        priority = %options.priority,
        stages = plan.stages.len(),
        estimated_seconds = plan.estimated_duration_seconds,
        "migration plan created"
    );
    plan
}

fn minutes_at(records: usize, per_minute: u64) -> u64 {
    (records as u64).div_ceil(per_minute.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(10_001, Priority::Speed, MigrationStrategy::Bulk)]
    #[case(10_001, Priority::Balanced, MigrationStrategy::Hybrid)]
    #[case(10_001, Priority::Reliability, MigrationStrategy::Hybrid)]
    #[case(10_000, Priority::Speed, MigrationStrategy::Hybrid)]
    #[case(1_001, Priority::Reliability, MigrationStrategy::Batch)]
    #[case(1_001, Priority::Balanced, MigrationStrategy::Hybrid)]
    #[case(1_000, Priority::Speed, MigrationStrategy::Batch)]
    #[case(0, Priority::Balanced, MigrationStrategy::Batch)]
    fn test_select_strategy(#[case] count: usize, #[case] priority: Priority, #[case] expected: MigrationStrategy) {
        assert_eq!(select_strategy(count, priority), expected);
    }

    #[rstest]
    #[case(0, 0)]
    #[case(1, 60)]
    #[case(100, 60)]
    #[case(101, 120)]
    #[case(1_000, 600)]
    fn test_estimate_batch_products(#[case] records: usize, #[case] seconds: u64) {
        assert_eq!(estimate_seconds(records, MigrationStrategy::Batch, ResourceKind::Product), seconds);
    }

    #[rstest]
    #[case(MigrationStrategy::Hybrid, 4_999, ExecutionMode::Batch)]
    #[case(MigrationStrategy::Hybrid, 5_000, ExecutionMode::Bulk)]
    #[case(MigrationStrategy::Bulk, 3, ExecutionMode::Bulk)]
    #[case(MigrationStrategy::Batch, 50_000, ExecutionMode::Batch)]
    fn test_resolve_mode(#[case] strategy: MigrationStrategy, #[case] records: usize, #[case] mode: ExecutionMode) {
        assert_eq!(resolve_mode(strategy, records, 5_000), mode);
    }

    #[test]
    fn test_plan_stages_follow_fixed_order() {
        let records = vec![
            SourceRecord::new(ResourceKind::Order, Default::default()),
            SourceRecord::new(ResourceKind::Product, Default::default()),
            SourceRecord::new(ResourceKind::Product, Default::default()),
            SourceRecord::new(ResourceKind::Inventory, Default::default()),
        ];
        let options = MigrationOptions {
            resources: vec![ResourceKind::Order, ResourceKind::Product],
            priority: Priority::Balanced,
        };

        let plan = build_plan(&records, &options);
        let kinds: Vec<StageKind> = plan.stages.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                StageKind::Validation,
                StageKind::Backup,
                StageKind::Products,
                StageKind::Orders,
                StageKind::Verification
            ]
        );
        assert_eq!(plan.total_records, 3);
        assert_eq!(plan.strategy, MigrationStrategy::Batch);
        assert_eq!(plan.step(StageKind::Products).map(|s| s.record_count), Some(2));
        assert_eq!(
            plan.estimated_duration_seconds,
            plan.stages.iter().map(|s| s.estimated_time_seconds).sum::<u64>()
        );
    }
}
