//! Post-run report: summary, throughput, issue buckets and recommendations

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use domain::{ErrorCategory, MigrationPlan, MigrationProgress, MigrationStatus, MigrationStrategy};

const ISSUE_EXAMPLES: usize = 3;
const MIN_SUCCESS_RATE: f64 = 95.0;
const MIN_RECORDS_PER_MINUTE: f64 = 50.0;
const MAX_ESTIMATE_OVERRUN: f64 = 1.5;

/// Substring → bucket name, checked in order
const ISSUE_BUCKETS: [(&str, &str); 3] = [
    ("rate limit", "Rate limit"),
    ("validation", "Validation"),
    ("duplicate", "Duplicate"),
];
const OTHER_BUCKET: &str = "Other";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub plan_id: Uuid,
    pub strategy: MigrationStrategy,
    pub status: MigrationStatus,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub success_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub actual_duration_seconds: f64,
    pub estimated_duration_seconds: u64,
    pub records_per_minute: f64,
    /// actual / estimated; 0 when nothing was estimated
    pub estimated_vs_actual: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueBucket {
    pub category: String,
    pub count: usize,
    pub examples: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    DataQuality,
    BulkStrategy,
    ReduceBatchSize,
    OffPeakScheduling,
    ManualRemediation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub kind: RecommendationKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationReport {
    pub summary: ReportSummary,
    pub performance: PerformanceMetrics,
    pub issues: Vec<IssueBucket>,
    pub recommendations: Vec<Recommendation>,
}

pub fn report(progress: &MigrationProgress, plan: &MigrationPlan) -> MigrationReport {
    let success_rate = if progress.total == 0 {
        100.0
    } else {
        progress.completed as f64 / progress.total as f64 * 100.0
    };

    // sub-second runs count as one second
    let actual_seconds = progress.duration_seconds().unwrap_or(0.0);
    let records_per_minute = progress.completed as f64 / (actual_seconds.max(1.0) / 60.0);
    let estimated_vs_actual = if plan.estimated_duration_seconds == 0 {
        0.0
    } else {
        actual_seconds / plan.estimated_duration_seconds as f64
    };

    let issues = bucket_issues(progress);
    let mut recommendations = Vec::new();

    if success_rate < MIN_SUCCESS_RATE {
        recommendations.push(Recommendation {
            kind: RecommendationKind::DataQuality,
            message: format!(
                "Only {success_rate:.1}% of records migrated; review the source data and field mapping before re-running"
            ),
        });
    }
    if progress.completed >= 1 && records_per_minute < MIN_RECORDS_PER_MINUTE {
        recommendations.push(Recommendation {
            kind: RecommendationKind::BulkStrategy,
            message: format!(
                "Throughput was {records_per_minute:.1} records/minute; the bulk strategy is faster for large catalogues"
            ),
        });
    }
    if issues.iter().any(|b| b.category == ISSUE_BUCKETS[0].1) {
        recommendations.push(Recommendation {
            kind: RecommendationKind::ReduceBatchSize,
            message: "Rate limit errors occurred; lower the batch size or the refill rate".to_string(),
        });
    }
    if estimated_vs_actual > MAX_ESTIMATE_OVERRUN {
        recommendations.push(Recommendation {
            kind: RecommendationKind::OffPeakScheduling,
            message: format!(
                "The run took {estimated_vs_actual:.1}x the estimate; schedule large migrations off-peak"
            ),
        });
    }
    let permanent = progress
        .errors
        .iter()
        .filter(|e| e.category == ErrorCategory::Permanent)
        .count();
    if permanent > 0 {
        recommendations.push(Recommendation {
            kind: RecommendationKind::ManualRemediation,
            message: format!("{permanent} operations failed permanently and need manual remediation"),
        });
    }

    MigrationReport {
        summary: ReportSummary {
            plan_id: plan.id,
            strategy: plan.strategy,
            status: progress.status,
            total: progress.total,
            completed: progress.completed,
            failed: progress.failed,
            success_rate,
        },
        performance: PerformanceMetrics {
            actual_duration_seconds: actual_seconds,
            estimated_duration_seconds: plan.estimated_duration_seconds,
            records_per_minute,
            estimated_vs_actual,
        },
        issues,
        recommendations,
    }
}

fn bucket_issues(progress: &MigrationProgress) -> Vec<IssueBucket> {
    let mut buckets: Vec<IssueBucket> = ISSUE_BUCKETS
        .iter()
        .map(|(_, name)| *name)
        .chain(std::iter::once(OTHER_BUCKET))
        .map(|name| IssueBucket {
            category: name.to_string(),
            count: 0,
            examples: Vec::new(),
        })
        .collect();

    for error in &progress.errors {
        let message = error.error_message.to_lowercase();
        let slot = ISSUE_BUCKETS
            .iter()
            .position(|(needle, _)| message.contains(needle))
            .unwrap_or(ISSUE_BUCKETS.len());
        let bucket = &mut buckets[slot];
        bucket.count += 1;
        if bucket.examples.len() < ISSUE_EXAMPLES {
            bucket.examples.push(error.error_message.clone());
        }
    }

    buckets.retain(|b| b.count > 0);
    buckets
}
