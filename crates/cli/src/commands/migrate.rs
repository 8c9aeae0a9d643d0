use anyhow::{bail, Result};
use clap::Args;
use console::style;
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use commerce::{CommerceApi, HttpCommerceClient, InMemoryCommerceStore};
use common::MigrationConfig;
use domain::{MigrationPlan, MigrationProgress, MigrationStatus};
use orchestrator::{analytics, FieldError, IntegrityReport, MigrationOrchestrator, MigrationReport};

use super::{print_plan, RunArgs};
use crate::input;
use crate::progress::MigrationProgressBar;

/// Plan and execute a migration, then print the analytics report
#[derive(Debug, Args)]
pub struct MigrateCommand {
    #[command(flatten)]
    pub input: RunArgs,

    /// Run against an in-memory store instead of the live API
    #[arg(long)]
    pub dry_run: bool,

    /// Write the JSON report here instead of stdout
    #[arg(short, long)]
    pub report: Option<PathBuf>,
}

#[derive(Serialize)]
struct RunReport<'a> {
    report: MigrationReport,
    plan: &'a MigrationPlan,
    progress: &'a MigrationProgress,
    #[serde(skip_serializing_if = "Option::is_none")]
    integrity: Option<&'a IntegrityReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    backup_records: Option<usize>,
    warnings: &'a [FieldError],
}

impl MigrateCommand {
    pub async fn execute(self, config: &MigrationConfig) -> Result<()> {
        let (records, mappings, options) = self.input.load()?;

        let api: Arc<dyn CommerceApi> = if self.dry_run {
            info!("dry run against an in-memory store");
            Arc::new(InMemoryCommerceStore::new())
        } else {
            Arc::new(HttpCommerceClient::from_env()?)
        };
        let orchestrator = Arc::new(MigrationOrchestrator::new(api, config.clone()));

        let plan = orchestrator.create_plan(&records, &mappings, &options);
        print_plan(&mut io::stderr(), &plan)?;

        let interrupt = {
            let orchestrator = orchestrator.clone();
            let plan_id = plan.id;
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!(%plan_id, "interrupt received, cancelling migration");
                    orchestrator.cancel(plan_id);
                }
            })
        };

        let bar = MigrationProgressBar::new();
        let result = orchestrator
            .execute(plan.id, &records, &mappings, Some(bar.callback()))
            .await;
        interrupt.abort();
        let outcome = result?;
        bar.finish(outcome.progress.status);

        let report = analytics::report(&outcome.progress, &outcome.plan);
        print_summary(&report, outcome.integrity.as_ref());

        input::write_json(
            self.report.as_deref(),
            &RunReport {
                report,
                plan: &outcome.plan,
                progress: &outcome.progress,
                integrity: outcome.integrity.as_ref(),
                backup_records: outcome.backup.as_ref().map(|b| b.record_count()),
                warnings: &outcome.warnings,
            },
        )?;

        if outcome.progress.status == MigrationStatus::Failed {
            bail!("migration {} failed", outcome.plan.id);
        }
        Ok(())
    }
}

fn print_summary(report: &MigrationReport, integrity: Option<&IntegrityReport>) {
    let summary = &report.summary;
    let performance = &report.performance;

    let rate = format!("{:.1}%", summary.success_rate);
    let rate = if summary.failed == 0 {
        style(rate).green()
    } else {
        style(rate).yellow()
    };
    eprintln!(
        "\n{} {}/{} records migrated ({} success), {} failed",
        style("Summary:").bold(),
        summary.completed,
        summary.total,
        rate,
        summary.failed
    );
    eprintln!(
        "  {:.1}s elapsed (estimated {}s), {:.0} records/min",
        performance.actual_duration_seconds,
        performance.estimated_duration_seconds,
        performance.records_per_minute
    );

    for bucket in &report.issues {
        eprintln!("  {} {} x{}", style("issue").red(), bucket.category, bucket.count);
        for example in &bucket.examples {
            eprintln!("      {}", style(example).dim());
        }
    }
    for recommendation in &report.recommendations {
        eprintln!("  {} {}", style("hint").cyan(), recommendation.message);
    }

    if let Some(integrity) = integrity {
        let line = format!(
            "integrity {:.1}%, {} missing, {} inconsistent",
            integrity.integrity_percent,
            integrity.missing_records.len(),
            integrity.inconsistencies.len()
        );
        if integrity.is_clean() {
            eprintln!("  {}", style(line).green());
        } else {
            eprintln!("  {}", style(line).yellow());
        }
    }
}
