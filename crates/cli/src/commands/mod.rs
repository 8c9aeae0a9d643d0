pub mod migrate;
pub mod plan;
pub mod suggest;
pub mod verify;

pub use migrate::MigrateCommand;
pub use plan::PlanCommand;
pub use suggest::SuggestCommand;
pub use verify::VerifyCommand;

use anyhow::Result;
use clap::Args;
use console::style;
use prettytable::{row, Table};
use std::io::{self, Write};
use std::path::PathBuf;

use domain::{FieldMappings, MigrationOptions, MigrationPlan, Priority, ResourceKind, SourceRecord};

use crate::input;

/// Inputs shared by `plan` and `migrate`
#[derive(Debug, Args)]
pub struct RunArgs {
    /// JSON array of records (tagged, or plain rows with --resource)
    #[arg(long)]
    pub records: PathBuf,

    /// Resource kind for rows without a tag
    #[arg(long)]
    pub resource: Option<ResourceKind>,

    /// Mapping file, as written by `suggest`
    #[arg(long)]
    pub mappings: PathBuf,

    /// Resources to migrate, comma separated; defaults to every kind in the input
    #[arg(long, value_delimiter = ',')]
    pub resources: Vec<ResourceKind>,

    /// speed, balanced or reliability
    #[arg(long, default_value = "balanced")]
    pub priority: Priority,
}

impl RunArgs {
    pub fn load(&self) -> Result<(Vec<SourceRecord>, FieldMappings, MigrationOptions)> {
        let records = input::load_records(&self.records, self.resource)?;
        let mappings = input::load_mappings(&self.mappings)?;
        let options = MigrationOptions {
            resources: input::requested_resources(&self.resources, &records),
            priority: self.priority,
        };
        Ok((records, mappings, options))
    }
}

pub(crate) fn print_plan(out: &mut dyn Write, plan: &MigrationPlan) -> io::Result<()> {
    writeln!(out, "{} {}", style("Migration plan").bold(), style(plan.id).dim())?;
    writeln!(
        out,
        "  strategy {}, priority {}, {} records, about {}s",
        style(plan.strategy).cyan(),
        plan.priority,
        plan.total_records,
        plan.estimated_duration_seconds
    )?;

    let mut table = Table::new();
    table.set_titles(row!["#", "Stage", "Records", "Estimate (s)", "Status"]);
    for (index, step) in plan.stages.iter().enumerate() {
        table.add_row(row![
            index + 1,
            step.name,
            step.record_count,
            step.estimated_time_seconds,
            step.status
        ]);
    }
    table.print(out)?;
    Ok(())
}
