use anyhow::Result;
use clap::Args;
use std::io;
use std::sync::Arc;

use commerce::InMemoryCommerceStore;
use common::MigrationConfig;
use orchestrator::MigrationOrchestrator;

use super::{print_plan, RunArgs};
use crate::input;
use crate::progress::ProgressType;

/// Build and show a migration plan without executing it
#[derive(Debug, Args)]
pub struct PlanCommand {
    #[command(flatten)]
    pub input: RunArgs,

    /// Print the plan as JSON
    #[arg(long)]
    pub json: bool,
}

impl PlanCommand {
    pub async fn execute(self, config: &MigrationConfig) -> Result<()> {
        let (records, mappings, options) = self.input.load()?;

        let spinner = ProgressType::Fast.create_spinner("Planning...");
        // planning never touches the remote store
        let orchestrator = MigrationOrchestrator::new(Arc::new(InMemoryCommerceStore::new()), config.clone());
        let plan = orchestrator.create_plan(&records, &mappings, &options);
        spinner.finish_success(&format!("{} stages planned", plan.stages.len()));

        if self.json {
            return input::write_json(None, &plan);
        }
        print_plan(&mut io::stdout(), &plan)?;
        Ok(())
    }
}
