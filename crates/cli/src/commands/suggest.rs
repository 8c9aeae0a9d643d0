use anyhow::Result;
use clap::Args;
use console::style;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use common::MigrationConfig;
use domain::{FieldMapping, FieldMappings};
use llm::{LlmClient, LlmMappingSuggester, MappingSuggester, RuleBasedSuggester};

use crate::input;
use crate::progress::ProgressType;

/// Detect the export schema and propose a field mapping
#[derive(Debug, Args)]
pub struct SuggestCommand {
    /// JSON array of sample rows (plain or tagged)
    #[arg(long)]
    pub sample: PathBuf,

    /// Use only the keyword rules, never call a model
    #[arg(long)]
    pub offline: bool,

    /// Drop suggestions below this confidence (0-100)
    #[arg(long, default_value_t = 0)]
    pub min_confidence: u8,

    /// Write the mapping file here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl SuggestCommand {
    pub async fn execute(self, config: &MigrationConfig) -> Result<()> {
        let rows = input::load_rows(&self.sample)?;
        let suggester = self.suggester(config);

        let spinner = ProgressType::Suggest.create_spinner("Detecting schema...");
        let schema = match suggester.detect_schema(&rows).await {
            Ok(schema) => schema,
            Err(e) => {
                spinner.finish_error("schema detection failed");
                return Err(e.into());
            }
        };

        spinner.set_message(&format!(
            "Suggesting mappings for {} fields ({} export)...",
            schema.fields.len(),
            schema.detected_source
        ));
        let suggestions = suggester
            .suggest_mappings(&schema.field_names(), &rows, &schema.detected_source)
            .await?;

        let kept: Vec<FieldMapping> = suggestions
            .into_iter()
            .filter(|s| s.confidence >= self.min_confidence)
            .map(FieldMapping::from)
            .collect();
        let mappings = FieldMappings::new(kept)?;

        spinner.set_message("Reviewing sample data...");
        let review = suggester.validate_data(&rows, &mappings).await?;
        spinner.finish_success(&format!(
            "{} mapped of {} fields, source looks like {}",
            mappings.active().count(),
            schema.fields.len(),
            schema.detected_source
        ));

        for error in &review.errors {
            eprintln!("  {} {}", style("error:").red().bold(), error);
        }
        for warning in &review.warnings {
            eprintln!("  {} {}", style("warning:").yellow(), warning);
        }
        if let Some(path) = &self.output {
            info!(path = %path.display(), mappings = mappings.len(), "writing mapping file");
        }

        input::write_json(self.output.as_deref(), &mappings)
    }

    fn suggester(&self, config: &MigrationConfig) -> Box<dyn MappingSuggester> {
        if self.offline {
            return Box::new(RuleBasedSuggester::new());
        }
        match LlmClient::from_env() {
            Ok(client) => {
                info!(provider = %client.provider_name(), "using model-backed suggestions");
                Box::new(LlmMappingSuggester::new(
                    Arc::new(client),
                    config.suggestion.clone(),
                ))
            }
            Err(e) => {
                warn!(error = %e, "no model configured, using keyword rules");
                Box::new(RuleBasedSuggester::new())
            }
        }
    }
}
