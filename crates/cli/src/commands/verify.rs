use anyhow::{bail, Result};
use clap::Args;
use console::style;
use std::path::PathBuf;

use common::MigrationConfig;
use domain::RecordData;
use orchestrator::{transform, IntegrityVerifier};

use crate::input;

/// Compare expected records with what the target store holds
#[derive(Debug, Args)]
pub struct VerifyCommand {
    /// Expected records, in target field names unless --mappings is given
    #[arg(long)]
    pub original: PathBuf,

    /// Records read back from the target store
    #[arg(long)]
    pub migrated: PathBuf,

    /// Apply this mapping to the original rows first
    #[arg(long)]
    pub mappings: Option<PathBuf>,

    /// Override the configured match keys, comma separated
    #[arg(long, value_delimiter = ',')]
    pub match_keys: Vec<String>,

    /// Override the configured critical fields, comma separated
    #[arg(long, value_delimiter = ',')]
    pub critical_fields: Vec<String>,

    /// Write the JSON report here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl VerifyCommand {
    pub async fn execute(self, config: &MigrationConfig) -> Result<()> {
        let mut original = input::load_rows(&self.original)?;
        if let Some(path) = &self.mappings {
            let mappings = input::load_mappings(path)?;
            original = original
                .iter()
                .map(|row| transform(row, &mappings))
                .collect::<Result<Vec<RecordData>, _>>()?;
        }
        let migrated = input::load_rows(&self.migrated)?;

        let mut verification = config.verification.clone();
        if !self.match_keys.is_empty() {
            verification.match_keys = self.match_keys.clone();
        }
        if !self.critical_fields.is_empty() {
            verification.critical_fields = self.critical_fields.clone();
        }

        let report = IntegrityVerifier::from_config(&verification).verify(&original, &migrated);
        let line = format!(
            "integrity {:.1}% over {} records, {} missing, {} inconsistent",
            report.integrity_percent,
            original.len(),
            report.missing_records.len(),
            report.inconsistencies.len()
        );
        if report.is_clean() {
            eprintln!("{}", style(line).green());
        } else {
            eprintln!("{}", style(line).yellow());
        }

        input::write_json(self.output.as_deref(), &report)?;

        if !report.is_clean() {
            bail!(
                "integrity check found {} missing and {} inconsistent records",
                report.missing_records.len(),
                report.inconsistencies.len()
            );
        }
        Ok(())
    }
}
