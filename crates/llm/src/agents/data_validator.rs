use anyhow::Result;
use std::sync::Arc;

use domain::{FieldMappings, RecordData};

use super::{parse_json_response, sample_rows_json};
use crate::types::DataValidationResult;
use crate::CompletionBackend;

/// Агент для проверки данных перед миграцией
pub struct DataValidatorAgent {
    llm: Arc<dyn CompletionBackend>,
}

impl DataValidatorAgent {
    pub fn new(llm: Arc<dyn CompletionBackend>) -> Self {
        Self { llm }
    }

    pub async fn validate_data(
        &self,
        rows: &[RecordData],
        mappings: &FieldMappings,
    ) -> Result<DataValidationResult> {
        let mapping_list = mappings
            .active()
            .map(|m| format!("- {} -> {}", m.source_field, m.target_field))
            .collect::<Vec<_>>()
            .join("\n");
        let sample = sample_rows_json(rows);
        let total = rows.len();

        let prompt = format!(
            r#"You review POS data before it is imported into an online store.

FIELD MAPPING:
{mapping_list}

SAMPLE ROWS ({total} rows in total):
{sample}

Report blocking problems as errors (missing product titles, non-numeric prices,
duplicate SKUs) and everything else worth a human look as warnings.

Answer ONLY with JSON:
{{
    "is_valid": true,
    "errors": [],
    "warnings": ["3 rows have no barcode"]
}}"#
        );

        let response = self.llm.chat_simple(&prompt).await?;
        let mut result: DataValidationResult = parse_json_response(&response)?;
        result.is_valid = result.errors.is_empty();
        Ok(result)
    }
}
