use anyhow::Result;
use std::sync::Arc;

use domain::RecordData;

use super::{parse_json_response, sample_rows_json};
use crate::types::DetectedSchema;
use crate::CompletionBackend;

/// Агент для определения схемы POS выгрузки
pub struct SchemaDetectorAgent {
    llm: Arc<dyn CompletionBackend>,
}

impl SchemaDetectorAgent {
    pub fn new(llm: Arc<dyn CompletionBackend>) -> Self {
        Self { llm }
    }

    pub async fn detect_schema(&self, rows: &[RecordData]) -> Result<DetectedSchema> {
        let sample = sample_rows_json(rows);
        let prompt = format!(
            r#"You analyse point-of-sale export files before they are imported into an online store.

SAMPLE ROWS:
{sample}

For every column give its name exactly as written, its data type
(string | number | boolean | date | email | currency) and up to three sample values.
Name the POS system the export most likely came from
(square | lightspeed | clover | shopify | vend | toast | generic).

Answer ONLY with JSON:
{{
    "fields": [{{"name": "Item Name", "type": "string", "sample_values": ["Widget"]}}],
    "detected_source": "square",
    "confidence": 0.8
}}"#
        );

        let response = self.llm.chat_simple(&prompt).await?;
        let mut schema: DetectedSchema = parse_json_response(&response)?;
        schema.confidence = schema.confidence.clamp(0.0, 1.0);
        Ok(schema)
    }
}
